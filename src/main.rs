use std::env;
use std::process;

use lox::prelude::InterpretResult;
use lox::Lox;

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1).collect::<Vec<_>>();
    let bytecode = match args.iter().position(|arg| arg == "--bytecode") {
        Some(index) => {
            args.remove(index);
            true
        }
        None => false,
    };

    match args.len() {
        0 => run_prompt(bytecode),
        1 => run_file(&args.pop().unwrap(), bytecode),
        _ => {
            println!("Usage: lox [--bytecode] [script]");
            process::exit(64);
        }
    }
}

fn run_prompt(bytecode: bool) {
    let mut lox = Lox::new();
    let result = if bytecode { lox.run_bytecode_prompt() } else { lox.run_prompt() };

    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(74);
    }
}

fn run_file(filename: &str, bytecode: bool) {
    let mut lox = Lox::new();

    if bytecode {
        match lox.run_bytecode_file(filename) {
            Err(_) => {
                eprintln!("Could not open file \"{filename}\".");
                process::exit(74);
            }
            Ok(InterpretResult::CompileError) => process::exit(65),
            Ok(InterpretResult::RuntimeError) => process::exit(70),
            Ok(InterpretResult::Ok) => {}
        }
    } else if lox.run_file(filename).is_err() {
        eprintln!("Could not open file \"{filename}\".");
        process::exit(74);
    }

    // Indicate an error in the exit code.
    if lox.had_error() {
        process::exit(65);
    }
    if lox.had_runtime_error() {
        process::exit(70);
    }
}

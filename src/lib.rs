#![allow(clippy::new_without_default)]
mod ast;
mod error;
mod interpreter;
mod object;
mod parser;
mod scanner;
mod token;
mod vm;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::error::*;
    pub use crate::interpreter::*;
    pub use crate::object::*;
    pub use crate::parser::*;
    pub use crate::scanner::*;
    pub use crate::token::*;
    pub use crate::vm::*;
}

use std::io::Write;

use log::debug;

use crate::ast::ExprId;
use crate::error::{ErrorReporter, SharedErrorReporter};
use crate::interpreter::{Interpreter, Resolver};
use crate::parser::Parser;
use crate::scanner::Scanner;
use crate::vm::{InterpretResult, Vm};

/// Front door for the tree-walking pipeline, plus entry points into the
/// bytecode VM. One instance per process; the REPL reuses it across lines so
/// definitions persist.
pub struct Lox {
    error_reporter: SharedErrorReporter,
    interpreter: Interpreter,
    next_expr_id: ExprId,
}

impl Lox {
    pub fn new() -> Self {
        let error_reporter = ErrorReporter::new().as_shared();
        let interpreter = Interpreter::new().with_error_reporting(error_reporter.clone());

        Self { error_reporter, interpreter, next_expr_id: 0 }
    }

    pub fn had_error(&self) -> bool {
        self.error_reporter.borrow().had_error
    }

    pub fn had_runtime_error(&self) -> bool {
        self.error_reporter.borrow().had_runtime_error
    }

    pub fn run_file(&mut self, filename: &str) -> Result<(), anyhow::Error> {
        let content = std::fs::read_to_string(filename)?;
        self.run(content.as_ref());
        Ok(())
    }

    pub fn run_bytecode_file(&mut self, filename: &str) -> Result<InterpretResult, anyhow::Error> {
        let content = std::fs::read_to_string(filename)?;
        Ok(self.run_bytecode(content.as_ref()))
    }

    pub fn run_prompt(&mut self) -> Result<(), anyhow::Error> {
        let reader = std::io::stdin();

        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let mut line = String::new();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                return Ok(());
            }
            let line = line.trim_end();

            // A line that reads as a single expression is evaluated and
            // echoed; everything else runs as a statement sequence.
            if !self.try_run_expression(line) {
                self.run(line);
            }

            self.error_reporter.borrow_mut().reset();
        }
    }

    /// Same line loop, driving the bytecode VM instead of the tree walker.
    pub fn run_bytecode_prompt(&mut self) -> Result<(), anyhow::Error> {
        let reader = std::io::stdin();
        let mut vm = Vm::new().with_error_reporting(self.error_reporter.clone());

        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let mut line = String::new();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                return Ok(());
            }

            vm.interpret_source(line.trim_end());
            self.error_reporter.borrow_mut().reset();
        }
    }

    pub fn run(&mut self, source: &str) {
        debug!("running {} bytes of source", source.len());

        let mut scanner =
            Scanner::new(source).with_error_reporting(self.error_reporter.clone());
        let tokens = scanner.scan_tokens();

        let mut parser = Parser::new(tokens)
            .with_start_id(self.next_expr_id)
            .with_error_reporting(self.error_reporter.clone());
        let parsed = parser.parse();
        self.next_expr_id = parser.next_id();

        let Some(stmts) = parsed else {
            return;
        };

        let mut resolver = Resolver::new(&mut self.interpreter)
            .with_error_reporting(self.error_reporter.clone());
        resolver.resolve(&stmts);

        if self.error_reporter.borrow().had_error {
            return;
        }

        self.interpreter.interpret(&stmts);
    }

    pub fn run_bytecode(&mut self, source: &str) -> InterpretResult {
        let mut vm = Vm::new().with_error_reporting(self.error_reporter.clone());
        vm.interpret_source(source)
    }

    /// REPL helper: parse the line as a bare expression with diagnostics
    /// silenced. Returns false if it does not parse that way.
    fn try_run_expression(&mut self, line: &str) -> bool {
        self.error_reporter.borrow_mut().silence(true);
        let tokens = Scanner::new(line)
            .with_error_reporting(self.error_reporter.clone())
            .scan_tokens();
        let mut parser = Parser::new(tokens)
            .with_start_id(self.next_expr_id)
            .with_error_reporting(self.error_reporter.clone());
        let parsed = parser.parse_expression();
        self.error_reporter.borrow_mut().silence(false);

        let Some(expr) = parsed else {
            return false;
        };
        self.next_expr_id = parser.next_id();

        let mut resolver = Resolver::new(&mut self.interpreter)
            .with_error_reporting(self.error_reporter.clone());
        resolver.resolve_expression(&expr);
        if self.error_reporter.borrow().had_error {
            return true;
        }

        match self.interpreter.evaluate_expr(&expr) {
            Ok(value) => println!("{value}"),
            Err(e) => self.error_reporter.borrow_mut().runtime_error(&e),
        }

        true
    }
}

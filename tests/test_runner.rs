use std::path::Path;
use std::process::Output;

use assert_cmd::Command;

include!(concat!(env!("OUT_DIR"), "/test_files.rs"));

// These functions are used by the included tests above.
// See `build.rs` for the code that generates the tests.
//
// Expectation comments inside a .lox file:
//   // expect: <stdout line>
//   // expect-err: <stderr line, verbatim>
//   // expect-exit: <code>         (defaults to 0)

fn do_test(filename: &Path, bytecode: bool) {
    let expected_out = find_expects(filename, "// expect: ").join("\n");
    let expected_err = find_expects(filename, "// expect-err: ").join("\n");
    let expected_exit = find_expects(filename, "// expect-exit: ")
        .pop()
        .map(|s| s.trim().parse::<i32>().expect("bad expect-exit value"))
        .unwrap_or(0);

    let output = run_file(filename, bytecode);

    let stdout = String::from_utf8(output.stdout).unwrap();
    let stdout = stdout.trim_end();

    let stderr = String::from_utf8(output.stderr).unwrap();
    let stderr = stderr.trim_end();

    assert_eq!(stdout, expected_out, "generated output != expected output");
    assert_eq!(stderr, expected_err, "generated error != expected error");
    assert_eq!(
        output.status.code(),
        Some(expected_exit),
        "exit code mismatch for {}",
        filename.display()
    );
}

fn run_file(filename: &Path, bytecode: bool) -> Output {
    let mut cmd = Command::cargo_bin("lox").unwrap();
    if bytecode {
        cmd.arg("--bytecode");
    }
    cmd.arg(filename).output().unwrap()
}

fn find_expects(filename: &Path, prefix: &str) -> Vec<String> {
    let content = std::fs::read_to_string(filename)
        .unwrap_or_else(|_| panic!("failed to read {}", filename.display()));

    let mut result = vec![];
    for line in content.lines() {
        if let Some(idx) = line.find(prefix) {
            result.push(line[idx + prefix.len()..].to_owned());
        }
    }

    result
}

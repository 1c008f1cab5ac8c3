use std::cell::RefCell;
use std::rc::Rc;

use crate::interpreter::RuntimeError;

/// Process-wide diagnostics sink. Scanner, parser, resolver, interpreter and
/// VM all report through a shared instance; the driver inspects the flags to
/// pick an exit code and resets them between REPL lines.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    pub had_error: bool,
    pub had_runtime_error: bool,
    silenced: bool,
    messages: Vec<String>,
}

pub type SharedErrorReporter = Rc<RefCell<ErrorReporter>>;

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_shared(self) -> SharedErrorReporter {
        Rc::new(RefCell::new(self))
    }

    /// Lexical and syntax errors.
    pub fn error(&mut self, line: i32, column: i32, message: &str) {
        if self.silenced {
            return;
        }
        self.report(line, column, "", message);
        self.had_error = true;
    }

    /// Resolver diagnostics.
    pub fn semantic_error(&mut self, line: i32, column: i32, message: &str) {
        if self.silenced {
            return;
        }
        self.report(line, column, "SemanticError", message);
        self.had_error = true;
    }

    pub fn runtime_error(&mut self, error: &RuntimeError) {
        let (line, column) = error.location();
        self.runtime_error_at(line, column, &error.to_string());
    }

    /// Runtime diagnostics with an explicit location (VM instructions).
    pub fn runtime_error_at(&mut self, line: i32, column: i32, message: &str) {
        if self.silenced {
            return;
        }
        self.report(line, column, "RuntimeError", message);
        self.had_runtime_error = true;
    }

    /// Used by the REPL while probing a line as a bare expression.
    pub fn silence(&mut self, silenced: bool) {
        self.silenced = silenced;
    }

    pub fn reset(&mut self) {
        self.had_error = false;
        self.had_runtime_error = false;
        self.messages.clear();
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    fn report(&mut self, line: i32, column: i32, kind: &str, message: &str) {
        let formatted = if line > 0 {
            format!("[{}:{}] {}: {}", line, column, kind, message)
        } else {
            format!("{}: {}", kind, message)
        };
        eprintln!("{formatted}");
        self.messages.push(formatted);
    }
}

use thiserror::Error;

use crate::object::Object;
use crate::token::Token;

/// Everything the evaluator can throw. `Break` and `Return` are not failures:
/// they ride the same channel so statement execution unwinds to the nearest
/// loop or call frame, which catches them.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{msg}")]
    InvalidOperand { operator: Token, msg: String },

    #[error("Undefined variable '{}'.", .name.lexeme)]
    UndefinedVariable { name: Token },

    #[error("Undefined property '{}'.", .name.lexeme)]
    UndefinedProperty { name: Token },

    #[error("Variable '{}' already defined in this scope.", .name.lexeme)]
    AlreadyDefined { name: Token },

    #[error("Unexpected 'break' outside of a loop.")]
    Break { token: Token },

    #[error("Unexpected 'return' outside of a function.")]
    Return { token: Token, value: Object },
}

impl RuntimeError {
    pub fn location(&self) -> (i32, i32) {
        let token = match self {
            RuntimeError::InvalidOperand { operator, .. } => operator,
            RuntimeError::UndefinedVariable { name } => name,
            RuntimeError::UndefinedProperty { name } => name,
            RuntimeError::AlreadyDefined { name } => name,
            RuntimeError::Break { token } => token,
            RuntimeError::Return { token, .. } => token,
        };
        (token.line, token.column)
    }
}

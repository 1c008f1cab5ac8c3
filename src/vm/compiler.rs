use log::debug;

use super::chunk::{Chunk, OpCode};
use crate::error::SharedErrorReporter;
use crate::object::Object;
use crate::scanner::Scanner;
use crate::token::{Token, TokenType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment, // =
    Question,   // ?:
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Question,
            Precedence::Question => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'c> = fn(&mut Compiler<'c>);

struct ParseRule<'c> {
    prefix: Option<ParseFn<'c>>,
    infix: Option<ParseFn<'c>>,
    precedence: Precedence,
}

/// The table drives `parse_precedence`: apply the current token's prefix
/// rule, then loop infix rules while the lookahead binds at least as tight.
fn get_rule<'c>(token_type: &TokenType) -> ParseRule<'c> {
    let (prefix, infix, precedence): (Option<ParseFn<'c>>, Option<ParseFn<'c>>, Precedence) =
        match token_type {
            TokenType::LeftParen => (Some(Compiler::grouping), None, Precedence::None),
            TokenType::Minus => {
                (Some(Compiler::unary), Some(Compiler::binary), Precedence::Term)
            }
            TokenType::Plus => (None, Some(Compiler::binary), Precedence::Term),
            TokenType::Slash => (None, Some(Compiler::binary), Precedence::Factor),
            TokenType::Star => (None, Some(Compiler::binary), Precedence::Factor),
            TokenType::Bang => (Some(Compiler::unary), None, Precedence::None),
            TokenType::Question => {
                (None, Some(Compiler::ternary), Precedence::Question)
            }
            TokenType::BangEqual => (None, Some(Compiler::binary), Precedence::Equality),
            TokenType::EqualEqual => (None, Some(Compiler::binary), Precedence::Equality),
            TokenType::Greater => (None, Some(Compiler::binary), Precedence::Comparison),
            TokenType::GreaterEqual => (None, Some(Compiler::binary), Precedence::Comparison),
            TokenType::Less => (None, Some(Compiler::binary), Precedence::Comparison),
            TokenType::LessEqual => (None, Some(Compiler::binary), Precedence::Comparison),
            TokenType::Number => (Some(Compiler::number), None, Precedence::None),
            TokenType::False => (Some(Compiler::literal), None, Precedence::None),
            TokenType::True => (Some(Compiler::literal), None, Precedence::None),
            TokenType::Nil => (Some(Compiler::literal), None, Precedence::None),
            _ => (None, None, Precedence::None),
        };

    ParseRule { prefix, infix, precedence }
}

/// Single-pass expression compiler: bytecode is emitted directly as the
/// Pratt parser recurses, no AST in between.
pub struct Compiler<'c> {
    tokens: Vec<Token>,
    current: usize,
    had_error: bool,
    panic_mode: bool,
    chunk: &'c mut Chunk,
    error_reporter: Option<SharedErrorReporter>,
}

impl<'c> Compiler<'c> {
    pub fn new(chunk: &'c mut Chunk) -> Self {
        Self {
            tokens: vec![],
            current: 0,
            had_error: false,
            panic_mode: false,
            chunk,
            error_reporter: None,
        }
    }

    pub fn with_error_reporting(self, error_reporter: SharedErrorReporter) -> Self {
        Self { error_reporter: Some(error_reporter), ..self }
    }

    pub fn compile(&mut self, source: &str) -> bool {
        let mut scanner = Scanner::new(source);
        if let Some(reporter) = self.error_reporter.as_ref() {
            scanner = scanner.with_error_reporting(reporter.clone());
        }
        self.tokens = scanner.scan_tokens();

        if self.tokens.last().map(|t| &t.token_type) != Some(&TokenType::EOF) {
            return false;
        }

        self.expression();
        self.consume(TokenType::EOF, "Expect end of expression.");
        self.end_compiler();

        !self.had_error
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let Some(prefix_rule) = get_rule(&self.previous().token_type).prefix else {
            self.error("Expect expression.");
            return;
        };
        prefix_rule(self);

        while precedence <= get_rule(&self.peek().token_type).precedence {
            self.advance();
            if let Some(infix_rule) = get_rule(&self.previous().token_type).infix {
                infix_rule(self);
            }
        }
    }

    fn number(&mut self) {
        let lexeme = self.previous().lexeme.clone();
        let value = if lexeme.contains('.') {
            lexeme.parse::<f64>().map(Object::Float).ok()
        } else {
            lexeme
                .parse::<i64>()
                .map(Object::Int)
                .ok()
                .or_else(|| lexeme.parse::<f64>().map(Object::Float).ok())
        };

        match value {
            Some(value) => self.emit_constant(value),
            None => self.error("Malformed number literal."),
        }
    }

    fn literal(&mut self) {
        match self.previous().token_type {
            TokenType::False => self.emit_byte(OpCode::False as u8),
            TokenType::True => self.emit_byte(OpCode::True as u8),
            TokenType::Nil => self.emit_byte(OpCode::Nil as u8),
            _ => self.error("Unknown literal."),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let operator_type = self.previous().token_type.clone();
        self.parse_precedence(Precedence::Unary);
        match operator_type {
            TokenType::Minus => self.emit_byte(OpCode::Negate as u8),
            TokenType::Bang => self.emit_byte(OpCode::Not as u8),
            _ => self.error("Unknown unary operator."),
        }
    }

    fn binary(&mut self) {
        let operator_type = self.previous().token_type.clone();

        let rule = get_rule(&operator_type);
        self.parse_precedence(rule.precedence.next());

        match operator_type {
            TokenType::Plus => self.emit_byte(OpCode::Add as u8),
            TokenType::Minus => self.emit_byte(OpCode::Subtract as u8),
            TokenType::Star => self.emit_byte(OpCode::Multiply as u8),
            TokenType::Slash => self.emit_byte(OpCode::Divide as u8),
            TokenType::Greater => self.emit_byte(OpCode::Greater as u8),
            TokenType::Less => self.emit_byte(OpCode::Less as u8),
            // a >= b  is  !(a < b);  a <= b  is  !(a > b).
            TokenType::GreaterEqual => {
                self.emit_byte(OpCode::Less as u8);
                self.emit_byte(OpCode::Not as u8);
            }
            TokenType::LessEqual => {
                self.emit_byte(OpCode::Greater as u8);
                self.emit_byte(OpCode::Not as u8);
            }
            TokenType::EqualEqual => self.emit_byte(OpCode::Equal as u8),
            TokenType::BangEqual => {
                self.emit_byte(OpCode::Equal as u8);
                self.emit_byte(OpCode::Not as u8);
            }
            _ => {
                // Unreachable.
            }
        }
    }

    fn ternary(&mut self) {
        let rule = get_rule(&TokenType::Question);
        self.parse_precedence(rule.precedence);
        self.consume(TokenType::Colon, "Expect ':' in ternary operator.");
        self.parse_precedence(rule.precedence);
    }

    fn emit_byte(&mut self, byte: u8) {
        let (line, column) = {
            let previous = self.previous();
            (previous.line, previous.column)
        };
        self.chunk.write(byte, line, column);
    }

    fn emit_constant(&mut self, value: Object) {
        let index = self.chunk.add_constant(value);
        let (line, column) = {
            let previous = self.previous();
            (previous.line, previous.column)
        };

        if index <= 0xFF {
            self.chunk.write_op(OpCode::Constant, line, column);
            self.chunk.write(index as u8, line, column);
        } else if index <= 0xFF_FFFF {
            self.chunk.write_op(OpCode::ConstantLong, line, column);
            self.chunk.write(((index >> 16) & 0xFF) as u8, line, column);
            self.chunk.write(((index >> 8) & 0xFF) as u8, line, column);
            self.chunk.write((index & 0xFF) as u8, line, column);
        } else {
            self.error("Too many constants in one chunk.");
        }
    }

    fn end_compiler(&mut self) {
        self.emit_byte(OpCode::Return as u8);
        if !self.had_error {
            debug!("{}", self.chunk.disassemble("code"));
        }
    }

    fn advance(&mut self) {
        while self.current < self.tokens.len() {
            if self.peek().token_type != TokenType::Error {
                if !self.is_at_end() {
                    self.current += 1;
                }
                return;
            }
            let message = self.peek().lexeme.clone();
            self.error_at_current(&message);
            self.current += 1;
        }
    }

    fn consume(&mut self, token_type: TokenType, message: &str) {
        if self.peek().token_type == token_type {
            if token_type != TokenType::EOF {
                self.advance();
            }
            return;
        }

        self.error_at_current(message);
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::EOF
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.current).unwrap_or_else(|| {
            self.tokens.last().expect("compiler started with an empty token stream")
        })
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.current.saturating_sub(1), message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    /// Panic mode swallows follow-on diagnostics until the compile ends;
    /// the chunk is refused either way.
    fn error_at(&mut self, index: usize, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        let Some(reporter) = self.error_reporter.as_ref() else {
            return;
        };
        let Some(token) = self.tokens.get(index) else {
            return;
        };
        let mut reporter = reporter.borrow_mut();
        match token.token_type {
            TokenType::EOF => {
                reporter.error(token.line, token.column, format!("at end: {}", message).as_str())
            }
            TokenType::Error => reporter.error(token.line, token.column, message),
            _ => reporter.error(
                token.line,
                token.column,
                format!("at '{}': {}", token.lexeme, message).as_str(),
            ),
        }
    }
}

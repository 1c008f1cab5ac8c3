use log::debug;
use phf::phf_map;

use crate::error::SharedErrorReporter;
use crate::token::{Token, TokenType};

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and" => TokenType::And,
    "break" => TokenType::Break,
    "class" => TokenType::Class,
    "else" => TokenType::Else,
    "false" => TokenType::False,
    "for" => TokenType::For,
    "fun" => TokenType::Fun,
    "if" => TokenType::If,
    "nil" => TokenType::Nil,
    "or" => TokenType::Or,
    "print" => TokenType::Print,
    "return" => TokenType::Return,
    "super" => TokenType::Super,
    "this" => TokenType::This,
    "true" => TokenType::True,
    "var" => TokenType::Var,
    "while" => TokenType::While,
};

#[derive(Debug)]
pub struct Scanner {
    source_chars: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: i32,
    column: i32,
    start_line: i32,
    start_column: i32,
    error_reporter: Option<SharedErrorReporter>,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            source_chars: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            error_reporter: None,
        }
    }

    pub fn with_error_reporting(self, error_reporter: SharedErrorReporter) -> Self {
        Self { error_reporter: Some(error_reporter), ..self }
    }

    pub fn scan_tokens(&mut self) -> Vec<Token> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_line = self.line;
            self.start_column = self.column;
            self.scan_token();
        }

        self.tokens.push(Token::new(TokenType::EOF, "", self.line, self.column));
        debug!("scanned {} tokens", self.tokens.len());

        std::mem::take(&mut self.tokens)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source_chars.len()
    }

    fn scan_token(&mut self) {
        let c = self.advance();

        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '.' => {
                // A leading dot may start a number like '.5'.
                if self.peek().is_ascii_digit() {
                    self.number();
                } else {
                    self.add_token(TokenType::Dot);
                }
            }
            '-' => self.add_token(TokenType::Minus),
            '+' => self.add_token(TokenType::Plus),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),
            '?' => self.add_token(TokenType::Question),
            ':' => self.add_token(TokenType::Colon),
            '!' => {
                let token_type = if self.match_next('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                };
                self.add_token(token_type);
            }
            '=' => {
                let token_type = if self.match_next('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                };
                self.add_token(token_type);
            }
            '<' => {
                let token_type = if self.match_next('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.add_token(token_type);
            }
            '>' => {
                let token_type = if self.match_next('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.add_token(token_type);
            }
            '/' => {
                if self.match_next('/') {
                    // Go until end of the commented line
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.match_next('*') {
                    self.block_comment();
                } else {
                    self.add_token(TokenType::Slash);
                }
            }
            ' ' | '\r' | '\t' | '\n' => {}
            '"' => self.string(),
            '0'..='9' => self.number(),
            c if is_alpha(c) => self.identifier(),
            _ => self.error(format!("Unexpected character: {c}").as_str()),
        }
    }

    fn error(&self, msg: &str) {
        if let Some(reporter) = self.error_reporter.as_ref() {
            reporter.borrow_mut().error(self.line, self.column, msg);
        }
    }

    fn advance(&mut self) -> char {
        let ch = *self.source_chars.get(self.current).expect("failed to read char!");
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.current += 1;
        ch
    }

    fn source_substring(&self, start: usize, end: usize) -> String {
        self.source_chars.get(start..end).unwrap_or_default().iter().collect()
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text = self.source_substring(self.start, self.current);
        self.add_token_with_lexeme(token_type, &text);
    }

    fn add_token_with_lexeme(&mut self, token_type: TokenType, lexeme: &str) {
        self.tokens.push(Token::new(token_type, lexeme, self.start_line, self.start_column));
    }

    fn match_next(&mut self, expected: char) -> bool {
        if let Some(c) = self.source_chars.get(self.current) {
            if c == &expected {
                self.advance();
                return true;
            }
        }

        false
    }

    fn peek(&self) -> char {
        *self.source_chars.get(self.current).unwrap_or(&'\0')
    }

    fn peek_next(&self) -> char {
        *self.source_chars.get(self.current + 1).unwrap_or(&'\0')
    }

    /// Block comments nest; an unterminated one is a lexical error.
    fn block_comment(&mut self) {
        let mut depth = 1;
        while !self.is_at_end() {
            if self.peek() == '/' && self.peek_next() == '*' {
                self.advance();
                self.advance();
                depth += 1;
            } else if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                depth -= 1;
                if depth == 0 {
                    return;
                }
            } else {
                self.advance();
            }
        }

        self.error("Unterminated multi-line comment.");
    }

    fn string(&mut self) {
        let mut text = String::new();
        while self.peek() != '"' && !self.is_at_end() {
            let c = self.advance();
            if c == '\\' {
                if self.is_at_end() {
                    break;
                }
                let next = self.advance();
                match next {
                    '"' => text.push('"'),
                    '\\' => text.push('\\'),
                    'n' => text.push('\n'),
                    'r' => text.push('\r'),
                    't' => text.push('\t'),
                    _ => self.error(format!("Unknown escape: \\{next}").as_str()),
                }
            } else {
                text.push(c);
            }
        }

        if self.is_at_end() {
            self.error("Unterminated string.");
            return;
        }

        // The closing "
        self.advance();

        self.add_token_with_lexeme(TokenType::StringLiteral, &text);
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            // Consume '.'
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        if self.peek() == 'e' || self.peek() == 'E' {
            self.advance();
            if self.peek() == '+' || self.peek() == '-' {
                self.advance();
            }
            if !self.peek().is_ascii_digit() {
                self.error("Malformed number: exponent has no digits.");
                return;
            }
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        self.add_token(TokenType::Number);
    }

    fn identifier(&mut self) {
        while is_alpha_numeric(self.peek()) {
            self.advance();
        }

        let text = self.source_substring(self.start, self.current);
        let token_type = KEYWORDS.get(text.as_str()).cloned().unwrap_or(TokenType::Identifier);
        self.add_token(token_type);
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_alpha_numeric(c: char) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReporter;

    fn scan(source: &str) -> Vec<Token> {
        Scanner::new(source).scan_tokens()
    }

    fn token_types(source: &str) -> Vec<TokenType> {
        scan(source).into_iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn scans_operators_and_keywords() {
        assert_eq!(
            token_types("var x = 1 + 2;"),
            vec![
                TokenType::Var,
                TokenType::Identifier,
                TokenType::Equal,
                TokenType::Number,
                TokenType::Plus,
                TokenType::Number,
                TokenType::Semicolon,
                TokenType::EOF,
            ]
        );
    }

    #[test]
    fn scans_ternary_tokens() {
        assert_eq!(
            token_types("a ? b : c"),
            vec![
                TokenType::Identifier,
                TokenType::Question,
                TokenType::Identifier,
                TokenType::Colon,
                TokenType::Identifier,
                TokenType::EOF,
            ]
        );
    }

    #[test]
    fn tracks_lines_and_columns() {
        let tokens = scan("var a;\n  a = 1;");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1)); // var
        assert_eq!((tokens[1].line, tokens[1].column), (1, 5)); // a
        assert_eq!((tokens[3].line, tokens[3].column), (2, 3)); // a
        assert_eq!((tokens[4].line, tokens[4].column), (2, 5)); // =
    }

    #[test]
    fn line_and_column_are_monotonic() {
        let tokens = scan("var a = 1;\nvar b = a + 2;\n{ print b; }");
        for pair in tokens.windows(2) {
            assert!((pair[0].line, pair[0].column) <= (pair[1].line, pair[1].column));
        }
    }

    #[test]
    fn nested_block_comments() {
        let tokens = scan("1 /* outer /* inner */ still out */ 2");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].lexeme, "1");
        assert_eq!(tokens[1].lexeme, "2");
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        let reporter = ErrorReporter::new().as_shared();
        let mut scanner = Scanner::new("/* no end").with_error_reporting(reporter.clone());
        scanner.scan_tokens();
        assert!(reporter.borrow().had_error);
    }

    #[test]
    fn string_escapes_are_decoded() {
        let tokens = scan(r#""a\tb\n\"q\"""#);
        assert_eq!(tokens[0].token_type, TokenType::StringLiteral);
        assert_eq!(tokens[0].lexeme, "a\tb\n\"q\"");
    }

    #[test]
    fn unknown_escape_is_an_error() {
        let reporter = ErrorReporter::new().as_shared();
        let mut scanner = Scanner::new(r#""bad \q""#).with_error_reporting(reporter.clone());
        scanner.scan_tokens();
        assert!(reporter.borrow().had_error);
    }

    #[test]
    fn numbers_with_fraction_and_exponent() {
        let tokens = scan("12 3.5 1e3 2.5E-2 .5");
        let lexemes: Vec<_> = tokens[..5].iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["12", "3.5", "1e3", "2.5E-2", ".5"]);
        assert!(tokens[..5].iter().all(|t| t.token_type == TokenType::Number));
    }

    #[test]
    fn exponent_without_digits_is_an_error() {
        let reporter = ErrorReporter::new().as_shared();
        let mut scanner = Scanner::new("1e+;").with_error_reporting(reporter.clone());
        scanner.scan_tokens();
        assert!(reporter.borrow().had_error);
    }

    #[test]
    fn errors_do_not_stop_scanning() {
        let reporter = ErrorReporter::new().as_shared();
        let mut scanner = Scanner::new("@ 1 #").with_error_reporting(reporter.clone());
        let tokens = scanner.scan_tokens();
        assert!(reporter.borrow().had_error);
        assert_eq!(reporter.borrow().messages().len(), 2);
        assert_eq!(tokens[0].lexeme, "1");
    }
}

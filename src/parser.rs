use std::rc::Rc;

use crate::ast::{Expr, ExprId, Stmt};
use crate::error::SharedErrorReporter;
use crate::token::{Token, TokenType};

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    next_id: ExprId,
    had_error: bool,
    error_reporter: Option<SharedErrorReporter>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0, next_id: 0, had_error: false, error_reporter: None }
    }

    /// Continue numbering expression nodes from a previous parse. The REPL
    /// uses this so depth annotations from earlier lines stay valid.
    pub fn with_start_id(self, next_id: ExprId) -> Self {
        Self { next_id, ..self }
    }

    pub fn with_error_reporting(self, error_reporter: SharedErrorReporter) -> Self {
        Self { error_reporter: Some(error_reporter), ..self }
    }

    pub fn next_id(&self) -> ExprId {
        self.next_id
    }

    pub fn parse(&mut self) -> Option<Vec<Stmt>> {
        let mut statements = vec![];
        while !self.is_at_end() {
            match self.declaration() {
                Some(stmt) => statements.push(stmt),
                None => self.synchronize(),
            }
        }

        if self.had_error {
            None
        } else {
            Some(statements)
        }
    }

    /// Parse a single expression spanning the whole input (REPL mode).
    pub fn parse_expression(&mut self) -> Option<Expr> {
        let expr = self.expression()?;
        if self.is_at_end() && !self.had_error {
            Some(expr)
        } else {
            None
        }
    }

    fn declaration(&mut self) -> Option<Stmt> {
        if self.match_tt(&[TokenType::Var]) {
            self.var_declaration()
        } else if self.check(&TokenType::Fun) && self.check_next(&TokenType::Identifier) {
            self.advance();
            self.function("function")
        } else if self.match_tt(&[TokenType::Class]) {
            self.class_declaration()
        } else {
            self.statement()
        }
    }

    fn var_declaration(&mut self) -> Option<Stmt> {
        let name = self.consume(TokenType::Identifier, "Expect variable name")?;

        let initializer = if self.match_tt(&[TokenType::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expect ';' after variable declaration")?;

        Some(Stmt::Var { name, initializer })
    }

    fn function(&mut self, kind: &str) -> Option<Stmt> {
        let name =
            self.consume(TokenType::Identifier, format!("Expect {} name", kind).as_str())?;
        self.function_with_name(name, kind)
    }

    fn function_with_name(&mut self, name: Token, kind: &str) -> Option<Stmt> {
        self.consume(
            TokenType::LeftParen,
            format!("Expect '(' after {} name", kind).as_str(),
        )?;

        let parameters = self.parameter_list()?;

        self.consume(
            TokenType::LeftBrace,
            format!("Expect '{{' before {} body", kind).as_str(),
        )?;

        let body = self.block()?.into_iter().map(Rc::new).collect::<Vec<_>>();

        Some(Stmt::Function { name, params: parameters, body })
    }

    fn parameter_list(&mut self) -> Option<Vec<Token>> {
        let mut parameters = vec![];
        if !self.check(&TokenType::RightParen) {
            loop {
                if parameters.len() >= 255 {
                    self.error(self.peek().clone(), "Can't have more than 255 parameters");
                }

                parameters.push(self.consume(TokenType::Identifier, "Expect parameter name")?);
                if !self.match_tt(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        self.consume(TokenType::RightParen, "Expect ')' after parameters")?;
        Some(parameters)
    }

    fn class_declaration(&mut self) -> Option<Stmt> {
        let name = self.consume(TokenType::Identifier, "Expect class name")?;

        let superclass = if self.match_tt(&[TokenType::Less]) {
            let super_name = self.consume(TokenType::Identifier, "Expect superclass name")?;
            Some(Expr::Variable { id: self.fresh_id(), name: super_name })
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expect '{' before class body")?;

        let mut methods = vec![];
        let mut getters = vec![];
        let mut class_methods = vec![];

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if self.match_tt(&[TokenType::Class]) {
                class_methods.push(self.function("class method")?);
            } else {
                let member_name = self.consume(TokenType::Identifier, "Expect method name")?;
                if self.match_tt(&[TokenType::LeftBrace]) {
                    // A getter is a body with no parameter list.
                    let body = self.block()?.into_iter().map(Rc::new).collect::<Vec<_>>();
                    getters.push(Stmt::Getter { name: member_name, body });
                } else {
                    methods.push(self.function_with_name(member_name, "method")?);
                }
            }
        }

        self.consume(TokenType::RightBrace, "Expect '}' after class body")?;

        Some(Stmt::Class { name, superclass, methods, getters, class_methods })
    }

    fn statement(&mut self) -> Option<Stmt> {
        if self.match_tt(&[TokenType::If]) {
            self.if_statement()
        } else if self.match_tt(&[TokenType::While]) {
            self.while_statement()
        } else if self.match_tt(&[TokenType::Return]) {
            self.return_statement()
        } else if self.match_tt(&[TokenType::For]) {
            self.for_statement()
        } else if self.match_tt(&[TokenType::Print]) {
            self.print_statement()
        } else if self.match_tt(&[TokenType::Break]) {
            self.break_statement()
        } else if self.match_tt(&[TokenType::LeftBrace]) {
            Some(Stmt::Block { statements: self.block()? })
        } else {
            self.expression_statement()
        }
    }

    fn if_statement(&mut self) -> Option<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_tt(&[TokenType::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Some(Stmt::If { condition, then_branch, else_branch })
    }

    fn return_statement(&mut self) -> Option<Stmt> {
        let keyword = self.previous();
        let value = if !self.check(&TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expect ';' after return value")?;
        Some(Stmt::Return { keyword, value })
    }

    fn while_statement(&mut self) -> Option<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after while condition")?;

        let body = Box::new(self.statement()?);
        Some(Stmt::While { condition, body })
    }

    /// `for` is pure sugar: the resolver and interpreter only ever see the
    /// equivalent `while` inside a block.
    fn for_statement(&mut self) -> Option<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'")?;

        let initializer = if self.match_tt(&[TokenType::Semicolon]) {
            None
        } else if self.match_tt(&[TokenType::Var]) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(&TokenType::Semicolon) {
            self.expression()?
        } else {
            let previous = self.previous();
            Expr::Literal {
                value: Token::new(TokenType::True, "true", previous.line, previous.column),
            }
        };
        self.consume(TokenType::Semicolon, "Expect ';' after 'for' condition")?;

        let increment = if !self.check(&TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expect ')' after 'for' clauses")?;

        let mut body = self.statement()?;

        // Now reconstruct all those parts as a while statement
        if let Some(increment) = increment {
            body = Stmt::Block { statements: vec![body, Stmt::Expression { expr: increment }] };
        }

        body = Stmt::While { condition, body: Box::new(body) };

        if let Some(initializer) = initializer {
            body = Stmt::Block { statements: vec![initializer, body] };
        }

        Some(body)
    }

    fn print_statement(&mut self) -> Option<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after the print statement")?;
        Some(Stmt::Print { expr })
    }

    fn break_statement(&mut self) -> Option<Stmt> {
        let token = self.previous();
        self.consume(TokenType::Semicolon, "Expect ';' after 'break'")?;
        Some(Stmt::Break { token })
    }

    fn block(&mut self) -> Option<Vec<Stmt>> {
        let mut statements = vec![];

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        self.consume(TokenType::RightBrace, "Expect '}' after block")?;
        Some(statements)
    }

    fn expression_statement(&mut self) -> Option<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after expression")?;
        Some(Stmt::Expression { expr })
    }

    fn expression(&mut self) -> Option<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Option<Expr> {
        let expr = self.or()?;

        if self.match_tt(&[TokenType::Equal]) {
            let equals = self.previous();
            let value = self.assignment()?;
            match expr {
                Expr::Variable { name, .. } => {
                    return Some(Expr::Assignment {
                        id: self.fresh_id(),
                        name,
                        value: Box::new(value),
                    });
                }
                Expr::Get { object, name } => {
                    return Some(Expr::Set { object, name, value: Box::new(value) });
                }
                _ => self.error(equals, "Invalid assignment target"),
            }
            return None;
        }

        Some(expr)
    }

    fn or(&mut self) -> Option<Expr> {
        let mut expr = self.and()?;

        while self.match_tt(&[TokenType::Or]) {
            let operator = self.previous();
            let right = self.and()?;
            expr = Expr::Logical { left: Box::new(expr), operator, right: Box::new(right) };
        }

        Some(expr)
    }

    fn and(&mut self) -> Option<Expr> {
        let mut expr = self.comma()?;

        while self.match_tt(&[TokenType::And]) {
            let operator = self.previous();
            let right = self.comma()?;
            expr = Expr::Logical { left: Box::new(expr), operator, right: Box::new(right) };
        }

        Some(expr)
    }

    fn comma(&mut self) -> Option<Expr> {
        let mut expr = self.ternary()?;

        while self.match_tt(&[TokenType::Comma]) {
            let operator = self.previous();
            let right = self.ternary()?;
            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }

        Some(expr)
    }

    fn ternary(&mut self) -> Option<Expr> {
        if self.match_tt(&[TokenType::Question]) {
            self.error(self.previous(), "Expect expression before '?'");
            return None;
        }

        let expr = self.equality()?;

        if self.match_tt(&[TokenType::Question]) {
            let middle = self.or()?;
            self.consume(TokenType::Colon, "Expect ':' after expression")?;
            let right = self.ternary()?;
            return Some(Expr::Ternary {
                left: Box::new(expr),
                middle: Box::new(middle),
                right: Box::new(right),
            });
        }

        Some(expr)
    }

    fn equality(&mut self) -> Option<Expr> {
        if self.match_tt(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            self.error(self.previous(), "Expect expression before equality operator");
            return None;
        }

        let mut expr = self.comparison()?;

        while self.match_tt(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            let operator: Token = self.previous();
            let right = self.comparison()?;
            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }
        Some(expr)
    }

    fn comparison(&mut self) -> Option<Expr> {
        if self.match_tt(&[
            TokenType::GreaterEqual,
            TokenType::Greater,
            TokenType::LessEqual,
            TokenType::Less,
        ]) {
            self.error(self.previous(), "Expect expression before comparison operator");
            return None;
        }

        let mut expr = self.term()?;

        while self.match_tt(&[
            TokenType::GreaterEqual,
            TokenType::Greater,
            TokenType::LessEqual,
            TokenType::Less,
        ]) {
            let operator: Token = self.previous();
            let right = self.term()?;
            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }
        Some(expr)
    }

    fn term(&mut self) -> Option<Expr> {
        let mut expr = self.factor()?;

        while self.match_tt(&[TokenType::Minus, TokenType::Plus]) {
            let operator: Token = self.previous();
            let right = self.factor()?;
            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }
        Some(expr)
    }

    fn factor(&mut self) -> Option<Expr> {
        if self.match_tt(&[TokenType::Slash, TokenType::Star]) {
            self.error(self.previous(), "Expect expression before factor operator");
            return None;
        }

        let mut expr = self.unary()?;

        while self.match_tt(&[TokenType::Slash, TokenType::Star]) {
            let operator: Token = self.previous();
            let right = self.unary()?;
            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }
        Some(expr)
    }

    fn unary(&mut self) -> Option<Expr> {
        if self.match_tt(&[TokenType::Bang, TokenType::Minus]) {
            let operator = self.previous();
            let right = self.unary()?;
            return Some(Expr::Unary { operator, right: Box::new(right) });
        }

        self.call()
    }

    fn call(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_tt(&[TokenType::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_tt(&[TokenType::Dot]) {
                let name = self.consume(TokenType::Identifier, "Expect property name after '.'")?;
                expr = Expr::Get { object: Box::new(expr), name };
            } else {
                break;
            }
        }

        Some(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Option<Expr> {
        let mut arguments = vec![];

        if !self.check(&TokenType::RightParen) {
            loop {
                // The comma operator binds inside an argument expression, so
                // any top-level comma chain is spread back into the list.
                Self::flatten_arguments(self.expression()?, &mut arguments);

                if arguments.len() >= 255 {
                    // Just report the error, but don't return None yet
                    self.error(self.peek().clone(), "Can't have more than 255 arguments");
                }

                if !self.match_tt(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments")?;
        Some(Expr::Call { callee: Box::new(callee), paren, arguments })
    }

    fn flatten_arguments(expr: Expr, arguments: &mut Vec<Expr>) {
        match expr {
            Expr::Binary { left, operator, right }
                if operator.token_type == TokenType::Comma =>
            {
                Self::flatten_arguments(*left, arguments);
                Self::flatten_arguments(*right, arguments);
            }
            other => arguments.push(other),
        }
    }

    fn primary(&mut self) -> Option<Expr> {
        if self.match_tt(&[
            TokenType::False,
            TokenType::True,
            TokenType::Nil,
            TokenType::Number,
            TokenType::StringLiteral,
        ]) {
            return Some(Expr::Literal { value: self.previous() });
        }
        if self.match_tt(&[TokenType::This]) {
            return Some(Expr::This { id: self.fresh_id(), keyword: self.previous() });
        }
        if self.match_tt(&[TokenType::Super]) {
            let keyword = self.previous();
            self.consume(TokenType::Dot, "Expect '.' after 'super'")?;
            let method = self.consume(TokenType::Identifier, "Expect superclass method name")?;
            return Some(Expr::Super { id: self.fresh_id(), keyword, method });
        }
        if self.match_tt(&[TokenType::Identifier]) {
            return Some(Expr::Variable { id: self.fresh_id(), name: self.previous() });
        }
        if self.match_tt(&[TokenType::Fun]) {
            return self.lambda();
        }
        if self.match_tt(&[TokenType::LeftParen]) {
            let expr = self.expression()?;
            self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
            return Some(Expr::Grouping { expr: Box::new(expr) });
        }

        self.error(self.peek().clone(), "Expect expression.");
        None
    }

    fn lambda(&mut self) -> Option<Expr> {
        let keyword = self.previous();
        self.consume(TokenType::LeftParen, "Expect '(' after 'fun'")?;
        let params = self.parameter_list()?;
        self.consume(TokenType::LeftBrace, "Expect '{' before function body")?;
        let body = self.block()?.into_iter().map(Rc::new).collect::<Vec<_>>();

        Some(Expr::Lambda { keyword, params, body })
    }

    fn fresh_id(&mut self) -> ExprId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Return the next token if its `token_type` matches the given type as input.
    /// Otherwise, print the error message and return `None`.
    fn consume(&mut self, token_type: TokenType, message: &str) -> Option<Token> {
        if self.check(&token_type) {
            return Some(self.advance());
        }

        self.error(self.peek().clone(), message);
        None
    }

    fn error(&mut self, token: Token, message: &str) {
        self.had_error = true;
        let Some(reporter) = self.error_reporter.as_ref() else {
            return;
        };
        let mut reporter = reporter.borrow_mut();
        if token.token_type == TokenType::EOF {
            reporter.error(token.line, token.column, format!("at end: {}", message).as_str());
        } else {
            reporter.error(
                token.line,
                token.column,
                format!("at '{}': {}", token.lexeme, message).as_str(),
            );
        }
    }

    fn match_tt(&mut self, types: &[TokenType]) -> bool {
        for tt in types {
            if self.check(tt) {
                self.advance();
                return true;
            }
        }

        false
    }

    /// Check to see if the next token's type matches the given `token_type`.
    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }

        self.peek().token_type == *token_type
    }

    fn check_next(&self, token_type: &TokenType) -> bool {
        match self.tokens.get(self.current + 1) {
            Some(token) => token.token_type == *token_type,
            None => false,
        }
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::EOF
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.current).expect("token stream ended without EOF")
    }

    fn previous(&self) -> Token {
        self.tokens.get(self.current - 1).expect("no previous token").clone()
    }

    fn synchronize(&mut self) {
        self.advance();

        // Move and discard tokens until we find a statement boundary
        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return
                | TokenType::Break => return,
                _ => {}
            }

            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReporter;
    use crate::scanner::Scanner;

    fn parse(source: &str) -> Option<Vec<Stmt>> {
        let tokens = Scanner::new(source).scan_tokens();
        Parser::new(tokens).parse()
    }

    fn parse_single(source: &str) -> Stmt {
        parse(source).expect("parse failed").pop().expect("no statement")
    }

    #[test]
    fn precedence_multiplication_binds_tighter() {
        let stmt = parse_single("1 + 2 * 3;");
        let rendered = format!("{:?}", stmt);
        // The '*' sits under the right side of '+'.
        assert!(rendered.contains("Plus"));
        let star_pos = rendered.find("Star").unwrap();
        let plus_pos = rendered.find("Plus").unwrap();
        assert!(plus_pos < star_pos);
    }

    #[test]
    fn parse_is_deterministic() {
        let source = "fun f(a, b) { return a ? b : a + b; } print f(1, 2);";
        let first = format!("{:?}", parse(source).unwrap());
        let second = format!("{:?}", parse(source).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn ternary_is_right_associative() {
        let stmt = parse_single("1 ? 2 : 3 ? 4 : 5;");
        if let Stmt::Expression { expr: Expr::Ternary { right, .. } } = stmt {
            assert!(matches!(*right, Expr::Ternary { .. }));
        } else {
            panic!("expected nested ternary");
        }
    }

    #[test]
    fn comma_operator_groups_left() {
        let stmt = parse_single("1, 2, 3;");
        if let Stmt::Expression { expr: Expr::Binary { operator, left, .. } } = stmt {
            assert_eq!(operator.token_type, TokenType::Comma);
            assert!(matches!(*left, Expr::Binary { .. }));
        } else {
            panic!("expected comma binary");
        }
    }

    #[test]
    fn call_arguments_flatten_comma_chains() {
        let stmt = parse_single("f(1, 2, 3);");
        if let Stmt::Expression { expr: Expr::Call { arguments, .. } } = stmt {
            assert_eq!(arguments.len(), 3);
        } else {
            panic!("expected call expression");
        }
    }

    #[test]
    fn for_loop_desugars_to_while_in_block() {
        let stmt = parse_single("for (var i = 0; i < 3; i = i + 1) print i;");
        if let Stmt::Block { statements } = stmt {
            assert_eq!(statements.len(), 2);
            assert!(matches!(statements[0], Stmt::Var { .. }));
            assert!(matches!(statements[1], Stmt::While { .. }));
        } else {
            panic!("expected desugared block");
        }
    }

    #[test]
    fn for_loop_without_condition_uses_true() {
        let stmt = parse_single("for (;;) break;");
        if let Stmt::While { condition, .. } = stmt {
            if let Expr::Literal { value } = condition {
                assert_eq!(value.token_type, TokenType::True);
            } else {
                panic!("expected literal condition");
            }
        } else {
            panic!("expected while statement");
        }
    }

    #[test]
    fn assignment_rewrites_get_into_set() {
        let stmt = parse_single("a.b = 1;");
        assert!(matches!(stmt, Stmt::Expression { expr: Expr::Set { .. } }));
    }

    #[test]
    fn invalid_assignment_target_is_an_error() {
        let reporter = ErrorReporter::new().as_shared();
        let tokens = Scanner::new("1 = 2;").scan_tokens();
        let result = Parser::new(tokens).with_error_reporting(reporter.clone()).parse();
        assert!(result.is_none());
        assert!(reporter.borrow().had_error);
        assert!(reporter.borrow().messages()[0].contains("Invalid assignment target"));
    }

    #[test]
    fn class_body_separates_member_kinds() {
        let stmt = parse_single(
            "class C { m(a) { return a; } g { return 1; } class cm() { return 2; } }",
        );
        if let Stmt::Class { methods, getters, class_methods, superclass, .. } = stmt {
            assert!(superclass.is_none());
            assert_eq!(methods.len(), 1);
            assert_eq!(getters.len(), 1);
            assert_eq!(class_methods.len(), 1);
        } else {
            panic!("expected class statement");
        }
    }

    #[test]
    fn class_with_superclass() {
        let stmt = parse_single("class B < A {}");
        if let Stmt::Class { superclass, .. } = stmt {
            assert!(matches!(superclass, Some(Expr::Variable { .. })));
        } else {
            panic!("expected class statement");
        }
    }

    #[test]
    fn lambda_expression_in_statement() {
        let stmt = parse_single("var f = fun (x) { return x; };");
        if let Stmt::Var { initializer, .. } = stmt {
            assert!(matches!(initializer, Some(Expr::Lambda { .. })));
        } else {
            panic!("expected var statement");
        }
    }

    #[test]
    fn errors_synchronize_to_next_statement() {
        let reporter = ErrorReporter::new().as_shared();
        let tokens = Scanner::new("var 1 = 2; var = 3; print 4;").scan_tokens();
        let result = Parser::new(tokens).with_error_reporting(reporter.clone()).parse();
        assert!(result.is_none());
        // Both broken declarations get reported.
        assert!(reporter.borrow().messages().len() >= 2);
    }

    #[test]
    fn expression_entry_point_rejects_statements() {
        let tokens = Scanner::new("var a = 1;").scan_tokens();
        assert!(Parser::new(tokens).parse_expression().is_none());

        let tokens = Scanner::new("1 + 2").scan_tokens();
        assert!(Parser::new(tokens).parse_expression().is_some());
    }
}

use std::collections::HashMap;
use std::rc::Rc;

use super::Interpreter;
use crate::ast::{Expr, ExprId, Stmt};
use crate::error::SharedErrorReporter;
use crate::token::Token;

#[derive(Debug, Clone, PartialEq, Copy)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
    ClassMethod,
}

#[derive(Debug, Clone, PartialEq, Copy)]
enum ClassType {
    None,
    Class,
    Subclass,
}

#[derive(Debug, Clone, PartialEq, Copy)]
enum LoopType {
    None,
    InLoop,
}

/// Static pass run between parsing and evaluation. Binds every variable use
/// to a scope depth and diagnoses scope misuse. Diagnostics are reported and
/// resolution continues, so one run surfaces as many errors as possible.
pub struct Resolver<'i> {
    interpreter: &'i mut Interpreter,
    scopes: Vec<HashMap<String, bool>>,
    current_function: FunctionType,
    current_class: ClassType,
    current_loop: LoopType,
    error_reporter: Option<SharedErrorReporter>,
}

impl<'i> Resolver<'i> {
    pub fn new(interpreter: &'i mut Interpreter) -> Self {
        Self {
            interpreter,
            scopes: vec![],
            current_function: FunctionType::None,
            current_class: ClassType::None,
            current_loop: LoopType::None,
            error_reporter: None,
        }
    }

    pub fn with_error_reporting(self, error_reporter: SharedErrorReporter) -> Self {
        Self { error_reporter: Some(error_reporter), ..self }
    }

    pub fn resolve(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
    }

    pub fn resolve_expression(&mut self, expr: &Expr) {
        self.resolve_expr(expr);
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block { statements } => {
                self.begin_scope();
                self.resolve(statements);
                self.end_scope();
            }
            Stmt::Var { name, initializer } => {
                // Declaring and defining are separate steps so that reading
                // the variable inside its own initializer is caught.
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.resolve_expr(initializer);
                }
                self.define(name);
            }
            Stmt::Class { name, superclass, methods, getters, class_methods } => {
                let enclosing_class = self.current_class;
                self.current_class = ClassType::Class;

                self.declare(name);
                self.define(name);

                if let Some(superclass) = superclass {
                    if let Expr::Variable { name: super_name, .. } = superclass {
                        if super_name.lexeme == name.lexeme {
                            self.semantic_error(name, "Class cannot inherit from itself.");
                        }
                    }
                    self.current_class = ClassType::Subclass;
                    self.resolve_expr(superclass);

                    self.begin_scope();
                    self.scope_insert("super");
                }

                // Class methods see 'super' but never 'this'.
                for class_method in class_methods {
                    self.resolve_callable_stmt(class_method, FunctionType::ClassMethod);
                }

                self.begin_scope();
                self.scope_insert("this");

                for method in methods {
                    let func_type = match method {
                        Stmt::Function { name, .. } if name.lexeme == "init" => {
                            FunctionType::Initializer
                        }
                        _ => FunctionType::Method,
                    };
                    self.resolve_callable_stmt(method, func_type);
                }

                for getter in getters {
                    self.resolve_callable_stmt(getter, FunctionType::Method);
                }

                self.end_scope();

                if superclass.is_some() {
                    self.end_scope();
                }
                self.current_class = enclosing_class;
            }
            Stmt::Function { name, .. } => {
                // Unlike variables, we declare and define functions before processing
                // their body. This way, functions can recursively call themselves.
                self.declare(name);
                self.define(name);

                self.resolve_callable_stmt(stmt, FunctionType::Function);
            }
            Stmt::Getter { .. } => {
                // Getters only appear inside a class body.
                self.resolve_callable_stmt(stmt, FunctionType::Method);
            }
            Stmt::Expression { expr } => self.resolve_expr(expr),
            Stmt::Print { expr } => self.resolve_expr(expr),
            Stmt::If { condition, then_branch, else_branch } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(stmt) = else_branch {
                    self.resolve_stmt(stmt);
                }
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.semantic_error(keyword, "'return' statement not within a function.");
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.semantic_error(
                            keyword,
                            "Cannot return a value from an initializer.",
                        );
                    }
                    self.resolve_expr(expr);
                }
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                let enclosing_loop = self.current_loop;
                self.current_loop = LoopType::InLoop;
                self.resolve_stmt(body);
                self.current_loop = enclosing_loop;
            }
            Stmt::Break { token } => {
                if self.current_loop == LoopType::None {
                    self.semantic_error(token, "'break' statement not within a loop.");
                }
            }
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Variable { id, name } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        self.semantic_error(
                            name,
                            &format!(
                                "Cannot read local variable '{}' in its own initializer.",
                                name.lexeme
                            ),
                        );
                    }
                }

                self.resolve_local(*id, name);
            }
            Expr::Assignment { id, name, value } => {
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }
            Expr::Binary { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Ternary { left, middle, right } => {
                self.resolve_expr(left);
                self.resolve_expr(middle);
                self.resolve_expr(right);
            }
            Expr::Call { callee, arguments, .. } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }
            Expr::Lambda { params, body, .. } => {
                self.resolve_callable(params, body, FunctionType::Function);
            }
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(value);
            }
            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.semantic_error(keyword, "'this' cannot be used outside of a class.");
                    return;
                }
                if self.current_function == FunctionType::ClassMethod {
                    self.semantic_error(keyword, "'this' cannot be used in a class method.");
                    return;
                }

                self.resolve_local(*id, keyword);
            }
            Expr::Super { id, keyword, .. } => {
                if self.current_class != ClassType::Subclass {
                    self.semantic_error(keyword, "'super' used outside of a subclass.");
                    return;
                }

                self.resolve_local(*id, keyword);
            }
            Expr::Grouping { expr } => self.resolve_expr(expr),
            Expr::Literal { .. } => {}
            Expr::Unary { right, .. } => self.resolve_expr(right),
        }
    }

    fn resolve_callable_stmt(&mut self, stmt: &Stmt, func_type: FunctionType) {
        match stmt {
            Stmt::Function { params, body, .. } => self.resolve_callable(params, body, func_type),
            Stmt::Getter { body, .. } => self.resolve_callable(&[], body, func_type),
            _ => {}
        }
    }

    fn resolve_callable(&mut self, params: &[Token], body: &[Rc<Stmt>], func_type: FunctionType) {
        let enclosing_func = self.current_function;
        self.current_function = func_type;
        // A loop outside the function does not license 'break' inside it.
        let enclosing_loop = self.current_loop;
        self.current_loop = LoopType::None;

        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }

        for stmt in body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.current_loop = enclosing_loop;
        self.current_function = enclosing_func;
    }

    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (i, scope) in self.scopes.iter().enumerate().rev() {
            if scope.contains_key(&name.lexeme) {
                self.interpreter.resolve(id, self.scopes.len() - i - 1);
                return;
            }
        }
        // Not found locally: the interpreter falls back to globals.
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        let already_defined = match self.scopes.last_mut() {
            None => return,
            Some(scope) => scope.insert(name.lexeme.clone(), false).is_some(),
        };

        if already_defined {
            self.semantic_error(
                name,
                &format!("Variable '{}' already defined in this scope.", name.lexeme),
            );
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    fn scope_insert(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), true);
        }
    }

    fn semantic_error(&mut self, token: &Token, message: &str) {
        if let Some(reporter) = self.error_reporter.as_ref() {
            reporter.borrow_mut().semantic_error(token.line, token.column, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReporter;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn resolve_source(source: &str) -> (Interpreter, SharedErrorReporter) {
        let reporter = ErrorReporter::new().as_shared();
        let tokens = Scanner::new(source).scan_tokens();
        let stmts = Parser::new(tokens).parse().expect("parse failed");
        let mut interpreter = Interpreter::new();
        Resolver::new(&mut interpreter)
            .with_error_reporting(reporter.clone())
            .resolve(&stmts);
        (interpreter, reporter)
    }

    fn first_message(reporter: &SharedErrorReporter) -> String {
        reporter.borrow().messages().first().cloned().unwrap_or_default()
    }

    #[test]
    fn global_code_resolves_without_errors() {
        let (_, reporter) = resolve_source("var a = 1; print a + 2;");
        assert!(!reporter.borrow().had_error);
    }

    #[test]
    fn depths_count_environment_hops() {
        let (interpreter, reporter) =
            resolve_source("{ var a = 1; { print a; } { { print a; } } }");
        assert!(!reporter.borrow().had_error);
        let mut depths: Vec<_> = interpreter.locals.values().copied().collect();
        depths.sort();
        assert_eq!(depths, vec![1, 2]);
    }

    #[test]
    fn resolving_twice_is_idempotent() {
        let source = "{ var a = 1; fun f(b) { return a + b; } print f(2); }";
        let reporter = ErrorReporter::new().as_shared();
        let tokens = Scanner::new(source).scan_tokens();
        let stmts = Parser::new(tokens).parse().expect("parse failed");

        let mut interpreter = Interpreter::new();
        Resolver::new(&mut interpreter)
            .with_error_reporting(reporter.clone())
            .resolve(&stmts);
        let first = interpreter.locals.clone();

        Resolver::new(&mut interpreter)
            .with_error_reporting(reporter.clone())
            .resolve(&stmts);
        assert_eq!(first, interpreter.locals);
        assert!(!reporter.borrow().had_error);
    }

    #[test]
    fn redeclaration_in_same_scope() {
        let (_, reporter) = resolve_source("{ var a = 1; var a = 2; }");
        assert!(first_message(&reporter)
            .contains("Variable 'a' already defined in this scope."));
    }

    #[test]
    fn self_referential_initializer() {
        let (_, reporter) = resolve_source("fun f() { var a = a; }");
        assert!(first_message(&reporter)
            .contains("Cannot read local variable 'a' in its own initializer."));
    }

    #[test]
    fn return_outside_function() {
        let (_, reporter) = resolve_source("return 1;");
        assert!(first_message(&reporter)
            .contains("'return' statement not within a function."));
    }

    #[test]
    fn valued_return_in_initializer() {
        let (_, reporter) = resolve_source("class C { init() { return 1; } }");
        assert!(first_message(&reporter)
            .contains("Cannot return a value from an initializer."));
    }

    #[test]
    fn bare_return_in_initializer_is_fine() {
        let (_, reporter) = resolve_source("class C { init() { return; } }");
        assert!(!reporter.borrow().had_error);
    }

    #[test]
    fn break_outside_loop() {
        let (_, reporter) = resolve_source("break;");
        assert!(first_message(&reporter).contains("'break' statement not within a loop."));
    }

    #[test]
    fn break_inside_nested_function_needs_its_own_loop() {
        let (_, reporter) = resolve_source("while (true) { fun f() { break; } }");
        assert!(first_message(&reporter).contains("'break' statement not within a loop."));
    }

    #[test]
    fn this_outside_class() {
        let (_, reporter) = resolve_source("fun f() { print this; }");
        assert!(first_message(&reporter)
            .contains("'this' cannot be used outside of a class."));
    }

    #[test]
    fn this_inside_class_method() {
        let (_, reporter) = resolve_source("class C { class m() { print this; } }");
        assert!(first_message(&reporter).contains("'this' cannot be used in a class method."));
    }

    #[test]
    fn super_outside_subclass() {
        let (_, reporter) = resolve_source("class C { m() { super.m(); } }");
        assert!(first_message(&reporter).contains("'super' used outside of a subclass."));
    }

    #[test]
    fn class_inheriting_from_itself() {
        let (_, reporter) = resolve_source("class C < C {}");
        assert!(first_message(&reporter).contains("Class cannot inherit from itself."));
    }

    #[test]
    fn multiple_errors_surface_in_one_pass() {
        let (_, reporter) = resolve_source("break; return 1;");
        assert_eq!(reporter.borrow().messages().len(), 2);
    }
}

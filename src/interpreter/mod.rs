mod class;
mod environment;
mod error;
mod func;
mod native;
mod resolver;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Expr, ExprId, Stmt};
use crate::error::SharedErrorReporter;
use crate::object::{Callable, Object};
use crate::token::{Token, TokenType};

pub use class::{Class, Instance};
pub use environment::Environment;
pub use error::RuntimeError;
use func::{LoxFunction, LoxGetter, LoxLambda};
pub use resolver::Resolver;

type InterpreterResult = Result<Object, RuntimeError>;

pub struct Interpreter {
    pub globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    pub(crate) locals: HashMap<ExprId, usize>, // expression id -> depth
    error_reporter: Option<SharedErrorReporter>,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Environment::new().as_rc();
        let environment = globals.clone();

        globals.borrow_mut().define("clock", Object::Callable(native::clock()));

        Self { globals, environment, locals: HashMap::new(), error_reporter: None }
    }

    pub fn with_error_reporting(self, error_reporter: SharedErrorReporter) -> Self {
        Self { error_reporter: Some(error_reporter), ..self }
    }
}

impl Interpreter {
    pub fn evaluate_expr(&mut self, expr: &Expr) -> InterpreterResult {
        match expr {
            Expr::Literal { value } => self.literal_value(value),
            Expr::Grouping { expr: inner } => self.evaluate_expr(inner.as_ref()),
            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),
            Expr::Binary { left, operator, right } => self.evaluate_binary(left, operator, right),
            Expr::Ternary { left, middle, right } => {
                let condition = self.evaluate_expr(left)?;
                if condition.is_truthy() {
                    self.evaluate_expr(middle)
                } else {
                    self.evaluate_expr(right)
                }
            }
            Expr::Variable { id, name } => self.lookup_variable(name, *id),
            Expr::Assignment { id, name, value } => {
                let value = self.evaluate_expr(value.as_ref())?;

                if let Some(&distance) = self.locals.get(id) {
                    self.environment.borrow_mut().assign_at(distance, name, value.clone())?;
                } else {
                    self.globals.borrow_mut().assign(name, value.clone())?;
                }

                Ok(value)
            }
            Expr::Get { object, name } => {
                let object = self.evaluate_expr(object)?;
                self.evaluate_property(object, name)
            }
            Expr::Set { object, name, value } => {
                let object = self.evaluate_expr(object)?;
                let value = self.evaluate_expr(value)?;

                match object {
                    Object::Instance(instance) => {
                        instance.borrow_mut().set_field(&name.lexeme, value.clone());
                        Ok(value)
                    }
                    Object::Class(class) => {
                        class.borrow_mut().set_method(&name.lexeme, value.clone());
                        Ok(value)
                    }
                    Object::Error(_) => Ok(object),
                    _ => Err(RuntimeError::InvalidOperand {
                        operator: name.clone(),
                        msg: "Only instances have properties.".to_owned(),
                    }),
                }
            }
            Expr::Super { id, keyword, method } => self.evaluate_super(*id, keyword, method),
            Expr::This { id, keyword } => self.lookup_variable(keyword, *id),
            Expr::Logical { left, operator, right } => {
                let left_val = self.evaluate_expr(left)?;

                if operator.token_type == TokenType::Or {
                    if left_val.is_truthy() {
                        return Ok(left_val);
                    }
                } else {
                    // TokenType::And
                    if !left_val.is_truthy() {
                        return Ok(left_val);
                    }
                }

                self.evaluate_expr(right)
            }
            Expr::Lambda { params, body, .. } => {
                let lambda = LoxLambda::new(params.clone(), body, self.environment.clone());
                Ok(Object::Callable(Rc::new(lambda)))
            }
            Expr::Call { callee, paren, arguments } => {
                self.evaluate_call(callee, paren, arguments)
            }
        }
    }

    fn literal_value(&self, token: &Token) -> InterpreterResult {
        match token.token_type {
            TokenType::True => Ok(Object::Boolean(true)),
            TokenType::False => Ok(Object::Boolean(false)),
            TokenType::Nil => Ok(Object::Null),
            TokenType::StringLiteral => Ok(Object::String(token.lexeme.clone())),
            TokenType::Number => {
                // A '.' in the lexeme makes it a float; otherwise it is an
                // int, except when the exponent pushes it out of range.
                let parsed = if token.lexeme.contains('.') {
                    token.lexeme.parse::<f64>().map(Object::Float).ok()
                } else {
                    token
                        .lexeme
                        .parse::<i64>()
                        .map(Object::Int)
                        .ok()
                        .or_else(|| token.lexeme.parse::<f64>().map(Object::Float).ok())
                };

                parsed.ok_or_else(|| RuntimeError::InvalidOperand {
                    operator: token.clone(),
                    msg: "Malformed number literal.".to_owned(),
                })
            }
            _ => Err(RuntimeError::InvalidOperand {
                operator: token.clone(),
                msg: "Unexpected literal type.".to_owned(),
            }),
        }
    }

    /// Property lookup order: fields, then getters (invoked), then methods
    /// (bound), then the superclass chain behind each table. Classes expose
    /// their class methods.
    fn evaluate_property(&mut self, object: Object, name: &Token) -> InterpreterResult {
        match object {
            Object::Instance(ref instance) => {
                if let Some(value) = instance.borrow().field(&name.lexeme) {
                    return Ok(value);
                }

                let class = instance.borrow().class();

                let getter = class.borrow().find_getter(&name.lexeme);
                if let Some(Object::Callable(getter)) = getter {
                    let bound = getter.bind(object.clone()).unwrap_or(getter);
                    return bound.call(self, vec![]);
                }

                let method = class.borrow().find_method(&name.lexeme);
                match method {
                    Some(Object::Callable(method)) => {
                        let bound = method.bind(object.clone()).unwrap_or(method);
                        Ok(Object::Callable(bound))
                    }
                    Some(other) => Ok(other),
                    None => Err(RuntimeError::UndefinedProperty { name: name.clone() }),
                }
            }
            Object::Class(ref class) => {
                let method = class.borrow().find_class_method(&name.lexeme);
                method.ok_or_else(|| RuntimeError::UndefinedProperty { name: name.clone() })
            }
            Object::Error(_) => Ok(object),
            _ => Err(RuntimeError::InvalidOperand {
                operator: name.clone(),
                msg: "Only instances have properties.".to_owned(),
            }),
        }
    }

    fn evaluate_call(
        &mut self,
        callee: &Expr,
        paren: &Token,
        arguments: &[Expr],
    ) -> InterpreterResult {
        let callee = self.evaluate_expr(callee)?;
        match callee {
            Object::Callable(callable) => {
                if callable.arity() != arguments.len() {
                    return Err(RuntimeError::InvalidOperand {
                        operator: paren.clone(),
                        msg: format!(
                            "Expected {} arguments, got {}",
                            callable.arity(),
                            arguments.len()
                        ),
                    });
                }
                // Evaluate all arguments
                let mut args = vec![];
                for arg in arguments {
                    args.push(self.evaluate_expr(arg)?);
                }

                callable.call(self, args)
            }
            Object::Class(class) => {
                let arity = class.borrow().arity();
                if arity != arguments.len() {
                    return Err(RuntimeError::InvalidOperand {
                        operator: paren.clone(),
                        msg: format!("Expected {} arguments, got {}", arity, arguments.len()),
                    });
                }

                // Evaluate all arguments
                let mut args = vec![];
                for arg in arguments {
                    args.push(self.evaluate_expr(arg)?);
                }

                Class::construct(class, args, self).map(Object::Instance)
            }
            Object::Error(_) => Ok(callee),
            _ => Err(RuntimeError::InvalidOperand {
                operator: paren.clone(),
                msg: "Can only call functions and classes.".to_owned(),
            }),
        }
    }

    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method_name: &Token) -> InterpreterResult {
        let distance =
            self.locals.get(&id).copied().ok_or_else(|| RuntimeError::InvalidOperand {
                operator: keyword.clone(),
                msg: "Unresolved 'super' expression.".to_owned(),
            })?;

        let superclass = self.environment.borrow().get_at(distance, keyword)?;
        let superclass = match superclass {
            Object::Class(c) => c,
            _ => {
                return Err(RuntimeError::InvalidOperand {
                    operator: keyword.clone(),
                    msg: "Superclass must be a class.".to_owned(),
                })
            }
        };

        let this = Token::new(TokenType::Identifier, "this", keyword.line, keyword.column);
        let instance = self.environment.borrow().get_at(distance - 1, &this)?;

        let method = superclass.borrow().find_method(&method_name.lexeme);
        match method {
            Some(Object::Callable(method)) => {
                let bound = method.bind(instance).unwrap_or(method);
                Ok(Object::Callable(bound))
            }
            Some(other) => Ok(other),
            None => Err(RuntimeError::UndefinedProperty { name: method_name.clone() }),
        }
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> InterpreterResult {
        let value = self.evaluate_expr(right)?;
        let result = match operator.token_type {
            TokenType::Minus => value.try_neg(),
            TokenType::Bang => value.try_not(),
            _ => Err("Unknown unary operator.".to_owned()),
        };

        result.map_err(|msg| RuntimeError::InvalidOperand { operator: operator.clone(), msg })
    }

    fn evaluate_binary(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> InterpreterResult {
        let left_value = self.evaluate_expr(left)?;
        let right_value = self.evaluate_expr(right)?;

        let result = match operator.token_type {
            TokenType::Plus => left_value.try_add(&right_value),
            TokenType::Minus => left_value.try_sub(&right_value),
            TokenType::Star => left_value.try_mul(&right_value),
            TokenType::Slash => left_value.try_div(&right_value),
            TokenType::Greater => left_value.try_greater(&right_value),
            TokenType::GreaterEqual => left_value.try_greater_equal(&right_value),
            TokenType::Less => left_value.try_less(&right_value),
            TokenType::LessEqual => left_value.try_less_equal(&right_value),
            TokenType::EqualEqual => left_value.try_equal(&right_value),
            TokenType::BangEqual => left_value.try_not_equal(&right_value),
            // The comma operator evaluates both sides and keeps the right.
            TokenType::Comma => Ok(right_value),
            _ => Err("Unknown binary operator.".to_owned()),
        };

        result.map_err(|msg| RuntimeError::InvalidOperand { operator: operator.clone(), msg })
    }

    fn lookup_variable(&self, name: &Token, id: ExprId) -> InterpreterResult {
        if let Some(&distance) = self.locals.get(&id) {
            self.environment.borrow().get_at(distance, name)
        } else {
            self.globals.borrow().get(name)
        }
    }
}

impl Interpreter {
    pub fn interpret(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            if let Err(e) = self.execute(stmt) {
                self.runtime_error(e);
                break;
            }
        }
    }

    pub fn execute(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        self.evaluate_stmt(stmt)
    }

    pub fn execute_block<I, R>(
        &mut self,
        statements: I,
        environment: Rc<RefCell<Environment>>,
    ) -> Result<(), RuntimeError>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<Stmt>,
    {
        let prev_env = self.environment.clone();
        self.environment = environment;

        for s in statements {
            let result = self.execute(s.as_ref());
            if result.is_err() {
                self.environment = prev_env;
                return result;
            }
        }

        self.environment = prev_env;
        Ok(())
    }

    pub fn resolve(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id, depth);
    }

    fn evaluate_stmt(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        match stmt {
            Stmt::Expression { expr } => {
                self.evaluate_expr(expr)?;
            }
            Stmt::Class { name, superclass, methods, getters, class_methods } => {
                self.evaluate_class(name, superclass.as_ref(), methods, getters, class_methods)?;
            }
            Stmt::Function { name, params, body } => {
                // self.environment is the current active environment when the
                // function is being declared, NOT when it's being called. For
                // inner functions it is their parent function's environment.
                let env = self.environment.clone();
                let function = LoxFunction::new(name.clone(), params.to_vec(), body, env, false);
                self.environment.borrow_mut().declare(name, Object::Callable(Rc::new(function)))?;
            }
            Stmt::Getter { name, .. } => {
                // Getters only occur as class members; the class statement
                // builds them directly.
                return Err(RuntimeError::InvalidOperand {
                    operator: name.clone(),
                    msg: "Getter outside of a class body.".to_owned(),
                });
            }
            Stmt::Break { token } => return Err(RuntimeError::Break { token: token.clone() }),
            Stmt::Return { keyword, value } => {
                let value =
                    if let Some(expr) = value { self.evaluate_expr(expr)? } else { Object::Null };

                return Err(RuntimeError::Return { token: keyword.clone(), value });
            }
            Stmt::Print { expr } => {
                let value = self.evaluate_expr(expr)?;
                println!("{value}");
            }
            Stmt::Var { name, initializer } => {
                let value = if let Some(expr) = initializer {
                    self.evaluate_expr(expr)?
                } else {
                    Object::uninitialized()
                };

                self.environment.borrow_mut().declare(name, value)?;
            }
            Stmt::Block { statements } => {
                // Create a new environment for executing the block
                let new_env = Environment::new().with_enclosing(self.environment.clone()).as_rc();

                self.execute_block(statements, new_env)?;
            }
            Stmt::If { condition, then_branch, else_branch } => {
                let condition_result = self.evaluate_expr(condition)?;

                if condition_result.is_truthy() {
                    self.execute(then_branch.as_ref())?;
                } else if let Some(stmt) = else_branch {
                    self.execute(stmt.as_ref())?;
                }
            }
            Stmt::While { condition, body } => loop {
                let value = self.evaluate_expr(condition)?;
                if !value.is_truthy() {
                    break;
                }

                // A 'Break' interrupt means the body hit a break statement.
                // Any other error is propagated up.
                let result = self.execute(body);

                if matches!(result, Err(RuntimeError::Break { .. })) {
                    break;
                }

                result?;
            },
        };
        Ok(())
    }

    fn evaluate_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Stmt],
        getters: &[Stmt],
        class_methods: &[Stmt],
    ) -> Result<(), RuntimeError> {
        let superclass = match superclass {
            Some(expr) => {
                let obj = self.evaluate_expr(expr)?;
                match obj {
                    Object::Class(c) => Some(c),
                    _ => {
                        return Err(RuntimeError::InvalidOperand {
                            operator: name.clone(),
                            msg: "Superclass must be a class.".to_owned(),
                        })
                    }
                }
            }
            None => None,
        };

        // The name is bound up front so methods can refer to the class.
        self.environment.borrow_mut().declare(name, Object::Null)?;

        // Methods close over an extra scope holding 'super' when inheriting.
        let class_env = if let Some(ref superclass) = superclass {
            let env = Environment::new().with_enclosing(self.environment.clone()).as_rc();
            env.borrow_mut().define("super", Object::Class(superclass.clone()));
            env
        } else {
            self.environment.clone()
        };

        let mut method_table = HashMap::new();
        for method in methods {
            if let Stmt::Function { name, params, body } = method {
                let is_initializer = name.lexeme == "init";
                let function = LoxFunction::new(
                    name.clone(),
                    params.to_vec(),
                    body,
                    class_env.clone(),
                    is_initializer,
                );
                method_table.insert(
                    name.lexeme.clone(),
                    Object::Callable(Rc::new(function) as Rc<dyn Callable>),
                );
            }
        }

        let mut getter_table = HashMap::new();
        for getter in getters {
            if let Stmt::Getter { name, body } = getter {
                let getter = LoxGetter::new(name.clone(), body, class_env.clone());
                getter_table.insert(
                    name.lexeme.clone(),
                    Object::Callable(Rc::new(getter) as Rc<dyn Callable>),
                );
            }
        }

        let mut class_method_table = HashMap::new();
        for class_method in class_methods {
            if let Stmt::Function { name, params, body } = class_method {
                let function =
                    LoxFunction::new(name.clone(), params.to_vec(), body, class_env.clone(), false);
                class_method_table.insert(
                    name.lexeme.clone(),
                    Object::Callable(Rc::new(function) as Rc<dyn Callable>),
                );
            }
        }

        let class = Rc::new(RefCell::new(Class::new(
            &name.lexeme,
            method_table,
            getter_table,
            class_method_table,
            superclass,
        )));

        self.environment.borrow_mut().assign(name, Object::Class(class))?;
        Ok(())
    }

    fn runtime_error(&self, e: RuntimeError) {
        if let Some(reporter) = self.error_reporter.as_ref() {
            reporter.borrow_mut().runtime_error(&e);
        }
    }
}

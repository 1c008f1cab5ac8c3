use std::{cell::RefCell, fmt::Display, rc::Rc};

use super::environment::Environment;
use super::{Interpreter, RuntimeError};
use crate::ast::Stmt;
use crate::object::{Callable, Object};
use crate::token::Token;

/// A user function together with the environment that was live at its
/// declaration site.
#[derive(Debug)]
pub struct LoxFunction {
    name: Token,
    params: Vec<Token>,
    body: Vec<Rc<Stmt>>,
    closure: Rc<RefCell<Environment>>,
    is_initializer: bool,
}

impl LoxFunction {
    pub fn new(
        name: Token,
        params: Vec<Token>,
        body: &[Rc<Stmt>],
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Self { name, params, body: body.to_vec(), closure, is_initializer }
    }
}

impl Callable for LoxFunction {
    fn arity(&self) -> usize {
        self.params.len()
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Object>,
    ) -> Result<Object, RuntimeError> {
        let mut environment = Environment::new().with_enclosing(self.closure.clone());
        for (param, arg) in self.params.iter().zip(arguments) {
            environment.define(param.lexeme.as_str(), arg);
        }

        let res = interpreter.execute_block(&self.body, environment.as_rc());

        // A 'Return' interrupt carries the value out of the body; anything
        // else is a real error. Initializers always produce the bound 'this'.
        match res {
            Err(RuntimeError::Return { value, .. }) => {
                if self.is_initializer {
                    Ok(self.bound_this())
                } else {
                    Ok(value)
                }
            }
            Err(e) => Err(e),
            Ok(()) => {
                if self.is_initializer {
                    Ok(self.bound_this())
                } else {
                    Ok(Object::Null)
                }
            }
        }
    }

    fn bind(&self, instance: Object) -> Option<Rc<dyn Callable>> {
        let mut environment = Environment::new().with_enclosing(self.closure.clone());
        environment.define("this", instance);

        Some(Rc::new(LoxFunction {
            name: self.name.clone(),
            params: self.params.clone(),
            body: self.body.clone(),
            closure: environment.as_rc(),
            is_initializer: self.is_initializer,
        }))
    }
}

impl LoxFunction {
    fn bound_this(&self) -> Object {
        self.closure.borrow().get_value("this").unwrap_or(Object::Null)
    }
}

impl Display for LoxFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<fn {}>", self.name.lexeme)
    }
}

/// Anonymous function expression value.
#[derive(Debug)]
pub struct LoxLambda {
    params: Vec<Token>,
    body: Vec<Rc<Stmt>>,
    closure: Rc<RefCell<Environment>>,
}

impl LoxLambda {
    pub fn new(params: Vec<Token>, body: &[Rc<Stmt>], closure: Rc<RefCell<Environment>>) -> Self {
        Self { params, body: body.to_vec(), closure }
    }
}

impl Callable for LoxLambda {
    fn arity(&self) -> usize {
        self.params.len()
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Object>,
    ) -> Result<Object, RuntimeError> {
        let mut environment = Environment::new().with_enclosing(self.closure.clone());
        for (param, arg) in self.params.iter().zip(arguments) {
            environment.define(param.lexeme.as_str(), arg);
        }

        match interpreter.execute_block(&self.body, environment.as_rc()) {
            Err(RuntimeError::Return { value, .. }) => Ok(value),
            Err(e) => Err(e),
            Ok(()) => Ok(Object::Null),
        }
    }
}

impl Display for LoxLambda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<lambda>")
    }
}

/// Zero-argument member invoked by property access rather than call syntax.
#[derive(Debug)]
pub struct LoxGetter {
    name: Token,
    body: Vec<Rc<Stmt>>,
    closure: Rc<RefCell<Environment>>,
}

impl LoxGetter {
    pub fn new(name: Token, body: &[Rc<Stmt>], closure: Rc<RefCell<Environment>>) -> Self {
        Self { name, body: body.to_vec(), closure }
    }
}

impl Callable for LoxGetter {
    fn arity(&self) -> usize {
        0
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        _arguments: Vec<Object>,
    ) -> Result<Object, RuntimeError> {
        let environment = Environment::new().with_enclosing(self.closure.clone());

        match interpreter.execute_block(&self.body, environment.as_rc()) {
            Err(RuntimeError::Return { value, .. }) => Ok(value),
            Err(e) => Err(e),
            Ok(()) => Ok(Object::Null),
        }
    }

    fn bind(&self, instance: Object) -> Option<Rc<dyn Callable>> {
        let mut environment = Environment::new().with_enclosing(self.closure.clone());
        environment.define("this", instance);

        Some(Rc::new(LoxGetter {
            name: self.name.clone(),
            body: self.body.clone(),
            closure: environment.as_rc(),
        }))
    }
}

impl Display for LoxGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<getter {}>", self.name.lexeme)
    }
}

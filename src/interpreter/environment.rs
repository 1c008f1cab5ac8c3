use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::RuntimeError;
use crate::object::Object;
use crate::token::Token;

/// One link of the lexical scope chain. Closures keep their defining
/// environment alive through the `Rc`, so a scope can outlive the block or
/// call frame that created it.
#[derive(Debug)]
pub struct Environment {
    enclosing: Option<Rc<RefCell<Environment>>>,
    values: HashMap<String, Object>,
}

impl Environment {
    pub fn new() -> Self {
        Self { enclosing: None, values: HashMap::new() }
    }

    pub fn with_enclosing(self, enclosing: Rc<RefCell<Environment>>) -> Self {
        Self { enclosing: Some(enclosing), ..self }
    }

    pub fn as_rc(self) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(self))
    }

    /// Raw insert used for internal bindings ('this', 'super', natives,
    /// parameters). User declarations go through `declare`.
    pub fn define(&mut self, name: &str, value: Object) {
        self.values.insert(name.to_owned(), value);
    }

    /// Binding a name that already exists in this scope is a runtime error;
    /// the resolver catches it statically everywhere except the global scope.
    pub fn declare(&mut self, name: &Token, value: Object) -> Result<(), RuntimeError> {
        if self.values.contains_key(&name.lexeme) {
            return Err(RuntimeError::AlreadyDefined { name: name.clone() });
        }

        self.values.insert(name.lexeme.clone(), value);
        Ok(())
    }

    pub fn assign(&mut self, name: &Token, value: Object) -> Result<(), RuntimeError> {
        if !self.values.contains_key(&name.lexeme) {
            // Ask one level above if possible
            if let Some(ref e) = self.enclosing {
                return e.borrow_mut().assign(name, value);
            }

            return Err(RuntimeError::UndefinedVariable { name: name.clone() });
        }

        self.values.insert(name.lexeme.clone(), value);
        Ok(())
    }

    pub fn get(&self, name: &Token) -> Result<Object, RuntimeError> {
        if let Some(value) = self.values.get(&name.lexeme) {
            return Ok(value.clone());
        }

        // Ask one level above if possible
        if let Some(ref e) = self.enclosing {
            return e.borrow().get(name);
        }

        Err(RuntimeError::UndefinedVariable { name: name.clone() })
    }

    /// Lookup by plain name without error bookkeeping; walks the whole chain.
    pub fn get_value(&self, name: &str) -> Option<Object> {
        if let Some(value) = self.values.get(name) {
            return Some(value.clone());
        }

        self.enclosing.as_ref().and_then(|e| e.borrow().get_value(name))
    }

    /// Read from exactly the `distance`-th enclosing scope (0 = this one).
    pub fn get_at(&self, distance: usize, name: &Token) -> Result<Object, RuntimeError> {
        if distance == 0 {
            return self
                .values
                .get(&name.lexeme)
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() });
        }

        let ancestor = self
            .ancestor(distance)
            .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() })?;
        let value = ancestor.borrow().values.get(&name.lexeme).cloned();
        value.ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() })
    }

    pub fn assign_at(
        &mut self,
        distance: usize,
        name: &Token,
        value: Object,
    ) -> Result<(), RuntimeError> {
        if distance == 0 {
            self.values.insert(name.lexeme.clone(), value);
            return Ok(());
        }

        let ancestor = self
            .ancestor(distance)
            .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() })?;
        ancestor.borrow_mut().values.insert(name.lexeme.clone(), value);
        Ok(())
    }

    fn ancestor(&self, distance: usize) -> Option<Rc<RefCell<Environment>>> {
        let mut env = self.enclosing.clone()?;
        for _ in 1..distance {
            let next = env.borrow().enclosing.clone()?;
            env = next;
        }
        Some(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn ident(name: &str) -> Token {
        Token::new(TokenType::Identifier, name, 1, 1)
    }

    #[test]
    fn get_walks_the_chain() {
        let globals = Environment::new().as_rc();
        globals.borrow_mut().define("a", Object::Int(1));
        let inner = Environment::new().with_enclosing(globals).as_rc();

        let value = inner.borrow().get(&ident("a")).unwrap();
        assert_eq!(value, Object::Int(1));
    }

    #[test]
    fn get_at_reads_the_exact_scope() {
        let globals = Environment::new().as_rc();
        globals.borrow_mut().define("a", Object::Int(1));
        let middle = Environment::new().with_enclosing(globals).as_rc();
        middle.borrow_mut().define("a", Object::Int(2));
        let inner = Environment::new().with_enclosing(middle).as_rc();
        inner.borrow_mut().define("a", Object::Int(3));

        assert_eq!(inner.borrow().get_at(0, &ident("a")).unwrap(), Object::Int(3));
        assert_eq!(inner.borrow().get_at(1, &ident("a")).unwrap(), Object::Int(2));
        assert_eq!(inner.borrow().get_at(2, &ident("a")).unwrap(), Object::Int(1));
    }

    #[test]
    fn assign_at_writes_the_exact_scope() {
        let globals = Environment::new().as_rc();
        globals.borrow_mut().define("a", Object::Int(1));
        let inner = Environment::new().with_enclosing(globals.clone()).as_rc();

        inner.borrow_mut().assign_at(1, &ident("a"), Object::Int(9)).unwrap();
        assert_eq!(globals.borrow().get(&ident("a")).unwrap(), Object::Int(9));
    }

    #[test]
    fn declare_rejects_duplicates() {
        let mut env = Environment::new();
        env.declare(&ident("a"), Object::Int(1)).unwrap();
        assert!(env.declare(&ident("a"), Object::Int(2)).is_err());
    }

    #[test]
    fn assigning_an_undefined_name_fails() {
        let mut env = Environment::new();
        assert!(env.assign(&ident("missing"), Object::Null).is_err());
    }
}

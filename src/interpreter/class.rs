use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::rc::Rc;

use super::{Interpreter, RuntimeError};
use crate::object::Object;

/// Runtime class: three member tables plus an optional superclass. Lookups
/// fall through to the superclass chain.
#[derive(Debug)]
pub struct Class {
    name: String,
    methods: HashMap<String, Object>,
    getters: HashMap<String, Object>,
    class_methods: HashMap<String, Object>,
    superclass: Option<Rc<RefCell<Class>>>,
}

impl Class {
    pub fn new(
        name: impl AsRef<str>,
        methods: HashMap<String, Object>,
        getters: HashMap<String, Object>,
        class_methods: HashMap<String, Object>,
        superclass: Option<Rc<RefCell<Class>>>,
    ) -> Self {
        Self { name: name.as_ref().to_owned(), methods, getters, class_methods, superclass }
    }

    pub fn construct(
        class: Rc<RefCell<Class>>,
        arguments: Vec<Object>,
        interpreter: &mut Interpreter,
    ) -> Result<Rc<RefCell<Instance>>, RuntimeError> {
        let instance = Rc::new(RefCell::new(Instance::new(class.clone())));

        let initializer = class.borrow().find_method("init");
        if let Some(Object::Callable(initializer)) = initializer {
            if let Some(bound) = initializer.bind(Object::Instance(instance.clone())) {
                bound.call(interpreter, arguments)?;
            }
        }

        Ok(instance)
    }

    pub fn find_method(&self, name: &str) -> Option<Object> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }

        if let Some(superclass) = &self.superclass {
            return superclass.borrow().find_method(name);
        }

        None
    }

    pub fn find_getter(&self, name: &str) -> Option<Object> {
        if let Some(getter) = self.getters.get(name) {
            return Some(getter.clone());
        }

        if let Some(superclass) = &self.superclass {
            return superclass.borrow().find_getter(name);
        }

        None
    }

    pub fn find_class_method(&self, name: &str) -> Option<Object> {
        if let Some(method) = self.class_methods.get(name) {
            return Some(method.clone());
        }

        if let Some(superclass) = &self.superclass {
            return superclass.borrow().find_class_method(name);
        }

        None
    }

    /// Property assignment on a class value replaces a method.
    pub fn set_method(&mut self, name: &str, value: Object) {
        self.methods.insert(name.to_owned(), value);
    }

    /// A class takes as many arguments as its initializer, or none.
    pub fn arity(&self) -> usize {
        match self.find_method("init") {
            Some(Object::Callable(initializer)) => initializer.arity(),
            _ => 0,
        }
    }
}

impl Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug)]
pub struct Instance {
    class: Rc<RefCell<Class>>,
    fields: HashMap<String, Object>,
}

impl Instance {
    pub fn new(class: Rc<RefCell<Class>>) -> Self {
        Self { class, fields: HashMap::new() }
    }

    pub fn class(&self) -> Rc<RefCell<Class>> {
        self.class.clone()
    }

    pub fn field(&self, name: &str) -> Option<Object> {
        self.fields.get(name).cloned()
    }

    pub fn set_field(&mut self, name: &str, value: Object) {
        self.fields.insert(name.to_owned(), value);
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} instance", self.class.borrow())
    }
}

//! Lexical environments.
//!
//! Each frame maps names to values, remembers which names are constant, and
//! links to the frame that encloses it. Function values hold the frame they
//! were declared in, so a frame lives as long as any closure over it.
//!
//! ```text
//!   global ◀── call frame (f) ◀── block frame
//!      ▲
//!      └──── closure captured by f
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use super::value::Value;

/// Shared handle to a frame.
pub type Env = Rc<RefCell<Environment>>;

/// Errors from name resolution and binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    AlreadyDefined(String),
    Undefined(String),
    ConstantReassignment(String),
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::AlreadyDefined(name) => write!(f, "Variable '{}' is already defined", name),
            ScopeError::Undefined(name) => write!(f, "Undefined variable '{}'", name),
            ScopeError::ConstantReassignment(name) => {
                write!(f, "Cannot reassign constant '{}'", name)
            }
        }
    }
}

impl std::error::Error for ScopeError {}

/// One scope frame.
#[derive(Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    constants: HashSet<String>,
    parent: Option<Env>,
}

impl Environment {
    /// A root frame with no parent.
    pub fn global() -> Env {
        Rc::new(RefCell::new(Environment::default()))
    }

    /// A new frame enclosed by `parent`.
    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Environment {
            parent: Some(Rc::clone(parent)),
            ..Environment::default()
        }))
    }

    /// Bind a name in this frame. Shadowing an outer binding is fine,
    /// redefining one in the same frame is not.
    pub fn define(&mut self, name: &str, value: Value, constant: bool) -> Result<(), ScopeError> {
        if self.values.contains_key(name) {
            return Err(ScopeError::AlreadyDefined(name.to_string()));
        }
        self.values.insert(name.to_string(), value);
        if constant {
            self.constants.insert(name.to_string());
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Drop every binding in this frame. Breaks reference cycles between a
    /// frame and the closures stored in it.
    pub fn clear(&mut self) {
        self.values.clear();
        self.constants.clear();
    }
}

/// Resolve a name, walking outward from `env`.
pub fn lookup(env: &Env, name: &str) -> Result<Value, ScopeError> {
    let mut frame = Rc::clone(env);
    loop {
        let parent = {
            let current = frame.borrow();
            if let Some(value) = current.values.get(name) {
                return Ok(value.clone());
            }
            current.parent.clone()
        };
        match parent {
            Some(p) => frame = p,
            None => return Err(ScopeError::Undefined(name.to_string())),
        }
    }
}

/// Assign to an existing binding in the nearest frame that owns `name`.
pub fn assign(env: &Env, name: &str, value: Value) -> Result<(), ScopeError> {
    let mut frame = Rc::clone(env);
    loop {
        let parent = {
            let mut current = frame.borrow_mut();
            if current.values.contains_key(name) {
                if current.constants.contains(name) {
                    return Err(ScopeError::ConstantReassignment(name.to_string()));
                }
                current.values.insert(name.to_string(), value);
                return Ok(());
            }
            current.parent.clone()
        };
        match parent {
            Some(p) => frame = p,
            None => return Err(ScopeError::Undefined(name.to_string())),
        }
    }
}

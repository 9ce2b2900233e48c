//! Scoped variable environment for the pmscript evaluator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    mutable: bool,
    /// Declared with `let`/`const`/`function` rather than `var`.
    lexical: bool,
}

#[derive(Debug)]
struct Frame {
    bindings: HashMap<String, Binding>,
    parent: Option<Scope>,
    /// `var` declarations land in the nearest frame with this flag set.
    function_boundary: bool,
}

/// A lexical scope, shared between the code running in it and any
/// closures created there.
///
/// Lookups walk from the innermost frame outward. `define` always creates in
/// this frame; `set` updates the first frame where the name exists.
#[derive(Debug, Clone)]
pub struct Scope(Rc<RefCell<Frame>>);

impl Scope {
    /// The outermost (script) scope.
    pub fn global() -> Self {
        Self::with_parent(None, true)
    }

    /// A nested scope for a block (`false`) or function body (`true`).
    pub fn child(&self, function_boundary: bool) -> Self {
        Self::with_parent(Some(self.clone()), function_boundary)
    }

    fn with_parent(parent: Option<Scope>, function_boundary: bool) -> Self {
        Scope(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent,
            function_boundary,
        })))
    }

    /// Declare a name in this frame.
    ///
    /// Redeclaring a `let`/`const` binding in the same frame is an error.
    pub fn define(&self, name: &str, value: Value, mutable: bool, lexical: bool) -> EvalResult<()> {
        let mut frame = self.0.borrow_mut();
        if let Some(existing) = frame.bindings.get(name) {
            if existing.lexical && lexical {
                return Err(EvalError::Syntax(format!(
                    "Identifier '{name}' has already been declared"
                )));
            }
        }
        frame.bindings.insert(
            name.to_string(),
            Binding {
                value,
                mutable,
                lexical,
            },
        );
        Ok(())
    }

    /// `var name [= value]`: declare in the nearest function frame. A
    /// redeclaration without initializer keeps the current value.
    pub fn define_var(&self, name: &str, value: Option<Value>) {
        let target = self.function_frame();
        let mut frame = target.0.borrow_mut();
        match (frame.bindings.get_mut(name), value) {
            (Some(binding), Some(value)) => binding.value = value,
            (Some(_), None) => {}
            (None, value) => {
                frame.bindings.insert(
                    name.to_string(),
                    Binding {
                        value: value.unwrap_or(Value::Undefined),
                        mutable: true,
                        lexical: false,
                    },
                );
            }
        }
    }

    fn function_frame(&self) -> Scope {
        let mut scope = self.clone();
        loop {
            let parent = {
                let frame = scope.0.borrow();
                if frame.function_boundary {
                    return scope.clone();
                }
                frame.parent.clone()
            };
            match parent {
                Some(p) => scope = p,
                None => return scope,
            }
        }
    }

    /// Look up a name, innermost first.
    pub fn get(&self, name: &str) -> Option<Value> {
        let frame = self.0.borrow();
        match frame.bindings.get(name) {
            Some(binding) => Some(binding.value.clone()),
            None => frame.parent.as_ref().and_then(|p| p.get(name)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Assign to an existing binding.
    ///
    /// Returns `Ok(false)` when no frame declares `name`.
    pub fn set(&self, name: &str, value: Value) -> EvalResult<bool> {
        let parent = {
            let mut frame = self.0.borrow_mut();
            if let Some(binding) = frame.bindings.get_mut(name) {
                if !binding.mutable {
                    return Err(EvalError::Type(
                        "Assignment to constant variable.".to_string(),
                    ));
                }
                binding.value = value;
                return Ok(true);
            }
            frame.parent.clone()
        };
        match parent {
            Some(parent) => parent.set(name, value),
            None => Ok(false),
        }
    }

    /// Assign, creating an implicit global when the name is undeclared.
    pub fn assign(&self, name: &str, value: Value) -> EvalResult<()> {
        if !self.set(name, value.clone())? {
            self.root().define_var(name, Some(value));
        }
        Ok(())
    }

    fn root(&self) -> Scope {
        let mut scope = self.clone();
        loop {
            let parent = scope.0.borrow().parent.clone();
            match parent {
                Some(p) => scope = p,
                None => return scope,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scope_shadows_and_falls_back() {
        let global = Scope::global();
        global.define("a", Value::Number(1.0), true, true).unwrap();
        let inner = global.child(false);
        inner.define("a", Value::Number(2.0), true, true).unwrap();
        assert_eq!(inner.get("a").and_then(|v| v.as_number()), Some(2.0));
        assert_eq!(global.get("a").and_then(|v| v.as_number()), Some(1.0));
        assert!(inner.get("missing").is_none());
    }

    #[test]
    fn set_updates_the_declaring_frame() {
        let global = Scope::global();
        global.define("n", Value::Number(1.0), true, true).unwrap();
        let inner = global.child(false);
        assert!(inner.set("n", Value::Number(5.0)).unwrap());
        assert_eq!(global.get("n").and_then(|v| v.as_number()), Some(5.0));
        assert!(!inner.set("other", Value::Null).unwrap());
    }

    #[test]
    fn const_rejects_assignment() {
        let global = Scope::global();
        global.define("k", Value::Number(1.0), false, true).unwrap();
        let err = global.set("k", Value::Number(2.0)).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Assignment to constant variable.");
    }

    #[test]
    fn lexical_redeclaration_is_an_error() {
        let global = Scope::global();
        global.define("x", Value::Null, true, true).unwrap();
        let err = global.define("x", Value::Null, true, true).unwrap_err();
        assert_eq!(err.message(), "Identifier 'x' has already been declared");
    }

    #[test]
    fn var_hoists_to_function_frame() {
        let global = Scope::global();
        let func = global.child(true);
        let block = func.child(false);
        block.define_var("v", Some(Value::Number(3.0)));
        assert!(func.contains("v"));
        assert!(!global.contains("v"));
        block.define_var("v", None);
        assert_eq!(func.get("v").and_then(|v| v.as_number()), Some(3.0));
    }

    #[test]
    fn undeclared_assignment_creates_global() {
        let global = Scope::global();
        let inner = global.child(true).child(false);
        inner.assign("implicit", Value::Bool(true)).unwrap();
        assert!(global.contains("implicit"));
    }
}

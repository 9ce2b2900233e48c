//! `pm.expect(actual)`: the chainable assertion target.
//!
//! A target is an immutable `(actual, negated)` pair. Chain words (`to`,
//! `be`, `have`, `a`, `an`) return the same target, `not` returns a fresh
//! target with the polarity flipped, and predicates either complete or fail
//! with an [`EvalError::Assertion`].

use std::rc::Rc;

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

/// Predicates callable on a target.
const PREDICATES: &[&str] = &["eql", "equal", "property", "ok", "above", "empty", "a", "an"];

#[derive(Debug)]
pub struct Expectation {
    pub actual: Value,
    pub negated: bool,
}

impl Expectation {
    pub fn new(actual: Value, negated: bool) -> Self {
        Self { actual, negated }
    }

    /// `"not "` when negated, for message templates.
    fn not(&self) -> &'static str {
        if self.negated {
            "not "
        } else {
            ""
        }
    }

    /// Fail unless `condition` holds, or, when negated, unless it does not.
    fn check(&self, condition: bool, message: impl FnOnce() -> String) -> EvalResult<()> {
        if condition == self.negated {
            Err(EvalError::Assertion(message()))
        } else {
            Ok(())
        }
    }

    /// Property read on a target.
    pub(crate) fn property(self: &Rc<Self>, key: &str) -> EvalResult<Value> {
        match key {
            "to" | "be" | "have" => Ok(Value::Expectation(Rc::clone(self))),
            "not" => Ok(Value::Expectation(Rc::new(Expectation::new(
                self.actual.clone(),
                !self.negated,
            )))),
            "null" => {
                self.check(matches!(self.actual, Value::Null), || {
                    format!("expected {} to be {}null", self.actual.describe(), self.not())
                })?;
                Ok(Value::Expectation(Rc::clone(self)))
            }
            _ if PREDICATES.contains(&key) => {
                Ok(Value::method(&Value::Expectation(Rc::clone(self)), key))
            }
            _ => Ok(Value::Undefined),
        }
    }

    pub(crate) fn has_property(&self, key: &str) -> bool {
        matches!(key, "to" | "be" | "have" | "not" | "null") || PREDICATES.contains(&key)
    }

    /// Invoke a predicate. Every predicate returns the target on success.
    pub(crate) fn call(self: &Rc<Self>, name: &str, args: &[Value]) -> EvalResult<Value> {
        let arg = args.first().cloned().unwrap_or(Value::Undefined);
        let actual = &self.actual;
        let not = self.not();
        match name {
            "eql" => {
                let equal = actual.stringify("")? == arg.stringify("")?;
                self.check(equal, || {
                    format!(
                        "expected {} {not}to deeply equal {}",
                        actual.describe(),
                        arg.describe()
                    )
                })?;
            }
            "equal" => {
                self.check(actual.strict_equals(&arg), || {
                    format!(
                        "expected {} {not}to equal {}",
                        actual.describe(),
                        arg.describe()
                    )
                })?;
            }
            "property" => {
                let key = arg.to_js_string();
                let present = match actual {
                    Value::Array(_) | Value::Object(_) | Value::Error(_) | Value::Host(_) => {
                        actual.has_property(&key)
                    }
                    Value::Expectation(target) => target.has_property(&key),
                    _ => false,
                };
                self.check(present, || {
                    format!(
                        "expected {} {not}to have property '{key}'",
                        actual.describe()
                    )
                })?;
            }
            "ok" => {
                self.check(actual.is_truthy(), || {
                    format!("expected {} {not}to be truthy", actual.describe())
                })?;
            }
            "above" => {
                let above = match (actual, &arg) {
                    (Value::Number(a), bound) => *a > bound.to_number(),
                    _ => false,
                };
                self.check(above, || {
                    format!(
                        "expected {} to be {not}above {}",
                        actual.to_js_string(),
                        arg.to_js_string()
                    )
                })?;
            }
            "empty" => {
                let empty = match actual {
                    Value::String(s) => s.is_empty(),
                    Value::Array(items) => items.borrow().is_empty(),
                    Value::Object(map) => map.borrow().is_empty(),
                    Value::Error(_) => true,
                    Value::Host(_) | Value::Expectation(_) => false,
                    other => {
                        return Err(EvalError::Usage(format!(
                            "'empty' assertion is not supported for type {}",
                            other.type_of()
                        )))
                    }
                };
                self.check(empty, || {
                    format!("expected {} to be {not}empty", actual.describe())
                })?;
            }
            "a" | "an" => {
                let expected = arg.to_js_string();
                let tag = actual.type_tag();
                self.check(tag == expected, || {
                    format!(
                        "expected {} to be {not}a {expected}, but got {tag}",
                        actual.describe()
                    )
                })?;
            }
            _ => {
                return Err(EvalError::Type(format!(
                    "pm.expect(...).{name} is not a function"
                )))
            }
        }
        Ok(Value::Expectation(Rc::clone(self)))
    }
}

//! Runtime error types for the pmscript evaluator.

use std::rc::Rc;

use crate::value::{ErrorKind, ErrorObject, Value};

/// Evaluation error: script-visible exceptions, the step budget, and
/// internal control flow.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    /// A terminal predicate did not hold.
    #[error("AssertionError: {0}")]
    Assertion(String),
    /// A predicate was applied to a value it does not support.
    #[error("UsageError: {0}")]
    Usage(String),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ReferenceError: {0}")]
    Reference(String),
    #[error("RangeError: {0}")]
    Range(String),
    #[error("SyntaxError: {0}")]
    Syntax(String),
    /// A value raised by `throw`.
    #[error("Uncaught {}", .0.to_js_string())]
    Thrown(Value),
    /// Step budget exhausted. Not catchable by scripts.
    #[error("script exceeded step budget of {0}")]
    StepBudgetExhausted(u64),
    /// `return` (used internally for control flow)
    #[error("return outside of function")]
    Return(Value),
    /// `break` (used internally for control flow)
    #[error("Illegal break statement")]
    Break,
    /// `continue` (used internally for control flow)
    #[error("Illegal continue statement")]
    Continue,
}

impl EvalError {
    /// The text a script would read from `error.message`.
    ///
    /// Thrown Error objects report their message; any other thrown value
    /// reports its string conversion.
    pub fn message(&self) -> String {
        match self {
            Self::Assertion(msg)
            | Self::Usage(msg)
            | Self::Type(msg)
            | Self::Reference(msg)
            | Self::Range(msg)
            | Self::Syntax(msg) => msg.clone(),
            Self::Thrown(Value::Error(err)) => err.message.clone(),
            Self::Thrown(value) => value.to_js_string(),
            Self::StepBudgetExhausted(_) | Self::Return(_) | Self::Break | Self::Continue => {
                self.to_string()
            }
        }
    }

    /// `true` for errors that `try`/`catch` and `pm.test` may intercept.
    pub fn is_catchable(&self) -> bool {
        !matches!(
            self,
            Self::StepBudgetExhausted(_) | Self::Return(_) | Self::Break | Self::Continue
        )
    }

    /// The value bound to a `catch (e)` parameter.
    pub fn into_value(self) -> Value {
        let (kind, message) = match self {
            Self::Thrown(value) => return value,
            Self::Assertion(msg) => (ErrorKind::AssertionError, msg),
            Self::Usage(msg) => (ErrorKind::UsageError, msg),
            Self::Type(msg) => (ErrorKind::TypeError, msg),
            Self::Reference(msg) => (ErrorKind::ReferenceError, msg),
            Self::Range(msg) => (ErrorKind::RangeError, msg),
            Self::Syntax(msg) => (ErrorKind::SyntaxError, msg),
            other => (ErrorKind::Error, other.to_string()),
        };
        Value::Error(Rc::new(ErrorObject::new(kind, message)))
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;

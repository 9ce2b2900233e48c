//! The `pm` object graph: `pm.test`, `pm.expect`, `pm.response` and
//! `pm.environment`.
//!
//! Every object here is a read-only [`HostObject`]; methods are bound on
//! property read and dispatched back through [`Evaluator::call_pm`].

use std::rc::Rc;

use tracing::debug;

use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::exchange::ResponseBody;
use crate::expect::Expectation;
use crate::test_runner::TestResult;
use crate::value::{HostObject, ObjectMap, Value};

impl HostObject {
    /// Callable members.
    pub(crate) fn methods(self) -> &'static [&'static str] {
        match self {
            HostObject::Pm => &["test", "expect"],
            HostObject::Response => &["json", "text"],
            HostObject::ResponseAssert => &["status", "header"],
            HostObject::Environment => &["get", "set", "has", "toObject"],
            HostObject::Headers => &["get", "has", "toObject"],
            HostObject::Console => &["log", "info", "warn", "error", "debug"],
            HostObject::Json => &["parse", "stringify"],
            HostObject::Math => &[
                "abs", "floor", "ceil", "round", "max", "min", "pow", "sqrt", "trunc", "sign",
            ],
            HostObject::Object => &["keys", "values", "entries", "assign"],
            HostObject::Array => &["isArray"],
        }
    }

    fn data_properties(self) -> &'static [&'static str] {
        match self {
            HostObject::Pm => &["response", "environment"],
            HostObject::Response => &["code", "status", "headers", "to"],
            HostObject::ResponseAssert => &["have", "be", "and"],
            HostObject::Math => &["PI", "E"],
            _ => &[],
        }
    }

    pub fn has_property(self, key: &str) -> bool {
        self.methods().contains(&key) || self.data_properties().contains(&key)
    }

    /// Objects reachable from `pm`, as opposed to language built-ins.
    pub(crate) fn is_pm(self) -> bool {
        matches!(
            self,
            HostObject::Pm
                | HostObject::Response
                | HostObject::ResponseAssert
                | HostObject::Environment
                | HostObject::Headers
        )
    }
}

impl Evaluator<'_> {
    /// Read a data property or bind a method of a `pm` object.
    pub(crate) fn pm_property(&mut self, host: HostObject, key: &str) -> EvalResult<Value> {
        if host.methods().contains(&key) {
            return Ok(Value::method(&Value::Host(host), key));
        }
        let exchange = self.exchange();
        let value = match (host, key) {
            (HostObject::Pm, "response") => Value::Host(HostObject::Response),
            (HostObject::Pm, "environment") => Value::Host(HostObject::Environment),
            (HostObject::Response, "code") => Value::Number(f64::from(exchange.status_code)),
            (HostObject::Response, "status") => Value::String(exchange.status_text.clone()),
            (HostObject::Response, "headers") => Value::Host(HostObject::Headers),
            (HostObject::Response, "to") => Value::Host(HostObject::ResponseAssert),
            (HostObject::ResponseAssert, "have" | "be" | "and") => {
                Value::Host(HostObject::ResponseAssert)
            }
            (HostObject::Headers, name) => exchange
                .header(name)
                .map(Value::from)
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        };
        Ok(value)
    }

    /// Call a method of a `pm` object.
    pub(crate) fn call_pm(
        &mut self,
        host: HostObject,
        name: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        match (host, name) {
            (HostObject::Pm, "test") => self.register_test(arg(0), arg(1)),
            (HostObject::Pm, "expect") => Ok(Value::Expectation(Rc::new(Expectation::new(
                arg(0),
                false,
            )))),
            (HostObject::Response, "json") => self.response_json(),
            (HostObject::Response, "text") => self.response_text(),
            (HostObject::ResponseAssert, "status") => self.assert_status(&arg(0)),
            (HostObject::ResponseAssert, "header") => self.assert_header(&arg(0), &arg(1)),
            (HostObject::Environment, "get") => Ok(self
                .variables
                .get(&arg(0).to_js_string())
                .map(Value::from)
                .unwrap_or(Value::Undefined)),
            (HostObject::Environment, "set") => {
                let key = arg(0).to_js_string();
                let value = arg(1).to_js_string();
                self.variables
                    .set(key, value)
                    .map_err(|e| EvalError::Usage(format!("pm.environment.set: {e}")))?;
                Ok(Value::Undefined)
            }
            (HostObject::Environment, "has") => {
                Ok(Value::Bool(self.variables.has(&arg(0).to_js_string())))
            }
            (HostObject::Environment, "toObject") => Ok(Value::object(
                self.variables
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::from(v)))
                    .collect(),
            )),
            (HostObject::Headers, "get") => Ok(self
                .exchange()
                .header(&arg(0).to_js_string())
                .map(Value::from)
                .unwrap_or(Value::Null)),
            (HostObject::Headers, "has") => Ok(Value::Bool(
                self.exchange().header(&arg(0).to_js_string()).is_some(),
            )),
            (HostObject::Headers, "toObject") => {
                let map: ObjectMap = self
                    .exchange()
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect();
                Ok(Value::object(map))
            }
            _ => Err(EvalError::Type(format!(
                "{}.{name} is not a function",
                host.path()
            ))),
        }
    }

    /// `pm.test(name, body)`: run `body` and record the outcome.
    fn register_test(&mut self, name: Value, body: Value) -> EvalResult<Value> {
        let name = name.to_js_string();
        let outcome = match &body {
            Value::Function(f) => self.call_function(f, Vec::new()).map(|_| ()),
            other => Err(EvalError::Type(format!(
                "{} is not a function",
                other.describe()
            ))),
        };
        let result = match outcome {
            Ok(()) => TestResult::pass(name),
            Err(e) if !e.is_catchable() => return Err(e),
            Err(e) => TestResult::fail(name, e.message()),
        };
        debug!(test = %result.name, passed = result.passed, "recorded test");
        self.results.push(result);
        Ok(Value::Undefined)
    }

    /// `pm.response.json()`: the decoded body, one identity per run.
    fn response_json(&mut self) -> EvalResult<Value> {
        if let Some(cached) = &self.json_body {
            return Ok(cached.clone());
        }
        match &self.exchange().body {
            ResponseBody::Json(json) => {
                let value = Value::from(json);
                self.json_body = Some(value.clone());
                Ok(value)
            }
            ResponseBody::Text(_) => Err(EvalError::Type("response body is not JSON".to_string())),
        }
    }

    fn response_text(&mut self) -> EvalResult<Value> {
        match &self.exchange().body {
            ResponseBody::Text(text) => Ok(Value::from(text.as_str())),
            ResponseBody::Json(_) => {
                let json = self.response_json()?;
                Ok(json
                    .stringify("")?
                    .map(Value::String)
                    .unwrap_or(Value::Undefined))
            }
        }
    }

    /// `pm.response.to.have.status(code)`
    fn assert_status(&self, code: &Value) -> EvalResult<Value> {
        let actual = self.exchange().status_code;
        if !code.strict_equals(&Value::Number(f64::from(actual))) {
            return Err(EvalError::Assertion(format!(
                "expected response status to be {} but got {actual}",
                code.to_js_string()
            )));
        }
        Ok(Value::Host(HostObject::ResponseAssert))
    }

    /// `pm.response.to.have.header(key[, value])`
    fn assert_header(&self, key: &Value, expected: &Value) -> EvalResult<Value> {
        let key = key.to_js_string();
        let Some(actual) = self.exchange().header(&key) else {
            return Err(EvalError::Assertion(format!(
                "expected header '{key}' to exist"
            )));
        };
        if !matches!(expected, Value::Undefined) && !expected.strict_equals(&Value::from(actual)) {
            return Err(EvalError::Assertion(format!(
                "expected header '{key}' to be '{}' but got '{actual}'",
                expected.to_js_string()
            )));
        }
        Ok(Value::Host(HostObject::ResponseAssert))
    }
}

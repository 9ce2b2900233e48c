//! Runtime values and their JavaScript conversions.
//!
//! Arrays and objects are shared, mutable references (`Rc<RefCell<..>>`) so
//! that identity (`===`) and aliasing behave as scripts expect. Objects keep
//! insertion order, which `JSON.stringify` and `eql` rely on.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use pmscript_types::ast::FunctionDef;

use crate::builtins::{code_unit_count, MAX_COLLECTION_LENGTH};
use crate::env::Scope;
use crate::error::{EvalError, EvalResult};
use crate::expect::Expectation;

/// Property storage of a plain object.
pub type ObjectMap = IndexMap<String, Value>;

/// A script value.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<ObjectMap>>),
    Function(Rc<Function>),
    Error(Rc<ErrorObject>),
    /// A read-only object provided by the engine (`pm`, `JSON`, ...).
    Host(HostObject),
    /// The chainable target returned by `pm.expect`.
    Expectation(Rc<Expectation>),
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors, functions, host objects
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    AssertionError,
    UsageError,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::TypeError => "TypeError",
            Self::RangeError => "RangeError",
            Self::ReferenceError => "ReferenceError",
            Self::SyntaxError => "SyntaxError",
            Self::AssertionError => "AssertionError",
            Self::UsageError => "UsageError",
        }
    }

    /// `true` if an error of this kind is an instance of `ctor`.
    pub fn is_instance_of(self, ctor: ErrorKind) -> bool {
        ctor == Self::Error || ctor == self
    }
}

/// An Error instance: `new Error("boom")`, or a caught engine error.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObject {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorObject {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// `String(error)`: `"TypeError: message"`, or just the name.
    pub fn to_js_string(&self) -> String {
        if self.message.is_empty() {
            self.kind.name().to_string()
        } else {
            format!("{}: {}", self.kind.name(), self.message)
        }
    }
}

/// A callable value.
pub enum Function {
    /// A function defined by the script, with its captured scope.
    Script(Closure),
    /// A global built-in such as `parseInt` or `Error`.
    Global(GlobalFn),
    /// A method read off a value: `"abc".includes`, `pm.test`.
    Method(BoundMethod),
}

pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: Scope,
}

pub struct BoundMethod {
    pub this: Value,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalFn {
    String,
    Number,
    Boolean,
    ParseInt,
    ParseFloat,
    IsNaN,
    IsFinite,
    Error(ErrorKind),
}

impl GlobalFn {
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::ParseInt => "parseInt",
            Self::ParseFloat => "parseFloat",
            Self::IsNaN => "isNaN",
            Self::IsFinite => "isFinite",
            Self::Error(kind) => kind.name(),
        }
    }
}

impl Function {
    pub fn name(&self) -> String {
        match self {
            Self::Script(closure) => closure
                .def
                .name
                .as_ref()
                .map(|n| n.name.clone())
                .unwrap_or_default(),
            Self::Global(g) => g.name().to_string(),
            Self::Method(m) => m.name.clone(),
        }
    }
}

/// Engine-provided objects. All of them are read-only to scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostObject {
    Pm,
    Response,
    /// `pm.response.to` / `pm.response.to.have`
    ResponseAssert,
    Environment,
    Headers,
    Console,
    Json,
    Math,
    Object,
    Array,
}

impl HostObject {
    /// How the object is reached from script code.
    pub fn path(self) -> &'static str {
        match self {
            Self::Pm => "pm",
            Self::Response => "pm.response",
            Self::ResponseAssert => "pm.response.to",
            Self::Environment => "pm.environment",
            Self::Headers => "pm.response.headers",
            Self::Console => "console",
            Self::Json => "JSON",
            Self::Math => "Math",
            Self::Object => "Object",
            Self::Array => "Array",
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Constructors & conversions
// ══════════════════════════════════════════════════════════════════════════════

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::array(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(map: ObjectMap) -> Value {
        Value::Object(Rc::new(RefCell::new(map)))
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Value {
        Value::Error(Rc::new(ErrorObject::new(kind, message)))
    }

    pub fn function(f: Function) -> Value {
        Value::Function(Rc::new(f))
    }

    /// A method bound to `this`, as produced by reading `this.name`.
    pub fn method(this: &Value, name: &str) -> Value {
        Value::function(Function::Method(BoundMethod {
            this: this.clone(),
            name: name.to_string(),
        }))
    }

    // ── Type inspection ──────────────────────────────────────────────────────

    /// The `typeof` operator.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Array(_)
            | Value::Object(_)
            | Value::Error(_)
            | Value::Host(_)
            | Value::Expectation(_) => "object",
        }
    }

    /// `typeof`, refined to `"array"` and `"null"`.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Array(_) => "array",
            other => other.type_of(),
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    // ── String conversion ────────────────────────────────────────────────────

    /// `String(value)`.
    pub fn to_js_string(&self) -> String {
        let mut seen = Vec::new();
        self.to_js_string_inner(&mut seen)
    }

    fn to_js_string_inner(&self, seen: &mut Vec<usize>) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => {
                let id = Rc::as_ptr(items) as usize;
                if seen.contains(&id) {
                    return String::new();
                }
                seen.push(id);
                let mut joined = String::new();
                for (i, v) in items.borrow().iter().enumerate() {
                    // Stop once past the cap; callers reject the overlong result.
                    if joined.len() > MAX_COLLECTION_LENGTH {
                        break;
                    }
                    if i > 0 {
                        joined.push(',');
                    }
                    if !v.is_nullish() {
                        joined.push_str(&v.to_js_string_inner(seen));
                    }
                }
                seen.pop();
                joined
            }
            Value::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
            Value::Error(err) => err.to_js_string(),
            Value::Object(_) | Value::Host(_) | Value::Expectation(_) => {
                "[object Object]".to_string()
            }
        }
    }

    /// The text used to name a value in assertion messages: its JSON
    /// encoding, or `undefined` when it has none.
    pub fn describe(&self) -> String {
        match self.stringify("") {
            Ok(Some(text)) => text,
            Ok(None) => "undefined".to_string(),
            Err(_) => self.to_js_string(),
        }
    }

    // ── Number conversion ────────────────────────────────────────────────────

    /// `Number(value)`.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(items) => {
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    // ── Equality ─────────────────────────────────────────────────────────────

    /// The `===` operator.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            (Value::Expectation(a), Value::Expectation(b)) => Rc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => a == b,
            _ => false,
        }
    }

    /// The `==` operator.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
            (a, b) if a.is_primitive() != b.is_primitive() => {
                let (object, primitive) = if a.is_primitive() { (b, a) } else { (a, b) };
                Value::String(object.to_js_string()).loose_equals(primitive)
            }
            _ => self.strict_equals(other),
        }
    }

    fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        )
    }

    // ── Properties ───────────────────────────────────────────────────────────

    /// Own enumerable keys, as `Object.keys` and `for…in` see them.
    pub fn own_keys(&self) -> Vec<String> {
        match self {
            Value::Object(map) => map.borrow().keys().cloned().collect(),
            Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
            Value::String(s) => (0..code_unit_count(s)).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// The `in` test: does an object-like value carry `key`?
    pub fn has_property(&self, key: &str) -> bool {
        match self {
            Value::Object(map) => map.borrow().contains_key(key),
            Value::Array(items) => {
                key == "length" || array_index(key).is_some_and(|i| i < items.borrow().len())
            }
            Value::Error(_) => matches!(key, "name" | "message"),
            Value::Host(host) => host.has_property(key),
            _ => false,
        }
    }

    // ── JSON ─────────────────────────────────────────────────────────────────

    /// `JSON.stringify(value, null, indent)`.
    ///
    /// Returns `None` where JavaScript returns `undefined` (for `undefined`
    /// and functions). Fails on circular structures.
    pub fn stringify(&self, indent: &str) -> EvalResult<Option<String>> {
        let mut writer = JsonWriter {
            indent,
            out: String::new(),
            stack: Vec::new(),
        };
        Ok(writer.write(self, 0)?.then_some(writer.out))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Function(func) => write!(f, "[Function {}]", func.name()),
            Value::Host(host) => write!(f, "[{}]", host.path()),
            Value::Expectation(e) => write!(f, "[Expectation {}]", e.actual.describe()),
            Value::Error(err) => write!(f, "[{}]", err.to_js_string()),
            other => f.write_str(&other.describe()),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// JSON writer
// ══════════════════════════════════════════════════════════════════════════════

struct JsonWriter<'a> {
    indent: &'a str,
    out: String,
    /// Containers currently being written, for cycle detection.
    stack: Vec<usize>,
}

impl JsonWriter<'_> {
    /// Write `value`; returns `false` (writing nothing) when it has no encoding.
    fn write(&mut self, value: &Value, depth: usize) -> EvalResult<bool> {
        match value {
            Value::Undefined | Value::Function(_) => return Ok(false),
            Value::Null => self.out.push_str("null"),
            Value::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) if n.is_finite() => self.out.push_str(&format_number(*n)),
            Value::Number(_) => self.out.push_str("null"),
            Value::String(s) => self.write_string(s)?,
            Value::Error(_) | Value::Host(_) | Value::Expectation(_) => self.out.push_str("{}"),
            Value::Array(items) => {
                self.enter(Rc::as_ptr(items) as usize)?;
                let items = items.borrow();
                self.out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push(',');
                    }
                    self.newline(depth + 1);
                    if !self.write(item, depth + 1)? {
                        self.out.push_str("null");
                    }
                }
                if !items.is_empty() {
                    self.newline(depth);
                }
                self.out.push(']');
                self.stack.pop();
            }
            Value::Object(map) => {
                self.enter(Rc::as_ptr(map) as usize)?;
                let map = map.borrow();
                self.out.push('{');
                let mut wrote_any = false;
                for (key, item) in map.iter() {
                    let mark = self.out.len();
                    if wrote_any {
                        self.out.push(',');
                    }
                    self.newline(depth + 1);
                    self.write_string(key)?;
                    self.out.push(':');
                    if !self.indent.is_empty() {
                        self.out.push(' ');
                    }
                    if self.write(item, depth + 1)? {
                        wrote_any = true;
                    } else {
                        self.out.truncate(mark);
                    }
                }
                if wrote_any {
                    self.newline(depth);
                }
                self.out.push('}');
                self.stack.pop();
            }
        }
        Ok(true)
    }

    fn write_string(&mut self, s: &str) -> EvalResult<()> {
        let quoted = serde_json::to_string(s).map_err(|e| EvalError::Type(e.to_string()))?;
        self.out.push_str(&quoted);
        Ok(())
    }

    fn enter(&mut self, id: usize) -> EvalResult<()> {
        if self.stack.contains(&id) {
            return Err(EvalError::Type(
                "Converting circular structure to JSON".to_string(),
            ));
        }
        self.stack.push(id);
        Ok(())
    }

    fn newline(&mut self, depth: usize) {
        if self.indent.is_empty() {
            return;
        }
        self.out.push('\n');
        for _ in 0..depth {
            self.out.push_str(self.indent);
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Number helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Format a number the way JavaScript's `String(n)` does.
///
/// Decimal notation for magnitudes in `[1e-6, 1e21)`, exponent notation
/// (`1e+21`, `1.5e-7`) outside it, shortest round-trip digits throughout.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{n}");
    }
    let exp = format!("{n:e}");
    match exp.split_once('e') {
        Some((mantissa, power)) if power.starts_with('-') => format!("{mantissa}e{power}"),
        Some((mantissa, power)) => format!("{mantissa}e+{power}"),
        None => exp,
    }
}

/// `Number(string)`: whitespace-trimmed decimal, hex, or `Infinity`.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    let numeric = t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !numeric {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Parse a canonical array index (`"0"`, `"12"`, not `"01"` or `"-1"`).
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

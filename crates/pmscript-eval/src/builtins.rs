//! Language built-ins: global functions, `JSON`, `Math`, `Object`, `Array`,
//! `console`, and the methods of strings, numbers and arrays.
//!
//! Nothing here performs I/O. `console` output is captured into the run's
//! log, never printed.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use tracing::debug;

use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::test_runner::{LogEntry, LogLevel};
use crate::value::{format_number, ErrorKind, GlobalFn, HostObject, Value};

pub(crate) const STRING_METHODS: &[&str] = &[
    "includes",
    "startsWith",
    "endsWith",
    "indexOf",
    "lastIndexOf",
    "slice",
    "substring",
    "toUpperCase",
    "toLowerCase",
    "trim",
    "trimStart",
    "trimEnd",
    "split",
    "replace",
    "replaceAll",
    "charAt",
    "charCodeAt",
    "at",
    "padStart",
    "padEnd",
    "repeat",
    "concat",
    "toString",
];

pub(crate) const ARRAY_METHODS: &[&str] = &[
    "push",
    "pop",
    "shift",
    "unshift",
    "splice",
    "slice",
    "concat",
    "join",
    "indexOf",
    "includes",
    "find",
    "findIndex",
    "filter",
    "map",
    "forEach",
    "some",
    "every",
    "reduce",
    "sort",
    "reverse",
    "flat",
    "at",
    "toString",
];

pub(crate) const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

/// Longest string or array a script may build.
pub(crate) const MAX_COLLECTION_LENGTH: usize = 1 << 24;

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// `ToIntegerOrInfinity`, with NaN as zero.
fn to_integer(value: &Value) -> f64 {
    let n = value.to_number();
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Resolve a possibly negative position (`slice`, `at`) against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = to_integer(value);
    let len_f = len as f64;
    if n < 0.0 {
        (len_f + n).max(0.0) as usize
    } else {
        n.min(len_f) as usize
    }
}

/// Resolve a position clamped to `0..=len` (`substring`, `includes`).
fn clamped_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    to_integer(value).clamp(0.0, len as f64) as usize
}

// ══════════════════════════════════════════════════════════════════════════════
// Global functions
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) fn call_global(global: GlobalFn, args: &[Value]) -> EvalResult<Value> {
    let value = match global {
        GlobalFn::String => match args.first() {
            Some(v) => Value::String(v.to_js_string()),
            None => Value::from(""),
        },
        GlobalFn::Number => Value::Number(args.first().map(Value::to_number).unwrap_or(0.0)),
        GlobalFn::Boolean => Value::Bool(arg(args, 0).is_truthy()),
        GlobalFn::ParseInt => Value::Number(parse_int(&arg(args, 0).to_js_string(), &arg(args, 1))),
        GlobalFn::ParseFloat => Value::Number(parse_float(&arg(args, 0).to_js_string())),
        GlobalFn::IsNaN => Value::Bool(arg(args, 0).to_number().is_nan()),
        GlobalFn::IsFinite => Value::Bool(arg(args, 0).to_number().is_finite()),
        GlobalFn::Error(kind) => construct_error(kind, args),
    };
    Ok(value)
}

/// `new Error(message)` and friends.
pub(crate) fn construct_error(kind: ErrorKind, args: &[Value]) -> Value {
    let message = match args.first() {
        None | Some(Value::Undefined) => String::new(),
        Some(v) => v.to_js_string(),
    };
    Value::error(kind, message)
}

fn parse_int(text: &str, radix: &Value) -> f64 {
    let s = text.trim_start();
    let (sign, s) = match s.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, s.strip_prefix('+').unwrap_or(s)),
    };
    let mut radix = match radix {
        Value::Undefined => 0,
        other => to_integer(other) as i64,
    };
    if radix != 0 && !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut digits = s;
    if radix == 0 || radix == 16 {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            digits = hex;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    let radix = radix as u32;
    let mut value = 0.0;
    let mut any = false;
    for d in digits.chars().map_while(|c| c.to_digit(radix)) {
        value = value * f64::from(radix) + f64::from(d);
        any = true;
    }
    if any {
        sign * value
    } else {
        f64::NAN
    }
}

fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    if unsigned.starts_with("Infinity") {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    s[..end].trim_end_matches('.').parse().unwrap_or(f64::NAN)
}

// ══════════════════════════════════════════════════════════════════════════════
// Numbers
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) fn call_number_method(n: f64, name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "toFixed" => {
            let digits = to_integer(&arg(args, 0));
            if !(0.0..=100.0).contains(&digits) {
                return Err(EvalError::Range(
                    "toFixed() digits argument must be between 0 and 100".to_string(),
                ));
            }
            Ok(Value::String(to_fixed(n, digits as usize)))
        }
        "toString" => {
            let radix = match arg(args, 0) {
                Value::Undefined => 10.0,
                other => to_integer(&other),
            };
            if !(2.0..=36.0).contains(&radix) {
                return Err(EvalError::Range(
                    "toString() radix must be between 2 and 36".to_string(),
                ));
            }
            Ok(Value::String(to_radix(n, radix as u32)))
        }
        _ => Err(EvalError::Type(format!("{name} is not a function"))),
    }
}

/// `Number.prototype.toFixed`: exact decimal expansion, ties rounded up.
pub(crate) fn to_fixed(x: f64, digits: usize) -> String {
    if !x.is_finite() || x.abs() >= 1e21 {
        return format_number(x);
    }
    // 1100 places cover every fraction digit an f64 can have.
    let exact = format!("{:.1100}", x.abs());
    let (int_part, frac_part) = exact.split_once('.').unwrap_or((exact.as_str(), ""));
    let mut kept: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().chain(std::iter::repeat(b'0')).take(digits))
        .map(|b| b - b'0')
        .collect();
    let mut int_len = int_part.len();
    if frac_part.as_bytes().get(digits).is_some_and(|b| *b >= b'5') {
        let mut i = kept.len();
        loop {
            if i == 0 {
                kept.insert(0, 1);
                int_len += 1;
                break;
            }
            i -= 1;
            if kept[i] == 9 {
                kept[i] = 0;
            } else {
                kept[i] += 1;
                break;
            }
        }
    }
    let mut out = String::new();
    if x < 0.0 {
        out.push('-');
    }
    for (i, d) in kept.iter().enumerate() {
        if i == int_len {
            out.push('.');
        }
        out.push(char::from(b'0' + d));
    }
    out
}

fn to_radix(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() {
        return format_number(n);
    }
    let base = f64::from(radix);
    let mut int = n.abs().trunc();
    let mut frac = n.abs() - int;
    let mut digits = Vec::new();
    while int >= 1.0 {
        let d = (int % base) as u32;
        digits.push(char::from_digit(d, radix).unwrap_or('0'));
        int = (int / base).trunc();
    }
    if digits.is_empty() {
        digits.push('0');
    }
    digits.reverse();
    let mut out: String = digits.into_iter().collect();
    if frac > 0.0 {
        out.push('.');
        for _ in 0..20 {
            frac *= base;
            let d = frac.trunc();
            out.push(char::from_digit(d as u32, radix).unwrap_or('0'));
            frac -= d;
            if frac == 0.0 {
                break;
            }
        }
    }
    if n < 0.0 {
        out.insert(0, '-');
    }
    out
}

// ══════════════════════════════════════════════════════════════════════════════
// Strings
// ══════════════════════════════════════════════════════════════════════════════

/// Strings are indexed by UTF-16 code unit, as scripts expect.
pub(crate) fn code_units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

pub(crate) fn code_unit_count(s: &str) -> usize {
    s.encode_utf16().count()
}

/// The one-unit string at `i`. A lone surrogate becomes U+FFFD.
pub(crate) fn code_unit_at(units: &[u16], i: usize) -> Option<Value> {
    units
        .get(i)
        .map(|u| Value::String(String::from_utf16_lossy(std::slice::from_ref(u))))
}

pub(crate) fn string_too_long() -> EvalError {
    EvalError::Range("Invalid string length".to_string())
}

/// Append `piece` to `out` unless that would pass the string cap.
pub(crate) fn push_capped(out: &mut String, piece: &str) -> EvalResult<()> {
    if out.len() + piece.len() > MAX_COLLECTION_LENGTH {
        return Err(string_too_long());
    }
    out.push_str(piece);
    Ok(())
}

/// First match of `needle` in `haystack` at or after unit position `from`.
fn unit_find(haystack: &[u16], needle: &str, from: usize) -> Option<usize> {
    let needle = code_units(needle);
    let last = haystack.len().checked_sub(needle.len())?;
    (from..=last).find(|&i| haystack[i..i + needle.len()] == needle[..])
}

fn unit_rfind(haystack: &[u16], needle: &str) -> Option<usize> {
    let needle = code_units(needle);
    let last = haystack.len().checked_sub(needle.len())?;
    (0..=last)
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == needle[..])
}

/// Length of `s` with every `pattern` replaced, or `None` past the cap.
fn replaced_len(s: &str, pattern: &str, replacement: &str, limit: usize) -> Option<usize> {
    let count = s.matches(pattern).take(limit).count();
    let kept = s.len() - count * pattern.len();
    count
        .checked_mul(replacement.len())
        .and_then(|added| added.checked_add(kept))
        .filter(|&total| total <= MAX_COLLECTION_LENGTH)
}

fn pad(s: &str, len: usize, target: &Value, fill: &Value, at_start: bool) -> String {
    let target = to_integer(target);
    let fill = match fill {
        Value::Undefined => " ".to_string(),
        other => other.to_js_string(),
    };
    if target <= len as f64 || fill.is_empty() {
        return s.to_string();
    }
    let padding: Vec<u16> = fill
        .encode_utf16()
        .cycle()
        .take(target as usize - len)
        .collect();
    let padding = String::from_utf16_lossy(&padding);
    if at_start {
        padding + s
    } else {
        format!("{s}{padding}")
    }
}

pub(crate) fn call_string_method(s: &str, name: &str, args: &[Value]) -> EvalResult<Value> {
    let units = code_units(s);
    let len = units.len();
    let substring = |from: usize, to: usize| -> Value {
        Value::String(String::from_utf16_lossy(&units[from..to.max(from)]))
    };
    let value = match name {
        "includes" => {
            let from = clamped_index(&arg(args, 1), len, 0);
            Value::Bool(unit_find(&units, &arg(args, 0).to_js_string(), from).is_some())
        }
        "startsWith" => {
            let from = clamped_index(&arg(args, 1), len, 0);
            Value::Bool(units[from..].starts_with(&code_units(&arg(args, 0).to_js_string())))
        }
        "endsWith" => {
            let to = clamped_index(&arg(args, 1), len, len);
            Value::Bool(units[..to].ends_with(&code_units(&arg(args, 0).to_js_string())))
        }
        "indexOf" => {
            let from = clamped_index(&arg(args, 1), len, 0);
            let found = unit_find(&units, &arg(args, 0).to_js_string(), from);
            Value::Number(found.map_or(-1.0, |i| i as f64))
        }
        "lastIndexOf" => {
            let found = unit_rfind(&units, &arg(args, 0).to_js_string());
            Value::Number(found.map_or(-1.0, |i| i as f64))
        }
        "slice" => substring(
            relative_index(&arg(args, 0), len, 0),
            relative_index(&arg(args, 1), len, len),
        ),
        "substring" => {
            let a = clamped_index(&arg(args, 0), len, 0);
            let b = clamped_index(&arg(args, 1), len, len);
            substring(a.min(b), a.max(b))
        }
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "trimStart" => Value::from(s.trim_start()),
        "trimEnd" => Value::from(s.trim_end()),
        "split" => {
            let limit = match arg(args, 1) {
                Value::Undefined => usize::MAX,
                other => to_integer(&other).max(0.0) as usize,
            };
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Undefined => vec![Value::from(s)],
                separator => {
                    let separator = separator.to_js_string();
                    if separator.is_empty() {
                        (0..len).filter_map(|i| code_unit_at(&units, i)).collect()
                    } else {
                        s.split(separator.as_str()).map(Value::from).collect()
                    }
                }
            };
            Value::array(parts.into_iter().take(limit).collect())
        }
        "replace" | "replaceAll" => {
            let pattern = arg(args, 0).to_js_string();
            let replacement = arg(args, 1).to_js_string();
            let limit = if name == "replace" { 1 } else { usize::MAX };
            if replaced_len(s, &pattern, &replacement, limit).is_none() {
                return Err(string_too_long());
            }
            Value::String(s.replacen(&pattern, &replacement, limit))
        }
        "charAt" => {
            let i = to_integer(&arg(args, 0));
            match code_unit_at(&units, i as usize) {
                Some(unit) if i >= 0.0 => unit,
                _ => Value::from(""),
            }
        }
        "charCodeAt" => {
            let i = to_integer(&arg(args, 0));
            match units.get(i as usize) {
                Some(u) if i >= 0.0 => Value::Number(f64::from(*u)),
                _ => Value::Number(f64::NAN),
            }
        }
        "at" => {
            let n = to_integer(&arg(args, 0));
            let i = if n < 0.0 { len as f64 + n } else { n };
            match code_unit_at(&units, i as usize) {
                Some(unit) if i >= 0.0 => unit,
                _ => Value::Undefined,
            }
        }
        "padStart" | "padEnd" => {
            let target = arg(args, 0);
            if to_integer(&target) > MAX_COLLECTION_LENGTH as f64 {
                return Err(string_too_long());
            }
            Value::String(pad(s, len, &target, &arg(args, 1), name == "padStart"))
        }
        "repeat" => {
            let count = to_integer(&arg(args, 0));
            if count < 0.0 || count.is_infinite() {
                return Err(EvalError::Range(format!(
                    "Invalid count value: {}",
                    format_number(count)
                )));
            }
            if count * s.len() as f64 > MAX_COLLECTION_LENGTH as f64 {
                return Err(string_too_long());
            }
            Value::String(s.repeat(count as usize))
        }
        "concat" => {
            let mut out = s.to_string();
            for a in args {
                push_capped(&mut out, &a.to_js_string())?;
            }
            Value::String(out)
        }
        "toString" => Value::from(s),
        _ => return Err(EvalError::Type(format!("{name} is not a function"))),
    };
    Ok(value)
}

// ══════════════════════════════════════════════════════════════════════════════
// Host built-ins and array methods (need the evaluator for callbacks)
// ══════════════════════════════════════════════════════════════════════════════

/// `SameValueZero`, used by `includes`.
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

/// Own `(key, value)` pairs of an object-like value.
pub(crate) fn own_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::String(s) => {
            let units = code_units(s);
            (0..units.len())
                .filter_map(|i| code_unit_at(&units, i).map(|unit| (i.to_string(), unit)))
                .collect()
        }
        _ => Vec::new(),
    }
}

fn require_object(value: &Value) -> EvalResult<()> {
    if value.is_nullish() {
        Err(EvalError::Type(
            "Cannot convert undefined or null to object".to_string(),
        ))
    } else {
        Ok(())
    }
}

fn math_unary(args: &[Value], f: fn(f64) -> f64) -> Value {
    Value::Number(f(arg(args, 0).to_number()))
}

/// `Math.round`: halves round toward +∞.
fn js_round(x: f64) -> f64 {
    let floor = x.floor();
    if x - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

fn js_sign(x: f64) -> f64 {
    if x.is_nan() || x == 0.0 {
        x
    } else {
        x.signum()
    }
}

fn js_pow(base: f64, exp: f64) -> f64 {
    if exp.is_nan() || (base.abs() == 1.0 && exp.is_infinite()) {
        f64::NAN
    } else {
        base.powf(exp)
    }
}

impl Evaluator<'_> {
    /// Read a property of `JSON`, `Math`, `Object`, `Array` or `console`.
    pub(crate) fn builtin_property(&self, host: HostObject, key: &str) -> Value {
        if host.methods().contains(&key) {
            return Value::method(&Value::Host(host), key);
        }
        match (host, key) {
            (HostObject::Math, "PI") => Value::Number(std::f64::consts::PI),
            (HostObject::Math, "E") => Value::Number(std::f64::consts::E),
            _ => Value::Undefined,
        }
    }

    pub(crate) fn call_builtin(
        &mut self,
        host: HostObject,
        name: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        let a = |i: usize| arg(&args, i);
        let value = match (host, name) {
            (HostObject::Json, "parse") => {
                let text = a(0).to_js_string();
                let json: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|e| EvalError::Syntax(format!("JSON.parse: {e}")))?;
                Value::from(&json)
            }
            (HostObject::Json, "stringify") => {
                let indent = match a(2) {
                    Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
                    Value::String(s) => s.chars().take(10).collect(),
                    _ => String::new(),
                };
                a(0).stringify(&indent)?
                    .map(Value::String)
                    .unwrap_or(Value::Undefined)
            }
            (HostObject::Math, "abs") => math_unary(&args, f64::abs),
            (HostObject::Math, "floor") => math_unary(&args, f64::floor),
            (HostObject::Math, "ceil") => math_unary(&args, f64::ceil),
            (HostObject::Math, "round") => math_unary(&args, js_round),
            (HostObject::Math, "sqrt") => math_unary(&args, f64::sqrt),
            (HostObject::Math, "trunc") => math_unary(&args, f64::trunc),
            (HostObject::Math, "sign") => math_unary(&args, js_sign),
            (HostObject::Math, "pow") => Value::Number(js_pow(a(0).to_number(), a(1).to_number())),
            (HostObject::Math, "max" | "min") => {
                let is_max = name == "max";
                let mut acc = if is_max {
                    f64::NEG_INFINITY
                } else {
                    f64::INFINITY
                };
                for n in args.iter().map(Value::to_number) {
                    if n.is_nan() {
                        acc = f64::NAN;
                        break;
                    }
                    acc = if is_max { acc.max(n) } else { acc.min(n) };
                }
                Value::Number(acc)
            }
            (HostObject::Object, "keys") => {
                let target = a(0);
                require_object(&target)?;
                Value::array(target.own_keys().into_iter().map(Value::String).collect())
            }
            (HostObject::Object, "values") => {
                let target = a(0);
                require_object(&target)?;
                Value::array(own_entries(&target).into_iter().map(|(_, v)| v).collect())
            }
            (HostObject::Object, "entries") => {
                let target = a(0);
                require_object(&target)?;
                Value::array(
                    own_entries(&target)
                        .into_iter()
                        .map(|(k, v)| Value::array(vec![Value::String(k), v]))
                        .collect(),
                )
            }
            (HostObject::Object, "assign") => {
                let target = a(0);
                require_object(&target)?;
                for source in args.iter().skip(1) {
                    for (key, value) in own_entries(source) {
                        self.set_property(&target, &key, value)?;
                    }
                }
                target
            }
            (HostObject::Array, "isArray") => Value::Bool(matches!(a(0), Value::Array(_))),
            (HostObject::Console, level) => {
                self.console(level, &args);
                Value::Undefined
            }
            _ => {
                return Err(EvalError::Type(format!(
                    "{}.{name} is not a function",
                    host.path()
                )))
            }
        };
        Ok(value)
    }

    fn console(&mut self, level: &str, args: &[Value]) {
        let level = match level {
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Log,
        };
        let message = args
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                Value::Array(_) | Value::Object(_) => v.describe(),
                other => other.to_js_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        debug!(target: "pmscript::console", ?level, "{message}");
        if self.config().capture_console {
            self.logs.push(LogEntry { level, message });
        }
    }

    /// Call `callback(item, index, array)`.
    fn call_callback(
        &mut self,
        callback: &Value,
        item: Value,
        index: usize,
        this: &Value,
    ) -> EvalResult<Value> {
        match callback {
            Value::Function(f) => {
                self.call_function(f, vec![item, Value::Number(index as f64), this.clone()])
            }
            other => Err(EvalError::Type(format!(
                "{} is not a function",
                other.describe()
            ))),
        }
    }

    pub(crate) fn call_array_method(
        &mut self,
        this: &Value,
        items: &Rc<RefCell<Vec<Value>>>,
        name: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        let a = |i: usize| arg(&args, i);
        let snapshot = || items.borrow().clone();
        let len = items.borrow().len();
        let value = match name {
            "push" => {
                let mut items = items.borrow_mut();
                items.extend(args.iter().cloned());
                Value::Number(items.len() as f64)
            }
            "pop" => items.borrow_mut().pop().unwrap_or(Value::Undefined),
            "shift" => {
                let mut items = items.borrow_mut();
                if items.is_empty() {
                    Value::Undefined
                } else {
                    items.remove(0)
                }
            }
            "unshift" => {
                let mut items = items.borrow_mut();
                items.splice(0..0, args.iter().cloned());
                Value::Number(items.len() as f64)
            }
            "splice" => {
                let start = relative_index(&a(0), len, 0);
                let delete = match a(1) {
                    Value::Undefined if args.len() < 2 => len - start,
                    other => (to_integer(&other).max(0.0) as usize).min(len - start),
                };
                let inserted: Vec<Value> = args.iter().skip(2).cloned().collect();
                let removed: Vec<Value> = items
                    .borrow_mut()
                    .splice(start..start + delete, inserted)
                    .collect();
                Value::array(removed)
            }
            "slice" => {
                let start = relative_index(&a(0), len, 0);
                let end = relative_index(&a(1), len, len).max(start);
                Value::array(items.borrow()[start..end].to_vec())
            }
            "concat" => {
                let mut out = snapshot();
                for extra in &args {
                    let added = match extra {
                        Value::Array(more) => more.borrow().len(),
                        _ => 1,
                    };
                    if out.len() + added > MAX_COLLECTION_LENGTH {
                        return Err(EvalError::Range("Invalid array length".to_string()));
                    }
                    self.charge(added as u64 / 64)?;
                    match extra {
                        Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                        other => out.push(other.clone()),
                    }
                }
                Value::array(out)
            }
            "join" => {
                let separator = match a(0) {
                    Value::Undefined => ",".to_string(),
                    other => other.to_js_string(),
                };
                let mut joined = String::new();
                for (i, item) in snapshot().iter().enumerate() {
                    if i > 0 {
                        push_capped(&mut joined, &separator)?;
                    }
                    if !item.is_nullish() {
                        push_capped(&mut joined, &item.to_js_string())?;
                    }
                }
                self.charge(joined.len() as u64 / 64)?;
                Value::String(joined)
            }
            "indexOf" => {
                let needle = a(0);
                let found = items.borrow().iter().position(|v| v.strict_equals(&needle));
                Value::Number(found.map_or(-1.0, |i| i as f64))
            }
            "includes" => {
                let needle = a(0);
                Value::Bool(items.borrow().iter().any(|v| same_value_zero(v, &needle)))
            }
            "find" | "findIndex" => {
                let callback = a(0);
                let mut found = None;
                for (i, item) in snapshot().into_iter().enumerate() {
                    if self.call_callback(&callback, item.clone(), i, this)?.is_truthy() {
                        found = Some((i, item));
                        break;
                    }
                }
                match (name, found) {
                    ("find", Some((_, item))) => item,
                    ("find", None) => Value::Undefined,
                    (_, Some((i, _))) => Value::Number(i as f64),
                    (_, None) => Value::Number(-1.0),
                }
            }
            "filter" => {
                let callback = a(0);
                let mut kept = Vec::new();
                for (i, item) in snapshot().into_iter().enumerate() {
                    if self.call_callback(&callback, item.clone(), i, this)?.is_truthy() {
                        kept.push(item);
                    }
                }
                Value::array(kept)
            }
            "map" => {
                let callback = a(0);
                let mut mapped = Vec::with_capacity(len);
                for (i, item) in snapshot().into_iter().enumerate() {
                    mapped.push(self.call_callback(&callback, item, i, this)?);
                }
                Value::array(mapped)
            }
            "forEach" => {
                let callback = a(0);
                for (i, item) in snapshot().into_iter().enumerate() {
                    self.call_callback(&callback, item, i, this)?;
                }
                Value::Undefined
            }
            "some" | "every" => {
                let callback = a(0);
                let want = name == "some";
                let mut result = !want;
                for (i, item) in snapshot().into_iter().enumerate() {
                    if self.call_callback(&callback, item, i, this)?.is_truthy() == want {
                        result = want;
                        break;
                    }
                }
                Value::Bool(result)
            }
            "reduce" => {
                let callback = a(0);
                let mut entries = snapshot().into_iter().enumerate();
                let mut acc = if args.len() >= 2 {
                    a(1)
                } else {
                    match entries.next() {
                        Some((_, first)) => first,
                        None => {
                            return Err(EvalError::Type(
                                "Reduce of empty array with no initial value".to_string(),
                            ))
                        }
                    }
                };
                for (i, item) in entries {
                    acc = match &callback {
                        Value::Function(f) => self.call_function(
                            f,
                            vec![acc, item, Value::Number(i as f64), this.clone()],
                        )?,
                        other => {
                            return Err(EvalError::Type(format!(
                                "{} is not a function",
                                other.describe()
                            )))
                        }
                    };
                }
                acc
            }
            "sort" => {
                let sorted = self.sort_values(snapshot(), &a(0))?;
                *items.borrow_mut() = sorted;
                this.clone()
            }
            "reverse" => {
                items.borrow_mut().reverse();
                this.clone()
            }
            "flat" => {
                let mut out = Vec::with_capacity(len);
                for item in snapshot() {
                    match item {
                        Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                }
                Value::array(out)
            }
            "at" => {
                let n = to_integer(&a(0));
                let i = if n < 0.0 { len as f64 + n } else { n };
                if i < 0.0 {
                    Value::Undefined
                } else {
                    items.borrow().get(i as usize).cloned().unwrap_or(Value::Undefined)
                }
            }
            "toString" => Value::String(this.to_js_string()),
            _ => return Err(EvalError::Type(format!("{name} is not a function"))),
        };
        Ok(value)
    }

    /// Stable merge sort with an optional comparator; `undefined` sorts last.
    fn sort_values(&mut self, values: Vec<Value>, comparator: &Value) -> EvalResult<Vec<Value>> {
        if values.len() <= 1 {
            return Ok(values);
        }
        let mut left = values;
        let right = left.split_off(left.len() / 2);
        let left = self.sort_values(left, comparator)?;
        let right = self.sort_values(right, comparator)?;

        let mut merged = Vec::with_capacity(left.len() + right.len());
        let mut right = right.into_iter().peekable();
        for l in left {
            while let Some(r) = right.peek() {
                if self.compare(r, &l, comparator)? != Ordering::Less {
                    break;
                }
                if let Some(r) = right.next() {
                    merged.push(r);
                }
            }
            merged.push(l);
        }
        merged.extend(right);
        Ok(merged)
    }

    fn compare(&mut self, x: &Value, y: &Value, comparator: &Value) -> EvalResult<Ordering> {
        match (x, y) {
            (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
            (Value::Undefined, _) => return Ok(Ordering::Greater),
            (_, Value::Undefined) => return Ok(Ordering::Less),
            _ => {}
        }
        match comparator {
            Value::Function(f) => {
                let n = self.call_function(f, vec![x.clone(), y.clone()])?.to_number();
                Ok(if n < 0.0 {
                    Ordering::Less
                } else if n > 0.0 {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                })
            }
            _ => Ok(x.to_js_string().cmp(&y.to_js_string())),
        }
    }
}

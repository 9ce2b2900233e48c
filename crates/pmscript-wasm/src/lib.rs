//! pmscript test runner as a WASM module for browser environments.
//!
//! This crate exposes the sandbox via `wasm-bindgen`, suitable for running
//! response tests in a Web Worker after each request completes.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { run_tests } from 'pmscript-wasm';
//!
//! await init();
//!
//! const exchange = { statusCode: 200, statusText: "OK", headers: {}, body: { ok: true } };
//! const result = run_tests(
//!   "pm.test('ok', () => pm.expect(pm.response.json().ok).to.be.ok())",
//!   JSON.stringify(exchange),
//!   JSON.stringify({ baseUrl: "https://api.test" }),
//! );
//! console.log(JSON.parse(result));
//! // { testResults: [{ name: "ok", passed: true }], updatedVariables: { baseUrl: "..." } }
//! ```

use pmscript_eval::{Exchange, RunOutcome, RunnerConfig, Sandbox, VariableStore};
use pmscript_parser::parse_script;
use pmscript_types::{Diagnostics, ScriptSource};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Error payload returned instead of a result when an input is malformed.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_json(message: impl Into<String>) -> String {
    to_json(&ErrorResponse {
        error: message.into(),
    })
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        format!(
            r#"{{"error":"Serialization error: {}"}}"#,
            e.to_string().replace('"', "'")
        )
    })
}

/// Parse the variables argument. Blank input means no variables.
fn parse_variables(variables_json: &str) -> Result<VariableStore, String> {
    if variables_json.trim().is_empty() {
        return Ok(VariableStore::new());
    }
    serde_json::from_str(variables_json).map_err(|e| format!("invalid variables: {e}"))
}

fn parse_exchange(exchange_json: &str) -> Result<Exchange, String> {
    serde_json::from_str(exchange_json).map_err(|e| format!("invalid exchange: {e}"))
}

fn run_with(
    sandbox: &Sandbox,
    script: &str,
    exchange_json: &str,
    variables_json: &str,
) -> Result<RunOutcome, String> {
    let exchange = parse_exchange(exchange_json)?;
    let variables = parse_variables(variables_json)?;
    Ok(sandbox.run(script, &exchange, variables))
}

/// Run a test script against a completed exchange.
///
/// `exchange_json` is an `Exchange`:
/// ```json
/// { "statusCode": 200, "statusText": "OK", "headers": { "Content-Type": "application/json" }, "body": { "id": 1 } }
/// ```
/// A string `body` is raw text; any other JSON value is a parsed body.
/// `variables_json` is a flat string-to-string object (blank for none).
///
/// Returns a JSON `RunOutcome`, or `{"error": "..."}` when an argument does
/// not parse. Script problems never produce an error object; they are
/// reported as failed results.
#[wasm_bindgen]
pub fn run_tests(script: &str, exchange_json: &str, variables_json: &str) -> String {
    match run_with(&Sandbox::default(), script, exchange_json, variables_json) {
        Ok(outcome) => to_json(&outcome),
        Err(message) => error_json(message),
    }
}

/// [`run_tests`] with a `RunnerConfig`, e.g. `{"stepBudget": 50000}`.
/// Missing fields take their defaults.
#[wasm_bindgen]
pub fn run_tests_with_config(
    script: &str,
    exchange_json: &str,
    variables_json: &str,
    config_json: &str,
) -> String {
    let config = match RunnerConfig::from_json(config_json) {
        Ok(config) => config,
        Err(e) => return error_json(format!("invalid config: {e}")),
    };
    match run_with(&Sandbox::new(config), script, exchange_json, variables_json) {
        Ok(outcome) => to_json(&outcome),
        Err(message) => error_json(message),
    }
}

/// [`run_tests`] taking and returning JavaScript objects instead of JSON
/// text.
#[wasm_bindgen(js_name = runTestsValue)]
pub fn run_tests_value(
    script: &str,
    exchange: JsValue,
    variables: JsValue,
) -> Result<JsValue, JsValue> {
    let exchange: Exchange = serde_wasm_bindgen::from_value(exchange)
        .map_err(|e| JsValue::from_str(&format!("invalid exchange: {e}")))?;
    let variables: VariableStore = if variables.is_undefined() || variables.is_null() {
        VariableStore::new()
    } else {
        serde_wasm_bindgen::from_value(variables)
            .map_err(|e| JsValue::from_str(&format!("invalid variables: {e}")))?
    };
    let outcome = Sandbox::default().run(script, &exchange, variables);
    serde_wasm_bindgen::to_value(&outcome).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Check a script for syntax errors without running it.
///
/// Returns a JSON `Diagnostics` object; `total_errors` is `0` for a valid
/// script. Suitable for editor integration.
#[wasm_bindgen]
pub fn check_script(script: &str) -> String {
    let source = ScriptSource::new("test-script", script);
    let diagnostics = parse_script(&source).err().unwrap_or_else(Diagnostics::empty);
    to_json(&diagnostics)
}

/// Replace `{{name}}` placeholders in `text`; unknown names stay as written.
#[wasm_bindgen]
pub fn replace_variables(text: &str, variables_json: &str) -> String {
    match parse_variables(variables_json) {
        Ok(variables) => pmscript_eval::replace_variables(text, &variables),
        Err(_) => text.to_string(),
    }
}

/// Return the engine version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

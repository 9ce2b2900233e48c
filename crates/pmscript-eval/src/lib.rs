//! pmscript tree-walking evaluator.
//!
//! Runs a Postman-style test script against one completed HTTP exchange and
//! a snapshot of environment variables, collecting `pm.test` results.
//!
//! ```
//! use pmscript_eval::{run_tests, Exchange, VariableStore};
//!
//! let exchange = Exchange::json(200, "OK", serde_json::json!({ "ok": true }));
//! let outcome = run_tests(
//!     "pm.test('ok', () => pm.expect(pm.response.json().ok).to.be.ok())",
//!     &exchange,
//!     VariableStore::new(),
//! );
//! assert!(outcome.test_results[0].passed);
//! ```

mod builtins;
pub mod config;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod exchange;
pub mod expect;
mod facade;
pub mod test_runner;
pub mod value;
pub mod variables;

pub use config::RunnerConfig;
pub use error::{EvalError, EvalResult};
pub use evaluator::Evaluator;
pub use exchange::{Exchange, Headers, ResponseBody};
pub use expect::Expectation;
pub use test_runner::{
    run_tests, LogEntry, LogLevel, RunOutcome, RunSummary, Sandbox, TestResult, SCRIPT_RESULT_NAME,
};
pub use value::{format_number, ErrorKind, HostObject, Value};
pub use variables::{
    replace_variables, test_script, Environment, EnvironmentValue, EventScript, ScriptEvent,
    VariableError, VariableStore,
};

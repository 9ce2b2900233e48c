//! pmscript test runner: executes a test script against one exchange and
//! collects the `pm.test` results.
//!
//! Every problem a script can have ends up in the returned [`RunOutcome`].
//! Failures inside a `pm.test` body fail that test; anything that escapes
//! (syntax errors, uncaught throws, an exhausted step budget) is reported as
//! one extra failed result named [`SCRIPT_RESULT_NAME`].

use std::any::Any;
use std::fmt;

use pmscript_parser::parse_script;
use pmscript_types::ScriptSource;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::evaluator::Evaluator;
use crate::exchange::Exchange;
use crate::variables::VariableStore;

/// Name of the synthetic result recorded when a script fails outside
/// `pm.test`.
pub const SCRIPT_RESULT_NAME: &str = "Test Script Execution";

/// File name used in syntax diagnostics.
const SCRIPT_FILE: &str = "test-script";

/// Stack reserved for the worker thread that runs a script. Nested script
/// calls recurse on the native stack, so `max_call_depth` must fit in here.
const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Result of one `pm.test` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// The name passed to `pm.test`.
    pub name: String,
    pub passed: bool,
    /// The failure message, the equivalent of `error.message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            error: None,
        }
    }

    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error.into()),
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            write!(f, "  ✓ {}", self.name)
        } else {
            write!(
                f,
                "  ✗ {}: {}",
                self.name,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// Console method a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

/// One captured `console.*` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Everything a script run produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    /// Results in the order the tests were registered.
    pub test_results: Vec<TestResult>,
    /// The variables after the run, including writes made before a failure.
    pub updated_variables: VariableStore,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
}

impl RunOutcome {
    /// An outcome for a script that never started.
    fn aborted(message: &str, variables: VariableStore) -> Self {
        Self {
            test_results: vec![script_failure(message)],
            updated_variables: variables,
            logs: Vec::new(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.test_results.iter().all(|r| r.passed)
    }

    pub fn summary(&self) -> RunSummary {
        let passed = self.test_results.iter().filter(|r| r.passed).count();
        RunSummary {
            results: self.test_results.clone(),
            passed,
            failed: self.test_results.len() - passed,
            total: self.test_results.len(),
        }
    }
}

/// Pass/fail counts of a run, printable as a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.results {
            writeln!(f, "{r}")?;
        }
        writeln!(f, "\n{} passed, {} failed", self.passed, self.failed)
    }
}

fn script_failure(message: &str) -> TestResult {
    TestResult::fail(SCRIPT_RESULT_NAME, format!("Global script error: {message}"))
}

/// Runs test scripts under a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    config: RunnerConfig,
}

impl Sandbox {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `script` against `exchange`, starting from `variables`.
    ///
    /// Never fails: script problems are reported in the outcome.
    pub fn run(&self, script: &str, exchange: &Exchange, variables: VariableStore) -> RunOutcome {
        let fallback = variables.clone();
        std::thread::scope(|s| {
            let worker = std::thread::Builder::new()
                .name("pmscript-sandbox".to_string())
                .stack_size(WORKER_STACK_SIZE)
                .spawn_scoped(s, || self.execute(script, exchange, variables));
            match worker {
                Ok(handle) => handle.join().unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    warn!(%message, "script worker panicked");
                    RunOutcome::aborted(&format!("internal error: {message}"), fallback)
                }),
                // No threads on this target: run on the caller's stack.
                Err(e) => {
                    debug!(error = %e, "running script inline");
                    self.execute(script, exchange, fallback)
                }
            }
        })
    }

    fn execute(&self, script: &str, exchange: &Exchange, variables: VariableStore) -> RunOutcome {
        let source = ScriptSource::new(SCRIPT_FILE, script);
        let program = match parse_script(&source) {
            Ok(program) => program,
            Err(diagnostics) => {
                let message = diagnostics
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "invalid script".to_string());
                warn!(errors = diagnostics.total_errors, %message, "script failed to parse");
                return RunOutcome::aborted(&message, variables);
            }
        };

        let mut evaluator = Evaluator::new(exchange, variables, self.config.clone());
        let result = evaluator.run(&program);
        let steps = evaluator.steps();
        let mut outcome = evaluator.into_outcome();
        if let Err(e) = result {
            warn!(error = %e, "script failed outside pm.test");
            outcome.test_results.push(script_failure(&e.message()));
        }
        info!(
            tests = outcome.test_results.len(),
            passed = outcome.all_passed(),
            steps,
            "script finished"
        );
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a test script with the default configuration.
pub fn run_tests(script: &str, exchange: &Exchange, variables: VariableStore) -> RunOutcome {
    Sandbox::default().run(script, exchange, variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_display() {
        assert_eq!(TestResult::pass("status ok").to_string(), "  ✓ status ok");
        assert_eq!(
            TestResult::fail("body", "expected 1 to equal 2").to_string(),
            "  ✗ body: expected 1 to equal 2"
        );
    }

    #[test]
    fn result_json_shape() {
        let json = serde_json::to_value(TestResult::pass("a")).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "a", "passed": true }));
        let json = serde_json::to_value(TestResult::fail("b", "boom")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": "b", "passed": false, "error": "boom" })
        );
    }

    #[test]
    fn outcome_json_uses_camel_case() {
        let outcome = RunOutcome {
            test_results: vec![TestResult::pass("a")],
            updated_variables: [("k", "v")].into_iter().collect(),
            logs: Vec::new(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "testResults": [{ "name": "a", "passed": true }],
                "updatedVariables": { "k": "v" }
            })
        );
    }

    #[test]
    fn summary_counts_and_report() {
        let outcome = RunOutcome {
            test_results: vec![TestResult::pass("a"), TestResult::fail("b", "nope")],
            ..RunOutcome::default()
        };
        let summary = outcome.summary();
        assert_eq!((summary.passed, summary.failed, summary.total), (1, 1, 2));
        assert!(!outcome.all_passed());
        assert_eq!(summary.to_string(), "  ✓ a\n  ✗ b: nope\n\n1 passed, 1 failed\n");
    }

    #[test]
    fn syntax_error_is_a_global_failure() {
        let exchange = Exchange::text(200, "OK", "");
        let vars: VariableStore = [("keep", "me")].into_iter().collect();
        let outcome = run_tests("pm.test('x', () => {", &exchange, vars.clone());
        assert_eq!(outcome.test_results.len(), 1);
        let result = &outcome.test_results[0];
        assert_eq!(result.name, SCRIPT_RESULT_NAME);
        assert!(!result.passed);
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .starts_with("Global script error: "));
        assert_eq!(outcome.updated_variables, vars);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}

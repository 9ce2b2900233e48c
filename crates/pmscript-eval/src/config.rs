//! Runner configuration.

use serde::{Deserialize, Serialize};

/// Resource limits and behaviour switches for one script run.
///
/// Missing fields take their defaults when deserialized:
///
/// ```
/// use pmscript_eval::RunnerConfig;
///
/// let config = RunnerConfig::from_json(r#"{ "stepBudget": 500 }"#).unwrap();
/// assert_eq!(config.step_budget, 500);
/// assert_eq!(config.max_call_depth, RunnerConfig::default().max_call_depth);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    /// Expressions and statements a script may evaluate before it is aborted.
    pub step_budget: u64,
    /// Deepest function call nesting before `RangeError`.
    pub max_call_depth: usize,
    /// Record `console.*` output in [`RunOutcome::logs`](crate::RunOutcome).
    pub capture_console: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            step_budget: 1_000_000,
            max_call_depth: 64,
            capture_console: true,
        }
    }
}

impl RunnerConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        assert_eq!(RunnerConfig::from_json("{}").unwrap(), RunnerConfig::default());
    }

    #[test]
    fn fields_are_camel_case() {
        let config =
            RunnerConfig::from_json(r#"{"maxCallDepth": 8, "captureConsole": false}"#).unwrap();
        assert_eq!(config.max_call_depth, 8);
        assert!(!config.capture_console);
        assert_eq!(config.step_budget, 1_000_000);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(RunnerConfig::from_json(r#"{"stepBudget": "lots"}"#).is_err());
    }
}

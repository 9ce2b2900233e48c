//! Environment variables: the per-run store, `{{name}}` substitution, and
//! the saved-environment model the store is drawn from.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Error from an invalid variable operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariableError {
    #[error("variable key must be a non-empty string")]
    EmptyKey,
}

/// The string-to-string variable map a script reads and writes through
/// `pm.environment`.
///
/// Keys are never empty, including when deserialized. The sandbox takes a
/// store by value and hands back the updated copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct VariableStore(BTreeMap<String, String>);

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), VariableError> {
        let key = key.into();
        if key.is_empty() {
            return Err(VariableError::EmptyKey);
        }
        self.0.insert(key, value.into());
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableStore {
    /// Collect pairs, skipping empty keys.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = VariableStore::new();
        for (k, v) in iter {
            let _ = store.set(k, v);
        }
        store
    }
}

impl From<BTreeMap<String, String>> for VariableStore {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<VariableStore> for BTreeMap<String, String> {
    fn from(store: VariableStore) -> Self {
        store.0
    }
}

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("placeholder pattern is valid"));

/// Replace every `{{name}}` with the variable's value.
///
/// Placeholders naming an unknown variable are left as written. The name is
/// taken literally, so `{{ name }}` looks up `" name "`.
pub fn replace_variables(text: &str, variables: &VariableStore) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| match variables.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

// ══════════════════════════════════════════════════════════════════════════════
// Saved environments
// ══════════════════════════════════════════════════════════════════════════════

/// A named set of variables, as saved by the workbench.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub values: Vec<EnvironmentValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentValue {
    pub key: String,
    pub value: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl Environment {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// The variables a run sees: enabled entries with a non-empty key.
    pub fn active_variables(&self) -> VariableStore {
        self.values
            .iter()
            .filter(|v| v.enabled && !v.key.is_empty())
            .map(|v| (v.key.clone(), v.value.clone()))
            .collect()
    }

    /// Fold a run's updated variables back in.
    ///
    /// Changed values are overwritten in place, unknown keys are appended as
    /// enabled entries. Nothing is removed.
    pub fn merge(&mut self, updated: &VariableStore) {
        for (key, value) in updated.iter() {
            match self.values.iter_mut().find(|v| v.key == key) {
                Some(entry) => {
                    if entry.value != value {
                        entry.value = value.to_string();
                    }
                }
                None => self.values.push(EnvironmentValue {
                    key: key.to_string(),
                    value: value.to_string(),
                    enabled: true,
                }),
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Collection event scripts
// ══════════════════════════════════════════════════════════════════════════════

/// A script attached to a collection item, e.g. `{"listen": "test", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEvent {
    pub listen: String,
    pub script: EventScript,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventScript {
    #[serde(default)]
    pub exec: Vec<String>,
}

/// The source of the first `test` event, lines joined with `\n`.
pub fn test_script(events: &[ScriptEvent]) -> String {
    events
        .iter()
        .find(|e| e.listen == "test")
        .map(|e| e.script.exec.join("\n"))
        .unwrap_or_default()
}

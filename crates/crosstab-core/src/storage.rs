//! Per-guest key/value bridge fed by the host.

use std::collections::HashMap;

use serde_json::Value;

/// Key/value store filled from host-pushed storage data.
///
/// Values are kept in their string representation. Last write for a key
/// wins; nothing expires.
#[derive(Debug, Clone, Default)]
pub struct TabStorage {
    items: HashMap<String, String>,
}

impl TabStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`, coercing it to its string representation.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.items.insert(key.into(), stringify(value.into()));
    }

    /// Get the stored representation for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    /// Copy of every stored item.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.items.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Write every pair found in a decoded storage-data body.
    ///
    /// Accepts a single `{"key": .., "value": ..}` object, an array of such
    /// objects, or a plain object mapping keys to values. An object is a pair
    /// only when it has exactly the `key` and `value` fields; `{"key": "x"}`
    /// is a mapping that stores `"x"` under `key`. Returns the number of
    /// pairs written.
    pub fn apply(&mut self, body: &Value) -> usize {
        match body {
            Value::Array(entries) => entries.iter().map(|e| self.apply_pair(e)).sum(),
            Value::Object(obj) if is_pair(obj) => self.apply_pair(body),
            Value::Object(obj) => {
                for (key, value) in obj {
                    self.set(key.clone(), value.clone());
                }
                obj.len()
            }
            other => {
                tracing::debug!("Ignoring storage data that is not a mapping: {other}");
                0
            }
        }
    }

    fn apply_pair(&mut self, entry: &Value) -> usize {
        let Some(obj) = entry.as_object().filter(|o| is_pair(o)) else {
            tracing::debug!("Ignoring malformed storage entry: {entry}");
            return 0;
        };
        let key = match &obj["key"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.set(key, obj["value"].clone());
        1
    }
}

fn is_pair(obj: &serde_json::Map<String, Value>) -> bool {
    obj.len() == 2 && obj.contains_key("key") && obj.contains_key("value")
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use strand_core::types::{input_key, is_reserved_key, value_to_text};

/// Shared run state: step outputs keyed by step id, plus reserved keys
/// holding user input.
///
/// Owned by the runner for the whole run; step executors only ever see a
/// shared borrow for the duration of one invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    data: HashMap<String, serde_json::Value>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed state with user inputs, each stored under its step's input key.
    /// Keys that are already reserved (e.g. `__delegate_message__`) are kept
    /// as given.
    pub fn with_inputs(inputs: HashMap<String, serde_json::Value>) -> Self {
        let data = inputs
            .into_iter()
            .map(|(key, value)| {
                if is_reserved_key(&key) {
                    (key, value)
                } else {
                    (input_key(&key), value)
                }
            })
            .collect();
        Self { data }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Text form of a value (strings verbatim, other JSON compact).
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.data.get(key).map(value_to_text)
    }

    /// Follow a dotted path (`key.field.sub`) into nested JSON objects.
    pub fn lookup(&self, path: &str) -> Option<&serde_json::Value> {
        let mut segments = path.split('.');
        let mut current = self.data.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Set a string value.
    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    /// Non-reserved keys, sorted.
    pub fn output_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .data
            .keys()
            .map(|k| k.as_str())
            .filter(|k| !is_reserved_key(k))
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Snapshot without reserved keys.
    pub fn outputs(&self) -> HashMap<String, serde_json::Value> {
        self.data
            .iter()
            .filter(|(k, _)| !is_reserved_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Get the underlying data map.
    pub fn data(&self) -> &HashMap<String, serde_json::Value> {
        &self.data
    }
}

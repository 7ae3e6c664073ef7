//! Fixture parameters - mutable via the serial protocol
//!
//! Stored as a flat JSON object; `last_modified` is rewritten on every save.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding the date of the last save
pub const LAST_MODIFIED_KEY: &str = "last_modified";

/// Free-form key/value parameter store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureParams {
    values: Map<String, Value>,
}

impl FixtureParams {
    /// Create an empty parameter store.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Date of the last save, if the file carried one
    pub fn last_modified(&self) -> Option<&str> {
        self.values.get(LAST_MODIFIED_KEY).and_then(Value::as_str)
    }

    /// Record the save date.
    pub fn stamp(&mut self, date: impl Into<String>) {
        self.values
            .insert(LAST_MODIFIED_KEY.to_string(), Value::String(date.into()));
    }

    /// Parse from JSON string.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

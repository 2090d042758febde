//! Structured payload attached to audit rows
//!
//! Details are a flat map of named primitive values (or lists of them),
//! serialized to JSON text. Keys that look like credentials are redacted
//! before anything is written.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub const REDACTED: &str = "***REDACTED***";

const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "password",
    "passwd",
    "token",
    "secret",
    "api_key",
    "apikey",
    "private_key",
    "session_id",
    "mfa",
    "backup_code",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<DetailValue>),
}

impl DetailValue {
    /// Replace values JSON cannot represent (NaN, infinities) with their text form
    fn sanitized(self) -> Self {
        match self {
            DetailValue::Float(f) if !f.is_finite() => DetailValue::Text(f.to_string()),
            DetailValue::List(items) => {
                DetailValue::List(items.into_iter().map(DetailValue::sanitized).collect())
            }
            other => other,
        }
    }
}

impl From<&str> for DetailValue {
    fn from(value: &str) -> Self {
        DetailValue::Text(value.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(value: String) -> Self {
        DetailValue::Text(value)
    }
}

impl From<bool> for DetailValue {
    fn from(value: bool) -> Self {
        DetailValue::Bool(value)
    }
}

impl From<i64> for DetailValue {
    fn from(value: i64) -> Self {
        DetailValue::Int(value)
    }
}

impl From<i32> for DetailValue {
    fn from(value: i32) -> Self {
        DetailValue::Int(i64::from(value))
    }
}

impl From<u32> for DetailValue {
    fn from(value: u32) -> Self {
        DetailValue::Int(i64::from(value))
    }
}

impl From<f64> for DetailValue {
    fn from(value: f64) -> Self {
        DetailValue::Float(value)
    }
}

impl<T: Into<DetailValue>> From<Option<T>> for DetailValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(DetailValue::Null, Into::into)
    }
}

impl<T: Into<DetailValue>> From<Vec<T>> for DetailValue {
    fn from(values: Vec<T>) -> Self {
        DetailValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<JsonValue> for DetailValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => DetailValue::Null,
            JsonValue::Bool(b) => DetailValue::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => DetailValue::Int(i),
                None => n
                    .as_f64()
                    .map_or_else(|| DetailValue::Text(n.to_string()), DetailValue::Float),
            },
            JsonValue::String(s) => DetailValue::Text(s),
            JsonValue::Array(items) => {
                DetailValue::List(items.into_iter().map(DetailValue::from).collect())
            }
            // Nested objects are kept as their JSON text
            object @ JsonValue::Object(_) => DetailValue::Text(object.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditDetails(BTreeMap<String, DetailValue>);

impl AuditDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<DetailValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<DetailValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&DetailValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert a loosely-typed JSON payload
    ///
    /// Objects become one entry per field; any other value is stored under
    /// the `value` key.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(fields) => Self(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, DetailValue::from(value)))
                    .collect(),
            ),
            other => Self::new().with("value", other),
        }
    }

    /// Copy with credential-like keys masked and non-finite numbers stringified
    pub fn redacted(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|(key, value)| {
                    let value = if is_sensitive_key(key) {
                        DetailValue::Text(REDACTED.to_string())
                    } else {
                        value.clone().sanitized()
                    };
                    (key.clone(), value)
                })
                .collect(),
        )
    }

    /// JSON text as stored in the `details` column
    pub fn to_storage_string(&self) -> String {
        let redacted = self.redacted();
        serde_json::to_string(&redacted).unwrap_or_else(|_| format!("{:?}", redacted.0))
    }
}

impl From<JsonValue> for AuditDetails {
    fn from(value: JsonValue) -> Self {
        Self::from_json(value)
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| key.contains(fragment))
}

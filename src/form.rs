//! Session-scoped form data store.
//!
//! [`FormData`] holds the last committed value for every parameter the user
//! has visited. It is the single source of truth: cached pages re-sync their
//! field values from here on every entry, never the other way around.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A committed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Free-form text.
    Text(String),
    /// Boolean or switch state.
    Bool(bool),
    /// Numeric input.
    Number(f64),
    /// Multi-select: the canonical set of selected string values.
    List(Vec<String>),
    /// Sensitive text. Never serialized into payloads; masked in Debug.
    Secret(SecretValue),
}

impl Value {
    /// Render the value for binding into a script invocation.
    ///
    /// Lists join with commas, matching how selected values travel as a
    /// single argument.
    pub fn as_binding_string(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::List(items) => items.join(","),
            Value::Secret(s) => s.expose().to_string(),
        }
    }

    /// Type-aware emptiness: bools are never empty, secrets are empty at
    /// zero length, everything else uses whitespace-trimmed emptiness.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Bool(_) => false,
            Value::Secret(s) => s.expose().is_empty(),
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(_) => false,
            Value::List(items) => items.is_empty(),
        }
    }

    /// True for `Bool(true)`; false for everything else.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// JSON rendering for the result payload. Secrets yield `None`.
    pub fn to_payload_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Text(s) => Some(serde_json::Value::String(s.clone())),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Number(n) => serde_json::Number::from_f64(*n).map(serde_json::Value::Number),
            Value::List(items) => Some(serde_json::Value::Array(
                items
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            )),
            Value::Secret(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Secret(_) => write!(f, "[REDACTED]"),
            other => write!(f, "{}", other.as_binding_string()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Sensitive text wrapper. Debug and Display never reveal the content;
/// serde serialization is a fixed redaction marker so a secret can never
/// leak through a derived Serialize.
#[derive(Clone, PartialEq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying text. Callers are responsible for keeping it
    /// out of logs; see [`crate::secrets::OutputMasker`].
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue([REDACTED])")
    }
}

impl Serialize for SecretValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        Ok(SecretValue(String::deserialize(deserializer)?))
    }
}

/// Session-wide committed parameter name → value store.
///
/// Mutated only on field edit and step save; read by the dynamic resolver,
/// validation, and the script host binding. Parameters on never-visited
/// steps are absent, not defaulted.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    values: HashMap<String, Value>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a value, replacing any previous one.
    pub fn commit(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate committed values in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Point-in-time copy handed to background evaluation so dependent
    /// refreshes see a consistent view.
    pub fn snapshot(&self) -> FormData {
        self.clone()
    }

    /// Binding map for a script-host invocation, keyed by parameter name.
    pub fn bindings(&self) -> HashMap<String, Value> {
        self.values.clone()
    }

    /// Serialized key/value map for embedding callers. Secret values are
    /// excluded entirely. Keys are emitted in sorted order so the payload
    /// is stable across runs.
    pub fn result_payload(&self, captured_output: &[String]) -> serde_json::Value {
        let mut fields = serde_json::Map::new();
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        for name in names {
            if let Some(json) = self.values[name].to_payload_json() {
                fields.insert(name.clone(), json);
            }
        }
        serde_json::json!({
            "fields": serde_json::Value::Object(fields),
            "output": captured_output,
        })
    }
}

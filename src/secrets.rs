//! Output masking for secret parameter values.
//!
//! Every line headed for the console or the run log passes through an
//! [`OutputMasker`] so committed secret values never appear in either.

use std::collections::HashSet;

use crate::form::{FormData, Value};

const MASK: &str = "[REDACTED]";

/// Masks registered secret values in output lines.
#[derive(Debug, Default)]
pub struct OutputMasker {
    secrets: HashSet<String>,
}

impl OutputMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a masker covering every secret value committed to the form.
    pub fn from_form(form: &FormData) -> Self {
        let mut masker = Self::new();
        for (_, value) in form.iter() {
            if let Value::Secret(secret) = value {
                masker.add_secret(secret.expose());
            }
        }
        masker
    }

    /// Register a secret value to be masked. Empty strings are ignored.
    pub fn add_secret(&mut self, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.insert(value);
        }
    }

    /// Mask any registered secret values in the given line.
    pub fn mask(&self, input: &str) -> String {
        let mut result = input.to_string();
        for secret in &self.secrets {
            result = result.replace(secret, MASK);
        }
        result
    }

    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }
}

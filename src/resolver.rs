//! Dynamic choice-list resolution.
//!
//! Keeps every dynamic parameter's choice list consistent with the current
//! values of the parameters it depends on, without re-evaluating parameters
//! that did not change. Evaluation failures are contained per parameter:
//! the previous choice list stays in place and siblings still refresh.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{Result, SwitchbackError};
use crate::form::{FormData, Value};
use crate::host::ScriptHost;

/// Registered data source for one dynamic parameter.
#[derive(Debug, Clone)]
struct SourceSpec {
    expression: String,
    depends_on: Vec<String>,
}

/// Dependency-aware choice resolver.
///
/// `dependents` is the inverted index: for each parameter name, the dynamic
/// parameters that must refresh when its value changes, in registration
/// order.
pub struct ChoiceResolver<'h> {
    host: &'h dyn ScriptHost,
    base_dir: PathBuf,
    sources: HashMap<String, SourceSpec>,
    dependents: HashMap<String, Vec<String>>,
}

impl<'h> ChoiceResolver<'h> {
    pub fn new(host: &'h dyn ScriptHost, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            host,
            base_dir: base_dir.into(),
            sources: HashMap::new(),
            dependents: HashMap::new(),
        }
    }

    /// Register a dynamic parameter's data source and dependency edges.
    pub fn register(
        &mut self,
        name: &str,
        source: &str,
        depends_on: &[String],
    ) -> Result<()> {
        if source.trim().is_empty() {
            return Err(SwitchbackError::Configuration {
                message: format!("dynamic parameter '{}' has no data source", name),
            });
        }
        self.sources.insert(
            name.to_string(),
            SourceSpec {
                expression: source.to_string(),
                depends_on: depends_on.to_vec(),
            },
        );
        for dep in depends_on {
            let entry = self.dependents.entry(dep.clone()).or_default();
            if !entry.iter().any(|d| d == name) {
                entry.push(name.to_string());
            }
        }
        Ok(())
    }

    /// Names of parameters that refresh when `name` changes.
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Re-evaluate every parameter depending on `changed`, sequentially,
    /// against a snapshot of the form. Returns the refreshed choice lists;
    /// parameters whose evaluation failed are absent (callers keep the
    /// previous list).
    pub fn on_value_changed(
        &self,
        changed: &str,
        form: &FormData,
    ) -> Vec<(String, Vec<String>)> {
        let snapshot = form.snapshot();
        let mut refreshed = Vec::new();
        for dependent in self.dependents_of(changed) {
            match self.evaluate(dependent, &snapshot) {
                Ok(choices) => refreshed.push((dependent.clone(), choices)),
                Err(e) => {
                    warn!(
                        "choice refresh for '{}' failed, keeping previous list: {}",
                        dependent, e
                    );
                }
            }
        }
        refreshed
    }

    /// Evaluate every registered dynamic parameter among `names` exactly
    /// once, in the given declaration order. Used when a step becomes
    /// current so first visits get populated lists.
    pub fn refresh_all(&self, names: &[String], form: &FormData) -> Vec<(String, Vec<String>)> {
        let snapshot = form.snapshot();
        let mut refreshed = Vec::new();
        for name in names {
            if !self.sources.contains_key(name) {
                continue;
            }
            match self.evaluate(name, &snapshot) {
                Ok(choices) => refreshed.push((name.clone(), choices)),
                Err(e) => {
                    warn!(
                        "choice refresh for '{}' failed, keeping previous list: {}",
                        name, e
                    );
                }
            }
        }
        refreshed
    }

    /// Evaluate one parameter's data source against the snapshot.
    fn evaluate(&self, name: &str, snapshot: &FormData) -> Result<Vec<String>> {
        let spec = self
            .sources
            .get(name)
            .ok_or_else(|| SwitchbackError::Configuration {
                message: format!("parameter '{}' is not registered as dynamic", name),
            })?;

        let choices = if let Some(file_spec) = spec.expression.strip_prefix("file:") {
            self.read_file_source(file_spec, &spec.depends_on, snapshot)?
        } else {
            let value = self
                .host
                .evaluate(&spec.expression, &snapshot.bindings())?;
            value_to_choices(&value)
        };

        Ok(normalize(choices))
    }

    /// Read a delimited data file: `file:<path>[:<column>]`.
    ///
    /// Each line is a `|`-delimited record. Without a column, the last
    /// field is the choice; with a 1-based column, that field is. Leading
    /// fields (when the record carries more than the choice needs) must
    /// equal the current values of the declared dependencies, in order.
    /// Records with a single field are unconditional; records missing the
    /// requested column are skipped.
    fn read_file_source(
        &self,
        file_spec: &str,
        depends_on: &[String],
        snapshot: &FormData,
    ) -> Result<Vec<String>> {
        let (path_part, column) = parse_file_spec(file_spec)?;
        let path = self.base_dir.join(path_part);
        let content =
            std::fs::read_to_string(&path).map_err(|e| SwitchbackError::Evaluation {
                expression: format!("file:{}", file_spec),
                message: format!("cannot read {}: {}", path.display(), e),
            })?;

        let dep_values: Vec<String> = depends_on
            .iter()
            .map(|d| {
                snapshot
                    .get(d)
                    .map(|v| v.as_binding_string())
                    .unwrap_or_default()
            })
            .collect();

        let mut choices = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            let (filters, choice): (&[&str], &str) = match column {
                Some(col) => {
                    let Some(choice) = fields.get(col - 1) else {
                        continue;
                    };
                    let filters: &[&str] = if fields.len() > dep_values.len() {
                        &fields[..dep_values.len()]
                    } else {
                        &[]
                    };
                    (filters, *choice)
                }
                None => {
                    let (filters, choice) = fields.split_at(fields.len() - 1);
                    (filters, choice[0])
                }
            };
            if !filters.is_empty() {
                if filters.len() != dep_values.len() {
                    continue;
                }
                if !filters.iter().zip(&dep_values).all(|(f, v)| f == v) {
                    continue;
                }
            }
            choices.push(choice.to_string());
        }
        Ok(choices)
    }
}

/// Split `<path>[:<column>]` into the file path and an optional 1-based
/// column index. A trailing `:<digits>` segment is the column; anything
/// else stays part of the path.
fn parse_file_spec(file_spec: &str) -> Result<(&str, Option<usize>)> {
    let trimmed = file_spec.trim();
    if let Some((path, suffix)) = trimmed.rsplit_once(':') {
        if let Ok(column) = suffix.parse::<usize>() {
            if column == 0 {
                return Err(SwitchbackError::Evaluation {
                    expression: format!("file:{}", file_spec),
                    message: "column index is 1-based".to_string(),
                });
            }
            return Ok((path, Some(column)));
        }
    }
    Ok((trimmed, None))
}

/// Coerce an evaluation result into a raw choice list.
fn value_to_choices(value: &Value) -> Vec<String> {
    match value {
        Value::List(items) => items.clone(),
        Value::Text(text) => text
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect(),
        other => vec![other.as_binding_string()],
    }
}

/// Ordered unique strings.
fn normalize(choices: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    choices
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

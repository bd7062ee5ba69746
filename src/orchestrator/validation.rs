//! Cross-step validation.
//!
//! Runs once, at the final Next/Finish. Every non-placeholder parameter
//! across all steps is checked; violations are collected, never
//! short-circuited, and reported together keyed by step and field label.

use std::path::Path;

use tracing::warn;

use crate::definition::schema::{ParameterConfig, PathKind, StepConfig};
use crate::form::{FormData, Value};
use crate::host::ScriptHost;

/// One validation failure, locatable by step and field.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// 1-based step index.
    pub step_index: usize,
    pub step_title: String,
    pub field_label: String,
    pub detail: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Step {} '{}': {}",
            self.step_index, self.step_title, self.detail
        )
    }
}

/// Aggregated result of the cross-step check.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// One consolidated human-readable message, one violation per line.
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Check every non-placeholder parameter of every step.
pub fn collect_validation_errors(
    steps: &[StepConfig],
    form: &FormData,
    host: &dyn ScriptHost,
    base_dir: &Path,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (index, step) in steps.iter().enumerate() {
        let step_index = index + 1;
        for param in step.parameters.iter().filter(|p| !p.placeholder) {
            check_parameter(
                param,
                step_index,
                &step.title,
                form,
                host,
                base_dir,
                &mut report,
            );
        }
    }

    report
}

fn check_parameter(
    param: &ParameterConfig,
    step_index: usize,
    step_title: &str,
    form: &FormData,
    host: &dyn ScriptHost,
    base_dir: &Path,
    report: &mut ValidationReport,
) {
    let label = param.display_label();
    let mut push = |detail: String| {
        report.violations.push(Violation {
            step_index,
            step_title: step_title.to_string(),
            field_label: label.to_string(),
            detail,
        });
    };

    let value = form.get(&param.name);

    // Mandatory emptiness, type-aware: boolean kinds are never empty.
    let empty = match value {
        Some(v) => v.is_empty(),
        None => !param.kind.is_boolean(),
    };
    if empty {
        if param.mandatory {
            push(format!("'{}' is required.", label));
        }
        // Remaining checks need a value to look at.
        return;
    }
    // Boolean kinds reach here with no committed value; there is nothing
    // further to check for them.
    let Some(value) = value else {
        return;
    };

    // Fixed-choice membership; list values validate every element.
    if let Some(choices) = &param.choices {
        match value {
            Value::List(items) => {
                for item in items {
                    if !choices.iter().any(|c| c == item) {
                        push(format!(
                            "'{}' value '{}' is not one of the allowed choices.",
                            label, item
                        ));
                    }
                }
            }
            other => {
                let rendered = other.as_binding_string();
                if !choices.iter().any(|c| *c == rendered) {
                    push(format!(
                        "'{}' value '{}' is not one of the allowed choices.",
                        label, rendered
                    ));
                }
            }
        }
    }

    // Path existence for path-constrained parameters.
    if param.path != PathKind::None {
        let rendered = value.as_binding_string();
        let candidate = Path::new(&rendered);
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base_dir.join(candidate)
        };
        let ok = match param.path {
            PathKind::File => resolved.is_file(),
            PathKind::Folder => resolved.is_dir(),
            PathKind::None => true,
        };
        if !ok {
            let kind = if param.path == PathKind::File {
                "file"
            } else {
                "folder"
            };
            push(format!(
                "'{}' {} does not exist: {}.",
                label, kind, rendered
            ));
        }
    }

    // Custom validation script wins over the regex pattern.
    if let Some(script) = &param.validation_script {
        let mut bindings = form.bindings();
        bindings.insert("value".to_string(), value.clone());
        match host.evaluate(script, &bindings) {
            Ok(result) => {
                if !is_truthy(&result) {
                    push(format!("'{}' failed its validation check.", label));
                }
            }
            Err(e) => {
                // Contained: an evaluation error never blocks the finish.
                warn!("validation script for '{}' failed to run: {}", label, e);
            }
        }
    } else if let Some(pattern) = &param.pattern {
        match regex::Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(&value.as_binding_string()) {
                    push(format!(
                        "'{}' does not match the required pattern.",
                        label
                    ));
                }
            }
            Err(e) => {
                warn!("pattern for '{}' does not compile: {}", label, e);
            }
        }
    }
}

/// Truthiness of an evaluation result.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => *n != 0.0,
        Value::List(items) => !items.is_empty(),
        Value::Secret(_) => false,
    }
}

//! Definition schema for Switchback launch files.
//!
//! This module contains the struct definitions that map to the YAML
//! definition format (or the embedded definition header of a script file).
//! Instances are created once at load time and are read-only for the rest
//! of the session.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root structure for a launch definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LaunchDefinition {
    /// Window/app title shown in headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Icon name (display hint only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Theme name (display hint only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    /// Jump straight to the workflow step on launch (set by resume).
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip_to_workflow: bool,

    /// Directory for structured run logs (defaults to the working dir).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// The terminal script executed once the wizard finishes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptSpec>,

    /// Ordered pages.
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// The terminal script: an inline template or an external file.
/// Exactly one of the two must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScriptSpec {
    /// Inline script body; `${name}` references are substituted with
    /// committed parameter values before execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// External script file, run with its raw content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// What kind of page a step renders as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    #[default]
    Wizard,
    Dashboard,
    Workflow,
}

/// One page in the loaded definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StepConfig {
    /// Page title (step indicator and header).
    pub title: String,

    /// Longer description shown under the title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Page type; determines which presentation state is built.
    #[serde(rename = "type")]
    pub page: PageKind,

    /// Declared inputs, in display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterConfig>,

    /// Auxiliary display controls (banners, cards, metrics).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<ControlConfig>,

    /// Workflow task list (workflow pages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskConfig>,
}

/// Declared input type of a parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    Text,
    Bool,
    Switch,
    Secret,
    Number,
    List,
}

impl ParamKind {
    /// Bool-like kinds bind only when true and are never "empty".
    pub fn is_boolean(&self) -> bool {
        matches!(self, ParamKind::Bool | ParamKind::Switch)
    }
}

/// Path constraint applied during validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    #[default]
    None,
    File,
    Folder,
}

/// A single input declared by the definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ParameterConfig {
    /// Unique name within the step; binding and interpolation key.
    pub name: String,

    /// Display label (falls back to the name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Declared input type.
    #[serde(rename = "type")]
    pub kind: ParamKind,

    /// Whether the parameter must have a value at finish.
    #[serde(default, skip_serializing_if = "is_false")]
    pub mandatory: bool,

    /// Regex the committed value must match (unless a validation script
    /// is present, which wins).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Expression evaluated against the committed value; truthy passes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_script: Option<String>,

    /// Fixed choice set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,

    /// Path-existence constraint.
    pub path: PathKind,

    /// Non-interactive marker (e.g. embedded card anchors). Placeholders
    /// produce no bound field and are never validated or bound.
    #[serde(default, skip_serializing_if = "is_false")]
    pub placeholder: bool,

    /// Whether the choice list is computed from a data source.
    #[serde(default, skip_serializing_if = "is_false")]
    pub dynamic: bool,

    /// Parameters whose value changes trigger a re-evaluation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Data-source expression (`file:...` or an inline expression).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Default value committed when running non-interactively.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ParameterConfig {
    /// Display label, falling back to the parameter name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Severity of a banner control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BannerSeverity {
    #[default]
    Info,
    Warning,
    Error,
}

/// Auxiliary display control. Tagged by `kind`; an unknown kind is
/// rejected at parse time rather than carried as a loose property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ControlConfig {
    /// Prominent text strip.
    Banner {
        text: String,
        #[serde(default)]
        severity: BannerSeverity,
    },
    /// Informational card.
    Card {
        title: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
    },
    /// Value card (dashboard metric).
    Metric {
        title: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
}

/// Workflow task type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Normal,
    ApprovalGate,
}

/// What to do when a task fails past its retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Halt the whole sequence.
    #[default]
    Stop,
    /// Mark failed and move on.
    Continue,
}

/// How an approval rejection resolves the task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RejectBehavior {
    #[default]
    Fail,
    Skip,
}

/// One unit of work in a workflow page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TaskConfig {
    /// Unique task name.
    pub name: String,

    /// Display title (falls back to the name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Execution order; tasks with equal or missing order keep their
    /// declaration position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,

    /// Task type.
    #[serde(rename = "type")]
    pub kind: TaskKind,

    /// Inline script body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// External script file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,

    /// Extra bindings passed to the task body (template-substituted).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub args: HashMap<String, String>,

    /// Retries after the first failed attempt.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry: u32,

    /// Seconds to wait between attempts.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub retry_delay_seconds: u64,

    /// Per-attempt timeout; 0 disables.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub timeout_seconds: u64,

    /// Expression; truthy skips the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_if: Option<String>,

    /// Reason recorded when the skip condition fires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    /// Inline rollback body, run best-effort when retries are exhausted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<String>,

    /// External rollback script file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_path: Option<PathBuf>,

    /// Failure policy.
    pub on_error: OnError,

    /// Group label for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Approval gates: a rejection must carry a non-empty reason.
    #[serde(default, skip_serializing_if = "is_false")]
    pub require_reason: bool,

    /// Approval gates: minutes before the gate auto-rejects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_timeout_minutes: Option<u64>,

    /// Approval gates: how a rejection resolves the task.
    pub on_reject: RejectBehavior,
}

impl TaskConfig {
    /// Display title, falling back to the task name.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn has_rollback(&self) -> bool {
        self.rollback.is_some() || self.rollback_path.is_some()
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_definition_parses() {
        let def: LaunchDefinition = serde_yaml::from_str(
            r#"
            title: Provisioning
            steps:
              - title: Basics
                parameters:
                  - name: host
                    mandatory: true
        "#,
        )
        .unwrap();

        assert_eq!(def.title.as_deref(), Some("Provisioning"));
        assert_eq!(def.steps.len(), 1);
        assert_eq!(def.steps[0].page, PageKind::Wizard);
        assert!(def.steps[0].parameters[0].mandatory);
        assert_eq!(def.steps[0].parameters[0].kind, ParamKind::Text);
    }

    #[test]
    fn page_kind_parses_from_type_field() {
        let step: StepConfig = serde_yaml::from_str(
            r#"
            title: Overview
            type: dashboard
        "#,
        )
        .unwrap();
        assert_eq!(step.page, PageKind::Dashboard);
    }

    #[test]
    fn parameter_defaults_are_quiet() {
        let param: ParameterConfig = serde_yaml::from_str("name: plain").unwrap();
        assert!(!param.mandatory);
        assert!(!param.dynamic);
        assert!(!param.placeholder);
        assert_eq!(param.path, PathKind::None);
        assert_eq!(param.display_label(), "plain");
    }

    #[test]
    fn dynamic_parameter_declares_dependencies() {
        let param: ParameterConfig = serde_yaml::from_str(
            r#"
            name: site
            dynamic: true
            depends_on: [region]
            source: "list-sites"
        "#,
        )
        .unwrap();
        assert!(param.dynamic);
        assert_eq!(param.depends_on, vec!["region"]);
        assert_eq!(param.source.as_deref(), Some("list-sites"));
    }

    #[test]
    fn controls_parse_as_typed_variants() {
        let controls: Vec<ControlConfig> = serde_yaml::from_str(
            r#"
            - kind: banner
              text: Heads up
              severity: warning
            - kind: card
              title: About
              text: Details here
            - kind: metric
              title: CPU
              value: "42"
              unit: "%"
        "#,
        )
        .unwrap();

        assert!(matches!(
            controls[0],
            ControlConfig::Banner {
                severity: BannerSeverity::Warning,
                ..
            }
        ));
        assert!(matches!(controls[1], ControlConfig::Card { .. }));
        assert!(matches!(controls[2], ControlConfig::Metric { .. }));
    }

    #[test]
    fn unknown_control_kind_is_rejected() {
        let result: std::result::Result<ControlConfig, _> = serde_yaml::from_str(
            r#"
            kind: hologram
            text: nope
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn task_defaults_follow_policy() {
        let task: TaskConfig = serde_yaml::from_str("name: install").unwrap();
        assert_eq!(task.kind, TaskKind::Normal);
        assert_eq!(task.on_error, OnError::Stop);
        assert_eq!(task.on_reject, RejectBehavior::Fail);
        assert_eq!(task.retry, 0);
        assert_eq!(task.timeout_seconds, 0);
        assert!(!task.has_rollback());
        assert_eq!(task.display_title(), "install");
    }

    #[test]
    fn task_parses_full_policy() {
        let task: TaskConfig = serde_yaml::from_str(
            r#"
            name: migrate
            title: Migrate database
            retry: 2
            retry_delay_seconds: 5
            timeout_seconds: 600
            skip_if: "test -f /tmp/migrated"
            skip_reason: already migrated
            rollback: "echo rollback"
            on_error: continue
            group: Database
        "#,
        )
        .unwrap();
        assert_eq!(task.retry, 2);
        assert_eq!(task.retry_delay_seconds, 5);
        assert_eq!(task.timeout_seconds, 600);
        assert_eq!(task.on_error, OnError::Continue);
        assert!(task.has_rollback());
        assert_eq!(task.group.as_deref(), Some("Database"));
    }

    #[test]
    fn approval_gate_parses() {
        let task: TaskConfig = serde_yaml::from_str(
            r#"
            name: signoff
            type: approval_gate
            require_reason: true
            approval_timeout_minutes: 30
            on_reject: skip
        "#,
        )
        .unwrap();
        assert_eq!(task.kind, TaskKind::ApprovalGate);
        assert!(task.require_reason);
        assert_eq!(task.approval_timeout_minutes, Some(30));
        assert_eq!(task.on_reject, RejectBehavior::Skip);
    }

    #[test]
    fn round_trips_through_yaml() {
        let def: LaunchDefinition = serde_yaml::from_str(
            r#"
            title: App
            steps:
              - title: One
                parameters:
                  - name: env
                    choices: [dev, prod]
        "#,
        )
        .unwrap();
        let yaml = serde_yaml::to_string(&def).unwrap();
        let back: LaunchDefinition = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.steps[0].parameters[0].choices.as_ref().unwrap().len(), 2);
    }
}

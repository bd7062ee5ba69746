//! Per-step presentation state.
//!
//! Page construction is a single switch over the step's page kind; each
//! variant's builder is a pure function of the step definition and a
//! FormData snapshot. Pages are cached by the navigator and re-synced from
//! FormData on every entry — the cache never becomes a second source of
//! truth.

use crate::definition::schema::{
    ControlConfig, ParamKind, ParameterConfig, PathKind, StepConfig,
};
use crate::form::{FormData, SecretValue, Value};
use crate::workflow::task::WorkflowTask;

/// A parameter bound to an editable field.
#[derive(Debug, Clone)]
pub struct BoundField {
    pub name: String,
    pub label: String,
    pub kind: ParamKind,
    pub mandatory: bool,
    pub pattern: Option<String>,
    pub validation_script: Option<String>,
    pub path: PathKind,
    /// Live choice list: fixed choices at build time, replaced by dynamic
    /// refreshes.
    pub choices: Vec<String>,
    pub dynamic: bool,
    pub depends_on: Vec<String>,
    /// Current value shown in the field; kept in lockstep with FormData.
    pub value: Option<Value>,
}

impl BoundField {
    fn from_parameter(param: &ParameterConfig, form: &FormData) -> Self {
        let value = form
            .get(&param.name)
            .cloned()
            .or_else(|| param.default.as_ref().and_then(|d| default_value(param.kind, d)));
        Self {
            name: param.name.clone(),
            label: param.display_label().to_string(),
            kind: param.kind,
            mandatory: param.mandatory,
            pattern: param.pattern.clone(),
            validation_script: param.validation_script.clone(),
            path: param.path,
            choices: param.choices.clone().unwrap_or_default(),
            dynamic: param.dynamic,
            depends_on: param.depends_on.clone(),
            value,
        }
    }
}

/// Convert a declared default into a typed value.
fn default_value(kind: ParamKind, raw: &serde_json::Value) -> Option<Value> {
    match (kind, raw) {
        (ParamKind::Bool | ParamKind::Switch, serde_json::Value::Bool(b)) => {
            Some(Value::Bool(*b))
        }
        (ParamKind::Number, serde_json::Value::Number(n)) => n.as_f64().map(Value::Number),
        (ParamKind::Secret, serde_json::Value::String(s)) => {
            Some(Value::Secret(SecretValue::new(s.clone())))
        }
        (ParamKind::List, serde_json::Value::Array(items)) => Some(Value::List(
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect(),
        )),
        (_, serde_json::Value::String(s)) => Some(Value::Text(s.clone())),
        _ => None,
    }
}

/// Wizard form page.
#[derive(Debug, Clone)]
pub struct WizardPage {
    pub title: String,
    pub description: Option<String>,
    pub controls: Vec<ControlConfig>,
    pub fields: Vec<BoundField>,
}

/// Dashboard page: controls first, optional jump fields.
#[derive(Debug, Clone)]
pub struct DashboardPage {
    pub title: String,
    pub description: Option<String>,
    pub controls: Vec<ControlConfig>,
    pub fields: Vec<BoundField>,
}

/// Workflow page: the runnable task list.
#[derive(Debug, Clone)]
pub struct WorkflowPage {
    pub title: String,
    pub description: Option<String>,
    pub tasks: Vec<WorkflowTask>,
}

/// Presentation state for one step, tagged by page kind.
#[derive(Debug, Clone)]
pub enum PresentationState {
    Wizard(WizardPage),
    Dashboard(DashboardPage),
    Workflow(WorkflowPage),
}

impl PresentationState {
    /// Build the presentation state for a step. Controls are processed
    /// first, then parameters; placeholder parameters produce no field.
    pub fn build(step: &StepConfig, form: &FormData) -> Self {
        use crate::definition::schema::PageKind;

        let controls = step.controls.clone();
        let fields: Vec<BoundField> = step
            .parameters
            .iter()
            .filter(|p| !p.placeholder)
            .map(|p| BoundField::from_parameter(p, form))
            .collect();

        match step.page {
            PageKind::Wizard => PresentationState::Wizard(WizardPage {
                title: step.title.clone(),
                description: step.description.clone(),
                controls,
                fields,
            }),
            PageKind::Dashboard => PresentationState::Dashboard(DashboardPage {
                title: step.title.clone(),
                description: step.description.clone(),
                controls,
                fields,
            }),
            PageKind::Workflow => PresentationState::Workflow(WorkflowPage {
                title: step.title.clone(),
                description: step.description.clone(),
                tasks: step
                    .tasks
                    .iter()
                    .enumerate()
                    .map(|(pos, t)| WorkflowTask::from_config(t, pos))
                    .collect(),
            }),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            PresentationState::Wizard(p) => &p.title,
            PresentationState::Dashboard(p) => &p.title,
            PresentationState::Workflow(p) => &p.title,
        }
    }

    /// Bound fields of this page (workflow pages have none).
    pub fn fields(&self) -> &[BoundField] {
        match self {
            PresentationState::Wizard(p) => &p.fields,
            PresentationState::Dashboard(p) => &p.fields,
            PresentationState::Workflow(_) => &[],
        }
    }

    pub fn fields_mut(&mut self) -> &mut [BoundField] {
        match self {
            PresentationState::Wizard(p) => &mut p.fields,
            PresentationState::Dashboard(p) => &mut p.fields,
            PresentationState::Workflow(_) => &mut [],
        }
    }

    /// Re-synchronize field values from FormData. Called on every page
    /// entry; FormData wins over whatever the cached page last showed.
    pub fn sync_from_form(&mut self, form: &FormData) {
        for field in self.fields_mut() {
            if let Some(value) = form.get(&field.name) {
                field.value = Some(value.clone());
            }
        }
    }

    /// Replace live choice lists after a dynamic refresh.
    pub fn apply_choices(&mut self, refreshed: &[(String, Vec<String>)]) {
        for field in self.fields_mut() {
            if let Some((_, choices)) = refreshed.iter().find(|(name, _)| *name == field.name) {
                field.choices = choices.clone();
            }
        }
    }
}

//! Mock UI for tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::definition::schema::ControlConfig;
use crate::error::Result;
use crate::form::Value;
use crate::host::StreamRecord;
use crate::orchestrator::pages::BoundField;
use crate::workflow::executor::ApprovalDecision;
use crate::workflow::task::{WorkflowSession, WorkflowTask};

use super::{NavChoice, WizardUi};

/// UI whose answers are scripted by the test and whose interactions are
/// recorded for assertions.
#[derive(Default)]
pub struct MockUi {
    interactive: bool,
    field_responses: HashMap<String, VecDeque<Value>>,
    nav_choices: VecDeque<NavChoice>,
    approvals: VecDeque<ApprovalDecision>,
    messages: Vec<String>,
    fields_prompted: Vec<String>,
    stream_lines: Vec<StreamRecord>,
    approval_timeouts: Vec<Option<Duration>>,
}

impl MockUi {
    pub fn new() -> Self {
        Self {
            interactive: true,
            ..Default::default()
        }
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    /// Queue a response for a named field (consumed in order).
    pub fn push_field_response(&mut self, name: &str, value: Value) {
        self.field_responses
            .entry(name.to_string())
            .or_default()
            .push_back(value);
    }

    pub fn push_nav_choice(&mut self, choice: NavChoice) {
        self.nav_choices.push_back(choice);
    }

    pub fn push_approval(&mut self, decision: ApprovalDecision) {
        self.approvals.push_back(decision);
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn fields_prompted(&self) -> &[String] {
        &self.fields_prompted
    }

    pub fn stream_lines(&self) -> &[StreamRecord] {
        &self.stream_lines
    }

    pub fn approval_timeouts(&self) -> &[Option<Duration>] {
        &self.approval_timeouts
    }
}

impl WizardUi for MockUi {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn message(&mut self, msg: &str) {
        self.messages.push(msg.to_string());
    }

    fn success(&mut self, msg: &str) {
        self.messages.push(format!("success: {}", msg));
    }

    fn warning(&mut self, msg: &str) {
        self.messages.push(format!("warning: {}", msg));
    }

    fn error(&mut self, msg: &str) {
        self.messages.push(format!("error: {}", msg));
    }

    fn show_header(&mut self, title: &str, current: usize, total: usize) {
        self.messages
            .push(format!("header: {} ({}/{})", title, current, total));
    }

    fn show_controls(&mut self, controls: &[ControlConfig]) {
        self.messages.push(format!("controls: {}", controls.len()));
    }

    fn prompt_field(&mut self, field: &BoundField) -> Result<Value> {
        self.fields_prompted.push(field.name.clone());
        if let Some(queue) = self.field_responses.get_mut(&field.name) {
            if let Some(value) = queue.pop_front() {
                return Ok(value);
            }
        }
        // Fall back like a user accepting what the field already shows:
        // the current value, else the first choice, else empty text.
        if let Some(value) = &field.value {
            return Ok(value.clone());
        }
        if let Some(first) = field.choices.first() {
            return Ok(Value::Text(first.clone()));
        }
        Ok(Value::Text(String::new()))
    }

    fn choose_navigation(
        &mut self,
        _at_first: bool,
        _at_last: bool,
        _step_titles: &[String],
    ) -> Result<NavChoice> {
        Ok(self.nav_choices.pop_front().unwrap_or(NavChoice::Next))
    }

    fn show_stream_line(&mut self, record: &StreamRecord) {
        self.stream_lines.push(record.clone());
    }

    fn show_workflow_update(&mut self, session: &WorkflowSession) {
        self.messages
            .push(format!("workflow: {:.0}%", session.overall_progress() * 100.0));
    }

    fn decide_approval(
        &mut self,
        _task: &WorkflowTask,
        timeout: Option<Duration>,
    ) -> Result<ApprovalDecision> {
        self.approval_timeouts.push(timeout);
        Ok(self
            .approvals
            .pop_front()
            .unwrap_or(ApprovalDecision::Approved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::schema::{ParamKind, PathKind};

    fn field(name: &str, choices: Vec<String>) -> BoundField {
        BoundField {
            name: name.to_string(),
            label: name.to_string(),
            kind: ParamKind::Text,
            mandatory: false,
            pattern: None,
            validation_script: None,
            path: PathKind::None,
            choices,
            dynamic: false,
            depends_on: vec![],
            value: None,
        }
    }

    #[test]
    fn scripted_responses_are_consumed_in_order() {
        let mut ui = MockUi::new();
        ui.push_field_response("env", Value::Text("dev".into()));
        ui.push_field_response("env", Value::Text("prod".into()));

        let f = field("env", vec![]);
        assert_eq!(ui.prompt_field(&f).unwrap(), Value::Text("dev".into()));
        assert_eq!(ui.prompt_field(&f).unwrap(), Value::Text("prod".into()));
        assert_eq!(ui.fields_prompted(), ["env", "env"]);
    }

    #[test]
    fn unscripted_field_falls_back_to_first_choice() {
        let mut ui = MockUi::new();
        let f = field("env", vec!["dev".into(), "prod".into()]);
        assert_eq!(ui.prompt_field(&f).unwrap(), Value::Text("dev".into()));
    }

    #[test]
    fn default_navigation_is_next() {
        let mut ui = MockUi::new();
        assert_eq!(
            ui.choose_navigation(true, false, &[]).unwrap(),
            NavChoice::Next
        );
    }

    #[test]
    fn default_approval_is_approved() {
        let mut ui = MockUi::new();
        let config = crate::definition::schema::TaskConfig {
            name: "gate".to_string(),
            ..Default::default()
        };
        let task = WorkflowTask::from_config(&config, 0);
        assert_eq!(
            ui.decide_approval(&task, None).unwrap(),
            ApprovalDecision::Approved
        );
    }
}

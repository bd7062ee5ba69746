//! Terminal implementation of [`WizardUi`] on dialoguer/console/indicatif.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use console::{style, Term};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, MultiSelect, Password, Select};
use indicatif::{ProgressBar, ProgressStyle};

use crate::definition::schema::{BannerSeverity, ControlConfig, ParamKind};
use crate::error::{Result, SwitchbackError};
use crate::form::{SecretValue, Value};
use crate::host::{StreamKind, StreamRecord};
use crate::orchestrator::pages::BoundField;
use crate::workflow::executor::ApprovalDecision;
use crate::workflow::task::{WorkflowSession, WorkflowTask};

use super::{NavChoice, WizardUi};

/// Convert dialoguer errors to SwitchbackError.
fn map_dialoguer_err(e: dialoguer::Error) -> SwitchbackError {
    SwitchbackError::Io(e.into())
}

/// Quiet mode keeps warnings and errors; everything else stays silent.
fn stream_line_visible(quiet: bool, kind: StreamKind) -> bool {
    !quiet || matches!(kind, StreamKind::Warning | StreamKind::Error)
}

/// Dialoguer theme without the default yellow `?` prefix.
fn prompt_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_prefix: style("".to_string()),
        ..ColorfulTheme::default()
    }
}

/// Terminal-backed UI. With `interactive` off, field prompts resolve from
/// the field's current value without touching the terminal. With `quiet`
/// on, informational output (messages, headers, controls, non-error
/// stream lines, workflow progress) is suppressed; warnings, errors, and
/// the final outcome still print.
pub struct TerminalUi {
    term: Term,
    interactive: bool,
    quiet: bool,
    workflow_bar: Option<ProgressBar>,
}

impl TerminalUi {
    pub fn new(interactive: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            interactive,
            quiet,
            workflow_bar: None,
        }
    }

    fn prompt_interactive(&mut self, field: &BoundField) -> Result<Value> {
        let label = field.label.as_str();

        if !field.choices.is_empty() {
            return match field.kind {
                ParamKind::List => {
                    let current: Vec<String> = match &field.value {
                        Some(Value::List(items)) => items.clone(),
                        _ => Vec::new(),
                    };
                    let defaults: Vec<bool> = field
                        .choices
                        .iter()
                        .map(|c| current.contains(c))
                        .collect();
                    let selections = MultiSelect::with_theme(&prompt_theme())
                        .with_prompt(label)
                        .items(&field.choices)
                        .defaults(&defaults)
                        .interact_on(&self.term)
                        .map_err(map_dialoguer_err)?;
                    Ok(Value::List(
                        selections
                            .iter()
                            .map(|&i| field.choices[i].clone())
                            .collect(),
                    ))
                }
                _ => {
                    let default_idx = field
                        .value
                        .as_ref()
                        .map(|v| v.as_binding_string())
                        .and_then(|v| field.choices.iter().position(|c| *c == v))
                        .unwrap_or(0);
                    let selection = Select::with_theme(&prompt_theme())
                        .with_prompt(label)
                        .items(&field.choices)
                        .default(default_idx)
                        .interact_on(&self.term)
                        .map_err(map_dialoguer_err)?;
                    Ok(Value::Text(field.choices[selection].clone()))
                }
            };
        }

        match field.kind {
            ParamKind::Bool | ParamKind::Switch => {
                let default = matches!(field.value, Some(Value::Bool(true)));
                let result = Confirm::new()
                    .with_prompt(label)
                    .default(default)
                    .interact_on(&self.term)
                    .map_err(map_dialoguer_err)?;
                Ok(Value::Bool(result))
            }
            ParamKind::Secret => {
                let result = Password::new()
                    .with_prompt(label)
                    .allow_empty_password(!field.mandatory)
                    .interact_on(&self.term)
                    .map_err(map_dialoguer_err)?;
                Ok(Value::Secret(SecretValue::new(result)))
            }
            ParamKind::Number => {
                let input = Input::<f64>::new().with_prompt(label);
                let result = if let Some(Value::Number(n)) = &field.value {
                    input
                        .default(*n)
                        .interact_on(&self.term)
                        .map_err(map_dialoguer_err)?
                } else {
                    input.interact_on(&self.term).map_err(map_dialoguer_err)?
                };
                Ok(Value::Number(result))
            }
            _ => {
                let input = Input::<String>::new()
                    .with_prompt(label)
                    .allow_empty(!field.mandatory);
                let result = if let Some(value) = &field.value {
                    input
                        .default(value.as_binding_string())
                        .interact_on(&self.term)
                        .map_err(map_dialoguer_err)?
                } else {
                    input.interact_on(&self.term).map_err(map_dialoguer_err)?
                };
                Ok(Value::Text(result))
            }
        }
    }

    /// Non-interactive resolution: current value, else first choice, else
    /// type-appropriate empty.
    fn resolve_quiet(field: &BoundField) -> Value {
        if let Some(value) = &field.value {
            return value.clone();
        }
        if let Some(first) = field.choices.first() {
            return match field.kind {
                ParamKind::List => Value::List(vec![first.clone()]),
                _ => Value::Text(first.clone()),
            };
        }
        match field.kind {
            ParamKind::Bool | ParamKind::Switch => Value::Bool(false),
            ParamKind::List => Value::List(Vec::new()),
            ParamKind::Secret => Value::Secret(SecretValue::new("")),
            _ => Value::Text(String::new()),
        }
    }
}

impl WizardUi for TerminalUi {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn message(&mut self, msg: &str) {
        if self.quiet {
            return;
        }
        let _ = self.term.write_line(msg);
    }

    fn success(&mut self, msg: &str) {
        let _ = self
            .term
            .write_line(&format!("{} {}", style("✓").green(), msg));
    }

    fn warning(&mut self, msg: &str) {
        let _ = self
            .term
            .write_line(&format!("{} {}", style("!").yellow(), msg));
    }

    fn error(&mut self, msg: &str) {
        let _ = self
            .term
            .write_line(&format!("{} {}", style("✗").red(), msg));
    }

    fn show_header(&mut self, title: &str, current: usize, total: usize) {
        if self.quiet {
            return;
        }
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&format!(
            "{} {}",
            style(format!("[{}/{}]", current, total)).dim(),
            style(title).bold()
        ));
    }

    fn show_controls(&mut self, controls: &[ControlConfig]) {
        if self.quiet {
            return;
        }
        for control in controls {
            match control {
                ControlConfig::Banner { text, severity } => {
                    let styled = match severity {
                        BannerSeverity::Info => style(text.as_str()).cyan(),
                        BannerSeverity::Warning => style(text.as_str()).yellow(),
                        BannerSeverity::Error => style(text.as_str()).red(),
                    };
                    let _ = self.term.write_line(&format!("  {}", styled));
                }
                ControlConfig::Card { title, text, .. } => {
                    let _ = self
                        .term
                        .write_line(&format!("  {} — {}", style(title).bold(), text));
                }
                ControlConfig::Metric { title, value, unit } => {
                    let unit = unit.as_deref().unwrap_or("");
                    let _ = self.term.write_line(&format!(
                        "  {}: {}{}",
                        title,
                        style(value).bold(),
                        unit
                    ));
                }
            }
        }
    }

    fn prompt_field(&mut self, field: &BoundField) -> Result<Value> {
        if !self.interactive {
            return Ok(Self::resolve_quiet(field));
        }
        self.prompt_interactive(field)
    }

    fn choose_navigation(
        &mut self,
        at_first: bool,
        at_last: bool,
        step_titles: &[String],
    ) -> Result<NavChoice> {
        if !self.interactive {
            return Ok(NavChoice::Next);
        }

        let mut labels: Vec<String> = Vec::new();
        let mut choices: Vec<NavChoice> = Vec::new();
        labels.push(if at_last { "Finish".to_string() } else { "Next".to_string() });
        choices.push(NavChoice::Next);
        if !at_first {
            labels.push("Back".to_string());
            choices.push(NavChoice::Back);
        }
        for (i, title) in step_titles.iter().enumerate() {
            labels.push(format!("Go to: {}", title));
            choices.push(NavChoice::Jump(i + 1));
        }
        labels.push("Quit".to_string());
        choices.push(NavChoice::Quit);

        let selection = Select::with_theme(&prompt_theme())
            .items(&labels)
            .default(0)
            .interact_on(&self.term)
            .map_err(map_dialoguer_err)?;
        Ok(choices[selection])
    }

    fn show_stream_line(&mut self, record: &StreamRecord) {
        if !stream_line_visible(self.quiet, record.kind) {
            return;
        }
        let line = match record.kind {
            StreamKind::Error => format!("{}", style(&record.text).red()),
            StreamKind::Warning => format!("{}", style(&record.text).yellow()),
            StreamKind::Verbose | StreamKind::Debug => {
                format!("{}", style(&record.text).dim())
            }
            _ => record.text.clone(),
        };
        let _ = self.term.write_line(&line);
    }

    fn show_workflow_update(&mut self, session: &WorkflowSession) {
        if self.quiet {
            return;
        }
        let bar = self.workflow_bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(100);
            if let Ok(styling) = ProgressStyle::with_template("{bar:30} {pos}% {msg}") {
                bar.set_style(styling);
            }
            bar
        });
        bar.set_position((session.overall_progress() * 100.0) as u64);
        if let Some(current) = session
            .tasks
            .iter()
            .find(|t| !t.status.is_terminal() && t.attempts > 0)
        {
            bar.set_message(current.title().to_string());
        }
        if !session.is_executing {
            bar.finish_and_clear();
            self.workflow_bar = None;
            for task in &session.tasks {
                let _ = self.term.write_line(&format!("  {}", task.summary_line()));
            }
        }
    }

    fn decide_approval(
        &mut self,
        task: &WorkflowTask,
        timeout: Option<Duration>,
    ) -> Result<ApprovalDecision> {
        if !self.interactive {
            // Gates need a human; a headless run resolves as rejection.
            return Ok(ApprovalDecision::Rejected {
                reason: "non-interactive run".to_string(),
            });
        }

        let prompt = match timeout {
            Some(t) => format!(
                "Approve '{}'? (auto-rejects after {}m)",
                task.title(),
                t.as_secs() / 60
            ),
            None => format!("Approve '{}'?", task.title()),
        };

        let approved = match timeout {
            None => Confirm::new()
                .with_prompt(&prompt)
                .default(false)
                .interact_on(&self.term)
                .map_err(map_dialoguer_err)?,
            Some(t) => {
                // Race the prompt against the gate timeout. The prompt
                // thread cannot be interrupted once reading; on expiry its
                // eventual answer is discarded.
                let (tx, rx) = mpsc::channel();
                let term = self.term.clone();
                let prompt = prompt.clone();
                thread::spawn(move || {
                    let answer = Confirm::new()
                        .with_prompt(&prompt)
                        .default(false)
                        .interact_on(&term);
                    let _ = tx.send(answer);
                });
                match rx.recv_timeout(t) {
                    Ok(answer) => answer.map_err(map_dialoguer_err)?,
                    Err(_) => {
                        return Ok(ApprovalDecision::Rejected {
                            reason: "approval timed out".to_string(),
                        })
                    }
                }
            }
        };

        if approved {
            return Ok(ApprovalDecision::Approved);
        }

        let reason: String = if task.config.require_reason {
            Input::<String>::new()
                .with_prompt("Rejection reason")
                .interact_on(&self.term)
                .map_err(map_dialoguer_err)?
        } else {
            String::new()
        };
        Ok(ApprovalDecision::Rejected { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::schema::PathKind;

    fn field(kind: ParamKind, value: Option<Value>, choices: Vec<String>) -> BoundField {
        BoundField {
            name: "f".to_string(),
            label: "F".to_string(),
            kind,
            mandatory: false,
            pattern: None,
            validation_script: None,
            path: PathKind::None,
            choices,
            dynamic: false,
            depends_on: vec![],
            value,
        }
    }

    #[test]
    fn quiet_resolution_prefers_current_value() {
        let f = field(
            ParamKind::Text,
            Some(Value::Text("set".into())),
            vec!["a".into()],
        );
        assert_eq!(TerminalUi::resolve_quiet(&f), Value::Text("set".into()));
    }

    #[test]
    fn quiet_resolution_falls_back_to_first_choice() {
        let f = field(ParamKind::Text, None, vec!["a".into(), "b".into()]);
        assert_eq!(TerminalUi::resolve_quiet(&f), Value::Text("a".into()));

        let f = field(ParamKind::List, None, vec!["a".into(), "b".into()]);
        assert_eq!(
            TerminalUi::resolve_quiet(&f),
            Value::List(vec!["a".into()])
        );
    }

    #[test]
    fn quiet_resolution_uses_type_appropriate_empties() {
        assert_eq!(
            TerminalUi::resolve_quiet(&field(ParamKind::Switch, None, vec![])),
            Value::Bool(false)
        );
        assert_eq!(
            TerminalUi::resolve_quiet(&field(ParamKind::List, None, vec![])),
            Value::List(vec![])
        );
        assert_eq!(
            TerminalUi::resolve_quiet(&field(ParamKind::Text, None, vec![])),
            Value::Text(String::new())
        );
    }

    #[test]
    fn non_interactive_ui_never_prompts() {
        let mut ui = TerminalUi::new(false, false);
        let f = field(ParamKind::Text, None, vec!["a".into()]);
        assert_eq!(ui.prompt_field(&f).unwrap(), Value::Text("a".into()));
        assert_eq!(
            ui.choose_navigation(true, false, &[]).unwrap(),
            NavChoice::Next
        );
    }

    #[test]
    fn quiet_mode_keeps_warnings_and_errors_visible() {
        assert!(!stream_line_visible(true, StreamKind::Output));
        assert!(!stream_line_visible(true, StreamKind::Verbose));
        assert!(!stream_line_visible(true, StreamKind::Debug));
        assert!(!stream_line_visible(true, StreamKind::Progress));
        assert!(stream_line_visible(true, StreamKind::Warning));
        assert!(stream_line_visible(true, StreamKind::Error));
        assert!(stream_line_visible(false, StreamKind::Output));
    }

    #[test]
    fn quiet_ui_still_resolves_fields() {
        let mut ui = TerminalUi::new(false, true);
        let f = field(ParamKind::Text, None, vec!["a".into()]);
        assert_eq!(ui.prompt_field(&f).unwrap(), Value::Text("a".into()));
    }

    #[test]
    fn non_interactive_approval_rejects() {
        let mut ui = TerminalUi::new(false, false);
        let config = crate::definition::schema::TaskConfig {
            name: "gate".to_string(),
            ..Default::default()
        };
        let task = WorkflowTask::from_config(&config, 0);
        match ui.decide_approval(&task, None).unwrap() {
            ApprovalDecision::Rejected { reason } => {
                assert!(reason.contains("non-interactive"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}

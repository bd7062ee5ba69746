//! User interface abstraction.
//!
//! This module provides:
//! - [`WizardUi`] trait for UI abstraction
//! - [`TerminalUi`] for interactive terminal usage
//! - [`MockUi`] for tests
//!
//! The trait keeps the orchestration engine free of any concrete prompt
//! toolkit; tests drive full sessions through [`MockUi`].

pub mod mock;
pub mod terminal;

pub use mock::MockUi;
pub use terminal::TerminalUi;

use std::time::Duration;

use crate::definition::schema::ControlConfig;
use crate::error::Result;
use crate::form::Value;
use crate::host::StreamRecord;
use crate::orchestrator::pages::BoundField;
use crate::workflow::executor::ApprovalDecision;
use crate::workflow::task::{WorkflowSession, WorkflowTask};

/// Where the user wants to go after a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavChoice {
    Next,
    Back,
    /// Jump to a 1-based step (dashboard sidebar semantics).
    Jump(usize),
    Quit,
}

/// Trait for user interface interactions.
///
/// This trait allows mocking the UI in tests.
pub trait WizardUi {
    /// Check if running in interactive mode.
    fn is_interactive(&self) -> bool;

    /// Display a message to the user.
    fn message(&mut self, msg: &str);

    /// Display a success message.
    fn success(&mut self, msg: &str);

    /// Display a warning message.
    fn warning(&mut self, msg: &str);

    /// Display an error message.
    fn error(&mut self, msg: &str);

    /// Show a page header with step position ("Basics (2/5)").
    fn show_header(&mut self, title: &str, current: usize, total: usize);

    /// Render auxiliary controls (banners, cards, metrics).
    fn show_controls(&mut self, controls: &[ControlConfig]);

    /// Collect a value for one bound field. Non-interactive
    /// implementations resolve from the field's current value instead of
    /// prompting.
    fn prompt_field(&mut self, field: &BoundField) -> Result<Value>;

    /// Ask where to go after the current page.
    fn choose_navigation(
        &mut self,
        at_first: bool,
        at_last: bool,
        step_titles: &[String],
    ) -> Result<NavChoice>;

    /// Display one live stream record from the execution console.
    fn show_stream_line(&mut self, record: &StreamRecord);

    /// Display workflow progress after a status change.
    fn show_workflow_update(&mut self, session: &WorkflowSession);

    /// Resolve an approval gate. Implementations must honor `timeout` by
    /// rejecting when it elapses without a decision.
    fn decide_approval(
        &mut self,
        task: &WorkflowTask,
        timeout: Option<Duration>,
    ) -> Result<ApprovalDecision>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nav_choice_variants() {
        assert_eq!(NavChoice::Jump(3), NavChoice::Jump(3));
        assert_ne!(NavChoice::Next, NavChoice::Back);
    }
}

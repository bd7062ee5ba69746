//! Page orchestration: presentation state, navigation, cross-step
//! validation.

pub mod navigator;
pub mod pages;
pub mod validation;

pub use navigator::{Navigator, StepFlags, Transition};
pub use pages::{BoundField, DashboardPage, PresentationState, WizardPage, WorkflowPage};
pub use validation::{collect_validation_errors, ValidationReport, Violation};

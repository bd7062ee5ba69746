//! Workflow task execution: runtime model, sequential executor,
//! reboot/resume persistence.

pub mod executor;
pub mod resume;
pub mod task;

pub use executor::{
    ApprovalDecision, ApprovalHandler, WorkflowExecutor, WorkflowOutcome, WorkflowState,
};
pub use resume::ResumeState;
pub use task::{TaskStatus, WorkflowSession, WorkflowTask};

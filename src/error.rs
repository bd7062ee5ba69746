//! Error types for Switchback operations.
//!
//! This module defines [`SwitchbackError`], the primary error type used
//! throughout the application, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Use `SwitchbackError` for domain-specific errors that need distinct handling
//! - Use `anyhow::Error` (via `SwitchbackError::Other`) for unexpected errors
//! - Errors local to one parameter or task are contained at that scope and
//!   logged; only validation and security errors at the whole-run boundary,
//!   and unrecovered task failures, escalate to user-visible blocking states

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for Switchback operations.
#[derive(Debug, Error)]
pub enum SwitchbackError {
    /// Definition file not found at expected location.
    #[error("Definition not found: {path}")]
    DefinitionNotFound { path: PathBuf },

    /// Failed to parse a definition file.
    #[error("Failed to parse definition at {path}: {message}")]
    DefinitionParse { path: PathBuf, message: String },

    /// Malformed step/parameter/task declarations.
    #[error("Invalid definition: {message}")]
    Configuration { message: String },

    /// Aggregated cross-step validation failures. Blocks the finish
    /// transition only; never fatal to the session.
    #[error("Validation failed:\n{summary}")]
    Validation { summary: String },

    /// Integrity hash mismatch or path constraint violation. Execution is
    /// refused outright.
    #[error("Security check failed: {message}")]
    Security { message: String },

    /// The script host reported a runtime failure.
    #[error("Script execution failed: {message}")]
    Execution { message: String },

    /// An individual workflow task failed past its retry/rollback policy.
    #[error("Task '{task}' failed: {message}")]
    Task { task: String, message: String },

    /// A data-source or validation-script evaluation failed. Callers catch
    /// this per-evaluation and keep previous state.
    #[error("Evaluation of '{expression}' failed: {message}")]
    Evaluation {
        expression: String,
        message: String,
    },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Switchback operations.
pub type Result<T> = std::result::Result<T, SwitchbackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_not_found_displays_path() {
        let err = SwitchbackError::DefinitionNotFound {
            path: PathBuf::from("/foo/wizard.yml"),
        };
        assert!(err.to_string().contains("/foo/wizard.yml"));
    }

    #[test]
    fn definition_parse_displays_path_and_message() {
        let err = SwitchbackError::DefinitionParse {
            path: PathBuf::from("/wizard.yml"),
            message: "invalid syntax".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/wizard.yml"));
        assert!(msg.contains("invalid syntax"));
    }

    #[test]
    fn configuration_displays_message() {
        let err = SwitchbackError::Configuration {
            message: "dynamic parameter 'site' has no data source".into(),
        };
        assert!(err.to_string().contains("dynamic parameter 'site'"));
    }

    #[test]
    fn validation_displays_summary() {
        let err = SwitchbackError::Validation {
            summary: "Step 1 'Wizard': 'Name' is required.".into(),
        };
        assert!(err.to_string().contains("'Name' is required."));
    }

    #[test]
    fn security_displays_message() {
        let err = SwitchbackError::Security {
            message: "definition hash mismatch".into(),
        };
        assert!(err.to_string().contains("hash mismatch"));
    }

    #[test]
    fn task_displays_task_and_message() {
        let err = SwitchbackError::Task {
            task: "install_agent".into(),
            message: "exit code 1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("install_agent"));
        assert!(msg.contains("exit code 1"));
    }

    #[test]
    fn evaluation_displays_expression() {
        let err = SwitchbackError::Evaluation {
            expression: "list-sites".into(),
            message: "host unreachable".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("list-sites"));
        assert!(msg.contains("host unreachable"));
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: SwitchbackError = io_err.into();
        assert!(matches!(err, SwitchbackError::Io(_)));
    }

    #[test]
    fn result_type_alias_works() {
        fn returns_error() -> Result<()> {
            Err(SwitchbackError::Configuration {
                message: "test".into(),
            })
        }
        assert!(returns_error().is_err());
    }
}

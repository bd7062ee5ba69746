//! Script host abstraction.
//!
//! The engine never interprets scripts itself. Everything that runs user
//! script code goes through [`ScriptHost`]: the terminal execution console,
//! workflow task bodies, dynamic data sources, and validation scripts.
//!
//! - [`shell::ShellHost`] is the bundled implementation backed by the
//!   system shell.
//! - [`mock::MockHost`] is a scriptable in-memory host for tests.

pub mod mock;
pub mod shell;

pub use mock::MockHost;
pub use shell::ShellHost;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::form::Value;

/// Exit code a task script uses to request a reboot pause. Windows
/// signals this as 3010 (ERROR_SUCCESS_REBOOT_REQUIRED); POSIX exit
/// statuses are eight bits, so the sentinel is 3010 mod 256.
pub const EXIT_REBOOT_REQUIRED: i32 = 194;

/// Exit code a task script uses to report a task-level skip.
pub const EXIT_SKIP_REQUESTED: i32 = 125;

/// Which side channel a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Output,
    Warning,
    Error,
    Verbose,
    Debug,
    Progress,
}

impl StreamKind {
    /// Stable label used in the run log (`[HH:mm:ss] [LEVEL] message`).
    pub fn label(&self) -> &'static str {
        match self {
            StreamKind::Output => "OUTPUT",
            StreamKind::Warning => "WARNING",
            StreamKind::Error => "ERROR",
            StreamKind::Verbose => "VERBOSE",
            StreamKind::Debug => "DEBUG",
            StreamKind::Progress => "PROGRESS",
        }
    }
}

/// One line emitted by a running script, in arrival order.
#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub kind: StreamKind,
    pub text: String,
}

impl StreamRecord {
    pub fn new(kind: StreamKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Callback receiving stream records as they occur.
pub type StreamSink = Box<dyn Fn(StreamRecord) + Send>;

/// Final state of a script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Completed,
    Failed,
    Canceled,
}

/// Result of a completed (or stopped) script run.
#[derive(Debug, Clone)]
pub struct HostOutcome {
    pub state: RunState,
    /// Exit code, when the host has one (None if killed by signal).
    pub exit_code: Option<i32>,
    /// Captured standard-output records, for the result payload.
    pub captured: Vec<String>,
    pub duration: Duration,
}

impl HostOutcome {
    pub fn success(&self) -> bool {
        self.state == RunState::Completed
    }
}

/// Cooperative stop signal shared between the engine and a running host.
///
/// The engine only ever requests a stop; it transitions to Canceled after
/// the host acknowledges by returning.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A script body to execute.
#[derive(Debug, Clone)]
pub enum ScriptSource {
    /// Assembled inline text.
    Inline(String),
    /// Path to a script file, run as-is.
    File(PathBuf),
}

/// Contract the engine requires from whatever interpreter is plugged in.
pub trait ScriptHost: Send + Sync {
    /// Execute a script against the given bindings, delivering stream
    /// records through `sink` in emission order. Honors `cancel`
    /// cooperatively: when it fires, the host stops the run and returns an
    /// outcome with [`RunState::Canceled`].
    fn run(
        &self,
        source: &ScriptSource,
        bindings: &HashMap<String, Value>,
        sink: StreamSink,
        cancel: &CancelToken,
    ) -> Result<HostOutcome>;

    /// One-shot evaluation of a small expression, used by the dynamic
    /// parameter resolver, skip conditions, and validation scripts.
    fn evaluate(&self, expression: &str, bindings: &HashMap<String, Value>) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_starts_clear() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
    }

    #[test]
    fn cancel_token_fires_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_canceled());
    }

    #[test]
    fn stream_kind_labels_are_stable() {
        assert_eq!(StreamKind::Output.label(), "OUTPUT");
        assert_eq!(StreamKind::Warning.label(), "WARNING");
        assert_eq!(StreamKind::Error.label(), "ERROR");
        assert_eq!(StreamKind::Verbose.label(), "VERBOSE");
        assert_eq!(StreamKind::Debug.label(), "DEBUG");
        assert_eq!(StreamKind::Progress.label(), "PROGRESS");
    }

    #[test]
    fn outcome_success_tracks_state() {
        let outcome = HostOutcome {
            state: RunState::Completed,
            exit_code: Some(0),
            captured: vec![],
            duration: Duration::ZERO,
        };
        assert!(outcome.success());

        let failed = HostOutcome {
            state: RunState::Failed,
            ..outcome.clone()
        };
        assert!(!failed.success());
    }
}

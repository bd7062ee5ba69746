//! Workflow task runtime model.

use chrono::{DateTime, Utc};

use crate::definition::schema::{OnError, RejectBehavior, TaskConfig, TaskKind};

/// Status of a workflow task.
///
/// `NotStarted → Running → {Completed | Failed | Skipped | PendingReboot |
/// AwaitingApproval}`; `AwaitingApproval` resolves only via explicit user
/// action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    PendingReboot,
    AwaitingApproval,
    Skipped,
}

impl TaskStatus {
    /// Check if this is a terminal state (no more changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// Counts toward completed progress.
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }

    /// Get a display character for this status.
    pub fn display_char(&self) -> char {
        match self {
            TaskStatus::NotStarted => '○',
            TaskStatus::Running => '◉',
            TaskStatus::Completed => '✓',
            TaskStatus::Failed => '✗',
            TaskStatus::PendingReboot => '↻',
            TaskStatus::AwaitingApproval => '?',
            TaskStatus::Skipped => '⊘',
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::NotStarted => "not started",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::PendingReboot => "pending reboot",
            TaskStatus::AwaitingApproval => "awaiting approval",
            TaskStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// One unit of work with its declared policy and runtime state.
#[derive(Debug, Clone)]
pub struct WorkflowTask {
    pub config: TaskConfig,
    /// Execution order; declaration position when not declared.
    pub order: u32,
    pub status: TaskStatus,
    /// Attempts used so far (1 after the first run).
    pub attempts: u32,
    /// Per-task output buffer, separate from the execution console.
    pub output: Vec<String>,
    /// Fractional progress of the current attempt, 0.0..=1.0.
    pub progress: f64,
    /// Short note shown next to the status ("from previous run", a skip
    /// reason, a failure summary).
    pub note: Option<String>,
}

impl WorkflowTask {
    pub fn from_config(config: &TaskConfig, position: usize) -> Self {
        let order = config.order.unwrap_or(position as u32);
        Self {
            config: config.clone(),
            order,
            status: TaskStatus::NotStarted,
            attempts: 0,
            output: Vec::new(),
            progress: 0.0,
            note: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn title(&self) -> &str {
        self.config.display_title()
    }

    pub fn kind(&self) -> TaskKind {
        self.config.kind
    }

    pub fn on_error(&self) -> OnError {
        self.config.on_error
    }

    pub fn on_reject(&self) -> RejectBehavior {
        self.config.on_reject
    }

    /// Seed the task as completed in an earlier run (reboot resume).
    pub fn seed_completed(&mut self) {
        self.status = TaskStatus::Completed;
        self.progress = 1.0;
        self.note = Some("completed in a previous run".to_string());
    }

    /// Summary line for display.
    pub fn summary_line(&self) -> String {
        match &self.note {
            Some(note) => format!("{} {} ({})", self.status.display_char(), self.title(), note),
            None => format!("{} {}", self.status.display_char(), self.title()),
        }
    }
}

/// An ordered task list plus overall execution flags.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSession {
    pub tasks: Vec<WorkflowTask>,
    pub is_executing: bool,
    pub is_completed: bool,
    pub has_failed: bool,
    /// Reason a reboot was requested, when pausing for one.
    pub pending_reboot: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl WorkflowSession {
    /// Build a session with tasks sorted by ascending order (stable, so
    /// equal orders keep declaration position).
    pub fn new(mut tasks: Vec<WorkflowTask>) -> Self {
        tasks.sort_by_key(|t| t.order);
        Self {
            tasks,
            ..Default::default()
        }
    }

    pub fn task(&self, name: &str) -> Option<&WorkflowTask> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    pub fn task_mut(&mut self, name: &str) -> Option<&mut WorkflowTask> {
        self.tasks.iter_mut().find(|t| t.name() == name)
    }

    /// Names of tasks already in a done state, in order.
    pub fn completed_names(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Overall progress: (done tasks + current task's fraction) / total.
    pub fn overall_progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 1.0;
        }
        let done = self.tasks.iter().filter(|t| t.status.is_done()).count() as f64;
        let current = self
            .tasks
            .iter()
            .find(|t| t.status == TaskStatus::Running)
            .map(|t| t.progress.clamp(0.0, 1.0))
            .unwrap_or(0.0);
        (done + current) / self.tasks.len() as f64
    }

    /// Seed tasks completed in a previous run; returns how many matched.
    pub fn seed_completed(&mut self, names: &[String]) -> usize {
        let mut seeded = 0;
        for name in names {
            if let Some(task) = self.task_mut(name) {
                task.seed_completed();
                seeded += 1;
            }
        }
        seeded
    }
}

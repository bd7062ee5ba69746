//! Sequential workflow task execution.
//!
//! Tasks run strictly in ascending order, one in flight at a time. Each
//! task carries its own retry/timeout/skip/rollback policy; approval gates
//! pause the sequence for an explicit decision; a reboot request persists
//! completed-task state and exits so a relaunch can resume.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::warn;

use crate::definition::schema::{OnError, RejectBehavior, TaskKind};
use crate::error::Result;
use crate::form::{FormData, Value};
use crate::host::{
    CancelToken, HostOutcome, RunState, ScriptHost, ScriptSource, StreamKind, StreamSink,
    EXIT_REBOOT_REQUIRED, EXIT_SKIP_REQUESTED,
};
use crate::interpolation::resolve_template;
use crate::runlog::RunLog;
use crate::workflow::resume::ResumeState;
use crate::workflow::task::{TaskStatus, WorkflowSession, WorkflowTask};

/// Maximum reason re-asks per approval gate. Prevents infinite loops when
/// a handler always returns an empty rejection reason (e.g. a scripted
/// handler in tests).
const MAX_APPROVAL_ASKS: u32 = 100;

/// How an approval gate was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected { reason: String },
}

/// Blocks for a human decision on an approval gate.
///
/// Implementations must honor `timeout` by returning a rejection when it
/// elapses without a decision.
pub trait ApprovalHandler {
    fn decide(
        &mut self,
        task: &WorkflowTask,
        timeout: Option<Duration>,
    ) -> Result<ApprovalDecision>;
}

/// Terminal state of a whole workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Completed,
    Failed,
    Canceled,
    PendingReboot,
}

/// Result of one `execute` call.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub state: WorkflowState,
    pub duration: Duration,
}

/// Result of a single task attempt, before policy is applied.
enum AttemptResult {
    Outcome(HostOutcome),
    TimedOut,
}

/// Sequential task executor.
pub struct WorkflowExecutor<'h> {
    host: &'h dyn ScriptHost,
    base_dir: PathBuf,
    log: RunLog,
    /// Recorded into resume state so a relaunch targets the same file.
    definition_path: PathBuf,
}

impl<'h> WorkflowExecutor<'h> {
    pub fn new(
        host: &'h dyn ScriptHost,
        base_dir: impl Into<PathBuf>,
        definition_path: impl Into<PathBuf>,
        log: RunLog,
    ) -> Self {
        Self {
            host,
            base_dir: base_dir.into(),
            log,
            definition_path: definition_path.into(),
        }
    }

    /// Run every non-completed task in order. Pre-seeded Completed tasks
    /// (reboot resume) are passed over without re-execution.
    pub fn execute(
        &self,
        session: &mut WorkflowSession,
        form: &FormData,
        approvals: &mut dyn ApprovalHandler,
        cancel: &CancelToken,
        mut on_update: impl FnMut(&WorkflowSession),
    ) -> Result<WorkflowOutcome> {
        let start = Instant::now();
        session.is_executing = true;
        session.started_at = Some(Utc::now());
        on_update(session);

        let mut canceled = false;
        let mut halted = false;

        for index in 0..session.tasks.len() {
            if cancel.is_canceled() {
                canceled = true;
                break;
            }
            if session.tasks[index].status == TaskStatus::Completed {
                continue;
            }

            let kind = session.tasks[index].kind();
            let control = match kind {
                TaskKind::ApprovalGate => {
                    self.run_approval_gate(session, index, approvals, &mut on_update)?
                }
                TaskKind::Normal => {
                    self.run_task(session, index, form, cancel, &mut on_update)?
                }
            };

            match control {
                TaskControl::Continue => {}
                TaskControl::Halt => {
                    halted = true;
                    break;
                }
                TaskControl::Canceled => {
                    canceled = true;
                    break;
                }
                TaskControl::PendingReboot => {
                    session.is_executing = false;
                    on_update(session);
                    return Ok(WorkflowOutcome {
                        state: WorkflowState::PendingReboot,
                        duration: start.elapsed(),
                    });
                }
            }
        }

        session.is_executing = false;
        let state = if canceled {
            WorkflowState::Canceled
        } else if session.has_failed || halted {
            WorkflowState::Failed
        } else {
            session.is_completed = true;
            WorkflowState::Completed
        };
        on_update(session);

        Ok(WorkflowOutcome {
            state,
            duration: start.elapsed(),
        })
    }

    /// Approval gates short-circuit execution: suspend until a decision.
    fn run_approval_gate(
        &self,
        session: &mut WorkflowSession,
        index: usize,
        approvals: &mut dyn ApprovalHandler,
        on_update: &mut impl FnMut(&WorkflowSession),
    ) -> Result<TaskControl> {
        {
            let task = &mut session.tasks[index];
            task.status = TaskStatus::AwaitingApproval;
            self.log
                .append("TASK", &format!("{}: awaiting approval", task.name()));
        }
        on_update(session);

        let timeout = session.tasks[index]
            .config
            .approval_timeout_minutes
            .map(|m| Duration::from_secs(m * 60));
        let require_reason = session.tasks[index].config.require_reason;

        let mut asks = 0;
        let decision = loop {
            let decision = approvals.decide(&session.tasks[index], timeout)?;
            asks += 1;
            match &decision {
                ApprovalDecision::Rejected { reason }
                    if require_reason && reason.trim().is_empty() && asks < MAX_APPROVAL_ASKS =>
                {
                    // A rejection without a reason is not accepted; ask again.
                    continue;
                }
                _ => break decision,
            }
        };

        let task = &mut session.tasks[index];
        match decision {
            ApprovalDecision::Approved => {
                task.status = TaskStatus::Completed;
                task.progress = 1.0;
                task.note = Some("approved".to_string());
                self.log.append("TASK", &format!("{}: approved", task.name()));
                on_update(session);
                Ok(TaskControl::Continue)
            }
            ApprovalDecision::Rejected { reason } => {
                let note = if reason.trim().is_empty() {
                    "rejected".to_string()
                } else {
                    format!("rejected: {}", reason.trim())
                };
                self.log
                    .append("TASK", &format!("{}: {}", task.name(), note));
                match task.on_reject() {
                    RejectBehavior::Skip => {
                        task.status = TaskStatus::Skipped;
                        task.note = Some(note);
                        on_update(session);
                        Ok(TaskControl::Continue)
                    }
                    RejectBehavior::Fail => {
                        task.status = TaskStatus::Failed;
                        task.note = Some(note);
                        let control = if task.on_error() == OnError::Continue {
                            TaskControl::Continue
                        } else {
                            session.has_failed = true;
                            TaskControl::Halt
                        };
                        on_update(session);
                        Ok(control)
                    }
                }
            }
        }
    }

    /// Run a normal task through its skip/retry/timeout/rollback policy.
    fn run_task(
        &self,
        session: &mut WorkflowSession,
        index: usize,
        form: &FormData,
        cancel: &CancelToken,
        on_update: &mut impl FnMut(&WorkflowSession),
    ) -> Result<TaskControl> {
        let bindings = self.task_bindings(&session.tasks[index], form)?;

        // Skip condition first: no retries, no rollback.
        if let Some(expr) = session.tasks[index].config.skip_if.clone() {
            match self.host.evaluate(&expr, &bindings) {
                Ok(value) if is_truthy(&value) => {
                    let task = &mut session.tasks[index];
                    let reason = task
                        .config
                        .skip_reason
                        .clone()
                        .unwrap_or_else(|| "skip condition met".to_string());
                    task.status = TaskStatus::Skipped;
                    task.note = Some(reason.clone());
                    self.log
                        .append("TASK", &format!("{}: skipped ({})", task.name(), reason));
                    on_update(session);
                    return Ok(TaskControl::Continue);
                }
                Ok(_) => {}
                Err(e) => {
                    // Contained: an unevaluable condition does not skip.
                    warn!(
                        "skip condition for '{}' failed to evaluate: {}",
                        session.tasks[index].name(),
                        e
                    );
                }
            }
        }

        let source = self.task_source(&session.tasks[index], form)?;
        let total_attempts = session.tasks[index].config.retry + 1;
        let retry_delay =
            Duration::from_secs(session.tasks[index].config.retry_delay_seconds);
        let timeout = match session.tasks[index].config.timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        loop {
            {
                let task = &mut session.tasks[index];
                task.status = TaskStatus::Running;
                task.attempts += 1;
                task.progress = 0.0;
                self.log.append(
                    "TASK",
                    &format!(
                        "{}: starting (attempt {}/{})",
                        task.name(),
                        task.attempts,
                        total_attempts
                    ),
                );
            }
            on_update(session);

            let attempt = self.run_attempt(session, index, &source, &bindings, timeout, cancel)?;

            let failure_note = match attempt {
                AttemptResult::Outcome(outcome) => match outcome.state {
                    RunState::Canceled => {
                        let task = &mut session.tasks[index];
                        task.status = TaskStatus::Failed;
                        task.note = Some("canceled".to_string());
                        self.log
                            .append("TASK", &format!("{}: canceled", task.name()));
                        on_update(session);
                        return Ok(TaskControl::Canceled);
                    }
                    _ if outcome.exit_code == Some(EXIT_REBOOT_REQUIRED) => {
                        return self.pause_for_reboot(session, index, on_update);
                    }
                    _ if outcome.exit_code == Some(EXIT_SKIP_REQUESTED) => {
                        let task = &mut session.tasks[index];
                        task.status = TaskStatus::Skipped;
                        task.note = Some("skip requested by task".to_string());
                        self.log
                            .append("TASK", &format!("{}: skip requested", task.name()));
                        on_update(session);
                        return Ok(TaskControl::Continue);
                    }
                    RunState::Completed => {
                        let task = &mut session.tasks[index];
                        task.status = TaskStatus::Completed;
                        task.progress = 1.0;
                        if task.attempts > 1 {
                            task.note =
                                Some(format!("succeeded on attempt {}", task.attempts));
                        }
                        self.log
                            .append("TASK", &format!("{}: completed", task.name()));
                        on_update(session);
                        return Ok(TaskControl::Continue);
                    }
                    RunState::Failed => {
                        format!("exit code {:?}", outcome.exit_code)
                    }
                },
                AttemptResult::TimedOut => "timed out".to_string(),
            };

            // Failure path: retry while attempts remain.
            if session.tasks[index].attempts < total_attempts {
                self.log.append(
                    "TASK",
                    &format!(
                        "{}: failed ({}), retrying in {}s",
                        session.tasks[index].name(),
                        failure_note,
                        retry_delay.as_secs()
                    ),
                );
                if !retry_delay.is_zero() {
                    thread::sleep(retry_delay);
                }
                continue;
            }

            // Retries exhausted: best-effort rollback, then policy.
            if session.tasks[index].config.has_rollback() {
                self.run_rollback(&session.tasks[index], &bindings);
            }

            let task = &mut session.tasks[index];
            task.status = TaskStatus::Failed;
            task.note = Some(failure_note.clone());
            self.log
                .append("TASK", &format!("{}: failed ({})", task.name(), failure_note));

            let control = if task.on_error() == OnError::Continue {
                TaskControl::Continue
            } else {
                session.has_failed = true;
                TaskControl::Halt
            };
            on_update(session);
            return Ok(control);
        }
    }

    /// One attempt: the host run races a timeout timer; on expiry the run
    /// is cancelled cooperatively and reported as [`AttemptResult::TimedOut`].
    fn run_attempt(
        &self,
        session: &mut WorkflowSession,
        index: usize,
        source: &ScriptSource,
        bindings: &HashMap<String, Value>,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<AttemptResult> {
        let attempt_cancel = CancelToken::new();
        let buffer: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let progress: Arc<Mutex<f64>> = Arc::new(Mutex::new(0.0));

        let sink: StreamSink = {
            let buffer = Arc::clone(&buffer);
            let progress = Arc::clone(&progress);
            let log = self.log.clone();
            Box::new(move |record| {
                if record.kind == StreamKind::Progress {
                    if let Some(fraction) = parse_progress(&record.text) {
                        *progress.lock().unwrap() = fraction;
                    }
                }
                buffer.lock().unwrap().push(record.text.clone());
                log.record(&record);
            })
        };

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut timed_out = false;

        let result = thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            let host = self.host;
            let worker_cancel = attempt_cancel.clone();
            scope.spawn(move || {
                let _ = tx.send(host.run(source, bindings, sink, &worker_cancel));
            });

            loop {
                if cancel.is_canceled() {
                    attempt_cancel.cancel();
                }
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline && !timed_out {
                        timed_out = true;
                        attempt_cancel.cancel();
                    }
                }
                match rx.recv_timeout(Duration::from_millis(25)) {
                    Ok(result) => break result,
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        break Err(crate::error::SwitchbackError::Execution {
                            message: "script host worker vanished".to_string(),
                        })
                    }
                }
            }
        });

        let outcome = result?;

        let task = &mut session.tasks[index];
        task.output.extend(buffer.lock().unwrap().drain(..));
        task.progress = *progress.lock().unwrap();

        if timed_out && !cancel.is_canceled() {
            return Ok(AttemptResult::TimedOut);
        }
        Ok(AttemptResult::Outcome(outcome))
    }

    /// Persist completed-task state and pause the session.
    fn pause_for_reboot(
        &self,
        session: &mut WorkflowSession,
        index: usize,
        on_update: &mut impl FnMut(&WorkflowSession),
    ) -> Result<TaskControl> {
        let name = session.tasks[index].name().to_string();
        let reason = format!("task '{}' requested a reboot", name);
        let completed = session.completed_names();

        ResumeState {
            definition_path: self.definition_path.clone(),
            completed_tasks: completed,
            pending_task: name.clone(),
            reason: reason.clone(),
            timestamp: Utc::now(),
        }
        .save()?;

        let task = &mut session.tasks[index];
        task.status = TaskStatus::PendingReboot;
        task.note = Some("reboot required".to_string());
        self.log
            .append("TASK", &format!("{}: pending reboot", name));
        session.pending_reboot = Some(reason);
        on_update(session);
        Ok(TaskControl::PendingReboot)
    }

    /// Rollback is best-effort: failures are logged, never re-raised.
    fn run_rollback(&self, task: &WorkflowTask, bindings: &HashMap<String, Value>) {
        let source = if let Some(body) = &task.config.rollback {
            ScriptSource::Inline(body.clone())
        } else if let Some(path) = &task.config.rollback_path {
            ScriptSource::File(self.base_dir.join(path))
        } else {
            return;
        };

        self.log
            .append("TASK", &format!("{}: running rollback", task.name()));
        let log = self.log.clone();
        let sink: StreamSink = Box::new(move |record| log.record(&record));

        match self.host.run(&source, bindings, sink, &CancelToken::new()) {
            Ok(outcome) if outcome.success() => {
                self.log
                    .append("TASK", &format!("{}: rollback completed", task.name()));
            }
            Ok(outcome) => {
                warn!(
                    "rollback for '{}' failed with exit code {:?}",
                    task.name(),
                    outcome.exit_code
                );
                self.log
                    .append("TASK", &format!("{}: rollback failed", task.name()));
            }
            Err(e) => {
                warn!("rollback for '{}' errored: {}", task.name(), e);
                self.log
                    .append("TASK", &format!("{}: rollback errored: {}", task.name(), e));
            }
        }
    }

    /// Wizard form values plus task arguments (template-substituted).
    fn task_bindings(
        &self,
        task: &WorkflowTask,
        form: &FormData,
    ) -> Result<HashMap<String, Value>> {
        let mut bindings = form.bindings();
        for (name, template) in &task.config.args {
            let resolved = resolve_template(template, form)?;
            bindings.insert(name.clone(), Value::Text(resolved));
        }
        Ok(bindings)
    }

    fn task_source(&self, task: &WorkflowTask, form: &FormData) -> Result<ScriptSource> {
        if let Some(body) = &task.config.script {
            Ok(ScriptSource::Inline(resolve_template(body, form)?))
        } else if let Some(path) = &task.config.script_path {
            Ok(ScriptSource::File(self.base_dir.join(path)))
        } else {
            Err(crate::error::SwitchbackError::Configuration {
                message: format!("task '{}' has no script", task.name()),
            })
        }
    }
}

/// Flow control after one task resolved.
enum TaskControl {
    Continue,
    Halt,
    Canceled,
    PendingReboot,
}

/// Progress stream lines carry a percentage (`50` or `50%`).
fn parse_progress(text: &str) -> Option<f64> {
    let cleaned = text.trim().trim_end_matches('%').trim();
    cleaned
        .parse::<f64>()
        .ok()
        .map(|p| (p / 100.0).clamp(0.0, 1.0))
}

/// Truthiness of a skip-condition result.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => *n != 0.0,
        Value::List(items) => !items.is_empty(),
        Value::Secret(_) => false,
    }
}

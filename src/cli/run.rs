//! The `run` command: drive a loaded definition end to end.
//!
//! Walks the page sequence through the [`WizardUi`], keeps FormData and
//! dynamic choice lists current, executes workflow pages through the
//! task executor, and finishes into the execution console.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::Local;
use tracing::debug;

use crate::console::ConsoleController;
use crate::definition::loader::{self, LoadedDefinition};
use crate::definition::schema::{PageKind, ParamKind, ParameterConfig};
use crate::error::{Result, SwitchbackError};
use crate::form::{FormData, SecretValue, Value};
use crate::host::{CancelToken, RunState, ScriptHost, ShellHost, StreamRecord};
use crate::orchestrator::navigator::{Navigator, Transition};
use crate::orchestrator::pages::PresentationState;
use crate::resolver::ChoiceResolver;
use crate::runlog::RunLog;
use crate::secrets::OutputMasker;
use crate::ui::{NavChoice, WizardUi};
use crate::workflow::executor::{ApprovalDecision, ApprovalHandler, WorkflowExecutor, WorkflowState};
use crate::workflow::resume::ResumeState;
use crate::workflow::task::{TaskStatus, WorkflowSession, WorkflowTask};

/// Exit code when a workflow paused for a reboot.
pub const EXIT_PENDING_REBOOT: i32 = 2;

/// Inputs for one launcher session.
#[derive(Debug, Default)]
pub struct SessionOptions {
    pub definition: PathBuf,
    /// Pre-set `name=value` pairs.
    pub set: Vec<String>,
    /// Resume state from a reboot pause, when relaunching.
    pub resume: Option<ResumeState>,
    pub log_dir: Option<PathBuf>,
}

/// Bridges approval gates to the UI behind a shared cell so progress
/// updates and approvals can interleave on the same UI.
struct UiApprovals<'a, 'b> {
    ui: &'a RefCell<&'b mut dyn WizardUi>,
}

impl ApprovalHandler for UiApprovals<'_, '_> {
    fn decide(
        &mut self,
        task: &WorkflowTask,
        timeout: Option<Duration>,
    ) -> Result<ApprovalDecision> {
        self.ui.borrow_mut().decide_approval(task, timeout)
    }
}

/// Run a full launcher session. Returns the process exit code.
pub fn run_session(options: &SessionOptions, ui: &mut dyn WizardUi) -> Result<i32> {
    let loaded = loader::load(&options.definition)?;
    let base_dir = options
        .definition
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let host = ShellHost::with_workdir(&base_dir);
    let mut form = FormData::new();
    apply_set_pairs(&options.set, &loaded, &mut form)?;

    let mut resolver = ChoiceResolver::new(&host, &base_dir);
    for step in loaded.steps() {
        for param in &step.parameters {
            if param.dynamic {
                resolver.register(
                    &param.name,
                    param.source.as_deref().unwrap_or(""),
                    &param.depends_on,
                )?;
            }
        }
    }

    let steps = loaded.steps().to_vec();
    let step_titles: Vec<String> = steps.iter().map(|s| s.title.clone()).collect();
    let mut nav = Navigator::new(steps, &base_dir);

    if let Some(title) = &loaded.definition.title {
        ui.message(&format!("── {} ──", title));
    }

    // Reboot resume (or a definition-level flag) jumps straight to the
    // workflow step.
    if options.resume.is_some() || loaded.definition.skip_to_workflow {
        if let Some(pos) = loaded
            .steps()
            .iter()
            .position(|s| s.page == PageKind::Workflow)
        {
            nav.enter_current(&form);
            nav.navigate_to(pos + 1, &mut form);
            debug!("skipping to workflow step {}", pos + 1);
        }
    }

    loop {
        let index = nav.current_index();
        let step = nav.current_step_config().clone();
        nav.enter_current(&form);

        // First-visit population and dependency-consistent refresh.
        let declared: Vec<String> = step.parameters.iter().map(|p| p.name.clone()).collect();
        let refreshed = resolver.refresh_all(&declared, &form);
        if let Some(page) = nav.current_page_mut() {
            page.apply_choices(&refreshed);
        }

        ui.show_header(&step.title, index, nav.len());
        if let Some(description) = &step.description {
            ui.message(description);
        }

        match step.page {
            PageKind::Wizard | PageKind::Dashboard => {
                if let Some(page) = nav.current_page() {
                    match page {
                        PresentationState::Wizard(p) => ui.show_controls(&p.controls),
                        PresentationState::Dashboard(p) => ui.show_controls(&p.controls),
                        PresentationState::Workflow(_) => {}
                    }
                }
                prompt_fields(&mut nav, &resolver, &mut form, ui)?;
            }
            PageKind::Workflow => {
                let code = run_workflow_page(
                    &mut nav, &loaded, &host, &base_dir, &form, options, ui,
                )?;
                if let Some(code) = code {
                    return Ok(code);
                }
            }
        }

        // Dashboards allow free jumps; other pages navigate linearly.
        let jump_titles: &[String] = if step.page == PageKind::Dashboard {
            &step_titles
        } else {
            &[]
        };
        match ui.choose_navigation(index == 1, nav.is_last(), jump_titles)? {
            NavChoice::Next => match nav.next(&mut form, &host) {
                Transition::Finish => {
                    return finish(&loaded, &host, &base_dir, &form, options, ui);
                }
                Transition::Blocked(report) => {
                    ui.error("Validation failed:");
                    for violation in &report.violations {
                        ui.error(&format!("  {}", violation));
                    }
                    // Headless runs cannot fix fields; bail instead of
                    // looping on the same page.
                    if !ui.is_interactive() {
                        return Err(SwitchbackError::Validation {
                            summary: report.summary(),
                        });
                    }
                }
                Transition::Moved(_) => {}
            },
            NavChoice::Back => {
                nav.previous(&mut form);
            }
            NavChoice::Jump(target) => {
                nav.navigate_to(target, &mut form);
            }
            NavChoice::Quit => {
                ui.message("Aborted.");
                return Ok(0);
            }
        }
    }
}

/// Prompt every field on the current page, committing each value and
/// cascading dependent choice refreshes as values change.
fn prompt_fields(
    nav: &mut Navigator,
    resolver: &ChoiceResolver<'_>,
    form: &mut FormData,
    ui: &mut dyn WizardUi,
) -> Result<()> {
    let field_count = nav
        .current_page()
        .map(|p| p.fields().len())
        .unwrap_or(0);

    for i in 0..field_count {
        // Re-fetch each time: an earlier field's change may have replaced
        // this field's choice list.
        let field = match nav.current_page() {
            Some(page) => page.fields()[i].clone(),
            None => break,
        };
        let value = ui.prompt_field(&field)?;
        let changed = form.get(&field.name) != Some(&value);
        nav.set_field_value(&field.name, value, form);

        if changed {
            let refreshed = resolver.on_value_changed(&field.name, form);
            if !refreshed.is_empty() {
                if let Some(page) = nav.current_page_mut() {
                    page.apply_choices(&refreshed);
                }
            }
        }
    }
    Ok(())
}

/// Run a workflow session's tasks to completion, bridging approval gates
/// and progress updates back through `ui` via a shared cell.
fn execute_workflow_tasks(
    executor: &WorkflowExecutor,
    session: &mut WorkflowSession,
    form: &FormData,
    cancel: &CancelToken,
    ui: &mut dyn WizardUi,
) -> Result<crate::workflow::executor::WorkflowOutcome> {
    let ui_cell = RefCell::new(ui);
    let mut approvals = UiApprovals { ui: &ui_cell };
    executor.execute(session, form, &mut approvals, cancel, |s| {
        ui_cell.borrow_mut().show_workflow_update(s);
    })
}

/// Execute the tasks of the current workflow page, unless they already
/// ran. Returns an exit code when the whole session should end here.
fn run_workflow_page(
    nav: &mut Navigator,
    loaded: &LoadedDefinition,
    host: &dyn ScriptHost,
    base_dir: &Path,
    form: &FormData,
    options: &SessionOptions,
    ui: &mut dyn WizardUi,
) -> Result<Option<i32>> {
    let tasks = match nav.current_page() {
        Some(PresentationState::Workflow(page)) => page.tasks.clone(),
        _ => return Ok(None),
    };
    if tasks.iter().all(|t| t.status.is_terminal()) {
        return Ok(None);
    }

    let mut session = WorkflowSession::new(tasks);
    if let Some(resume) = &options.resume {
        // The task that requested the reboot counts as done on relaunch:
        // the reboot it asked for has happened.
        let mut done = resume.completed_tasks.clone();
        if !done.contains(&resume.pending_task) {
            done.push(resume.pending_task.clone());
        }
        let seeded = session.seed_completed(&done);
        if seeded > 0 {
            ui.message(&format!("Resuming: {} task(s) already completed.", seeded));
        }
    }

    let log_dir = options
        .log_dir
        .clone()
        .or_else(|| loaded.definition.log_dir.clone())
        .unwrap_or_else(|| base_dir.to_path_buf());
    let log_path = log_dir.join(format!(
        "switchback-workflow-{}.log",
        Local::now().format("%Y%m%d-%H%M%S")
    ));
    let log = RunLog::create(&log_path, "WORKFLOW", OutputMasker::from_form(form))?;

    let executor = WorkflowExecutor::new(host, base_dir, &loaded.source_path, log.clone());
    let cancel = CancelToken::new();

    let outcome = execute_workflow_tasks(&executor, &mut session, form, &cancel, ui)?;
    log.close();

    // Reflect final task state back into the cached page.
    if let Some(PresentationState::Workflow(page)) = nav.current_page_mut() {
        page.tasks = session.tasks.clone();
    }

    match outcome.state {
        WorkflowState::PendingReboot => {
            ui.warning("A task requested a reboot.");
            ui.message("After restarting, run `switchback resume` to continue.");
            Ok(Some(EXIT_PENDING_REBOOT))
        }
        WorkflowState::Failed => {
            let failed = session
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Failed)
                .count();
            ui.error(&format!("Workflow failed ({} task(s) failed).", failed));
            if ui.is_interactive() {
                // The user may inspect task output and navigate away.
                Ok(None)
            } else {
                let first_failed = session
                    .tasks
                    .iter()
                    .find(|t| t.status == TaskStatus::Failed);
                Err(SwitchbackError::Task {
                    task: first_failed.map(|t| t.name().to_string()).unwrap_or_default(),
                    message: first_failed
                        .and_then(|t| t.note.clone())
                        .unwrap_or_else(|| "task failed".to_string()),
                })
            }
        }
        WorkflowState::Canceled => {
            ui.warning("Workflow canceled.");
            if ui.is_interactive() {
                Ok(None)
            } else {
                Ok(Some(130))
            }
        }
        WorkflowState::Completed => {
            if options.resume.is_some() {
                ResumeState::clear().map_err(SwitchbackError::Other)?;
            }
            ui.success("Workflow completed.");
            Ok(None)
        }
    }
}

/// The terminal execution console: run the assembled script with live
/// streaming, then emit the result payload on stdout.
fn finish(
    loaded: &LoadedDefinition,
    host: &dyn ScriptHost,
    base_dir: &Path,
    form: &FormData,
    options: &SessionOptions,
    ui: &mut dyn WizardUi,
) -> Result<i32> {
    // Definitions without a terminal script (pure workflow launchers)
    // finish after the last page.
    if loaded.definition.script.is_none() {
        ui.success("Done.");
        return Ok(0);
    }

    let controller =
        ConsoleController::new(host, base_dir).with_log_dir(options.log_dir.clone());
    let cancel = CancelToken::new();

    let (tx, rx) = mpsc::channel::<StreamRecord>();
    let outcome = thread::scope(|scope| {
        let worker = scope.spawn(|| {
            controller.run(loaded, form, &cancel, move |record| {
                let _ = tx.send(record.clone());
            })
        });
        for record in rx {
            ui.show_stream_line(&record);
        }
        worker.join().unwrap_or_else(|_| {
            Err(SwitchbackError::Execution {
                message: "execution console worker panicked".to_string(),
            })
        })
    })?;

    ui.message(&format!("Log: {}", outcome.log_path.display()));
    match outcome.state {
        RunState::Completed => {
            ui.success("Run completed.");
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome.payload).unwrap_or_default()
            );
            Ok(0)
        }
        RunState::Failed => {
            ui.error("Run failed; see the log for details.");
            Ok(1)
        }
        RunState::Canceled => {
            ui.warning("Run canceled.");
            Ok(130)
        }
    }
}

/// Commit `name=value` pairs, coercing each to its declared kind.
fn apply_set_pairs(
    pairs: &[String],
    loaded: &LoadedDefinition,
    form: &mut FormData,
) -> Result<()> {
    let mut params: HashMap<&str, &ParameterConfig> = HashMap::new();
    for step in loaded.steps() {
        for param in &step.parameters {
            params.insert(param.name.as_str(), param);
        }
    }

    for pair in pairs {
        let Some((name, raw)) = pair.split_once('=') else {
            return Err(SwitchbackError::Configuration {
                message: format!("--set expects NAME=VALUE, got '{}'", pair),
            });
        };
        let Some(param) = params.get(name) else {
            return Err(SwitchbackError::Configuration {
                message: format!("--set names unknown parameter '{}'", name),
            });
        };
        form.commit(name, coerce_value(param.kind, raw));
    }
    Ok(())
}

fn coerce_value(kind: ParamKind, raw: &str) -> Value {
    match kind {
        ParamKind::Bool | ParamKind::Switch => {
            let truthy = matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes");
            Value::Bool(truthy)
        }
        ParamKind::Number => raw
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::Text(raw.to_string())),
        ParamKind::List => Value::List(
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        ParamKind::Secret => Value::Secret(SecretValue::new(raw)),
        _ => Value::Text(raw.to_string()),
    }
}

//! Execution console controller.
//!
//! Runs the fully assembled terminal script exactly once per finish
//! action: re-verifies the definition's integrity hash, builds the
//! parameter bindings from the final FormData snapshot, multiplexes every
//! stream into one ordered console/log feed, and classifies the outcome.
//! The log sink is closed on every exit path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;

use crate::definition::loader::LoadedDefinition;
use crate::error::{Result, SwitchbackError};
use crate::form::{FormData, Value};
use crate::host::{
    CancelToken, RunState, ScriptHost, ScriptSource, StreamKind, StreamRecord, StreamSink,
};
use crate::interpolation::resolve_template;
use crate::runlog::RunLog;
use crate::secrets::OutputMasker;

/// Result of one execution console run.
#[derive(Debug)]
pub struct ConsoleOutcome {
    pub state: RunState,
    /// Every stream record, in arrival order across all streams.
    pub lines: Vec<StreamRecord>,
    /// FormData (secrets excluded) plus captured output, for embedding
    /// callers.
    pub payload: serde_json::Value,
    pub log_path: PathBuf,
    pub duration: Duration,
}

/// Wraps the script host for the terminal "run the whole script" step.
pub struct ConsoleController<'h> {
    host: &'h dyn ScriptHost,
    base_dir: PathBuf,
    log_dir: Option<PathBuf>,
}

impl<'h> ConsoleController<'h> {
    pub fn new(host: &'h dyn ScriptHost, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            host,
            base_dir: base_dir.into(),
            log_dir: None,
        }
    }

    /// Override the log directory (takes precedence over the definition's
    /// `log_dir`).
    pub fn with_log_dir(mut self, log_dir: Option<PathBuf>) -> Self {
        self.log_dir = log_dir;
        self
    }

    /// Execute the terminal script. `on_line` receives each record as it
    /// arrives, for live display.
    pub fn run(
        &self,
        loaded: &LoadedDefinition,
        form: &FormData,
        cancel: &CancelToken,
        on_line: impl Fn(&StreamRecord) + Send + 'static,
    ) -> Result<ConsoleOutcome> {
        // Tamper protection: refuse to run a definition whose source
        // changed since load.
        loaded.verify_integrity()?;

        let source = self.assemble_source(loaded, form)?;
        let bindings = build_bindings(loaded, form);

        let log_dir = self
            .log_dir
            .clone()
            .or_else(|| loaded.definition.log_dir.clone())
            .unwrap_or_else(|| self.base_dir.clone());
        let log_path = log_dir.join(format!(
            "switchback-run-{}.log",
            Local::now().format("%Y%m%d-%H%M%S")
        ));
        let log = RunLog::create(&log_path, "EXECUTION", OutputMasker::from_form(form))?;

        let lines: Arc<Mutex<Vec<StreamRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let error_seen = Arc::new(Mutex::new(false));
        let masker = Arc::new(OutputMasker::from_form(form));

        let sink: StreamSink = {
            let lines = Arc::clone(&lines);
            let error_seen = Arc::clone(&error_seen);
            let masker = Arc::clone(&masker);
            let log = log.clone();
            Box::new(move |record| {
                // Secrets never reach the live console either.
                let record = StreamRecord::new(record.kind, masker.mask(&record.text));
                if record.kind == StreamKind::Error {
                    *error_seen.lock().unwrap() = true;
                }
                log.record(&record);
                on_line(&record);
                lines.lock().unwrap().push(record);
            })
        };

        let result = self.host.run(&source, &bindings, sink, cancel);

        // The log is closed before any error propagates.
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                log.append("CONSOLE", &format!("run errored: {}", e));
                log.close();
                return Err(e);
            }
        };

        let error_seen = *error_seen.lock().unwrap();
        let state = match outcome.state {
            RunState::Canceled => RunState::Canceled,
            RunState::Failed => RunState::Failed,
            RunState::Completed if error_seen => RunState::Failed,
            RunState::Completed => RunState::Completed,
        };

        log.append(
            "CONSOLE",
            match state {
                RunState::Completed => "run completed",
                RunState::Failed => "run failed",
                RunState::Canceled => "run canceled",
            },
        );
        log.close();

        let lines = lines.lock().unwrap().clone();
        let captured: Vec<String> = outcome.captured.iter().map(|l| masker.mask(l)).collect();

        Ok(ConsoleOutcome {
            state,
            lines,
            payload: form.result_payload(&captured),
            log_path,
            duration: outcome.duration,
        })
    }

    /// Combine the script body with the final FormData snapshot.
    fn assemble_source(
        &self,
        loaded: &LoadedDefinition,
        form: &FormData,
    ) -> Result<ScriptSource> {
        let spec = loaded
            .definition
            .script
            .as_ref()
            .ok_or_else(|| SwitchbackError::Configuration {
                message: "definition declares no terminal script".to_string(),
            })?;

        if let Some(template) = &spec.template {
            Ok(ScriptSource::Inline(resolve_template(template, form)?))
        } else if let Some(path) = &spec.path {
            Ok(ScriptSource::File(self.base_dir.join(path)))
        } else {
            Err(SwitchbackError::Configuration {
                message: "script must set either 'template' or 'path'".to_string(),
            })
        }
    }
}

/// Parameter bindings for the terminal invocation.
///
/// Exclusions: placeholder parameters are never bound; optional parameters
/// with an empty (or absent) value are omitted so the script's own default
/// applies; boolean/switch parameters bind only when true.
fn build_bindings(loaded: &LoadedDefinition, form: &FormData) -> HashMap<String, Value> {
    let mut bindings = HashMap::new();
    for step in loaded.steps() {
        for param in &step.parameters {
            if param.placeholder {
                continue;
            }
            let Some(value) = form.get(&param.name) else {
                continue;
            };
            if param.kind.is_boolean() {
                if value.is_true() {
                    bindings.insert(param.name.clone(), value.clone());
                }
                continue;
            }
            if !param.mandatory && value.is_empty() {
                continue;
            }
            bindings.insert(param.name.clone(), value.clone());
        }
    }
    bindings
}

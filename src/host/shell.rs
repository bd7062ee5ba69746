//! Process-backed script host.
//!
//! Runs script bodies through the system shell with one reader thread per
//! pipe and a single mpsc channel preserving arrival order across streams.
//! Scripts route lines to side channels with an `@kind ` prefix
//! (`@warning`, `@verbose`, `@debug`, `@progress`); bare stdout lines are
//! Output and stderr lines are Error.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, SwitchbackError};
use crate::form::Value;

use super::{CancelToken, HostOutcome, RunState, ScriptHost, ScriptSource, StreamKind, StreamRecord, StreamSink};

/// How often the run loop checks the cancel token while the child lives.
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Script host backed by the system shell.
#[derive(Debug, Default)]
pub struct ShellHost {
    /// Working directory for spawned scripts (inherited if None).
    pub workdir: Option<std::path::PathBuf>,
}

impl ShellHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workdir(workdir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            workdir: Some(workdir.into()),
        }
    }

    fn command_for(&self, body: &str, bindings: &HashMap<String, Value>) -> Command {
        let shell = detect_shell();
        let mut cmd = Command::new(&shell);
        cmd.arg(shell_flag());
        cmd.arg(body);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        for (name, value) in bindings {
            cmd.env(name, value.as_binding_string());
        }
        // Own process group, so a stop request reaches grandchildren and
        // their pipe handles too.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

impl ScriptHost for ShellHost {
    fn run(
        &self,
        source: &ScriptSource,
        bindings: &HashMap<String, Value>,
        sink: StreamSink,
        cancel: &CancelToken,
    ) -> Result<HostOutcome> {
        let start = Instant::now();
        let body = match source {
            ScriptSource::Inline(text) => text.clone(),
            ScriptSource::File(path) => std::fs::read_to_string(path)?,
        };

        let mut cmd = self.command_for(&body, bindings);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| SwitchbackError::Execution {
            message: format!("failed to spawn script host shell: {}", e),
        })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let (tx, rx) = mpsc::channel::<StreamRecord>();
        let tx_err = tx.clone();

        let stdout_handle = thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(std::result::Result::ok) {
                let _ = tx.send(classify_stdout_line(&line));
            }
        });
        let stderr_handle = thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(std::result::Result::ok) {
                let _ = tx_err.send(StreamRecord::new(StreamKind::Error, line));
            }
        });

        // Pump records in arrival order while watching for a stop request.
        let mut captured = Vec::new();
        let mut stop_sent = false;
        loop {
            if cancel.is_canceled() && !stop_sent {
                request_stop(&mut child);
                stop_sent = true;
            }
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(record) => {
                    if record.kind == StreamKind::Output {
                        captured.push(record.text.clone());
                    }
                    sink(record);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let _ = stdout_handle.join();
        let _ = stderr_handle.join();

        let status = child.wait().map_err(|e| SwitchbackError::Execution {
            message: format!("failed to reap script host shell: {}", e),
        })?;

        let state = if cancel.is_canceled() {
            RunState::Canceled
        } else if status.success() {
            RunState::Completed
        } else {
            RunState::Failed
        };

        Ok(HostOutcome {
            state,
            exit_code: status.code(),
            captured,
            duration: start.elapsed(),
        })
    }

    fn evaluate(&self, expression: &str, bindings: &HashMap<String, Value>) -> Result<Value> {
        let mut cmd = self.command_for(expression, bindings);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd.output().map_err(|e| SwitchbackError::Evaluation {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SwitchbackError::Evaluation {
                expression: expression.to_string(),
                message: format!(
                    "exit code {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }

        Ok(coerce_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Route an stdout line to its stream.
fn classify_stdout_line(line: &str) -> StreamRecord {
    for (prefix, kind) in [
        ("@warning ", StreamKind::Warning),
        ("@verbose ", StreamKind::Verbose),
        ("@debug ", StreamKind::Debug),
        ("@progress ", StreamKind::Progress),
    ] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return StreamRecord::new(kind, rest);
        }
    }
    StreamRecord::new(StreamKind::Output, line)
}

/// Coerce captured expression output into a [`Value`].
fn coerce_output(raw: &str) -> Value {
    let trimmed = raw.trim_end_matches('\n').trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if trimmed.contains('\n') {
        return Value::List(
            trimmed
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
        );
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if !trimmed.is_empty() {
            return Value::Number(n);
        }
    }
    Value::Text(trimmed.to_string())
}

/// Ask the child to stop. SIGTERM to the whole process group on Unix so
/// traps can run; hard kill elsewhere.
fn request_stop(child: &mut Child) {
    #[cfg(unix)]
    {
        unsafe {
            libc::kill(-(child.id() as libc::pid_t), libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
}

/// Detect the current shell.
fn detect_shell() -> String {
    if cfg!(target_os = "windows") {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

/// Flag used to pass script bodies to the shell. Login shell on Unix so
/// user-activated tools are on PATH.
fn shell_flag() -> &'static str {
    if cfg!(target_os = "windows") {
        "/C"
    } else {
        "-lc"
    }
}

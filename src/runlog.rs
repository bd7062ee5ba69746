//! Structured run log sink.
//!
//! One newline-delimited text file per execution or workflow run. The line
//! format is stable and consumed by external log viewers:
//!
//! ```text
//! ==== 2024-03-01 14:05:12 EXECUTION START ====
//! [14:05:12] [OUTPUT] provisioning host01
//! [14:05:13] [ERROR] disk full
//! ==== 2024-03-01 14:05:13 EXECUTION END ====
//! ```
//!
//! A single mutex guards the writer so console lines and workflow lines
//! interleave without corrupting the file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;

use crate::error::Result;
use crate::host::StreamRecord;
use crate::secrets::OutputMasker;

struct LogInner {
    writer: BufWriter<File>,
    masker: OutputMasker,
    closed: bool,
    header: String,
}

/// Shared handle to one run's structured log file.
#[derive(Clone)]
pub struct RunLog {
    path: PathBuf,
    inner: Arc<Mutex<LogInner>>,
}

impl RunLog {
    /// Create the log file and write the session start separator.
    pub fn create(path: &Path, header: &str, masker: OutputMasker) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "==== {} {} START ====",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            header
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: Arc::new(Mutex::new(LogInner {
                writer,
                masker,
                closed: false,
                header: header.to_string(),
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one tagged line: `[HH:mm:ss] [LEVEL] message`.
    pub fn append(&self, level: &str, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        let masked = inner.masker.mask(message);
        let _ = writeln!(
            inner.writer,
            "[{}] [{}] {}",
            Local::now().format("%H:%M:%S"),
            level,
            masked
        );
    }

    /// Append a stream record with its stream-kind label.
    pub fn record(&self, record: &StreamRecord) {
        self.append(record.kind.label(), &record.text);
    }

    /// Write the session end separator and flush. Idempotent; also runs on
    /// drop if nobody called it, so every exit path leaves a closed log.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        inner.closed = true;
        let header = inner.header.clone();
        let _ = writeln!(
            inner.writer,
            "==== {} {} END ====",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            header
        );
        let _ = inner.writer.flush();
    }
}

impl Drop for LogInner {
    fn drop(&mut self) {
        if !self.closed {
            let _ = writeln!(
                self.writer,
                "==== {} {} END ====",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                self.header
            );
        }
        let _ = self.writer.flush();
    }
}

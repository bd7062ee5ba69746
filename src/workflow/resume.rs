//! Reboot/resume state persistence.
//!
//! When a task requests a reboot, the set of already-completed task names
//! is written to a durable location. On relaunch with the resume flag the
//! orchestrator jumps straight to the workflow step and seeds those tasks
//! as completed without re-executing them.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// Override path for testing
static STATE_PATH_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// State saved when a workflow pauses for a reboot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeState {
    /// Definition the workflow belongs to.
    pub definition_path: PathBuf,
    /// Tasks already completed, in execution order.
    pub completed_tasks: Vec<String>,
    /// Task that requested the reboot.
    pub pending_task: String,
    /// Why the pause happened.
    pub reason: String,
    /// When the pause was requested.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ResumeState {
    /// Save resume state to disk using write-to-temp-then-rename so a
    /// crash mid-write never leaves a corrupt file.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::state_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)
            .with_context(|| format!("Failed to write resume state to {:?}", temp_path))?;
        std::fs::rename(&temp_path, &path)?;
        Ok(path)
    }

    /// Load resume state if it exists.
    pub fn load() -> Result<Option<Self>> {
        let path = Self::state_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let state: Self =
            serde_json::from_str(&content).context("Failed to parse resume state")?;
        Ok(Some(state))
    }

    /// Clear saved resume state.
    pub fn clear() -> Result<()> {
        let path = Self::state_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Check if there is a resume state available.
    pub fn exists() -> bool {
        Self::state_path().exists()
    }

    /// Get the resume state file path.
    fn state_path() -> PathBuf {
        if let Ok(guard) = STATE_PATH_OVERRIDE.lock() {
            if let Some(ref path) = *guard {
                return path.clone();
            }
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("switchback")
            .join("resume-state.json")
    }

    /// Set the state path override (for testing).
    pub fn set_state_path_override(path: Option<PathBuf>) {
        if let Ok(mut guard) = STATE_PATH_OVERRIDE.lock() {
            *guard = path;
        }
    }
}

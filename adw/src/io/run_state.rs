//! Run state persistence and the per-run artifact layout.
//!
//! Every run owns `agents/<run-id>/` under the workspace root:
//!
//! ```text
//! agents/<run-id>/adw_state.json     RunState
//! agents/<run-id>/test_results.json  TestOutcome sequence
//! agents/<run-id>/<agent>/raw_output.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::run_id::validate_run_id;
use crate::core::types::WorkType;

pub const AGENTS_DIR: &str = "agents";
pub const STATE_FILE: &str = "adw_state.json";
pub const TEST_RESULTS_FILE: &str = "test_results.json";
pub const RAW_OUTPUT_FILE: &str = "raw_output.txt";

pub const PLANNER: &str = "planner";
pub const IMPLEMENTOR: &str = "implementor";
pub const REVIEWER: &str = "reviewer";
pub const FIXER: &str = "fixer";

/// Persisted identity and checkpoint of one workflow run.
///
/// Only Plan sets `branch_name`, `spec_file` and `work_type`; later phases read them.
/// Review records its verdict so Publish can report it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunState {
    pub run_id: String,
    #[serde(default)]
    pub issue_number: Option<u64>,
    #[serde(default)]
    pub branch_name: Option<String>,
    /// Spec document path relative to the workspace root.
    #[serde(default)]
    pub spec_file: Option<String>,
    #[serde(default)]
    pub work_type: Option<WorkType>,
    /// Outcome of the last review, absent until one has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_passed: Option<bool>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            issue_number: None,
            branch_name: None,
            spec_file: None,
            work_type: None,
            review_passed: None,
        }
    }
}

/// Filesystem locations for one run's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub run_dir: PathBuf,
}

impl RunPaths {
    pub fn state_path(&self) -> PathBuf {
        self.run_dir.join(STATE_FILE)
    }

    pub fn test_results_path(&self) -> PathBuf {
        self.run_dir.join(TEST_RESULTS_FILE)
    }

    /// Raw output log for one agent role, e.g. `planner/raw_output.txt`.
    pub fn agent_log(&self, agent: &str) -> PathBuf {
        self.run_dir.join(agent).join(RAW_OUTPUT_FILE)
    }
}

/// Loads and saves [`RunState`] under `<root>/agents/`.
#[derive(Debug, Clone)]
pub struct StateStore {
    agents_dir: PathBuf,
}

impl StateStore {
    pub fn new(root: &Path) -> Self {
        Self {
            agents_dir: root.join(AGENTS_DIR),
        }
    }

    pub fn paths(&self, run_id: &str) -> RunPaths {
        RunPaths {
            run_dir: self.agents_dir.join(run_id),
        }
    }

    /// Persist the state, fully replacing any previous record for the same run.
    pub fn save(&self, state: &RunState) -> Result<()> {
        validate_run_id(&state.run_id)?;
        let path = self.paths(&state.run_id).state_path();
        debug!(path = %path.display(), run_id = %state.run_id, "writing run state");
        let mut buf = serde_json::to_string_pretty(state).context("serialize run state")?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }

    /// Load the state for `run_id`. A missing record is `Ok(None)`, not a default.
    pub fn load(&self, run_id: &str) -> Result<Option<RunState>> {
        validate_run_id(run_id)?;
        let path = self.paths(run_id).state_path();
        if !path.exists() {
            debug!(path = %path.display(), "run state missing");
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read run state {}", path.display()))?;
        let state: RunState = serde_json::from_str(&contents)
            .with_context(|| format!("parse run state {}", path.display()))?;
        debug!(run_id = %state.run_id, "run state loaded");
        Ok(Some(state))
    }

    /// The run whose state record was modified most recently.
    pub fn latest_run_id(&self) -> Result<Option<String>> {
        if !self.agents_dir.exists() {
            return Ok(None);
        }
        let entries = fs::read_dir(&self.agents_dir)
            .with_context(|| format!("read directory {}", self.agents_dir.display()))?;

        let mut latest: Option<(SystemTime, String)> = None;
        for entry in entries {
            let entry = entry
                .with_context(|| format!("read entry in {}", self.agents_dir.display()))?;
            let state_path = entry.path().join(STATE_FILE);
            let Ok(metadata) = fs::metadata(&state_path) else {
                continue;
            };
            let modified = metadata
                .modified()
                .with_context(|| format!("read mtime {}", state_path.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let newer = match &latest {
                None => true,
                Some((best_time, best_name)) => {
                    (modified, name.as_str()) > (*best_time, best_name.as_str())
                }
            };
            if newer {
                latest = Some((modified, name));
            }
        }
        Ok(latest.map(|(_, name)| name))
    }
}

/// Write `contents` to `path` via a sibling temp file and rename.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

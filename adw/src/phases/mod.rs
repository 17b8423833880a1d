//! Workflow phases and the orchestrator that sequences them.
//!
//! Each phase loads what it needs from the [`StateStore`], does its work
//! through the collaborators in [`PhaseEnv`], and reports a [`PhaseStatus`].
//! `Err` is reserved for fatal conditions (missing run state, persistence
//! failures); agent and check failures are statuses.
//!
//! [`PhaseStatus`]: crate::core::pipeline::PhaseStatus

pub mod build;
pub mod fix;
pub mod pipeline;
pub mod plan;
pub mod publish;
pub mod review;
pub mod testing;

use std::path::Path;

use anyhow::Result;

use crate::core::types::truncate_to_boundary;
use crate::io::checks::CheckRunner;
use crate::io::config::WorkflowConfig;
use crate::io::git::VersionControl;
use crate::io::provider::AgentProvider;
use crate::io::run_state::{RunState, StateStore};
use crate::io::tracker::IssueTracker;

/// Bytes of failed agent output echoed to the console.
pub(crate) const CONSOLE_EXCERPT_BYTES: usize = 500;

/// Collaborators shared by every phase of a run.
pub struct PhaseEnv<'a> {
    /// Workspace root: agents run here and artifacts are written under it.
    pub root: &'a Path,
    pub config: &'a WorkflowConfig,
    pub provider: &'a dyn AgentProvider,
    pub tracker: &'a dyn IssueTracker,
    pub checks: &'a dyn CheckRunner,
    pub vcs: &'a dyn VersionControl,
}

impl PhaseEnv<'_> {
    pub fn store(&self) -> StateStore {
        StateStore::new(self.root)
    }
}

/// Run state problems that make a phase impossible to start.
#[derive(Debug, thiserror::Error)]
pub enum RunStateError {
    #[error("no run state found for run '{run_id}' (run `adw plan` first)")]
    Missing { run_id: String },

    #[error("run '{run_id}' has no {field} recorded (re-run `adw plan`)")]
    Incomplete { run_id: String, field: &'static str },
}

/// Load the state a non-Plan phase requires, failing fast when it is absent.
pub(crate) fn load_required(store: &StateStore, run_id: &str) -> Result<RunState> {
    match store.load(run_id)? {
        Some(state) => Ok(state),
        None => Err(RunStateError::Missing {
            run_id: run_id.to_string(),
        }
        .into()),
    }
}

pub(crate) fn required<'s, T: ?Sized>(
    state: &RunState,
    value: Option<&'s T>,
    field: &'static str,
) -> Result<&'s T> {
    value.ok_or_else(|| {
        RunStateError::Incomplete {
            run_id: state.run_id.clone(),
            field,
        }
        .into()
    })
}

/// Warn when the issue on the command line disagrees with the recorded one.
pub(crate) fn note_issue_mismatch(state: &RunState, issue_number: u64) {
    if let Some(recorded) = state.issue_number
        && recorded != issue_number
    {
        tracing::warn!(recorded, requested = issue_number, "issue number mismatch");
        println!("⚠️  Run {} was planned for issue #{recorded}, not #{issue_number}", state.run_id);
    }
}

pub(crate) fn print_output_excerpt(output: &str) {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        println!("   Output: No output");
    } else {
        println!(
            "   Output: {}",
            truncate_to_boundary(trimmed, CONSOLE_EXCERPT_BYTES)
        );
    }
}

//! Review: have the agent check the implementation against the spec.

use anyhow::{Context, Result};
use tracing::instrument;

use crate::core::pipeline::PhaseStatus;
use crate::core::types::Operation;
use crate::io::run_state::REVIEWER;
use crate::phases::{PhaseEnv, load_required, note_issue_mismatch, print_output_excerpt, required};

/// Run the review. A failed review is reported but the pipeline treats it as advisory.
#[instrument(skip_all, fields(issue = issue_number, run_id))]
pub fn run_review(env: &PhaseEnv<'_>, issue_number: u64, run_id: &str) -> Result<PhaseStatus> {
    let store = env.store();
    let mut state = load_required(&store, run_id)?;
    note_issue_mismatch(&state, issue_number);
    let spec_file = required(&state, state.spec_file.as_deref(), "spec file")?.to_string();

    println!("🔍 Reviewing issue #{issue_number} (ADW ID: {run_id})");
    let log_path = store.paths(run_id).agent_log(REVIEWER);
    let response = env.provider.run_operation(
        &Operation::Review,
        &[run_id.to_string(), spec_file, REVIEWER.to_string()],
        Some(env.root),
        Some(&log_path),
    );
    state.review_passed = Some(response.success);
    store.save(&state).context("persist review outcome")?;

    if response.success {
        println!("✅ Review complete");
        println!("\n📋 Next: adw publish {issue_number} {run_id}");
        Ok(PhaseStatus::Succeeded)
    } else {
        println!("⚠️  Review reported problems");
        print_output_excerpt(&response.output);
        Ok(PhaseStatus::Failed)
    }
}

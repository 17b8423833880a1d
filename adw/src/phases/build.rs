//! Build: check out the run's branch and have the agent implement the spec.

use anyhow::Result;
use tracing::{instrument, warn};

use crate::core::pipeline::PhaseStatus;
use crate::core::types::Operation;
use crate::io::run_state::IMPLEMENTOR;
use crate::phases::{PhaseEnv, load_required, note_issue_mismatch, print_output_excerpt, required};

#[instrument(skip_all, fields(issue = issue_number, run_id))]
pub fn run_build(env: &PhaseEnv<'_>, issue_number: u64, run_id: &str) -> Result<PhaseStatus> {
    let store = env.store();
    let state = load_required(&store, run_id)?;
    note_issue_mismatch(&state, issue_number);
    let branch = required(&state, state.branch_name.as_deref(), "branch name")?;
    let spec_file = required(&state, state.spec_file.as_deref(), "spec file")?;

    println!("🔨 Building issue #{issue_number} (ADW ID: {run_id})");
    println!("📝 Spec: {spec_file}");

    match env.vcs.current_branch() {
        Ok(current) if current == branch => println!("🌿 On branch {branch}"),
        _ => match env.vcs.switch_to(branch) {
            Ok(()) => println!("🌿 Switched to branch {branch}"),
            Err(err) => {
                warn!(err = %err, branch, "branch switch failed");
                println!("⚠️  Could not switch to branch {branch}: {err:#}");
            }
        },
    }

    println!("🤖 Running implementor...");
    let log_path = store.paths(run_id).agent_log(IMPLEMENTOR);
    let response = env.provider.run_operation(
        &Operation::Implement,
        &[spec_file.to_string(), run_id.to_string()],
        Some(env.root),
        Some(&log_path),
    );

    if response.success {
        println!("✅ Implementation complete");
        println!("\n📋 Next: adw test {issue_number} {run_id}");
        Ok(PhaseStatus::Succeeded)
    } else {
        println!("❌ Implementation failed");
        print_output_excerpt(&response.output);
        Ok(PhaseStatus::Failed)
    }
}

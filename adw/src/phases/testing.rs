//! Test: run the configured checks fail-fast and record their outcomes.

use anyhow::Result;
use tracing::instrument;

use crate::core::pipeline::PhaseStatus;
use crate::io::checks::{run_checks, write_test_outcomes};
use crate::phases::{PhaseEnv, load_required, note_issue_mismatch};

#[instrument(skip_all, fields(issue = issue_number, run_id))]
pub fn run_test(env: &PhaseEnv<'_>, issue_number: u64, run_id: &str) -> Result<PhaseStatus> {
    let store = env.store();
    let state = load_required(&store, run_id)?;
    note_issue_mismatch(&state, issue_number);

    let checks = &env.config.checks;
    println!("🧪 Running {} checks for issue #{issue_number} (ADW ID: {run_id})", checks.len());

    let outcomes = run_checks(env.checks, checks, env.root, |outcome| {
        if outcome.passed {
            println!("  ✅ {}", outcome.name);
        } else {
            println!(
                "  ❌ {}: {}",
                outcome.name,
                outcome.error.as_deref().unwrap_or("failed")
            );
        }
    });

    let results_path = store.paths(run_id).test_results_path();
    write_test_outcomes(&results_path, &outcomes)?;

    let passed = outcomes.iter().filter(|o| o.passed).count();
    println!("📊 {passed}/{} checks passed", checks.len());
    println!("💾 Results saved to {}", results_path.display());

    if outcomes.iter().all(|o| o.passed) {
        println!("\n📋 Next: adw review {issue_number} {run_id}");
        Ok(PhaseStatus::Succeeded)
    } else {
        println!("\n💡 To fix: adw fix <error-log> --run-id {run_id}");
        Ok(PhaseStatus::Failed)
    }
}

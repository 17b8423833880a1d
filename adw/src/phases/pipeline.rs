//! Orchestrator: drive the phases in order according to the gating policy.

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::pipeline::{
    Phase, PhaseStatus, PipelineOptions, PipelineState, next_state,
};
use crate::phases::{
    PhaseEnv, build::run_build, plan::run_plan, publish::run_publish, review::run_review,
    testing::run_test,
};

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Run id created by Plan.
    pub run_id: String,
    pub final_state: PipelineState,
    /// Phases that ran, in order.
    pub reports: Vec<(Phase, PhaseStatus)>,
}

impl PipelineOutcome {
    pub fn succeeded(&self) -> bool {
        self.final_state == PipelineState::Done
    }

    pub fn status_of(&self, phase: Phase) -> Option<PhaseStatus> {
        self.reports
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, status)| *status)
    }
}

/// Run Plan and the subsequent phases for one issue.
///
/// Phase errors (missing run state, persistence failures) propagate; agent and
/// check failures are folded into the returned outcome.
#[instrument(skip_all, fields(issue = issue_number))]
pub fn run_pipeline(
    env: &PhaseEnv<'_>,
    issue_number: u64,
    options: &PipelineOptions,
) -> Result<PipelineOutcome> {
    print_header(Phase::Plan);
    let plan = run_plan(env, issue_number, None)?;
    let run_id = plan.run_id;
    let mut reports = vec![(Phase::Plan, plan.status)];
    let mut state = next_state(Phase::Plan, plan.status, options);
    note_skips(Phase::Plan, state, options);

    while let Some(phase) = state.phase() {
        print_header(phase);
        let status = match phase {
            Phase::Plan => run_plan(env, issue_number, Some(&run_id))?.status,
            Phase::Build => run_build(env, issue_number, &run_id)?,
            Phase::Test => run_test(env, issue_number, &run_id)?,
            Phase::Review => run_review(env, issue_number, &run_id)?,
            Phase::Publish => run_publish(env, issue_number, &run_id)?,
        };
        info!(phase = phase.name(), ?status, "phase finished");
        if phase == Phase::Review && status == PhaseStatus::Failed {
            println!("⚠️  Review reported problems; continuing to publish");
        }
        reports.push((phase, status));
        state = next_state(phase, status, options);
        note_skips(phase, state, options);
    }

    match state {
        PipelineState::Aborted => {
            let failed = reports.last().map(|(phase, _)| phase.name()).unwrap_or("plan");
            println!("\n❌ Workflow aborted: {failed} failed (ADW ID: {run_id})");
        }
        _ => println!("\n🎉 Workflow complete (ADW ID: {run_id})"),
    }

    Ok(PipelineOutcome {
        run_id,
        final_state: state,
        reports,
    })
}

fn print_header(phase: Phase) {
    println!("\n=== {} ===", phase.name().to_uppercase());
}

/// Announce phases jumped over between `from` and the next state.
fn note_skips(from: Phase, next: PipelineState, options: &PipelineOptions) {
    if next == PipelineState::Aborted || options.stop_after == Some(from) {
        return;
    }
    let target = next.phase();
    for phase in Phase::ALL.iter().skip_while(|p| **p != from).skip(1) {
        if Some(*phase) == target {
            break;
        }
        println!("⏭️  Skipping {phase}");
    }
}

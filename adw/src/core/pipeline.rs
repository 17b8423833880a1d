//! Phase sequencing and gating policy.
//!
//! The pipeline is strictly linear: Plan, Build, Test, Review, Publish. This
//! module only decides what comes next; running a phase is the caller's job.

use std::fmt;

/// One stage of the delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Plan,
    Build,
    Test,
    Review,
    Publish,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Plan,
        Phase::Build,
        Phase::Test,
        Phase::Review,
        Phase::Publish,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Build => "build",
            Phase::Test => "test",
            Phase::Review => "review",
            Phase::Publish => "publish",
        }
    }

    fn successor(self) -> Option<Phase> {
        match self {
            Phase::Plan => Some(Phase::Build),
            Phase::Build => Some(Phase::Test),
            Phase::Test => Some(Phase::Review),
            Phase::Review => Some(Phase::Publish),
            Phase::Publish => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Orchestrator state: a phase to run, or a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Plan,
    Build,
    Test,
    Review,
    Publish,
    Done,
    Aborted,
}

impl PipelineState {
    /// The phase to run in this state, or `None` when terminal.
    pub fn phase(self) -> Option<Phase> {
        match self {
            PipelineState::Plan => Some(Phase::Plan),
            PipelineState::Build => Some(Phase::Build),
            PipelineState::Test => Some(Phase::Test),
            PipelineState::Review => Some(Phase::Review),
            PipelineState::Publish => Some(Phase::Publish),
            PipelineState::Done | PipelineState::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.phase().is_none()
    }
}

impl From<Phase> for PipelineState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Plan => PipelineState::Plan,
            Phase::Build => PipelineState::Build,
            Phase::Test => PipelineState::Test,
            Phase::Review => PipelineState::Review,
            Phase::Publish => PipelineState::Publish,
        }
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Succeeded,
    /// Completed with an acceptable fallback (e.g. Plan wrote the template document).
    Degraded,
    Failed,
}

impl PhaseStatus {
    /// Whether a standalone phase invocation should exit 0.
    pub fn is_acceptable(self) -> bool {
        !matches!(self, PhaseStatus::Failed)
    }
}

/// Knobs for a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub skip_test: bool,
    pub skip_review: bool,
    /// Finish (as `Done`) right after this phase instead of continuing.
    pub stop_after: Option<Phase>,
}

impl PipelineOptions {
    /// Plan followed by Build only.
    pub fn plan_build() -> Self {
        Self {
            stop_after: Some(Phase::Build),
            ..Self::default()
        }
    }

    fn skips(&self, phase: Phase) -> bool {
        match phase {
            Phase::Test => self.skip_test,
            Phase::Review => self.skip_review,
            _ => false,
        }
    }
}

/// Decide the next state after `phase` finished with `status`.
///
/// Build, Test and Publish failures abort. A Plan failure only happens when the
/// run state could not be persisted, so it aborts too. Review failures are
/// advisory and the pipeline moves on to Publish.
pub fn next_state(phase: Phase, status: PhaseStatus, options: &PipelineOptions) -> PipelineState {
    let blocking = !matches!(phase, Phase::Review);
    if status == PhaseStatus::Failed && blocking {
        return PipelineState::Aborted;
    }
    if options.stop_after == Some(phase) {
        return PipelineState::Done;
    }

    let mut candidate = phase.successor();
    while let Some(next) = candidate {
        if !options.skips(next) {
            return next.into();
        }
        candidate = next.successor();
    }
    PipelineState::Done
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> PipelineOptions {
        PipelineOptions::default()
    }

    #[test]
    fn linear_order_on_success() {
        let mut state = PipelineState::Plan;
        let mut visited = Vec::new();
        while let Some(phase) = state.phase() {
            visited.push(phase);
            state = next_state(phase, PhaseStatus::Succeeded, &defaults());
        }
        assert_eq!(visited, Phase::ALL.to_vec());
        assert_eq!(state, PipelineState::Done);
    }

    #[test]
    fn blocking_failures_abort() {
        for phase in [Phase::Plan, Phase::Build, Phase::Test, Phase::Publish] {
            assert_eq!(
                next_state(phase, PhaseStatus::Failed, &defaults()),
                PipelineState::Aborted,
                "{phase}"
            );
        }
    }

    #[test]
    fn review_failure_is_advisory() {
        assert_eq!(
            next_state(Phase::Review, PhaseStatus::Failed, &defaults()),
            PipelineState::Publish
        );
    }

    #[test]
    fn degraded_plan_continues() {
        assert_eq!(
            next_state(Phase::Plan, PhaseStatus::Degraded, &defaults()),
            PipelineState::Build
        );
    }

    #[test]
    fn skip_flags_are_honored() {
        let options = PipelineOptions {
            skip_test: true,
            skip_review: true,
            stop_after: None,
        };
        assert_eq!(
            next_state(Phase::Build, PhaseStatus::Succeeded, &options),
            PipelineState::Publish
        );

        let skip_test = PipelineOptions {
            skip_test: true,
            ..PipelineOptions::default()
        };
        assert_eq!(
            next_state(Phase::Build, PhaseStatus::Succeeded, &skip_test),
            PipelineState::Review
        );
    }

    #[test]
    fn stop_after_build_finishes_early() {
        assert_eq!(
            next_state(Phase::Build, PhaseStatus::Succeeded, &PipelineOptions::plan_build()),
            PipelineState::Done
        );
        assert_eq!(
            next_state(Phase::Build, PhaseStatus::Failed, &PipelineOptions::plan_build()),
            PipelineState::Aborted
        );
    }

    #[test]
    fn publish_success_is_done() {
        assert_eq!(
            next_state(Phase::Publish, PhaseStatus::Succeeded, &defaults()),
            PipelineState::Done
        );
    }
}

//! Fix: hand an error log to the agent and let it repair the code.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::instrument;

use crate::core::pipeline::PhaseStatus;
use crate::core::run_id::validate_run_id;
use crate::core::types::Operation;
use crate::io::run_state::FIXER;
use crate::phases::{PhaseEnv, print_output_excerpt};

/// Characters of the error log forwarded to the agent.
pub const MAX_ERROR_LOG_CHARS: usize = 3000;

#[instrument(skip_all, fields(error_file = %error_file.display()))]
pub fn run_fix(env: &PhaseEnv<'_>, error_file: &Path, run_id: Option<&str>) -> Result<PhaseStatus> {
    let log = std::fs::read_to_string(error_file)
        .with_context(|| format!("read error log {}", error_file.display()))?;
    if log.trim().is_empty() {
        println!("✅ No errors to fix");
        return Ok(PhaseStatus::Succeeded);
    }

    let excerpt: String = log.chars().take(MAX_ERROR_LOG_CHARS).collect();
    let log_path = match run_id {
        Some(id) => {
            validate_run_id(id)?;
            Some(env.store().paths(id).agent_log(FIXER))
        }
        None => None,
    };

    println!("🔧 Fixing errors from {}", error_file.display());
    let response = env.provider.run_operation(
        &Operation::Fix,
        &[excerpt],
        Some(env.root),
        log_path.as_deref(),
    );

    if response.success {
        println!("✅ Fix applied");
        Ok(PhaseStatus::Succeeded)
    } else {
        println!("❌ Fix failed");
        print_output_excerpt(&response.output);
        Ok(PhaseStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AgentResponse;
    use crate::test_support::TestHarness;

    #[test]
    fn empty_log_needs_no_agent() {
        let harness = TestHarness::new();
        let log = harness.root().join("errors.log");
        std::fs::write(&log, "  \n").expect("write");
        let status = run_fix(&harness.env(), &log, None).expect("fix");
        assert_eq!(status, PhaseStatus::Succeeded);
        assert!(harness.provider.calls().is_empty());
    }

    #[test]
    fn long_logs_are_truncated() {
        let harness = TestHarness::new().with_responses(vec![AgentResponse::ok("fixed")]);
        let log = harness.root().join("errors.log");
        std::fs::write(&log, "é".repeat(MAX_ERROR_LOG_CHARS + 50)).expect("write");

        let status = run_fix(&harness.env(), &log, Some("fix00001")).expect("fix");
        assert_eq!(status, PhaseStatus::Succeeded);
        let calls = harness.provider.calls();
        assert_eq!(calls[0].operation, Operation::Fix);
        assert_eq!(calls[0].args[0].chars().count(), MAX_ERROR_LOG_CHARS);
        assert_eq!(
            calls[0].output_file.as_deref(),
            Some(harness.root().join("agents/fix00001/fixer/raw_output.txt").as_path())
        );
    }

    #[test]
    fn missing_log_is_an_error() {
        let harness = TestHarness::new();
        assert!(run_fix(&harness.env(), &harness.root().join("nope.log"), None).is_err());
    }
}

//! Test-phase checks: named shell commands run fail-fast.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::types::{TestOutcome, truncate_to_boundary};
use crate::io::config::{CheckSpec, WorkflowConfig};
use crate::io::process::{self, CommandOutcome, CommandRequest, StreamMode};
use crate::io::run_state::write_atomic;

/// Recorded when a failing check wrote nothing to stderr.
pub const GENERIC_FAILURE: &str = "Test failed";

/// Runs a single check to an outcome. Never errors; failures are outcomes.
pub trait CheckRunner {
    fn run_check(&self, check: &CheckSpec, workdir: &Path) -> TestOutcome;
}

/// Runs checks through `sh -c` with a per-check timeout.
#[derive(Debug, Clone)]
pub struct ShellCheckRunner {
    pub timeout: Duration,
    pub error_excerpt_bytes: usize,
    pub output_limit_bytes: usize,
}

impl ShellCheckRunner {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.check_timeout_secs),
            error_excerpt_bytes: config.error_excerpt_bytes,
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl CheckRunner for ShellCheckRunner {
    #[instrument(skip_all, fields(check = %check.name))]
    fn run_check(&self, check: &CheckSpec, workdir: &Path) -> TestOutcome {
        let request = CommandRequest::new(
            vec!["sh".to_string(), "-c".to_string(), check.command.clone()],
            self.timeout,
        )
        .workdir(Some(workdir))
        .mode(StreamMode::Buffered)
        .output_limit_bytes(self.output_limit_bytes);
        let outcome = process::execute(&request);
        debug!(passed = outcome.success, exit_code = ?outcome.exit_code, "check finished");

        let error = (!outcome.success)
            .then(|| failure_excerpt(&outcome, self.timeout, self.error_excerpt_bytes));
        TestOutcome {
            name: check.name.clone(),
            command: check.command.clone(),
            purpose: check.purpose.clone(),
            passed: outcome.success,
            error,
        }
    }
}

/// Bounded description of why a check failed.
pub fn failure_excerpt(outcome: &CommandOutcome, timeout: Duration, max_bytes: usize) -> String {
    if outcome.timed_out {
        return format!("Test timed out after {} seconds", timeout.as_secs());
    }
    let source = if !outcome.stderr.trim().is_empty() {
        outcome.stderr.as_str()
    } else if outcome.exit_code.is_none() {
        // Never started; the output carries the launch error.
        outcome.output.as_str()
    } else {
        return GENERIC_FAILURE.to_string();
    };
    truncate_to_boundary(source.trim(), max_bytes).to_string()
}

/// Run checks in order, stopping after the first failure.
///
/// `on_result` sees each outcome as soon as it is known.
pub fn run_checks<F>(
    runner: &dyn CheckRunner,
    checks: &[CheckSpec],
    workdir: &Path,
    mut on_result: F,
) -> Vec<TestOutcome>
where
    F: FnMut(&TestOutcome),
{
    let mut outcomes = Vec::with_capacity(checks.len());
    for check in checks {
        let outcome = runner.run_check(check, workdir);
        on_result(&outcome);
        let passed = outcome.passed;
        outcomes.push(outcome);
        if !passed {
            break;
        }
    }
    outcomes
}

pub fn write_test_outcomes(path: &Path, outcomes: &[TestOutcome]) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(outcomes).context("serialize test results")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Load recorded outcomes; `None` when the Test phase never ran for this run.
pub fn load_test_outcomes(path: &Path) -> Result<Option<Vec<TestOutcome>>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let outcomes = serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(outcomes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ShellCheckRunner {
        ShellCheckRunner {
            timeout: Duration::from_secs(10),
            error_excerpt_bytes: 16,
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn passing_check_has_no_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = runner().run_check(&CheckSpec::new("ok", "true", "always passes"), dir.path());
        assert!(outcome.passed);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.purpose, "always passes");
    }

    #[test]
    fn failing_check_records_bounded_stderr() {
        let dir = tempfile::tempdir().expect("tempdir");
        let check = CheckSpec::new(
            "lint",
            "echo 'this error message is quite long' 1>&2; exit 1",
            "lint",
        );
        let outcome = runner().run_check(&check, dir.path());
        assert!(!outcome.passed);
        assert_eq!(outcome.error.as_deref(), Some("this error messa"));
    }

    #[test]
    fn silent_failure_uses_generic_message() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = runner().run_check(&CheckSpec::new("f", "exit 2", "p"), dir.path());
        assert_eq!(outcome.error.as_deref(), Some(GENERIC_FAILURE));
    }

    #[test]
    fn timed_out_check_says_so() {
        let dir = tempfile::tempdir().expect("tempdir");
        let slow = ShellCheckRunner {
            timeout: Duration::from_millis(200),
            ..runner()
        };
        let outcome = slow.run_check(&CheckSpec::new("slow", "exec sleep 5", "p"), dir.path());
        assert!(!outcome.passed);
        assert!(
            outcome
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("Test timed out"))
        );
    }

    /// The first failure stops the sequence; later checks never execute.
    #[test]
    fn run_checks_is_fail_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checks = vec![
            CheckSpec::new("first", "exit 1", "p"),
            CheckSpec::new("second", "touch second-ran", "p"),
        ];
        let mut seen = Vec::new();
        let outcomes = run_checks(&runner(), &checks, dir.path(), |o| seen.push(o.name.clone()));
        assert_eq!(outcomes.len(), 1);
        assert_eq!(seen, vec!["first"]);
        assert!(!dir.path().join("second-ran").exists());
    }

    #[test]
    fn outcomes_persist_with_historical_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agents/r1/test_results.json");
        assert_eq!(load_test_outcomes(&path).expect("load"), None);

        let outcomes = vec![TestOutcome {
            name: "Unit Tests".to_string(),
            command: "pnpm test".to_string(),
            purpose: "Run unit tests".to_string(),
            passed: false,
            error: Some("1 failed".to_string()),
        }];
        write_test_outcomes(&path, &outcomes).expect("write");
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"execution_command\": \"pnpm test\""));
        assert_eq!(load_test_outcomes(&path).expect("load"), Some(outcomes));
    }
}

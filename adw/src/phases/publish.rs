//! Publish: push the branch and open a pull request for the run.

use std::path::Path;

use anyhow::Result;
use tracing::{instrument, warn};

use crate::core::pipeline::PhaseStatus;
use crate::core::types::WorkType;
use crate::io::checks::load_test_outcomes;
use crate::io::prompt::{PromptEngine, PullRequestContext};
use crate::io::tracker::PullRequestDraft;
use crate::phases::{PhaseEnv, load_required, note_issue_mismatch, required};

/// `<work-type>: #<issue> - <spec-file-stem>`.
pub fn pull_request_title(work_type: WorkType, issue_number: u64, spec_file: &str) -> String {
    let stem = Path::new(spec_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| spec_file.to_string());
    format!("{work_type}: #{issue_number} - {stem}")
}

/// Publish the run. Git and comment failures are warnings; a pull request that
/// cannot be created fails the phase.
#[instrument(skip_all, fields(issue = issue_number, run_id))]
pub fn run_publish(env: &PhaseEnv<'_>, issue_number: u64, run_id: &str) -> Result<PhaseStatus> {
    let store = env.store();
    let state = load_required(&store, run_id)?;
    note_issue_mismatch(&state, issue_number);
    let branch = required(&state, state.branch_name.as_deref(), "branch name")?;
    let spec_file = required(&state, state.spec_file.as_deref(), "spec file")?;
    let work_type = *required(&state, state.work_type.as_ref(), "work type")?;
    let base = env.config.base_branch.as_str();

    println!("🚀 Publishing issue #{issue_number} (ADW ID: {run_id})");

    let diff_stat = env.vcs.diff_stat(base).unwrap_or_else(|err| {
        warn!(err = %err, "diff stat unavailable");
        String::new()
    });
    let commits = env.vcs.log_oneline(base).unwrap_or_else(|err| {
        warn!(err = %err, "commit log unavailable");
        String::new()
    });

    match env.vcs.push(branch) {
        Ok(()) => println!("📤 Pushed {branch}"),
        Err(err) => {
            warn!(err = %err, branch, "push failed");
            println!("⚠️  Could not push {branch}: {err:#}");
        }
    }

    let paths = store.paths(run_id);
    let tests_ran = load_test_outcomes(&paths.test_results_path())
        .unwrap_or_else(|err| {
            warn!(err = %err, "test results unreadable");
            None
        })
        .is_some_and(|outcomes| !outcomes.is_empty() && outcomes.iter().all(|o| o.passed));
    let reviewed = state.review_passed == Some(true);

    let title = pull_request_title(work_type, issue_number, spec_file);
    let body = PromptEngine::new().render_pull_request(&PullRequestContext {
        issue_number,
        work_type,
        spec_file: spec_file.to_string(),
        run_id: run_id.to_string(),
        diff_stat,
        commits,
        tests_ran,
        reviewed,
    })?;

    let draft = PullRequestDraft {
        head: branch.to_string(),
        base: base.to_string(),
        title,
        body,
    };
    let url = match env.tracker.create_pull_request(&draft) {
        Ok(url) => url,
        Err(err) => {
            warn!(err = %err, "pull request creation failed");
            println!("❌ Could not create pull request: {err}");
            return Ok(PhaseStatus::Failed);
        }
    };
    println!("✅ Pull request: {url}");

    let comment = format!("🚀 Pull request created: {url}\n\nADW ID: `{run_id}`");
    if let Err(err) = env.tracker.post_comment(issue_number, &comment) {
        warn!(err = %err, "issue comment failed");
        println!("⚠️  Could not comment on issue #{issue_number}: {err}");
    }
    Ok(PhaseStatus::Succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestHarness, planned_state};

    #[test]
    fn title_uses_spec_stem() {
        assert_eq!(
            pull_request_title(WorkType::Bug, 42, "specs/003-fix-42-login.md"),
            "bug: #42 - 003-fix-42-login"
        );
    }

    #[test]
    fn creates_pull_request_and_comments() {
        let harness = TestHarness::new();
        harness.tracker.set_pr_url("https://github.com/acme/shop/pull/9");
        harness.save_state(&planned_state("pub00001", 7));

        let status = run_publish(&harness.env(), 7, "pub00001").expect("publish");
        assert_eq!(status, PhaseStatus::Succeeded);
        assert_eq!(harness.vcs.pushed(), vec!["feat-7-add-dark-mode"]);

        let drafts = harness.tracker.drafts();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].head, "feat-7-add-dark-mode");
        assert_eq!(drafts[0].base, "main");
        assert_eq!(drafts[0].title, "feature: #7 - 001-feat-7-add-dark-mode");
        assert!(drafts[0].body.contains("Closes #7"));
        assert!(drafts[0].body.contains("- [ ] Code reviewed"));

        let comments = harness.tracker.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, 7);
        assert!(comments[0].1.contains("https://github.com/acme/shop/pull/9"));
    }

    #[test]
    fn review_checkbox_follows_recorded_verdict() {
        let harness = TestHarness::new();
        harness.tracker.set_pr_url("https://example.test/pr/5");
        let mut failed = planned_state("pub00004", 7);
        failed.review_passed = Some(false);
        harness.save_state(&failed);
        let mut passed = planned_state("pub00005", 7);
        passed.review_passed = Some(true);
        harness.save_state(&passed);

        run_publish(&harness.env(), 7, "pub00004").expect("publish");
        run_publish(&harness.env(), 7, "pub00005").expect("publish");
        let drafts = harness.tracker.drafts();
        assert!(drafts[0].body.contains("- [ ] Code reviewed"));
        assert!(drafts[1].body.contains("- [x] Code reviewed"));
    }

    #[test]
    fn pull_request_failure_fails_phase() {
        let harness = TestHarness::new();
        harness.save_state(&planned_state("pub00002", 7));
        let status = run_publish(&harness.env(), 7, "pub00002").expect("publish");
        assert_eq!(status, PhaseStatus::Failed);
        assert!(harness.tracker.comments().is_empty());
    }

    #[test]
    fn push_failure_does_not_block_pull_request() {
        let harness = TestHarness::new();
        harness.vcs.fail_push();
        harness.tracker.set_pr_url("https://example.test/pr/1");
        harness.save_state(&planned_state("pub00003", 7));
        let status = run_publish(&harness.env(), 7, "pub00003").expect("publish");
        assert_eq!(status, PhaseStatus::Succeeded);
    }
}

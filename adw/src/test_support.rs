//! Scripted collaborators and fixture builders for phase tests.
//!
//! Every fake records what it was asked to do so tests can assert on the
//! calls a phase made without spawning agents, git or network requests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tempfile::TempDir;

use crate::core::types::{AgentResponse, Operation, TestOutcome, WorkType};
use crate::io::checks::CheckRunner;
use crate::io::config::{CheckSpec, WorkflowConfig};
use crate::io::git::VersionControl;
use crate::io::provider::AgentProvider;
use crate::io::run_state::{RunState, StateStore};
use crate::io::tracker::{IssueSnapshot, IssueTracker, PullRequestDraft, TrackerError};
use crate::phases::PhaseEnv;

/// One `run_operation` call seen by [`ScriptedProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: Operation,
    pub args: Vec<String>,
    pub output_file: Option<PathBuf>,
}

/// Replays queued responses in order; an exhausted queue answers with a failure.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: RefCell<VecDeque<AgentResponse>>,
    calls: RefCell<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    pub fn push_response(&self, response: AgentResponse) {
        self.responses.borrow_mut().push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }
}

impl AgentProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn run_operation(
        &self,
        operation: &Operation,
        args: &[String],
        _workdir: Option<&Path>,
        output_file: Option<&Path>,
    ) -> AgentResponse {
        self.calls.borrow_mut().push(RecordedCall {
            operation: operation.clone(),
            args: args.to_vec(),
            output_file: output_file.map(Path::to_path_buf),
        });
        let response = self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| AgentResponse::failed("no scripted response"));
        if let Some(path) = output_file {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = fs::write(path, &response.output);
        }
        response
    }
}

/// Serves one issue and, once a URL is set, accepts pull requests.
#[derive(Debug, Default)]
pub struct ScriptedTracker {
    issue: RefCell<Option<IssueSnapshot>>,
    pr_url: RefCell<Option<String>>,
    comments: RefCell<Vec<(u64, String)>>,
    drafts: RefCell<Vec<PullRequestDraft>>,
}

impl ScriptedTracker {
    pub fn set_issue(&self, issue: IssueSnapshot) {
        *self.issue.borrow_mut() = Some(issue);
    }

    pub fn set_pr_url(&self, url: &str) {
        *self.pr_url.borrow_mut() = Some(url.to_string());
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.comments.borrow().clone()
    }

    pub fn drafts(&self) -> Vec<PullRequestDraft> {
        self.drafts.borrow().clone()
    }
}

impl IssueTracker for ScriptedTracker {
    fn fetch_issue(&self, number: u64) -> Result<IssueSnapshot, TrackerError> {
        match self.issue.borrow().as_ref() {
            Some(issue) if issue.number == number => Ok(issue.clone()),
            _ => Err(TrackerError::NotFound(format!("issue #{number}"))),
        }
    }

    fn post_comment(&self, number: u64, body: &str) -> Result<(), TrackerError> {
        self.comments.borrow_mut().push((number, body.to_string()));
        Ok(())
    }

    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<String, TrackerError> {
        let url = self
            .pr_url
            .borrow()
            .clone()
            .ok_or(TrackerError::Unconfigured("pull request url"))?;
        self.drafts.borrow_mut().push(draft.clone());
        Ok(url)
    }
}

/// Passes every check unless told otherwise with [`ScriptedCheckRunner::fail`].
#[derive(Debug, Default)]
pub struct ScriptedCheckRunner {
    failures: RefCell<Vec<(String, String)>>,
    executed: RefCell<Vec<String>>,
}

impl ScriptedCheckRunner {
    pub fn fail(&self, name: &str, error: &str) {
        self.failures
            .borrow_mut()
            .push((name.to_string(), error.to_string()));
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }
}

impl CheckRunner for ScriptedCheckRunner {
    fn run_check(&self, check: &CheckSpec, _workdir: &Path) -> TestOutcome {
        self.executed.borrow_mut().push(check.name.clone());
        let error = self
            .failures
            .borrow()
            .iter()
            .find(|(name, _)| *name == check.name)
            .map(|(_, error)| error.clone());
        TestOutcome {
            name: check.name.clone(),
            command: check.command.clone(),
            purpose: check.purpose.clone(),
            passed: error.is_none(),
            error,
        }
    }
}

/// Tracks the current branch and records switches and pushes.
#[derive(Debug)]
pub struct RecordingVcs {
    current: RefCell<String>,
    switched: RefCell<Vec<String>>,
    pushed: RefCell<Vec<String>>,
    fail_switch: RefCell<bool>,
    fail_push: RefCell<bool>,
}

impl Default for RecordingVcs {
    fn default() -> Self {
        Self {
            current: RefCell::new("main".to_string()),
            switched: RefCell::default(),
            pushed: RefCell::default(),
            fail_switch: RefCell::new(false),
            fail_push: RefCell::new(false),
        }
    }
}

impl RecordingVcs {
    pub fn fail_switch(&self) {
        *self.fail_switch.borrow_mut() = true;
    }

    pub fn fail_push(&self) {
        *self.fail_push.borrow_mut() = true;
    }

    pub fn switched(&self) -> Vec<String> {
        self.switched.borrow().clone()
    }

    pub fn pushed(&self) -> Vec<String> {
        self.pushed.borrow().clone()
    }
}

impl VersionControl for RecordingVcs {
    fn current_branch(&self) -> Result<String> {
        Ok(self.current.borrow().clone())
    }

    fn switch_to(&self, branch: &str) -> Result<()> {
        if *self.fail_switch.borrow() {
            bail!("cannot switch to {branch}");
        }
        self.switched.borrow_mut().push(branch.to_string());
        *self.current.borrow_mut() = branch.to_string();
        Ok(())
    }

    fn push(&self, branch: &str) -> Result<()> {
        if *self.fail_push.borrow() {
            bail!("remote rejected {branch}");
        }
        self.pushed.borrow_mut().push(branch.to_string());
        Ok(())
    }

    fn diff_stat(&self, _base: &str) -> Result<String> {
        Ok(" src/theme.ts | 12 ++++++++++++\n 1 file changed, 12 insertions(+)".to_string())
    }

    fn log_oneline(&self, _base: &str) -> Result<String> {
        Ok("abc1234 Add theme toggle".to_string())
    }
}

/// A temporary workspace wired to scripted collaborators.
pub struct TestHarness {
    tempdir: TempDir,
    pub config: WorkflowConfig,
    pub provider: ScriptedProvider,
    pub tracker: ScriptedTracker,
    pub checks: ScriptedCheckRunner,
    pub vcs: RecordingVcs,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            tempdir: TempDir::new().expect("create temp workspace"),
            config: WorkflowConfig::default(),
            provider: ScriptedProvider::default(),
            tracker: ScriptedTracker::default(),
            checks: ScriptedCheckRunner::default(),
            vcs: RecordingVcs::default(),
        }
    }

    pub fn with_issue(self, issue: IssueSnapshot) -> Self {
        self.tracker.set_issue(issue);
        self
    }

    pub fn with_responses(self, responses: Vec<AgentResponse>) -> Self {
        for response in responses {
            self.provider.push_response(response);
        }
        self
    }

    pub fn root(&self) -> &Path {
        self.tempdir.path()
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.root())
    }

    pub fn save_state(&self, state: &RunState) {
        self.store().save(state).expect("save run state");
    }

    pub fn env(&self) -> PhaseEnv<'_> {
        PhaseEnv {
            root: self.root(),
            config: &self.config,
            provider: &self.provider,
            tracker: &self.tracker,
            checks: &self.checks,
            vcs: &self.vcs,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn issue(number: u64, title: &str, body: &str, labels: &[&str]) -> IssueSnapshot {
    IssueSnapshot {
        number,
        title: title.to_string(),
        body: body.to_string(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        author: None,
        created_at: None,
        updated_at: None,
        url: None,
    }
}

/// State as Plan leaves it for the "Add dark mode" feature issue.
pub fn planned_state(run_id: &str, issue_number: u64) -> RunState {
    let branch = format!("feat-{issue_number}-add-dark-mode");
    RunState {
        run_id: run_id.to_string(),
        issue_number: Some(issue_number),
        spec_file: Some(format!("specs/001-{branch}.md")),
        branch_name: Some(branch),
        work_type: Some(WorkType::Feature),
        review_passed: None,
    }
}

//! Git adapter used by the Build and Publish phases.
//!
//! A small, explicit wrapper around `git` subprocess calls, behind the
//! [`VersionControl`] trait so phases can be tested without a repository.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Version-control operations the workflow needs.
pub trait VersionControl {
    /// Current branch name (errors on detached HEAD).
    fn current_branch(&self) -> Result<String>;

    /// Check out `branch`, creating it at HEAD if it does not exist.
    fn switch_to(&self, branch: &str) -> Result<()>;

    /// Push `branch` to `origin` and set upstream.
    fn push(&self, branch: &str) -> Result<()>;

    /// `git diff origin/<base>...HEAD --stat`.
    fn diff_stat(&self, base: &str) -> Result<String>;

    /// `git log origin/<base>..HEAD --oneline`.
    fn log_oneline(&self, base: &str) -> Result<String>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl VersionControl for Git {
    #[instrument(skip_all)]
    fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    #[instrument(skip_all, fields(branch))]
    fn switch_to(&self, branch: &str) -> Result<()> {
        if self.branch_exists(branch)? {
            debug!(branch, "checking out existing branch");
            self.run_checked(&["checkout", branch])?;
        } else {
            debug!(branch, "creating and checking out new branch");
            self.run_checked(&["checkout", "-b", branch])?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(branch))]
    fn push(&self, branch: &str) -> Result<()> {
        self.run_checked(&["push", "-u", "origin", branch])?;
        Ok(())
    }

    fn diff_stat(&self, base: &str) -> Result<String> {
        self.run_capture(&["diff", &format!("origin/{base}...HEAD"), "--stat"])
    }

    fn log_oneline(&self, base: &str) -> Result<String> {
        self.run_capture(&["log", &format!("origin/{base}..HEAD"), "--oneline"])
    }
}

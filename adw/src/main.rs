//! adw: drive an issue from plan to pull request with a coding agent.
//!
//! Each phase is its own subcommand and reloads the run state written by
//! `adw plan`, so a run can be resumed one phase at a time. `adw sdlc` and
//! `adw plan-build` chain the phases in a single process.

use std::path::{Path, PathBuf};

use adw::core::pipeline::{PhaseStatus, PipelineOptions};
use adw::core::run_id::validate_run_id;
use adw::exit_codes;
use adw::io::checks::{ShellCheckRunner, load_test_outcomes};
use adw::io::config::{AdwConfig, CONFIG_RELATIVE_PATH, WorkflowConfig, write_config};
use adw::io::git::Git;
use adw::io::provider::build_provider;
use adw::io::run_state::{AGENTS_DIR, StateStore};
use adw::io::tracker::tracker_from_settings;
use adw::logging;
use adw::phases::plan::SPECS_DIR;
use adw::phases::{
    PhaseEnv, RunStateError, build::run_build, fix::run_fix, pipeline::run_pipeline,
    plan::run_plan, publish::run_publish, review::run_review, testing::run_test,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "adw",
    version,
    about = "Issue-to-pull-request workflow driver for coding agents"
)]
struct Cli {
    /// Workspace root (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (defaults to `<root>/.adw/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.adw/config.toml` with the default checks if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Fetch and classify an issue, name its branch and write a spec.
    Plan {
        issue: u64,
        /// Re-plan an existing run instead of starting a new one.
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Implement the run's spec on its branch.
    Build { issue: u64, run_id: String },
    /// Run the configured checks, stopping at the first failure.
    Test { issue: u64, run_id: String },
    /// Ask the agent to review the implementation against the spec.
    Review { issue: u64, run_id: String },
    /// Push the branch and open a pull request.
    Publish { issue: u64, run_id: String },
    /// Hand an error log to the agent to fix.
    Fix {
        error_file: PathBuf,
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Plan, build, test, review and publish in one go.
    Sdlc {
        issue: u64,
        #[arg(long)]
        skip_test: bool,
        #[arg(long)]
        skip_review: bool,
    },
    /// Plan then build, stopping before the checks.
    PlanBuild { issue: u64 },
    /// Show the recorded state of a run (the most recent one by default).
    Status {
        #[arg(long)]
        run_id: Option<String>,
    },
}

fn main() {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    logging::init();

    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            if err.downcast_ref::<RunStateError>().is_some() {
                exit_codes::INVALID
            } else {
                exit_codes::FAILED
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let config_path = cli
        .config
        .unwrap_or_else(|| root.join(CONFIG_RELATIVE_PATH));
    debug!(root = %root.display(), config = %config_path.display(), "starting");

    match cli.command {
        Command::Init { force } => cmd_init(&root, &config_path, force),
        Command::Status { run_id } => cmd_status(&root, run_id.as_deref()),
        command => {
            let config = AdwConfig::load(&config_path)?;
            dispatch(command, &root, &config)
        }
    }
}

fn dispatch(command: Command, root: &Path, config: &AdwConfig) -> Result<i32> {
    let provider = build_provider(&config.agent);
    let tracker = tracker_from_settings(&config.github);
    let checks = ShellCheckRunner::from_config(&config.workflow);
    let vcs = Git::new(root);
    let env = PhaseEnv {
        root,
        config: &config.workflow,
        provider: provider.as_ref(),
        tracker: tracker.as_ref(),
        checks: &checks,
        vcs: &vcs,
    };
    debug!(provider = provider.name(), "collaborators ready");

    let status = match command {
        Command::Plan { issue, run_id } => run_plan(&env, issue, run_id.as_deref())?.status,
        Command::Build { issue, run_id } => run_build(&env, issue, &checked(&run_id)?)?,
        Command::Test { issue, run_id } => run_test(&env, issue, &checked(&run_id)?)?,
        Command::Review { issue, run_id } => run_review(&env, issue, &checked(&run_id)?)?,
        Command::Publish { issue, run_id } => run_publish(&env, issue, &checked(&run_id)?)?,
        Command::Fix { error_file, run_id } => run_fix(&env, &error_file, run_id.as_deref())?,
        Command::Sdlc {
            issue,
            skip_test,
            skip_review,
        } => {
            let options = PipelineOptions {
                skip_test,
                skip_review,
                stop_after: None,
            };
            return Ok(pipeline_exit(run_pipeline(&env, issue, &options)?.succeeded()));
        }
        Command::PlanBuild { issue } => {
            let outcome = run_pipeline(&env, issue, &PipelineOptions::plan_build())?;
            return Ok(pipeline_exit(outcome.succeeded()));
        }
        Command::Init { .. } | Command::Status { .. } => {
            unreachable!("handled before config is loaded")
        }
    };
    Ok(status_exit(status))
}

/// Reject malformed run ids before they are used as directory names.
fn checked(run_id: &str) -> Result<String> {
    validate_run_id(run_id)?;
    Ok(run_id.to_string())
}

fn status_exit(status: PhaseStatus) -> i32 {
    if status.is_acceptable() {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    }
}

fn pipeline_exit(succeeded: bool) -> i32 {
    if succeeded {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    }
}

fn cmd_init(root: &Path, config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        println!("Config already exists: {}", config_path.display());
    } else {
        write_config(config_path, &WorkflowConfig::default())?;
        println!("✅ Wrote {}", config_path.display());
    }
    for dir in [SPECS_DIR, AGENTS_DIR] {
        let path = root.join(dir);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("create directory {}", path.display()))?;
    }
    Ok(exit_codes::OK)
}

fn cmd_status(root: &Path, run_id: Option<&str>) -> Result<i32> {
    let store = StateStore::new(root);
    let run_id = match run_id {
        Some(id) => checked(id)?,
        None => match store.latest_run_id()? {
            Some(id) => id,
            None => {
                println!("No runs found under {}", root.join(AGENTS_DIR).display());
                return Ok(exit_codes::OK);
            }
        },
    };
    let Some(state) = store.load(&run_id)? else {
        return Err(RunStateError::Missing { run_id }.into());
    };

    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    println!("🔹 ADW ID: {}", state.run_id);
    println!("   Issue: {}", or_dash(state.issue_number.map(|n| format!("#{n}"))));
    println!("   Type: {}", or_dash(state.work_type.map(|t| t.to_string())));
    println!("   Branch: {}", or_dash(state.branch_name.clone()));
    println!("   Spec: {}", or_dash(state.spec_file.clone()));

    let paths = store.paths(&run_id);
    match load_test_outcomes(&paths.test_results_path())? {
        Some(outcomes) => {
            let passed = outcomes.iter().filter(|o| o.passed).count();
            println!("   Checks: {passed}/{} passed", outcomes.len());
        }
        None => println!("   Checks: not run"),
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["adw", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_plan_with_run_id() {
        let cli = Cli::parse_from(["adw", "plan", "42", "--run-id", "abc12345"]);
        match cli.command {
            Command::Plan { issue, run_id } => {
                assert_eq!(issue, 42);
                assert_eq!(run_id.as_deref(), Some("abc12345"));
            }
            _ => panic!("expected plan"),
        }
    }

    #[test]
    fn parse_phase_commands_take_issue_and_run_id() {
        let cli = Cli::parse_from(["adw", "build", "7", "r1"]);
        assert!(matches!(cli.command, Command::Build { issue: 7, ref run_id } if run_id == "r1"));
        assert!(Cli::try_parse_from(["adw", "test", "7"]).is_err());
    }

    #[test]
    fn parse_sdlc_flags_and_globals() {
        let cli = Cli::parse_from(["adw", "sdlc", "3", "--skip-review", "--root", "/tmp/ws"]);
        assert_eq!(cli.root.as_deref(), Some(Path::new("/tmp/ws")));
        assert!(matches!(
            cli.command,
            Command::Sdlc {
                issue: 3,
                skip_test: false,
                skip_review: true
            }
        ));
    }

    #[test]
    fn parse_plan_build_and_fix() {
        let cli = Cli::parse_from(["adw", "plan-build", "5"]);
        assert!(matches!(cli.command, Command::PlanBuild { issue: 5 }));
        let cli = Cli::parse_from(["adw", "fix", "errors.log"]);
        assert!(matches!(cli.command, Command::Fix { run_id: None, .. }));
    }

    #[test]
    fn failed_status_maps_to_failure_exit() {
        assert_eq!(status_exit(PhaseStatus::Degraded), exit_codes::OK);
        assert_eq!(status_exit(PhaseStatus::Failed), exit_codes::FAILED);
    }
}

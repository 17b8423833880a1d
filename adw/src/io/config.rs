//! Workflow configuration: `.adw/config.toml` plus environment overrides.
//!
//! Everything is read once at startup into an [`AdwConfig`] that is passed
//! down explicitly. Nothing below the CLI consults the environment.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::io::process::StreamMode;
use crate::io::run_state::write_atomic;

/// Location of the config file relative to the workspace root.
pub const CONFIG_RELATIVE_PATH: &str = ".adw/config.toml";

/// One named check run by the Test phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckSpec {
    pub name: String,
    /// Shell command, run through `sh -c`.
    pub command: String,
    pub purpose: String,
}

impl CheckSpec {
    pub fn new(name: &str, command: &str, purpose: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            purpose: purpose.to_string(),
        }
    }
}

/// Workflow configuration (TOML).
///
/// Edited by humans; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Checks for the Test phase, run in order until the first failure.
    pub checks: Vec<CheckSpec>,

    /// Wall-clock bound per check.
    pub check_timeout_secs: u64,

    /// Maximum size of the stderr excerpt recorded for a failed check.
    pub error_excerpt_bytes: usize,

    /// Branch pull requests target and diffs are computed against.
    pub base_branch: String,

    /// Truncate captured command output beyond this many bytes per stream.
    pub output_limit_bytes: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            checks: vec![
                CheckSpec::new(
                    "TypeScript Check",
                    "pnpm tsc --noEmit",
                    "Validate TypeScript types",
                ),
                CheckSpec::new("Lint Check", "pnpm lint", "Check code quality"),
                CheckSpec::new("Unit Tests", "pnpm test", "Run unit tests"),
                CheckSpec::new("Build Test", "pnpm build", "Verify production build"),
            ],
            check_timeout_secs: 300,
            error_excerpt_bytes: 500,
            base_branch: "main".to_string(),
            output_limit_bytes: 4 * 1024 * 1024,
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.check_timeout_secs == 0 {
            return Err(anyhow!("check_timeout_secs must be > 0"));
        }
        if self.error_excerpt_bytes == 0 {
            return Err(anyhow!("error_excerpt_bytes must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.base_branch.trim().is_empty() {
            return Err(anyhow!("base_branch must not be empty"));
        }
        for (idx, check) in self.checks.iter().enumerate() {
            if check.name.trim().is_empty() {
                return Err(anyhow!("checks[{idx}].name must not be empty"));
            }
            if check.command.trim().is_empty() {
                return Err(anyhow!("checks[{idx}].command must not be empty"));
            }
        }
        Ok(())
    }
}

/// Load workflow config from a TOML file.
///
/// If the file is missing, returns `WorkflowConfig::default()`.
pub fn load_config(path: &Path) -> Result<WorkflowConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        let cfg = WorkflowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WorkflowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write workflow config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &WorkflowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Which provider variant backs agent calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// Named slash commands with per-operation argument encoding (`claude`).
    #[default]
    DirectCommand,
    /// Free-form prompts rendered from templates (`kimi`).
    TemplatedPrompt,
}

impl ProviderKind {
    /// Map the `AI_PROVIDER` selector. Unknown values warn and fall back to DirectCommand.
    pub fn from_selector(selector: Option<&str>) -> Self {
        let Some(raw) = selector else {
            return ProviderKind::default();
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "claude" => ProviderKind::DirectCommand,
            "kimi" => ProviderKind::TemplatedPrompt,
            other => {
                warn!(selector = other, "unknown AI_PROVIDER, falling back to claude");
                println!("⚠️  Unknown AI_PROVIDER '{other}', using claude");
                ProviderKind::DirectCommand
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::DirectCommand => "claude",
            ProviderKind::TemplatedPrompt => "kimi",
        }
    }
}

/// Interactive runs favor quick feedback; unattended runs stream and wait longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Interactive,
    Unattended,
}

impl ExecutionMode {
    /// `CI=true` (any case) selects unattended execution.
    pub fn from_ci_flag(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("true") => ExecutionMode::Unattended,
            _ => ExecutionMode::Interactive,
        }
    }

    pub fn stream_mode(self) -> StreamMode {
        match self {
            ExecutionMode::Interactive => StreamMode::Buffered,
            ExecutionMode::Unattended => StreamMode::Streaming,
        }
    }
}

/// Settings the agent providers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub provider: ProviderKind,
    pub claude_path: String,
    pub kimi_path: String,
    pub mode: ExecutionMode,
    pub output_limit_bytes: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            claude_path: "claude".to_string(),
            kimi_path: "kimi".to_string(),
            mode: ExecutionMode::default(),
            output_limit_bytes: WorkflowConfig::default().output_limit_bytes,
        }
    }
}

/// Issue tracker endpoint and credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitHubSettings {
    pub repo_url: Option<String>,
    pub token: Option<String>,
}

/// Everything a workflow run is configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdwConfig {
    pub workflow: WorkflowConfig,
    pub agent: AgentSettings,
    pub github: GitHubSettings,
}

impl AdwConfig {
    /// Load the config file and apply overrides from the process environment.
    pub fn load(config_path: &Path) -> Result<Self> {
        let workflow = load_config(config_path)?;
        Ok(Self::from_lookup(workflow, |key| env::var(key).ok()))
    }

    /// Apply overrides from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(workflow: WorkflowConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let agent = AgentSettings {
            provider: ProviderKind::from_selector(get("AI_PROVIDER").as_deref()),
            claude_path: get("CLAUDE_CODE_PATH").unwrap_or_else(|| "claude".to_string()),
            kimi_path: get("KIMI_CODE_PATH").unwrap_or_else(|| "kimi".to_string()),
            mode: ExecutionMode::from_ci_flag(get("CI").as_deref()),
            output_limit_bytes: workflow.output_limit_bytes,
        };
        let github = GitHubSettings {
            repo_url: get("GITHUB_REPO_URL"),
            token: get("GITHUB_PAT").or_else(|| get("GITHUB_TOKEN")),
        };
        debug!(
            provider = agent.provider.name(),
            mode = ?agent.mode,
            github_configured = github.repo_url.is_some(),
            "configuration resolved"
        );

        Self {
            workflow,
            agent,
            github,
        }
    }
}

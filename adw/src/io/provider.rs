//! Agent providers: one contract over differently shaped agent CLIs.
//!
//! [`DirectCommandProvider`] drives a CLI that understands named slash
//! commands, encoding arguments per operation. [`TemplatedPromptProvider`]
//! drives a CLI that only takes a free-form instruction, so each operation is
//! rendered into a full prompt first. Both hand the process to
//! [`crate::io::process`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::core::types::{AgentResponse, Operation, WorkType};
use crate::io::config::{AgentSettings, ExecutionMode, ProviderKind};
use crate::io::process::{self, CommandRequest, StreamMode};
use crate::io::prompt::{PromptEngine, SpecContext};

/// Bound for interactive (buffered) agent runs.
pub const INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(300);
/// Bound for unattended (streaming) agent runs.
pub const UNATTENDED_TIMEOUT: Duration = Duration::from_secs(600);

pub fn agent_timeout(mode: ExecutionMode) -> Duration {
    match mode {
        ExecutionMode::Interactive => INTERACTIVE_TIMEOUT,
        ExecutionMode::Unattended => UNATTENDED_TIMEOUT,
    }
}

/// Runs logical operations against an external agent.
pub trait AgentProvider {
    fn name(&self) -> &'static str;

    /// Run one operation. Failures of any kind come back as `success = false`.
    fn run_operation(
        &self,
        operation: &Operation,
        args: &[String],
        workdir: Option<&Path>,
        output_file: Option<&Path>,
    ) -> AgentResponse;
}

/// Concrete process invocation for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub stdin: Option<String>,
}

/// Pick the provider variant named by the settings.
pub fn build_provider(settings: &AgentSettings) -> Box<dyn AgentProvider> {
    match settings.provider {
        ProviderKind::DirectCommand => Box::new(DirectCommandProvider::new(settings)),
        ProviderKind::TemplatedPrompt => Box::new(TemplatedPromptProvider::new(settings)),
    }
}

fn arg(args: &[String], idx: usize) -> &str {
    args.get(idx).map(String::as_str).unwrap_or("")
}

fn run_invocation(
    provider: &str,
    invocation: Invocation,
    mode: ExecutionMode,
    output_limit_bytes: usize,
    workdir: Option<&Path>,
    output_file: Option<&Path>,
) -> AgentResponse {
    let stream_mode = mode.stream_mode();
    if stream_mode == StreamMode::Streaming {
        println!(
            "   [Running {provider} command: {}]",
            invocation.argv.first().map(String::as_str).unwrap_or("")
        );
    }
    let request = CommandRequest::new(invocation.argv, agent_timeout(mode))
        .workdir(workdir)
        .stdin(invocation.stdin)
        .mode(stream_mode)
        .output_file(output_file)
        .output_limit_bytes(output_limit_bytes);
    let outcome = process::execute(&request);
    if outcome.timed_out {
        warn!(provider, "agent command timed out");
    }
    AgentResponse {
        success: outcome.success,
        output: outcome.output,
    }
}

/// Slash-command CLI (`claude -p --dangerously-skip-permissions /<op>`).
#[derive(Debug, Clone)]
pub struct DirectCommandProvider {
    binary: String,
    mode: ExecutionMode,
    output_limit_bytes: usize,
}

impl DirectCommandProvider {
    pub fn new(settings: &AgentSettings) -> Self {
        Self {
            binary: settings.claude_path.clone(),
            mode: settings.mode,
            output_limit_bytes: settings.output_limit_bytes,
        }
    }

    fn command_token(operation: &Operation) -> String {
        let name = operation.name();
        if name.starts_with('/') {
            name.to_string()
        } else {
            format!("/{name}")
        }
    }

    /// Encode an operation as argv plus optional stdin.
    ///
    /// Classification, spec generation and implementation take structured stdin,
    /// review takes positional tokens, everything else gets newline-joined stdin.
    pub fn invocation(&self, operation: &Operation, args: &[String]) -> Invocation {
        let mut argv = vec![
            self.binary.clone(),
            "-p".to_string(),
            "--dangerously-skip-permissions".to_string(),
            Self::command_token(operation),
        ];
        let stdin = match operation {
            Operation::ClassifyIssue => {
                Some(format!("Title: {}\nBody: {}", arg(args, 0), arg(args, 1)))
            }
            Operation::GenerateSpec => Some(format!(
                "Title: {}\nBody: {}\nType: {}\nRun ID: {}\nIssue: {}\nSpec Number: {}",
                arg(args, 0),
                arg(args, 1),
                arg(args, 2),
                arg(args, 3),
                arg(args, 4),
                arg(args, 5),
            )),
            Operation::Implement => Some(format!("{}\n{}", arg(args, 0), arg(args, 1))),
            Operation::Review => {
                argv.extend(args.iter().cloned());
                None
            }
            Operation::Fix | Operation::Custom(_) => {
                (!args.is_empty()).then(|| args.join("\n"))
            }
        };
        Invocation { argv, stdin }
    }
}

impl AgentProvider for DirectCommandProvider {
    fn name(&self) -> &'static str {
        ProviderKind::DirectCommand.name()
    }

    #[instrument(skip_all, fields(provider = "claude", operation = %operation))]
    fn run_operation(
        &self,
        operation: &Operation,
        args: &[String],
        workdir: Option<&Path>,
        output_file: Option<&Path>,
    ) -> AgentResponse {
        let invocation = self.invocation(operation, args);
        info!("running agent operation");
        run_invocation(
            self.name(),
            invocation,
            self.mode,
            self.output_limit_bytes,
            workdir,
            output_file,
        )
    }
}

/// Free-form prompt CLI (`kimi -p <prompt> --print --thinking`).
pub struct TemplatedPromptProvider {
    binary: String,
    mode: ExecutionMode,
    output_limit_bytes: usize,
    engine: PromptEngine,
}

impl TemplatedPromptProvider {
    pub fn new(settings: &AgentSettings) -> Self {
        Self {
            binary: settings.kimi_path.clone(),
            mode: settings.mode,
            output_limit_bytes: settings.output_limit_bytes,
            engine: PromptEngine::new(),
        }
    }

    /// Render the instruction text for an operation.
    pub fn prompt(
        &self,
        operation: &Operation,
        args: &[String],
        workdir: Option<&Path>,
    ) -> anyhow::Result<String> {
        match operation {
            Operation::ClassifyIssue => self.engine.render_classify(arg(args, 0), arg(args, 1)),
            Operation::GenerateSpec => self.engine.render_generate_spec(&SpecContext {
                title: arg(args, 0).to_string(),
                body: arg(args, 1).to_string(),
                work_type: arg(args, 2).parse().unwrap_or(WorkType::Feature),
                run_id: arg(args, 3).to_string(),
                issue_number: arg(args, 4).parse().unwrap_or_default(),
                spec_number: arg(args, 5).to_string(),
            }),
            Operation::Implement => {
                let spec = read_spec(arg(args, 0), workdir);
                self.engine.render_implement(arg(args, 1), &spec)
            }
            Operation::Review => {
                let spec = read_spec(arg(args, 1), workdir);
                self.engine
                    .render_review(arg(args, 0), arg(args, 1), arg(args, 2), &spec)
            }
            Operation::Fix => self.engine.render_fix(arg(args, 0)),
            Operation::Custom(name) => Ok(format!("{name} {}", args.join(" ")).trim().to_string()),
        }
    }

    pub fn invocation(&self, prompt: String) -> Invocation {
        Invocation {
            argv: vec![
                self.binary.clone(),
                "-p".to_string(),
                prompt,
                "--print".to_string(),
                "--thinking".to_string(),
            ],
            stdin: None,
        }
    }
}

/// Spec file contents, or a note the agent can act on when it cannot be read.
fn read_spec(spec_file: &str, workdir: Option<&Path>) -> String {
    let path = match workdir {
        Some(dir) if Path::new(spec_file).is_relative() => dir.join(spec_file),
        _ => PathBuf::from(spec_file),
    };
    fs::read_to_string(&path).unwrap_or_else(|err| {
        warn!(path = %path.display(), err = %err, "could not read spec file for prompt");
        format!("[Could not read spec file: {spec_file}]")
    })
}

impl AgentProvider for TemplatedPromptProvider {
    fn name(&self) -> &'static str {
        ProviderKind::TemplatedPrompt.name()
    }

    #[instrument(skip_all, fields(provider = "kimi", operation = %operation))]
    fn run_operation(
        &self,
        operation: &Operation,
        args: &[String],
        workdir: Option<&Path>,
        output_file: Option<&Path>,
    ) -> AgentResponse {
        let prompt = match self.prompt(operation, args, workdir) {
            Ok(prompt) => prompt,
            Err(err) => return AgentResponse::failed(format!("render prompt: {err:#}")),
        };
        info!(prompt_bytes = prompt.len(), "running agent operation");
        run_invocation(
            self.name(),
            self.invocation(prompt),
            self.mode,
            self.output_limit_bytes,
            workdir,
            output_file,
        )
    }
}

//! Plan: turn an issue into a run with a branch name and a spec document.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::branch::branch_name;
use crate::core::classifier::classify_issue;
use crate::core::pipeline::PhaseStatus;
use crate::core::run_id::{generate_run_id, validate_run_id};
use crate::core::spec_parser::{Recognizer, extract_spec};
use crate::core::types::Operation;
use crate::io::prompt::{PromptEngine, SpecContext};
use crate::io::run_state::{PLANNER, RunState};
use crate::io::tracker::IssueSnapshot;
use crate::phases::{PhaseEnv, print_output_excerpt};

pub const SPECS_DIR: &str = "specs";

/// Where the spec document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecSource {
    Agent(Recognizer),
    Fallback,
}

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub run_id: String,
    pub state: RunState,
    pub spec_source: SpecSource,
    /// `Succeeded` with an agent-written spec, `Degraded` with the fallback template.
    pub status: PhaseStatus,
}

/// Run the Plan phase for `issue_number`, creating a run id unless one is given.
///
/// Agent and tracker failures degrade to the fallback document; only failures
/// to write the spec or persist the run state are errors.
#[instrument(skip_all, fields(issue = issue_number))]
pub fn run_plan(env: &PhaseEnv<'_>, issue_number: u64, run_id: Option<&str>) -> Result<PlanOutcome> {
    let run_id = match run_id {
        Some(id) => {
            validate_run_id(id)?;
            id.to_string()
        }
        None => generate_run_id(&mut rand::thread_rng()),
    };
    println!("🔹 ADW ID: {run_id}");

    println!("📥 Fetching issue #{issue_number}...");
    let issue = match env.tracker.fetch_issue(issue_number) {
        Ok(issue) => {
            println!("✅ Found: {}", issue.title);
            issue
        }
        Err(err) => {
            warn!(err = %err, "issue fetch failed");
            println!("❌ Could not fetch issue ({err}). Continuing with minimal info.");
            IssueSnapshot::minimal(issue_number)
        }
    };

    let work_type = classify_issue(&issue.title, &issue.body, &issue.labels);
    println!("🏷️  Classified as: {work_type}");

    let store = env.store();
    let previous = store.load(&run_id)?;
    let branch = match previous.as_ref().and_then(|s| s.branch_name.clone()) {
        Some(existing) => {
            info!(branch = %existing, "keeping branch from existing run");
            existing
        }
        None => branch_name(issue_number, &issue.title, work_type),
    };
    println!("🌿 Branch: {branch}");

    let (spec_number, spec_file) = match previous.as_ref().and_then(|s| s.spec_file.clone()) {
        Some(existing) => {
            let number = match spec_number_of(&existing) {
                Some(number) => number,
                None => next_spec_number(env.root)?,
            };
            (number, existing)
        }
        None => {
            let number = next_spec_number(env.root)?;
            (number, format!("{SPECS_DIR}/{number:03}-{branch}.md"))
        }
    };
    println!("📝 Spec: {spec_file}");

    let context = SpecContext {
        spec_number: format!("{spec_number:03}"),
        title: issue.title.clone(),
        body: issue.body.clone(),
        run_id: run_id.clone(),
        issue_number,
        work_type,
    };

    println!("🤖 Running planner...");
    let log_path = store.paths(&run_id).agent_log(PLANNER);
    let response = env.provider.run_operation(
        &Operation::GenerateSpec,
        &[
            context.title.clone(),
            context.body.clone(),
            work_type.to_string(),
            run_id.clone(),
            issue_number.to_string(),
            context.spec_number.clone(),
        ],
        Some(env.root),
        Some(&log_path),
    );

    let extracted = if response.success {
        extract_spec(&response.output)
    } else {
        println!("⚠️  Planner command failed (non-critical)");
        print_output_excerpt(&response.output);
        None
    };

    let (document, spec_source) = match extracted {
        Some(spec) => {
            info!(recognizer = spec.recognizer.name(), "spec extracted from agent output");
            (spec.document, SpecSource::Agent(spec.recognizer))
        }
        None => {
            if response.success {
                println!("⚠️  Could not find a spec in the planner output, using template");
            }
            let doc = PromptEngine::new().render_spec_fallback(&context)?;
            (doc, SpecSource::Fallback)
        }
    };
    write_spec(env.root, &spec_file, &document)?;
    println!("✅ Created spec: {spec_file}");

    let state = RunState {
        run_id: run_id.clone(),
        issue_number: Some(issue_number),
        branch_name: Some(branch.clone()),
        spec_file: Some(spec_file.clone()),
        work_type: Some(work_type),
        review_passed: None,
    };
    store.save(&state).context("persist run state")?;
    println!(
        "💾 State saved to {}",
        store.paths(&run_id).state_path().display()
    );

    println!("\n📋 Next Steps:");
    println!("  1. Review spec: {spec_file}");
    println!("  2. Build: adw build {issue_number} {run_id}");

    let status = match spec_source {
        SpecSource::Agent(_) => PhaseStatus::Succeeded,
        SpecSource::Fallback => PhaseStatus::Degraded,
    };
    Ok(PlanOutcome {
        run_id,
        state,
        spec_source,
        status,
    })
}

/// One more than the number of spec documents already present.
pub fn next_spec_number(root: &Path) -> Result<u32> {
    let dir = root.join(SPECS_DIR);
    if !dir.exists() {
        return Ok(1);
    }
    let mut count = 0u32;
    for entry in fs::read_dir(&dir).with_context(|| format!("read directory {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            count += 1;
        }
    }
    Ok(count + 1)
}

fn spec_number_of(spec_file: &str) -> Option<u32> {
    let stem = Path::new(spec_file).file_name()?.to_str()?;
    let digits: String = stem.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn write_spec(root: &Path, spec_file: &str, document: &str) -> Result<()> {
    let path = root.join(spec_file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut contents = document.trim_end().to_string();
    contents.push('\n');
    fs::write(&path, contents).with_context(|| format!("write spec {}", path.display()))
}

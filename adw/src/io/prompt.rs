//! Prompt and document templates rendered with minijinja.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::WorkType;

const CLASSIFY_TEMPLATE: &str = include_str!("prompts/classify_issue.md");
const GENERATE_SPEC_TEMPLATE: &str = include_str!("prompts/generate_spec.md");
const IMPLEMENT_TEMPLATE: &str = include_str!("prompts/implement.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");
const SPEC_FALLBACK_TEMPLATE: &str = include_str!("prompts/spec_fallback.md");
const PULL_REQUEST_TEMPLATE: &str = include_str!("prompts/pull_request.md");

/// Inputs for the spec-generation prompt and the fallback spec document.
#[derive(Debug, Clone, Serialize)]
pub struct SpecContext {
    pub spec_number: String,
    pub title: String,
    pub body: String,
    pub run_id: String,
    pub issue_number: u64,
    pub work_type: WorkType,
}

/// Inputs for the pull request body.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestContext {
    pub issue_number: u64,
    pub work_type: WorkType,
    pub spec_file: String,
    pub run_id: String,
    pub diff_stat: String,
    pub commits: String,
    pub tests_ran: bool,
    pub reviewed: bool,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        for (name, source) in [
            ("classify_issue", CLASSIFY_TEMPLATE),
            ("generate_spec", GENERATE_SPEC_TEMPLATE),
            ("implement", IMPLEMENT_TEMPLATE),
            ("fix", FIX_TEMPLATE),
            ("review", REVIEW_TEMPLATE),
            ("spec_fallback", SPEC_FALLBACK_TEMPLATE),
            ("pull_request", PULL_REQUEST_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("bundled template should be valid");
        }
        Self { env }
    }

    fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("load template {name}"))?;
        template
            .render(ctx)
            .with_context(|| format!("render template {name}"))
    }

    pub fn render_classify(&self, title: &str, body: &str) -> Result<String> {
        self.render("classify_issue", context! { title, body })
    }

    pub fn render_generate_spec(&self, spec: &SpecContext) -> Result<String> {
        self.render("generate_spec", spec)
    }

    pub fn render_implement(&self, run_id: &str, spec: &str) -> Result<String> {
        self.render("implement", context! { run_id, spec => spec.trim() })
    }

    pub fn render_fix(&self, error_log: &str) -> Result<String> {
        self.render("fix", context! { error_log => error_log.trim_end() })
    }

    pub fn render_review(
        &self,
        run_id: &str,
        spec_file: &str,
        agent_name: &str,
        spec: &str,
    ) -> Result<String> {
        self.render(
            "review",
            context! { run_id, spec_file, agent_name, spec => spec.trim() },
        )
    }

    /// The deterministic spec document written when the agent produced nothing usable.
    pub fn render_spec_fallback(&self, spec: &SpecContext) -> Result<String> {
        self.render("spec_fallback", SpecContext {
            body: spec.body.trim().to_string(),
            ..spec.clone()
        })
    }

    pub fn render_pull_request(&self, pr: &PullRequestContext) -> Result<String> {
        self.render("pull_request", PullRequestContext {
            diff_stat: pr.diff_stat.trim_end().to_string(),
            commits: pr.commits.trim_end().to_string(),
            ..pr.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_context(body: &str) -> SpecContext {
        SpecContext {
            spec_number: "001".to_string(),
            title: "Add dark mode".to_string(),
            body: body.to_string(),
            run_id: "abcd1234".to_string(),
            issue_number: 7,
            work_type: WorkType::Feature,
        }
    }

    #[test]
    fn fallback_contains_literal_body() {
        let engine = PromptEngine::new();
        let doc = engine
            .render_spec_fallback(&spec_context("Users want a <dark> theme & more."))
            .expect("render");
        assert!(doc.starts_with("# Spec 001: Add dark mode\n"));
        assert!(doc.contains("Users want a <dark> theme & more."));
        assert!(doc.contains("**ADW ID:** abcd1234"));
        assert!(doc.contains("**Issue:** #7"));
        assert!(doc.contains("**Type:** feature"));
    }

    #[test]
    fn fallback_without_body_uses_placeholder() {
        let engine = PromptEngine::new();
        let doc = engine
            .render_spec_fallback(&spec_context("   "))
            .expect("render");
        assert!(doc.contains("_No description provided_"));
    }

    #[test]
    fn generate_spec_prompt_names_expected_heading() {
        let engine = PromptEngine::new();
        let prompt = engine
            .render_generate_spec(&spec_context("body"))
            .expect("render");
        assert!(prompt.contains("# Spec 001: Add dark mode"));
        assert!(prompt.contains("issue #7"));
    }

    #[test]
    fn fix_prompt_embeds_log() {
        let engine = PromptEngine::new();
        let prompt = engine.render_fix("error TS2304: Cannot find name 'x'\n").expect("render");
        assert!(prompt.contains("```\nerror TS2304: Cannot find name 'x'\n```"));
    }

    #[test]
    fn pull_request_body_closes_issue() {
        let engine = PromptEngine::new();
        let body = engine
            .render_pull_request(&PullRequestContext {
                issue_number: 12,
                work_type: WorkType::Bug,
                spec_file: "specs/002-fix-12-crash.md".to_string(),
                run_id: "run00012".to_string(),
                diff_stat: " src/a.ts | 2 +-\n".to_string(),
                commits: String::new(),
                tests_ran: true,
                reviewed: false,
            })
            .expect("render");
        assert!(body.contains("## Summary"));
        assert!(body.contains(" src/a.ts | 2 +-\n```"));
        assert!(body.contains("No commits"));
        assert!(body.contains("- [x] Tests pass"));
        assert!(body.contains("- [ ] Code reviewed"));
        assert!(body.trim_end().ends_with("Closes #12"));
    }
}

//! Shared deterministic types for workflow core logic.
//!
//! These types define stable contracts between the phases, the providers and
//! the persisted artifacts. They carry no I/O and must serialize identically
//! across runs.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

use serde::{Deserialize, Serialize};

/// Category of work an issue represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    /// Maintenance: refactors, configuration, dependency bumps.
    Chore,
    /// Defect fix.
    Bug,
    /// Net-new functionality.
    Feature,
}

impl WorkType {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkType::Chore => "chore",
            WorkType::Bug => "bug",
            WorkType::Feature => "feature",
        }
    }

    /// Prefix used when deriving a branch name for this kind of work.
    pub fn branch_prefix(self) -> &'static str {
        match self {
            WorkType::Chore => "chore",
            WorkType::Bug => "fix",
            WorkType::Feature => "feat",
        }
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chore" => Ok(WorkType::Chore),
            "bug" => Ok(WorkType::Bug),
            "feature" => Ok(WorkType::Feature),
            other => Err(anyhow!("unknown work type '{other}'")),
        }
    }
}

/// A logical unit of agent work, independent of how a provider encodes it.
///
/// Positional arguments by operation:
/// - `ClassifyIssue`: `[title, body]`
/// - `GenerateSpec`: `[title, body, work_type, run_id, issue_number, spec_number]`
/// - `Implement`: `[spec_file, run_id]`
/// - `Review`: `[run_id, spec_file, agent_name]`
/// - `Fix`: `[error_log]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    ClassifyIssue,
    GenerateSpec,
    Implement,
    Review,
    Fix,
    /// Anything outside the known vocabulary; providers fall back to a generic encoding.
    Custom(String),
}

impl Operation {
    pub fn name(&self) -> &str {
        match self {
            Operation::ClassifyIssue => "classify_issue",
            Operation::GenerateSpec => "generate_spec",
            Operation::Implement => "implement",
            Operation::Review => "review",
            Operation::Fix => "fix",
            Operation::Custom(name) => name,
        }
    }

    /// Parse an operation name, accepting an optional leading `/`.
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim();
        match trimmed.trim_start_matches('/') {
            "classify_issue" => Operation::ClassifyIssue,
            "generate_spec" => Operation::GenerateSpec,
            "implement" => Operation::Implement,
            "review" => Operation::Review,
            "fix" => Operation::Fix,
            _ => Operation::Custom(trimmed.to_string()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one agent invocation. Consumed immediately by the calling phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub success: bool,
    pub output: String,
}

impl AgentResponse {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Outcome of a single named check in the Test phase.
///
/// Field names on disk match the historical `test_results.json` layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    #[serde(rename = "test_name")]
    pub name: String,
    #[serde(rename = "execution_command")]
    pub command: String,
    #[serde(rename = "test_purpose")]
    pub purpose: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Truncate `text` to at most `max_bytes`, never splitting a UTF-8 character.
pub fn truncate_to_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_parse_accepts_slash_prefix() {
        assert_eq!(Operation::parse("/implement"), Operation::Implement);
        assert_eq!(Operation::parse("classify_issue"), Operation::ClassifyIssue);
        assert_eq!(
            Operation::parse("/document"),
            Operation::Custom("/document".to_string())
        );
    }

    #[test]
    fn work_type_parses_case_insensitively() {
        assert_eq!("Bug".parse::<WorkType>().expect("parse"), WorkType::Bug);
        assert!("patch".parse::<WorkType>().is_err());
    }

    #[test]
    fn work_type_serializes_lowercase() {
        let json = serde_json::to_string(&WorkType::Bug).expect("serialize");
        assert_eq!(json, "\"bug\"");
    }

    #[test]
    fn test_outcome_omits_missing_error() {
        let outcome = TestOutcome {
            name: "Lint Check".to_string(),
            command: "pnpm lint".to_string(),
            purpose: "Check code quality".to_string(),
            passed: true,
            error: None,
        };
        let json = serde_json::to_string(&outcome).expect("serialize");
        assert!(json.contains("\"test_name\":\"Lint Check\""));
        assert!(!json.contains("error"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_to_boundary("héllo", 2), "h");
        assert_eq!(truncate_to_boundary("abc", 10), "abc");
    }
}

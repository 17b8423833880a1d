//! Issue tracker client (GitHub REST API).
//!
//! Phases treat the tracker as an opaque collaborator behind [`IssueTracker`].
//! Every failure is a typed [`TrackerError`] so callers can decide whether it
//! is fatal; Plan degrades, Publish fails only when no pull request is created.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::io::config::GitHubSettings;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only view of an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

impl IssueSnapshot {
    /// Stand-in used when the tracker cannot be reached.
    pub fn minimal(number: u64) -> Self {
        Self {
            number,
            title: format!("Issue {number}"),
            body: String::new(),
            labels: Vec::new(),
            author: None,
            created_at: None,
            updated_at: None,
            url: None,
        }
    }
}

/// A pull request to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("issue tracker not configured: {0} is not set")]
    Unconfigured(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cannot parse repository from '{0}'")]
    InvalidRepoUrl(String),
}

pub trait IssueTracker {
    fn fetch_issue(&self, number: u64) -> Result<IssueSnapshot, TrackerError>;

    fn post_comment(&self, number: u64, body: &str) -> Result<(), TrackerError>;

    /// Open a pull request and return its URL.
    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<String, TrackerError>;
}

/// Build the tracker described by the settings, or one that reports why it is missing.
pub fn tracker_from_settings(settings: &GitHubSettings) -> Box<dyn IssueTracker> {
    let Some(repo_url) = settings.repo_url.as_deref() else {
        return Box::new(UnconfiguredTracker);
    };
    match GitHubTracker::new(repo_url, settings.token.clone(), DEFAULT_API_BASE) {
        Ok(tracker) => Box::new(tracker),
        Err(err) => {
            warn!(err = %err, "issue tracker disabled");
            Box::new(UnconfiguredTracker)
        }
    }
}

/// Tracker used when `GITHUB_REPO_URL` is absent.
#[derive(Debug, Default)]
pub struct UnconfiguredTracker;

impl IssueTracker for UnconfiguredTracker {
    fn fetch_issue(&self, _number: u64) -> Result<IssueSnapshot, TrackerError> {
        Err(TrackerError::Unconfigured("GITHUB_REPO_URL"))
    }

    fn post_comment(&self, _number: u64, _body: &str) -> Result<(), TrackerError> {
        Err(TrackerError::Unconfigured("GITHUB_REPO_URL"))
    }

    fn create_pull_request(&self, _draft: &PullRequestDraft) -> Result<String, TrackerError> {
        Err(TrackerError::Unconfigured("GITHUB_REPO_URL"))
    }
}

/// Extract `(owner, repo)` from an https, ssh or `owner/repo` reference.
pub fn parse_repo(url: &str) -> Result<(String, String), TrackerError> {
    let invalid = || TrackerError::InvalidRepoUrl(url.to_string());
    let trimmed = url.trim().trim_end_matches('/');
    let path = if let Some(rest) = trimmed.strip_prefix("git@") {
        rest.split_once(':').map(|(_, path)| path).ok_or_else(invalid)?
    } else if let Some((_, rest)) = trimmed.split_once("://") {
        rest.split_once('/').map(|(_, path)| path).ok_or_else(invalid)?
    } else {
        trimmed
    };

    let path = path.strip_suffix(".git").unwrap_or(path);
    let mut parts = path.split('/').filter(|part| !part.is_empty());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) => Ok((owner.to_string(), repo.to_string())),
        _ => Err(invalid()),
    }
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<WireLabel>,
    #[serde(default)]
    user: Option<WireUser>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct WirePullRequest {
    html_url: String,
}

impl From<WireIssue> for IssueSnapshot {
    fn from(issue: WireIssue) -> Self {
        Self {
            number: issue.number,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            labels: issue.labels.into_iter().map(|label| label.name).collect(),
            author: issue.user.map(|user| user.login),
            created_at: issue.created_at,
            updated_at: issue.updated_at,
            url: issue.html_url,
        }
    }
}

/// GitHub REST client over blocking reqwest.
#[derive(Debug, Clone)]
pub struct GitHubTracker {
    owner: String,
    repo: String,
    token: Option<String>,
    api_base: String,
    client: Client,
}

impl GitHubTracker {
    pub fn new(
        repo_url: &str,
        token: Option<String>,
        api_base: &str,
    ) -> Result<Self, TrackerError> {
        let (owner, repo) = parse_repo(repo_url)?;
        let client = Client::builder()
            .user_agent(concat!("adw/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            owner,
            repo,
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_base, self.owner, self.repo, path)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn require_token(&self) -> Result<(), TrackerError> {
        if self.token.is_none() {
            return Err(TrackerError::Unconfigured("GITHUB_PAT or GITHUB_TOKEN"));
        }
        Ok(())
    }

    fn check(response: Response, what: &str) -> Result<Response, TrackerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 404 {
            return Err(TrackerError::NotFound(what.to_string()));
        }
        let message = response
            .json::<serde_json::Value>()
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Err(TrackerError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl IssueTracker for GitHubTracker {
    #[instrument(skip_all, fields(number))]
    fn fetch_issue(&self, number: u64) -> Result<IssueSnapshot, TrackerError> {
        let url = self.api_url(&format!("issues/{number}"));
        let response = self.request(reqwest::Method::GET, &url).send()?;
        let issue: WireIssue = Self::check(response, &format!("issue #{number}"))?.json()?;
        debug!(title = %issue.title, "issue fetched");
        Ok(issue.into())
    }

    #[instrument(skip_all, fields(number))]
    fn post_comment(&self, number: u64, body: &str) -> Result<(), TrackerError> {
        self.require_token()?;
        let url = self.api_url(&format!("issues/{number}/comments"));
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({ "body": body }))
            .send()?;
        Self::check(response, &format!("issue #{number}"))?;
        Ok(())
    }

    #[instrument(skip_all, fields(head = %draft.head))]
    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<String, TrackerError> {
        self.require_token()?;
        let url = self.api_url("pulls");
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({
                "title": draft.title,
                "body": draft.body,
                "head": draft.head,
                "base": draft.base,
            }))
            .send()?;
        let pr: WirePullRequest = Self::check(response, "repository")?.json()?;
        debug!(url = %pr.html_url, "pull request created");
        Ok(pr.html_url)
    }
}

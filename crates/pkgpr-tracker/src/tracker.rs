//! Tracker trait definitions for pkgpr
//!
//! The `PullRequestTracker` trait is the engine's only window onto the
//! issue/PR tracker. It covers:
//! - pull request listing, creation, update and merge
//! - labels and comments on the pull request's issue
//! - commit statuses on a head SHA
//! - repository variables (used to persist the run cursor)
//!
//! An in-memory fake is provided for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Result type for tracker operations
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Maximum length GitHub accepts for a commit status description.
pub const STATUS_DESCRIPTION_LIMIT: usize = 140;

/// Lifecycle state of a pull request as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

/// A pull request on the remote, keyed by its head branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePullRequest {
    pub number: u64,
    /// Head branch name (without `refs/heads/`)
    pub branch: String,
    pub head_sha: String,
    pub title: String,
    pub state: PullRequestState,
    pub html_url: Option<String>,
}

impl RemotePullRequest {
    /// The merge ref GitHub maintains for this pull request.
    pub fn merge_ref(&self) -> String {
        format!("refs/pull/{}/merge", self.number)
    }
}

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub base: String,
    pub head: String,
    pub title: String,
    pub body: String,
}

/// Commit status state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    Pending,
    Success,
    Failure,
    Error,
}

impl StatusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusState::Pending => "pending",
            StatusState::Success => "success",
            StatusState::Failure => "failure",
            StatusState::Error => "error",
        }
    }
}

impl std::fmt::Display for StatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A commit status attached to a SHA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub state: StatusState,
    pub description: String,
    pub context: String,
    pub target_url: Option<String>,
}

impl CommitStatus {
    /// Build a status, truncating the description to the tracker's limit.
    pub fn new(
        state: StatusState,
        description: impl AsRef<str>,
        context: impl Into<String>,
        target_url: Option<String>,
    ) -> Self {
        Self {
            state,
            description: truncate_description(description.as_ref()),
            context: context.into(),
            target_url,
        }
    }
}

/// Truncate to [`STATUS_DESCRIPTION_LIMIT`] characters, marking the cut with `…`.
pub fn truncate_description(text: &str) -> String {
    if text.chars().count() <= STATUS_DESCRIPTION_LIMIT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(STATUS_DESCRIPTION_LIMIT - 1).collect();
    out.push('…');
    out
}

/// Issue/PR tracker.
///
/// Guarantees expected by the engine:
/// - `list_open_pull_requests` returns every open PR (all pages).
/// - `update_pull_request` edits title/body in place; it never opens a new PR.
/// - `add_labels` is additive and only called by the engine on creation.
#[async_trait]
pub trait PullRequestTracker: Send + Sync {
    /// List all currently open pull requests.
    async fn list_open_pull_requests(&self) -> TrackerResult<Vec<RemotePullRequest>>;

    /// Open a new pull request.
    async fn create_pull_request(&self, request: &NewPullRequest)
        -> TrackerResult<RemotePullRequest>;

    /// Replace the title and body of an existing pull request.
    async fn update_pull_request(
        &self,
        number: u64,
        title: &str,
        body: &str,
    ) -> TrackerResult<RemotePullRequest>;

    /// Attach labels to a pull request.
    async fn add_labels(&self, number: u64, labels: &[String]) -> TrackerResult<()>;

    /// Set a commit status on `sha`.
    async fn create_commit_status(&self, sha: &str, status: &CommitStatus) -> TrackerResult<()>;

    /// Merge a pull request.
    async fn merge_pull_request(&self, number: u64) -> TrackerResult<()>;

    /// Post a comment on a pull request.
    async fn create_comment(&self, number: u64, body: &str) -> TrackerResult<()>;

    /// Read a repository variable. `None` if it does not exist.
    async fn get_variable(&self, name: &str) -> TrackerResult<Option<String>>;

    /// Create or overwrite a repository variable.
    async fn set_variable(&self, name: &str, value: &str) -> TrackerResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_description_is_kept() {
        let status = CommitStatus::new(StatusState::Pending, "Running lint...", "ctx", None);
        assert_eq!(status.description, "Running lint...");
    }

    #[test]
    fn long_description_is_truncated_to_limit() {
        let long = "x".repeat(500);
        let truncated = truncate_description(&long);
        assert_eq!(truncated.chars().count(), STATUS_DESCRIPTION_LIMIT);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn merge_ref_uses_pr_number() {
        let pr = RemotePullRequest {
            number: 42,
            branch: "package/a/b".to_string(),
            head_sha: "abc".to_string(),
            title: "t".to_string(),
            state: PullRequestState::Open,
            html_url: None,
        };
        assert_eq!(pr.merge_ref(), "refs/pull/42/merge");
    }

    #[test]
    fn status_state_serializes_lowercase() {
        let json = serde_json::to_string(&StatusState::Failure).unwrap();
        assert_eq!(json, "\"failure\"");
        assert_eq!(StatusState::Success.to_string(), "success");
    }
}

//! GitHub REST client
//!
//! Implements [`PullRequestTracker`] against the GitHub REST API (v3).
//! Only the handful of endpoints the reconciliation engine needs are covered.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::TrackerError;
use crate::tracker::{
    CommitStatus, NewPullRequest, PullRequestState, PullRequestTracker, RemotePullRequest,
    TrackerResult,
};

/// Page size used when listing pull requests (GitHub's maximum).
const PAGE_SIZE: usize = 100;

const API_VERSION: &str = "2022-11-28";

/// GitHub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// REST API root, e.g. `https://api.github.com`
    pub api_url: String,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Token sent as `Authorization: Bearer` (optional for public reads)
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        let (owner, repo) = std::env::var("GITHUB_REPOSITORY")
            .ok()
            .and_then(|slug| split_slug(&slug))
            .unwrap_or_default();
        GithubConfig {
            api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            owner,
            repo,
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }
}

impl GithubConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific `owner/repo` slug
    pub fn from_slug(slug: &str) -> TrackerResult<Self> {
        let (owner, repo) = split_slug(slug).ok_or_else(|| {
            TrackerError::NotConfigured(format!("repository must be owner/repo, got '{slug}'"))
        })?;
        Ok(GithubConfig {
            owner,
            repo,
            ..Self::default()
        })
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Point the client at a different API root (GitHub Enterprise, tests)
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }
}

fn split_slug(slug: &str) -> Option<(String, String)> {
    let (owner, repo) = slug.trim().split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

#[derive(Debug, Deserialize)]
struct WireHead {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct WirePullRequest {
    number: u64,
    title: String,
    state: String,
    html_url: Option<String>,
    head: WireHead,
    #[serde(default)]
    merged_at: Option<String>,
}

impl From<WirePullRequest> for RemotePullRequest {
    fn from(pr: WirePullRequest) -> Self {
        let state = if pr.merged_at.is_some() {
            PullRequestState::Merged
        } else if pr.state == "open" {
            PullRequestState::Open
        } else {
            PullRequestState::Closed
        };
        RemotePullRequest {
            number: pr.number,
            branch: pr.head.ref_name,
            head_sha: pr.head.sha,
            title: pr.title,
            state,
            html_url: pr.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireVariable {
    value: String,
}

/// GitHub client for pull request operations
pub struct GithubTracker {
    config: GithubConfig,
    http_client: reqwest::Client,
}

impl GithubTracker {
    /// Create a new GitHub client
    pub fn new(config: GithubConfig) -> TrackerResult<Self> {
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(TrackerError::NotConfigured(
                "owner and repo must be set (GITHUB_REPOSITORY=owner/repo)".to_string(),
            ));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("pkgpr/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(GithubTracker {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> TrackerResult<Self> {
        Self::new(GithubConfig::from_env())
    }

    pub fn config(&self) -> &GithubConfig {
        &self.config
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http_client
            .request(method, self.repo_url(path))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.config.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Send a request, mapping non-success statuses to [`TrackerError::Api`].
    async fn send(&self, operation: &str, builder: RequestBuilder) -> TrackerResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        debug!(operation, status = status.as_u16(), "github response");
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(TrackerError::api(
            operation,
            status.as_u16(),
            api_message(&text),
        ))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        builder: RequestBuilder,
    ) -> TrackerResult<T> {
        let response = self.send(operation, builder).await?;
        response.json::<T>().await.map_err(|e| TrackerError::Decode {
            operation: operation.to_string(),
            detail: e.to_string(),
        })
    }
}

/// Pull the `message` field out of a GitHub error body, falling back to the raw text.
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl PullRequestTracker for GithubTracker {
    async fn list_open_pull_requests(&self) -> TrackerResult<Vec<RemotePullRequest>> {
        let mut all = Vec::new();
        let mut page = 1usize;
        loop {
            let builder = self.request(Method::GET, "pulls").query(&[
                ("state", "open".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            let batch: Vec<WirePullRequest> =
                self.send_json("list pull requests", builder).await?;
            let count = batch.len();
            all.extend(batch.into_iter().map(RemotePullRequest::from));
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    async fn create_pull_request(
        &self,
        request: &NewPullRequest,
    ) -> TrackerResult<RemotePullRequest> {
        let builder = self.request(Method::POST, "pulls").json(&json!({
            "base": request.base,
            "head": request.head,
            "title": request.title,
            "body": request.body,
        }));
        let pr: WirePullRequest = self.send_json("create pull request", builder).await?;
        Ok(pr.into())
    }

    async fn update_pull_request(
        &self,
        number: u64,
        title: &str,
        body: &str,
    ) -> TrackerResult<RemotePullRequest> {
        let builder = self
            .request(Method::PATCH, &format!("pulls/{number}"))
            .json(&json!({ "title": title, "body": body }));
        let pr: WirePullRequest = self.send_json("update pull request", builder).await?;
        Ok(pr.into())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> TrackerResult<()> {
        let builder = self
            .request(Method::POST, &format!("issues/{number}/labels"))
            .json(&json!({ "labels": labels }));
        self.send("add labels", builder).await?;
        Ok(())
    }

    async fn create_commit_status(&self, sha: &str, status: &CommitStatus) -> TrackerResult<()> {
        let mut payload = json!({
            "state": status.state.as_str(),
            "description": status.description,
            "context": status.context,
        });
        if let Some(url) = &status.target_url {
            payload["target_url"] = json!(url);
        }
        let builder = self
            .request(Method::POST, &format!("statuses/{sha}"))
            .json(&payload);
        self.send("create commit status", builder).await?;
        Ok(())
    }

    async fn merge_pull_request(&self, number: u64) -> TrackerResult<()> {
        let builder = self
            .request(Method::PUT, &format!("pulls/{number}/merge"))
            .json(&json!({}));
        self.send("merge pull request", builder).await?;
        Ok(())
    }

    async fn create_comment(&self, number: u64, body: &str) -> TrackerResult<()> {
        let builder = self
            .request(Method::POST, &format!("issues/{number}/comments"))
            .json(&json!({ "body": body }));
        self.send("create comment", builder).await?;
        Ok(())
    }

    async fn get_variable(&self, name: &str) -> TrackerResult<Option<String>> {
        let builder = self.request(Method::GET, &format!("actions/variables/{name}"));
        match self.send_json::<WireVariable>("get variable", builder).await {
            Ok(var) => Ok(Some(var.value)),
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND.as_u16()) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn set_variable(&self, name: &str, value: &str) -> TrackerResult<()> {
        let builder = self
            .request(Method::PATCH, &format!("actions/variables/{name}"))
            .json(&json!({ "name": name, "value": value }));
        match self.send("update variable", builder).await {
            Ok(_) => Ok(()),
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND.as_u16()) => {
                debug!(name, "variable missing, creating it");
                let builder = self
                    .request(Method::POST, "actions/variables")
                    .json(&json!({ "name": name, "value": value }));
                self.send("create variable", builder).await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_must_have_owner_and_repo() {
        assert_eq!(
            split_slug("memo33/sc4pac"),
            Some(("memo33".to_string(), "sc4pac".to_string()))
        );
        assert_eq!(split_slug("no-slash"), None);
        assert_eq!(split_slug("/repo"), None);
        assert_eq!(split_slug("a/b/c"), None);
    }

    #[test]
    fn tracker_requires_owner_and_repo() {
        let config = GithubConfig {
            api_url: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            token: None,
        };
        assert!(matches!(
            GithubTracker::new(config),
            Err(TrackerError::NotConfigured(_))
        ));
    }

    #[test]
    fn repo_url_joins_path() {
        let config = GithubConfig {
            api_url: "https://api.github.com/".to_string(),
            owner: "o".to_string(),
            repo: "r".to_string(),
            token: None,
        };
        let tracker = GithubTracker::new(config).unwrap();
        assert_eq!(
            tracker.repo_url("/pulls/3/merge"),
            "https://api.github.com/repos/o/r/pulls/3/merge"
        );
    }

    #[test]
    fn api_message_prefers_json_message() {
        assert_eq!(api_message(r#"{"message":"Bad credentials"}"#), "Bad credentials");
        assert_eq!(api_message("plain failure\n"), "plain failure");
    }

    #[test]
    fn wire_pull_request_maps_state() {
        let wire: WirePullRequest = serde_json::from_value(json!({
            "number": 7,
            "title": "`a:b@1.0.0`",
            "state": "closed",
            "html_url": null,
            "head": { "ref": "package/a/b", "sha": "deadbeef" },
            "merged_at": "2024-12-21T21:40:00Z"
        }))
        .unwrap();
        let pr = RemotePullRequest::from(wire);
        assert_eq!(pr.state, PullRequestState::Merged);
        assert_eq!(pr.branch, "package/a/b");
        assert_eq!(pr.head_sha, "deadbeef");
    }
}

//! Remote PR Directory: one snapshot of open pull requests per batch.

use std::collections::HashMap;

use pkgpr_tracker::{PullRequestTracker, RemotePullRequest};

use crate::domain::error::Result;

/// Open pull requests keyed by head branch.
///
/// Fetched once and never refreshed mid-batch.
#[derive(Debug, Clone, Default)]
pub struct PullRequestDirectory {
    by_branch: HashMap<String, RemotePullRequest>,
}

impl PullRequestDirectory {
    pub async fn fetch(tracker: &dyn PullRequestTracker) -> Result<Self> {
        let open = tracker.list_open_pull_requests().await?;
        Ok(Self::from_pull_requests(open))
    }

    pub fn from_pull_requests(prs: impl IntoIterator<Item = RemotePullRequest>) -> Self {
        let by_branch = prs
            .into_iter()
            .map(|pr| (pr.branch.clone(), pr))
            .collect();
        Self { by_branch }
    }

    pub fn find_by_branch(&self, branch: &str) -> Option<&RemotePullRequest> {
        self.by_branch.get(branch)
    }

    pub fn len(&self) -> usize {
        self.by_branch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_branch.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgpr_tracker::fakes::MemoryTracker;
    use pkgpr_tracker::{PullRequestState, TrackerError};

    fn pr(number: u64, branch: &str) -> RemotePullRequest {
        RemotePullRequest {
            number,
            branch: branch.to_string(),
            head_sha: "abc".to_string(),
            title: "t".to_string(),
            state: PullRequestState::Open,
            html_url: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_indexes_by_branch() {
        let tracker = MemoryTracker::new()
            .with_pull_request(pr(3, "package/a/b"))
            .with_pull_request(pr(7, "package/c/d"));
        let dir = PullRequestDirectory::fetch(&tracker).await.unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.find_by_branch("package/c/d").map(|p| p.number), Some(7));
        assert!(dir.find_by_branch("package/x/y").is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let tracker = MemoryTracker::new();
        tracker.fail_operation("list");
        let err = PullRequestDirectory::fetch(&tracker).await.unwrap_err();
        assert!(matches!(
            err,
            crate::domain::error::PkgprError::Tracker(TrackerError::Injected(_))
        ));
    }
}

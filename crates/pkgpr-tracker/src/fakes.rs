//! In-memory fake tracker (testing only)
//!
//! `MemoryTracker` satisfies the [`PullRequestTracker`] contract without any
//! network access, records every call in order, and can be told to fail a
//! named operation to exercise transport-failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::TrackerError;
use crate::tracker::*;

/// One recorded tracker call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    ListOpenPullRequests,
    CreatePullRequest { head: String, title: String },
    UpdatePullRequest { number: u64, title: String },
    AddLabels { number: u64, labels: Vec<String> },
    CommitStatus { sha: String, state: StatusState },
    MergePullRequest { number: u64 },
    CreateComment { number: u64, body: String },
    GetVariable { name: String },
    SetVariable { name: String, value: String },
}

#[derive(Debug)]
struct State {
    pull_requests: Vec<(RemotePullRequest, String)>,
    next_number: u64,
    calls: Vec<TrackerCall>,
    statuses: Vec<(String, CommitStatus)>,
    variables: HashMap<String, String>,
    failing: HashSet<String>,
}

impl Default for State {
    fn default() -> Self {
        State {
            pull_requests: Vec::new(),
            next_number: 1,
            calls: Vec::new(),
            statuses: Vec::new(),
            variables: HashMap::new(),
            failing: HashSet::new(),
        }
    }
}

/// In-memory tracker backed by a `Mutex<State>`.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    state: Mutex<State>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing pull request (with an empty body).
    pub fn with_pull_request(self, pr: RemotePullRequest) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.next_number = state.next_number.max(pr.number + 1);
            state.pull_requests.push((pr, String::new()));
        }
        self
    }

    /// Seed a repository variable.
    pub fn with_variable(self, name: &str, value: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .variables
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Make every subsequent call of `operation` fail.
    ///
    /// Operation names: `list`, `create`, `update`, `labels`, `status`,
    /// `merge`, `comment`, `get_variable`, `set_variable`.
    pub fn fail_operation(&self, operation: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(operation.to_string());
    }

    /// Stop failing `operation`.
    pub fn heal_operation(&self, operation: &str) {
        self.state.lock().unwrap().failing.remove(operation);
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<TrackerCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Forget recorded calls (state is kept).
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Current record of a pull request.
    pub fn pull_request(&self, number: u64) -> Option<RemotePullRequest> {
        self.state
            .lock()
            .unwrap()
            .pull_requests
            .iter()
            .find(|(pr, _)| pr.number == number)
            .map(|(pr, _)| pr.clone())
    }

    /// Current body of a pull request.
    pub fn pull_request_body(&self, number: u64) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .pull_requests
            .iter()
            .find(|(pr, _)| pr.number == number)
            .map(|(_, body)| body.clone())
    }

    /// Every pull request ever created or seeded.
    pub fn pull_requests(&self) -> Vec<RemotePullRequest> {
        self.state
            .lock()
            .unwrap()
            .pull_requests
            .iter()
            .map(|(pr, _)| pr.clone())
            .collect()
    }

    /// Statuses set on `sha`, oldest first.
    pub fn statuses_for(&self, sha: &str) -> Vec<CommitStatus> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .iter()
            .filter(|(s, _)| s == sha)
            .map(|(_, status)| status.clone())
            .collect()
    }

    /// Current value of a repository variable.
    pub fn variable(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().variables.get(name).cloned()
    }

    fn enter(
        &self,
        operation: &str,
        call: TrackerCall,
    ) -> TrackerResult<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failing.contains(operation) {
            return Err(TrackerError::Injected(operation.to_string()));
        }
        Ok(state)
    }
}

fn find_mut(state: &mut State, number: u64) -> TrackerResult<&mut (RemotePullRequest, String)> {
    state
        .pull_requests
        .iter_mut()
        .find(|(pr, _)| pr.number == number)
        .ok_or(TrackerError::PullRequestNotFound(number))
}

#[async_trait]
impl PullRequestTracker for MemoryTracker {
    async fn list_open_pull_requests(&self) -> TrackerResult<Vec<RemotePullRequest>> {
        let state = self.enter("list", TrackerCall::ListOpenPullRequests)?;
        Ok(state
            .pull_requests
            .iter()
            .filter(|(pr, _)| pr.state == PullRequestState::Open)
            .map(|(pr, _)| pr.clone())
            .collect())
    }

    async fn create_pull_request(
        &self,
        request: &NewPullRequest,
    ) -> TrackerResult<RemotePullRequest> {
        let mut state = self.enter(
            "create",
            TrackerCall::CreatePullRequest {
                head: request.head.clone(),
                title: request.title.clone(),
            },
        )?;
        let duplicate = state
            .pull_requests
            .iter()
            .any(|(pr, _)| pr.branch == request.head && pr.state == PullRequestState::Open);
        if duplicate {
            return Err(TrackerError::api(
                "create pull request",
                422,
                format!("A pull request already exists for {}", request.head),
            ));
        }
        let number = state.next_number;
        state.next_number += 1;
        let pr = RemotePullRequest {
            number,
            branch: request.head.clone(),
            head_sha: String::new(),
            title: request.title.clone(),
            state: PullRequestState::Open,
            html_url: None,
        };
        state.pull_requests.push((pr.clone(), request.body.clone()));
        Ok(pr)
    }

    async fn update_pull_request(
        &self,
        number: u64,
        title: &str,
        body: &str,
    ) -> TrackerResult<RemotePullRequest> {
        let mut state = self.enter(
            "update",
            TrackerCall::UpdatePullRequest {
                number,
                title: title.to_string(),
            },
        )?;
        let entry = find_mut(&mut state, number)?;
        entry.0.title = title.to_string();
        entry.1 = body.to_string();
        Ok(entry.0.clone())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> TrackerResult<()> {
        let mut state = self.enter(
            "labels",
            TrackerCall::AddLabels {
                number,
                labels: labels.to_vec(),
            },
        )?;
        find_mut(&mut state, number)?;
        Ok(())
    }

    async fn create_commit_status(&self, sha: &str, status: &CommitStatus) -> TrackerResult<()> {
        let mut state = self.enter(
            "status",
            TrackerCall::CommitStatus {
                sha: sha.to_string(),
                state: status.state,
            },
        )?;
        state.statuses.push((sha.to_string(), status.clone()));
        Ok(())
    }

    async fn merge_pull_request(&self, number: u64) -> TrackerResult<()> {
        let mut state = self.enter("merge", TrackerCall::MergePullRequest { number })?;
        let entry = find_mut(&mut state, number)?;
        if entry.0.state != PullRequestState::Open {
            return Err(TrackerError::api(
                "merge pull request",
                405,
                "Pull Request is not mergeable",
            ));
        }
        entry.0.state = PullRequestState::Merged;
        Ok(())
    }

    async fn create_comment(&self, number: u64, body: &str) -> TrackerResult<()> {
        let mut state = self.enter(
            "comment",
            TrackerCall::CreateComment {
                number,
                body: body.to_string(),
            },
        )?;
        find_mut(&mut state, number)?;
        Ok(())
    }

    async fn get_variable(&self, name: &str) -> TrackerResult<Option<String>> {
        let state = self.enter(
            "get_variable",
            TrackerCall::GetVariable {
                name: name.to_string(),
            },
        )?;
        Ok(state.variables.get(name).cloned())
    }

    async fn set_variable(&self, name: &str, value: &str) -> TrackerResult<()> {
        let mut state = self.enter(
            "set_variable",
            TrackerCall::SetVariable {
                name: name.to_string(),
                value: value.to_string(),
            },
        )?;
        state.variables.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pr(head: &str) -> NewPullRequest {
        NewPullRequest {
            base: "main".to_string(),
            head: head.to_string(),
            title: "title".to_string(),
            body: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn created_pull_request_is_listed_as_open() {
        let tracker = MemoryTracker::new();
        let pr = tracker.create_pull_request(&new_pr("package/a/b")).await.unwrap();
        let open = tracker.list_open_pull_requests().await.unwrap();
        assert_eq!(open, vec![pr]);
    }

    #[tokio::test]
    async fn duplicate_open_pull_request_is_rejected() {
        let tracker = MemoryTracker::new();
        tracker.create_pull_request(&new_pr("package/a/b")).await.unwrap();
        let err = tracker
            .create_pull_request(&new_pr("package/a/b"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(422));
    }

    #[tokio::test]
    async fn merged_pull_request_leaves_open_list() {
        let tracker = MemoryTracker::new();
        let pr = tracker.create_pull_request(&new_pr("package/a/b")).await.unwrap();
        tracker.merge_pull_request(pr.number).await.unwrap();
        assert!(tracker.list_open_pull_requests().await.unwrap().is_empty());
        assert_eq!(
            tracker.pull_request(pr.number).unwrap().state,
            PullRequestState::Merged
        );
    }

    #[tokio::test]
    async fn failing_operation_is_recorded_and_errors() {
        let tracker = MemoryTracker::new();
        tracker.fail_operation("list");
        let err = tracker.list_open_pull_requests().await.unwrap_err();
        assert!(matches!(err, TrackerError::Injected(_)));
        assert_eq!(tracker.calls(), vec![TrackerCall::ListOpenPullRequests]);

        tracker.heal_operation("list");
        assert!(tracker.list_open_pull_requests().await.is_ok());
    }

    #[tokio::test]
    async fn variables_round_trip() {
        let tracker = MemoryTracker::new().with_variable("LAST_RUN", "t0");
        assert_eq!(
            tracker.get_variable("LAST_RUN").await.unwrap().as_deref(),
            Some("t0")
        );
        tracker.set_variable("LAST_RUN", "t1").await.unwrap();
        assert_eq!(tracker.variable("LAST_RUN").as_deref(), Some("t1"));
        assert_eq!(tracker.get_variable("MISSING").await.unwrap(), None);
    }
}

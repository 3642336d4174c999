//! Per-package outcomes and the batch report.

use serde::{Deserialize, Serialize};

/// Terminal status of one submission within a run.
///
/// Every status is terminal for the run; a failed package has to be
/// re-submitted in a later batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeStatus {
    ValidatedMerged,
    ValidationFailed,
    MergeConflictAborted,
    MalformedSubmission,
    /// Transport or tooling failure (tracker API, git, validator start-up).
    Aborted,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::ValidatedMerged => "validated-merged",
            OutcomeStatus::ValidationFailed => "validation-failed",
            OutcomeStatus::MergeConflictAborted => "merge-conflict-aborted",
            OutcomeStatus::MalformedSubmission => "malformed-submission",
            OutcomeStatus::Aborted => "aborted",
        }
    }

    /// Whether this outcome keeps the run cursor from advancing.
    ///
    /// Infrastructure failures hold the cursor so the same window is
    /// reconsidered next run; content problems do not.
    pub fn holds_cursor(&self) -> bool {
        matches!(self, OutcomeStatus::Aborted)
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States of the per-package reconciliation state machine, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    Start,
    BranchReady,
    FilesStaged,
    Committed,
    Pushed,
    PrReady,
    StatusPending,
    Validated,
    Merged,
    StatusFailure,
    Aborted,
    CleanedUp,
    Done,
}

impl ReconcileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileState::Start => "start",
            ReconcileState::BranchReady => "branch_ready",
            ReconcileState::FilesStaged => "files_staged",
            ReconcileState::Committed => "committed",
            ReconcileState::Pushed => "pushed",
            ReconcileState::PrReady => "pr_ready",
            ReconcileState::StatusPending => "status_pending",
            ReconcileState::Validated => "validated",
            ReconcileState::Merged => "merged",
            ReconcileState::StatusFailure => "status_failure",
            ReconcileState::Aborted => "aborted",
            ReconcileState::CleanedUp => "cleaned_up",
            ReconcileState::Done => "done",
        }
    }
}

impl std::fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of reconciling one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub package_id: String,
    pub branch: String,
    pub status: OutcomeStatus,
    /// Last state reached before the terminal transition.
    pub last_state: ReconcileState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub merge_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    /// Whether this run opened the PR (as opposed to updating it).
    #[serde(default)]
    pub pr_created: bool,
    /// Validator output for `validation-failed`, error text for aborts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitter_handle: Option<String>,
}

impl ReconciliationOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::ValidatedMerged
    }
}

/// A direct message for the downstream notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Message telling a submitter their package failed validation.
    ///
    /// `None` when the outcome is not a validation failure or the submitter
    /// is unknown.
    pub fn for_outcome(outcome: &ReconciliationOutcome, repo_url: Option<&str>) -> Option<Self> {
        if outcome.status != OutcomeStatus::ValidationFailed {
            return None;
        }
        let to = outcome.submitter_handle.clone()?;
        let mut body = format!(
            "There is an issue with the metadata for your package `{}`.",
            outcome.package_id
        );
        if let (Some(url), Some(number)) = (repo_url, outcome.number) {
            body.push_str(&format!(
                " See {}/pull/{number} for details.",
                url.trim_end_matches('/')
            ));
        }
        if let Some(detail) = &outcome.detail {
            body.push_str(&format!("\n\n```\n{}\n```", detail.trim_end()));
        }
        Some(Notification {
            to,
            subject: format!("Metadata issue with {}", outcome.package_id),
            body,
        })
    }
}

/// Everything one batch run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Cursor marker of the batch window.
    pub timestamp: String,
    pub outcomes: Vec<ReconciliationOutcome>,
    pub cursor_advanced: bool,
    #[serde(default)]
    pub messages: Vec<Notification>,
}

impl BatchReport {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Whether any outcome keeps the cursor from advancing.
    pub fn cursor_held(&self) -> bool {
        self.outcomes.iter().any(|o| o.status.holds_cursor())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

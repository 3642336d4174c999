//! Engine-level error taxonomy for pkgpr.

use pkgpr_tracker::TrackerError;

use crate::domain::outcome::OutcomeStatus;

/// pkgpr engine errors.
#[derive(Debug, thiserror::Error)]
pub enum PkgprError {
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("merge of trunk into {branch} conflicts: {detail}")]
    MergeConflict { branch: String, detail: String },

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("malformed submission {id}: {reason}")]
    MalformedSubmission { id: String, reason: String },

    #[error("validator could not run: {0}")]
    Validator(String),

    #[error("run cursor error: {0}")]
    Cursor(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PkgprError {
    pub(crate) fn malformed(id: &str, reason: impl Into<String>) -> Self {
        PkgprError::MalformedSubmission {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Terminal status a package takes when this error stops it.
    pub fn abort_status(&self) -> OutcomeStatus {
        match self {
            PkgprError::MergeConflict { .. } => OutcomeStatus::MergeConflictAborted,
            PkgprError::MalformedSubmission { .. } => OutcomeStatus::MalformedSubmission,
            _ => OutcomeStatus::Aborted,
        }
    }
}

/// Result type for pkgpr engine operations.
pub type Result<T> = std::result::Result<T, PkgprError>;

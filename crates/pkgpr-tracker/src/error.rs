//! Error types for pkgpr-tracker

use thiserror::Error;

/// Errors raised while talking to the pull request tracker.
///
/// Every variant is a transport-level failure from the engine's point of
/// view: the package being processed is aborted, the batch continues.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// The request never produced a response (DNS, TLS, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API answered with a non-success status
    #[error("{operation} failed with status {status}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    /// The response body did not have the expected shape
    #[error("could not decode {operation} response: {detail}")]
    Decode { operation: String, detail: String },

    /// Tracker is missing required configuration (owner, repo, token)
    #[error("tracker is not configured: {0}")]
    NotConfigured(String),

    /// Pull request number unknown to the tracker
    #[error("pull request #{0} not found")]
    PullRequestNotFound(u64),

    /// Failure injected by a test fake
    #[error("injected failure in {0}")]
    Injected(String),
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        TrackerError::Http(err.to_string())
    }
}

impl TrackerError {
    /// Build an [`TrackerError::Api`] from a status code and response text.
    pub fn api(operation: &str, status: u16, message: impl Into<String>) -> Self {
        TrackerError::Api {
            operation: operation.to_string(),
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TrackerError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_names_operation_and_status() {
        let err = TrackerError::api("merge pull request", 405, "Pull Request is not mergeable");
        let msg = err.to_string();
        assert!(msg.contains("merge pull request"));
        assert!(msg.contains("405"));
        assert!(msg.contains("not mergeable"));
        assert_eq!(err.status(), Some(405));
    }

    #[test]
    fn http_error_has_no_status() {
        let err = TrackerError::Http("connection reset".to_string());
        assert_eq!(err.status(), None);
    }
}

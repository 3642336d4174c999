//! Structured observability hooks for batch and package lifecycle events.
//!
//! - `package_span` scoping every log line to one package
//! - `emit_*` functions for batch start, state transitions, validation
//!   results and cursor decisions
//!
//! Filter with `RUST_LOG`; pass `--json` to the CLI for JSON lines.

use tracing::{info, warn};

use crate::domain::outcome::{OutcomeStatus, ReconcileState};

/// Span tagging every event of one package's reconciliation.
///
/// ```ignore
/// reconcile(submission).instrument(package_span("smf-16:everseasonal")).await
/// ```
pub fn package_span(package_id: &str) -> tracing::Span {
    tracing::info_span!("pkgpr.package", package_id = %package_id)
}

pub fn emit_batch_started(timestamp: &str, packages: usize, open_pull_requests: usize) {
    info!(
        event = "batch.started",
        timestamp = %timestamp,
        packages = packages,
        open_pull_requests = open_pull_requests,
    );
}

pub fn emit_transition(from: ReconcileState, to: ReconcileState) {
    info!(event = "package.transition", from = %from, to = %to);
}

/// Emit event: package reached a terminal outcome.
///
/// Infrastructure aborts are logged at `warn`; they go to the run log only.
pub fn emit_package_finished(package_id: &str, status: OutcomeStatus, detail: Option<&str>) {
    match status {
        OutcomeStatus::Aborted | OutcomeStatus::MergeConflictAborted => warn!(
            event = "package.finished",
            package_id = %package_id,
            status = %status,
            detail = detail.unwrap_or_default(),
        ),
        _ => info!(event = "package.finished", package_id = %package_id, status = %status),
    }
}

pub fn emit_validation_finished(sha: &str, passed: bool) {
    info!(event = "validation.finished", sha = %sha, passed = passed);
}

pub fn emit_cursor_advanced(mark: &str) {
    info!(event = "cursor.advanced", mark = %mark);
}

pub fn emit_cursor_held(mark: &str, aborted: usize) {
    warn!(event = "cursor.held", mark = %mark, aborted = aborted);
}

/// Emit event: cleanup failed after a package (error level).
pub fn emit_cleanup_error(package_id: &str, error: &dyn std::fmt::Display) {
    tracing::error!(event = "package.cleanup_error", package_id = %package_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_span_create() {
        let _entered = package_span("smf-16:everseasonal").entered();
        emit_transition(ReconcileState::Start, ReconcileState::BranchReady);
    }
}

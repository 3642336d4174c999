//! Batch runner: reconciles a whole fetch result, then advances the cursor.

use pkgpr_tracker::PullRequestTracker;
use tracing::error;

use crate::config::ReconcileConfig;
use crate::cursor::RunCursor;
use crate::directory::PullRequestDirectory;
use crate::domain::error::Result;
use crate::domain::outcome::{BatchReport, Notification};
use crate::domain::submission::{FetchResult, ResolvedSubmission};
use crate::obs;
use crate::reconciler::{rejected_outcome, Reconciler};
use crate::validation::Validator;
use crate::worktree::WorkingTree;

/// Everything a batch run needs, borrowed for its duration.
pub struct BatchContext<'a> {
    pub tree: &'a mut WorkingTree,
    pub tracker: &'a dyn PullRequestTracker,
    pub validator: &'a dyn Validator,
    pub cursor: &'a dyn RunCursor,
    pub config: &'a ReconcileConfig,
}

/// Reconcile every submission in `fetch`, strictly in order.
///
/// Errors only for batch-level failures (tree reset, trunk fetch, open-PR
/// listing), in which case no package was touched and the cursor did not
/// move.
/// Per-package failures are reported as outcomes.
pub async fn run_batch(ctx: BatchContext<'_>, fetch: &FetchResult) -> Result<BatchReport> {
    let BatchContext {
        tree,
        tracker,
        validator,
        cursor,
        config,
    } = ctx;

    // The new content sits in the tree as uncommitted edits until the reset.
    let resolved: Vec<Result<ResolvedSubmission>> = fetch
        .packages
        .iter()
        .map(|submission| submission.resolve(tree.root()))
        .collect();

    tree.reset_to_clean().await?;
    tree.sync_trunk().await?;
    let directory = PullRequestDirectory::fetch(tracker).await?;
    obs::emit_batch_started(&fetch.timestamp, fetch.packages.len(), directory.len());

    let mut reconciler = Reconciler::new(tree, tracker, validator, &directory, config);
    let mut outcomes = Vec::with_capacity(resolved.len());
    for (submission, resolved) in fetch.packages.iter().zip(resolved) {
        let outcome = match resolved {
            Ok(resolved) => reconciler.reconcile(&resolved).await,
            Err(e) => rejected_outcome(submission, &e),
        };
        outcomes.push(outcome);
    }

    let messages = outcomes
        .iter()
        .filter_map(|o| Notification::for_outcome(o, config.repo_url.as_deref()))
        .collect();
    let mut report = BatchReport {
        timestamp: fetch.timestamp.clone(),
        outcomes,
        cursor_advanced: false,
        messages,
    };

    if report.cursor_held() {
        let aborted = report.outcomes.iter().filter(|o| o.status.holds_cursor()).count();
        obs::emit_cursor_held(&fetch.timestamp, aborted);
    } else {
        match cursor.advance(&fetch.timestamp).await {
            Ok(()) => {
                obs::emit_cursor_advanced(&fetch.timestamp);
                report.cursor_advanced = true;
            }
            Err(e) => error!(event = "cursor.error", mark = %fetch.timestamp, error = %e),
        }
    }
    Ok(report)
}

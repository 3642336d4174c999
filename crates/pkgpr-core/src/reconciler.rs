//! Reconciler: the per-package state machine.
//!
//! ```text
//! START → BRANCH_READY → FILES_STAGED → COMMITTED → PUSHED → PR_READY
//!       → STATUS_PENDING → VALIDATED → MERGED | STATUS_FAILURE
//!       → CLEANED_UP → DONE
//! ```
//!
//! Any error moves the package to ABORTED; cleanup runs on every path so
//! the next package starts from trunk.

use pkgpr_tracker::{NewPullRequest, PullRequestTracker};
use tracing::Instrument;

use crate::body::render_body;
use crate::config::ReconcileConfig;
use crate::directory::PullRequestDirectory;
use crate::documents::ClassifiedDocuments;
use crate::domain::branch::branch_name;
use crate::domain::error::{PkgprError, Result};
use crate::domain::outcome::{OutcomeStatus, ReconcileState, ReconciliationOutcome};
use crate::domain::submission::{PackageSubmission, ResolvedSubmission};
use crate::obs;
use crate::validation::{ValidationDriver, Validator, Verdict};
use crate::worktree::{BranchStart, WorkingTree};

/// Where one package got to.
struct Progress {
    state: ReconcileState,
    number: Option<u64>,
    sha: Option<String>,
    pr_created: bool,
}

impl Progress {
    fn new(number: Option<u64>) -> Self {
        Self {
            state: ReconcileState::Start,
            number,
            sha: None,
            pr_created: false,
        }
    }

    fn advance(&mut self, to: ReconcileState) {
        obs::emit_transition(self.state, to);
        self.state = to;
    }
}

/// Reconciles submissions one at a time against a single working tree.
pub struct Reconciler<'a> {
    tree: &'a mut WorkingTree,
    tracker: &'a dyn PullRequestTracker,
    validator: &'a dyn Validator,
    directory: &'a PullRequestDirectory,
    config: &'a ReconcileConfig,
    /// Set when the tree could not be restored after a package.
    poisoned: Option<String>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        tree: &'a mut WorkingTree,
        tracker: &'a dyn PullRequestTracker,
        validator: &'a dyn Validator,
        directory: &'a PullRequestDirectory,
        config: &'a ReconcileConfig,
    ) -> Self {
        Self {
            tree,
            tracker,
            validator,
            directory,
            config,
            poisoned: None,
        }
    }

    /// Why the tree is unusable, if a cleanup and the recovery reset both failed.
    pub fn poisoned(&self) -> Option<&str> {
        self.poisoned.as_deref()
    }

    /// Run one submission to a terminal outcome. Never fails: errors become
    /// the package's outcome.
    pub async fn reconcile(&mut self, submission: &ResolvedSubmission) -> ReconciliationOutcome {
        let span = obs::package_span(submission.id());
        self.reconcile_in_span(submission).instrument(span).await
    }

    async fn reconcile_in_span(
        &mut self,
        submission: &ResolvedSubmission,
    ) -> ReconciliationOutcome {
        if let Some(reason) = &self.poisoned {
            let error = PkgprError::Git {
                command: "reset".to_string(),
                stderr: format!("working tree unavailable: {reason}"),
            };
            return rejected_outcome(&submission.submission, &error);
        }

        let id = submission.id();
        let branch = branch_name(id);
        let existing = self.directory.find_by_branch(&branch).map(|pr| pr.number);
        let mut progress = Progress::new(existing);

        let result = self.drive(submission, &branch, &mut progress).await;
        let last_state = progress.state;
        let (status, detail) = match result {
            Ok(Verdict::Merged) => (OutcomeStatus::ValidatedMerged, None),
            Ok(Verdict::Failed { diagnostics }) => {
                (OutcomeStatus::ValidationFailed, Some(diagnostics))
            }
            Err(e) => {
                progress.advance(ReconcileState::Aborted);
                (e.abort_status(), Some(e.to_string()))
            }
        };

        match self.cleanup(&branch).await {
            Ok(()) => progress.advance(ReconcileState::CleanedUp),
            Err(e) => {
                obs::emit_cleanup_error(id, &e);
                self.poisoned = Some(e.to_string());
            }
        }
        progress.advance(ReconcileState::Done);
        obs::emit_package_finished(id, status, detail.as_deref());

        ReconciliationOutcome {
            package_id: id.to_string(),
            branch,
            status,
            last_state,
            number: progress.number,
            merge_ref: progress.number.map(|n| format!("refs/pull/{n}/merge")),
            sha: progress.sha,
            pr_created: progress.pr_created,
            detail,
            submitter_handle: submission.submission.submitter_handle.clone(),
        }
    }

    async fn drive(
        &mut self,
        submission: &ResolvedSubmission,
        branch: &str,
        progress: &mut Progress,
    ) -> Result<Verdict> {
        let config = self.config;
        let id = submission.id();

        // Parsed before the tree is touched.
        let docs = ClassifiedDocuments::from_files(id, &submission.files)?;
        let title = docs.title();
        let body = render_body(&docs);

        if self.tree.begin_branch(branch).await? == BranchStart::Resumed {
            self.tree.reconcile_with_trunk(branch).await?;
        }
        progress.advance(ReconcileState::BranchReady);

        self.tree
            .replace_files(&submission.submission.file_id, &submission.files)
            .await?;
        progress.advance(ReconcileState::FilesStaged);

        let sha = self.tree.commit(&title).await?;
        progress.sha = Some(sha.clone());
        progress.advance(ReconcileState::Committed);

        self.tree.push(branch).await?;
        progress.advance(ReconcileState::Pushed);

        let number = self
            .upsert_pull_request(branch, &title, &body, progress)
            .await?;
        progress.advance(ReconcileState::PrReady);

        let driver = ValidationDriver::new(
            self.tracker,
            self.validator,
            &config.status_context,
            config.run_url.as_deref(),
        );
        driver.mark_pending(&sha).await?;
        progress.advance(ReconcileState::StatusPending);

        let report = driver.run(self.tree.root(), &config.validate_path).await?;
        progress.advance(ReconcileState::Validated);

        let submitter = submission.submission.submitter_handle.as_deref();
        let verdict = driver.conclude(number, &sha, &report, submitter).await?;
        progress.advance(match verdict {
            Verdict::Merged => ReconcileState::Merged,
            Verdict::Failed { .. } => ReconcileState::StatusFailure,
        });
        Ok(verdict)
    }

    /// Update the open PR for `branch`, or open one and label it.
    async fn upsert_pull_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
        progress: &mut Progress,
    ) -> Result<u64> {
        if let Some(existing) = self.directory.find_by_branch(branch) {
            self.tracker
                .update_pull_request(existing.number, title, body)
                .await?;
            return Ok(existing.number);
        }

        let request = NewPullRequest {
            base: self.config.trunk.clone(),
            head: branch.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        };
        let pr = self.tracker.create_pull_request(&request).await?;
        progress.number = Some(pr.number);
        progress.pr_created = true;
        self.tracker
            .add_labels(pr.number, &[self.config.label.clone()])
            .await?;
        Ok(pr.number)
    }

    /// Back to trunk; falls back to a full reset if that fails.
    async fn cleanup(&mut self, branch: &str) -> Result<()> {
        match self.tree.return_to_trunk_and_delete_branch(branch).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(branch, error = %e, "cleanup failed, resetting tree");
                self.tree.reset_to_clean().await
            }
        }
    }
}

/// Outcome for a submission stopped before its state machine started.
pub fn rejected_outcome(
    submission: &PackageSubmission,
    error: &PkgprError,
) -> ReconciliationOutcome {
    let status = error.abort_status();
    let detail = error.to_string();
    obs::emit_package_finished(&submission.id, status, Some(&detail));
    ReconciliationOutcome {
        package_id: submission.id.clone(),
        branch: branch_name(&submission.id),
        status,
        last_state: ReconcileState::Start,
        number: None,
        merge_ref: None,
        sha: None,
        pr_created: false,
        detail: Some(detail),
        submitter_handle: submission.submitter_handle.clone(),
    }
}

//! pkgpr Core Library
//!
//! Package-to-pull-request reconciliation engine: turns a batch of package
//! submissions into branches, pull requests and validated merges on one
//! shared working tree.

pub mod batch;
pub mod body;
pub mod config;
pub mod cursor;
pub mod directory;
pub mod documents;
pub mod domain;
pub mod obs;
pub mod reconciler;
pub mod telemetry;
pub mod validation;
pub mod worktree;

pub use domain::{
    branch_name, BatchReport, FetchResult, Notification, OutcomeStatus, PackageSubmission,
    PkgprError, ReconcileState, ReconciliationOutcome, ResolvedSubmission, Result,
    SubmissionFile, BRANCH_PREFIX,
};

pub use batch::{run_batch, BatchContext};
pub use body::render_body;
pub use config::ReconcileConfig;
pub use cursor::{FileRunCursor, RunCursor, VariableRunCursor, CURSOR_VARIABLE};
pub use directory::PullRequestDirectory;
pub use documents::{AssetDoc, ClassifiedDocuments, PackageDoc, PackageDocument, PackageInfo};
pub use reconciler::Reconciler;
pub use telemetry::init_tracing;
pub use validation::{CommandValidator, ValidationDriver, ValidationReport, Validator, Verdict};
pub use worktree::{BranchStart, WorkingTree};

//! Domain models for pkgpr.
//!
//! Canonical definitions for the core entities:
//! - `PackageSubmission`: one package's proposed change
//! - `branch_name`: deterministic branch for a package id
//! - `ReconciliationOutcome`: terminal result per submission
//! - `BatchReport`: everything a run produced

pub mod branch;
pub mod error;
pub mod outcome;
pub mod submission;

// Re-export main types and errors
pub use branch::{branch_name, BRANCH_PREFIX};
pub use error::{PkgprError, Result};
pub use outcome::{
    BatchReport, Notification, OutcomeStatus, ReconcileState, ReconciliationOutcome,
};
pub use submission::{FetchResult, PackageSubmission, ResolvedSubmission, SubmissionFile};

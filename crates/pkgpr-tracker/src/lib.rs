//! pkgpr-tracker: Issue/PR tracker seam for pkgpr
//!
//! This crate is the only place the engine talks to the pull request
//! tracker. It exposes the [`PullRequestTracker`] trait, a GitHub REST
//! implementation and an in-memory fake for tests.
//!
//! ## Layer 0 - Tracker
//!
//! Focus: one request per engine step, errors surfaced as [`TrackerError`].

pub mod error;
pub mod fakes;
pub mod github;
pub mod tracker;

pub use error::TrackerError;
pub use github::{GithubConfig, GithubTracker};
pub use tracker::{
    truncate_description, CommitStatus, NewPullRequest, PullRequestState, PullRequestTracker,
    RemotePullRequest, StatusState, TrackerResult, STATUS_DESCRIPTION_LIMIT,
};

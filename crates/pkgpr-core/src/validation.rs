//! Validation Driver: runs the external validator and maps its verdict to
//! commit statuses, a merge, or a failure comment.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use pkgpr_tracker::{CommitStatus, PullRequestTracker, StatusState};
use tokio::process::Command;

use crate::domain::error::{PkgprError, Result};
use crate::obs;

/// Outcome of one validator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub passed: bool,
    /// Combined stdout and stderr, verbatim.
    pub diagnostics: String,
}

impl ValidationReport {
    pub fn pass() -> Self {
        Self {
            passed: true,
            diagnostics: String::new(),
        }
    }

    pub fn fail(diagnostics: impl Into<String>) -> Self {
        Self {
            passed: false,
            diagnostics: diagnostics.into(),
        }
    }
}

/// External metadata validator.
///
/// `Err` means the validator could not be run at all; a validator that ran
/// and rejected the metadata returns `Ok` with `passed == false`.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, workdir: &Path, target: &Path) -> Result<ValidationReport>;
}

/// Validator backed by a subprocess; exit code 0 means pass.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandValidator {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout: None,
        }
    }

    /// Split a command line with shell quoting rules (no expansion).
    pub fn from_command_line(command: &str) -> Result<Self> {
        let parts = shlex::split(command).ok_or_else(|| {
            PkgprError::Validator(format!("unbalanced quotes in validator command: {command}"))
        })?;
        let mut parts = parts.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| PkgprError::Validator("validator command is empty".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Validator for CommandValidator {
    async fn validate(&self, workdir: &Path, target: &Path) -> Result<ValidationReport> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(target)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PkgprError::Validator(format!("{}: {e}", self.program)))?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    PkgprError::Validator(format!(
                        "{} timed out after {}s",
                        self.program,
                        limit.as_secs()
                    ))
                })??,
            None => child.wait_with_output().await?,
        };

        let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ValidationReport {
            passed: output.status.success(),
            diagnostics,
        })
    }
}

/// Verdict reached once statuses and the merge or comment are posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Merged,
    Failed { diagnostics: String },
}

/// Drives the commit-status state machine for one head SHA.
pub struct ValidationDriver<'a> {
    tracker: &'a dyn PullRequestTracker,
    validator: &'a dyn Validator,
    context: &'a str,
    target_url: Option<&'a str>,
}

impl<'a> ValidationDriver<'a> {
    pub fn new(
        tracker: &'a dyn PullRequestTracker,
        validator: &'a dyn Validator,
        context: &'a str,
        target_url: Option<&'a str>,
    ) -> Self {
        Self {
            tracker,
            validator,
            context,
            target_url,
        }
    }

    fn status(&self, state: StatusState, description: &str) -> CommitStatus {
        CommitStatus::new(
            state,
            description,
            self.context,
            self.target_url.map(str::to_string),
        )
    }

    pub async fn mark_pending(&self, sha: &str) -> Result<()> {
        let status = self.status(StatusState::Pending, "Running lint...");
        self.tracker.create_commit_status(sha, &status).await?;
        Ok(())
    }

    /// Run the validator against `target` inside `workdir`.
    pub async fn run(&self, workdir: &Path, target: &Path) -> Result<ValidationReport> {
        self.validator.validate(workdir, target).await
    }

    /// Post the final status, then merge on pass or comment on failure.
    ///
    /// Never merges a failed validation.
    pub async fn conclude(
        &self,
        number: u64,
        sha: &str,
        report: &ValidationReport,
        submitter: Option<&str>,
    ) -> Result<Verdict> {
        obs::emit_validation_finished(sha, report.passed);
        if report.passed {
            let status = self.status(StatusState::Success, "Metadata validated");
            self.tracker.create_commit_status(sha, &status).await?;
            self.tracker.merge_pull_request(number).await?;
            return Ok(Verdict::Merged);
        }

        let status = self.status(StatusState::Failure, &failure_description(&report.diagnostics));
        self.tracker.create_commit_status(sha, &status).await?;
        let comment = failure_comment(&report.diagnostics, submitter);
        self.tracker.create_comment(number, &comment).await?;
        Ok(Verdict::Failed {
            diagnostics: report.diagnostics.clone(),
        })
    }
}

/// `Invalid metadata: <first diagnostic line>`.
pub fn failure_description(diagnostics: &str) -> String {
    match diagnostics.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => format!("Invalid metadata: {line}"),
        None => "Invalid metadata".to_string(),
    }
}

/// PR comment for a failed validation, carrying the diagnostics verbatim.
pub fn failure_comment(diagnostics: &str, submitter: Option<&str>) -> String {
    let mention = submitter
        .filter(|h| !h.is_empty())
        .map(|h| format!("@{} ", h.trim_start_matches('@')))
        .unwrap_or_default();
    let fence = code_fence(diagnostics);
    format!(
        "{mention}⚠️ There is an issue with the metadata for this package:\n\n{fence}\n{}\n{fence}",
        diagnostics.trim_end()
    )
}

/// A backtick fence longer than any backtick run inside `text`.
fn code_fence(text: &str) -> String {
    let longest = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

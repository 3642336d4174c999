//! Package submissions as delivered by the fetch step.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::{PkgprError, Result};

/// Output of the fetch step: the batch window marker plus its submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Marker the run cursor advances to once the whole batch is reconciled.
    pub timestamp: String,
    #[serde(default)]
    pub packages: Vec<PackageSubmission>,
}

impl FetchResult {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// One package's proposed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSubmission {
    /// `<group>:<name>`
    pub id: String,
    /// Git pathspec glob matching every file previously published for this package.
    pub file_id: String,
    /// Repository-relative paths of the new file set.
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter_handle: Option<String>,
}

impl PackageSubmission {
    pub fn new(id: &str, file_id: &str, files: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            file_id: file_id.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
            submitter_handle: None,
        }
    }

    pub fn with_submitter(mut self, handle: &str) -> Self {
        self.submitter_handle = Some(handle.to_string());
        self
    }

    /// Check the identifiers and paths without touching the disk.
    pub fn check(&self) -> Result<()> {
        match self.id.split_once(':') {
            Some((group, name))
                if !group.is_empty() && !name.is_empty() && !name.contains(':') => {}
            _ => return Err(PkgprError::malformed(&self.id, "id must be <group>:<name>")),
        }
        if self.file_id.trim().is_empty() {
            return Err(PkgprError::malformed(&self.id, "fileId is empty"));
        }
        if self.files.is_empty() {
            return Err(PkgprError::malformed(&self.id, "submission has no files"));
        }
        let mut seen = std::collections::HashSet::new();
        for file in &self.files {
            check_relative(&self.id, file)?;
            if !seen.insert(file.as_str()) {
                return Err(PkgprError::malformed(
                    &self.id,
                    format!("file listed twice: {file}"),
                ));
            }
        }
        Ok(())
    }

    /// Read every file's content from `root`.
    ///
    /// Must happen before the working tree is reset, since the fetch step
    /// leaves the new content as uncommitted edits.
    pub fn resolve(&self, root: &Path) -> Result<ResolvedSubmission> {
        self.check()?;
        let mut files = Vec::with_capacity(self.files.len());
        for name in &self.files {
            let path = root.join(name);
            let contents = std::fs::read(&path).map_err(|e| {
                PkgprError::malformed(&self.id, format!("cannot read {}: {e}", path.display()))
            })?;
            files.push(SubmissionFile {
                name: name.clone(),
                contents,
            });
        }
        Ok(ResolvedSubmission {
            submission: self.clone(),
            files,
        })
    }
}

fn check_relative(id: &str, file: &str) -> Result<()> {
    let path = Path::new(file);
    if file.is_empty() || path.is_absolute() {
        return Err(PkgprError::malformed(
            id,
            format!("path must be repository-relative: '{file}'"),
        ));
    }
    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(PkgprError::malformed(
            id,
            format!("path escapes the repository: '{file}'"),
        ));
    }
    Ok(())
}

/// A submission file with its content held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFile {
    /// Repository-relative path.
    pub name: String,
    pub contents: Vec<u8>,
}

impl SubmissionFile {
    pub fn new(name: &str, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            contents: contents.into(),
        }
    }

    pub fn absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.name)
    }

    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.contents)
    }
}

/// A submission whose files have been read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubmission {
    pub submission: PackageSubmission,
    pub files: Vec<SubmissionFile>,
}

impl ResolvedSubmission {
    pub fn id(&self) -> &str {
        &self.submission.id
    }
}

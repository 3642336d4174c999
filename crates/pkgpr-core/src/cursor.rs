//! Run Cursor: the persisted "reconciled up to here" marker.
//!
//! Two backends: a JSON file next to the checkout, and a repository
//! variable on the tracker (the `LAST_RUN` Actions variable).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pkgpr_tracker::PullRequestTracker;
use serde::{Deserialize, Serialize};

use crate::domain::error::{PkgprError, Result};

/// Name of the tracker variable holding the cursor.
pub const CURSOR_VARIABLE: &str = "LAST_RUN";

/// Persisted batch checkpoint.
#[async_trait]
pub trait RunCursor: Send + Sync {
    /// Current mark, `None` before the first advance.
    async fn read(&self) -> Result<Option<String>>;

    async fn advance(&self, mark: &str) -> Result<()>;
}

/// On-disk cursor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRecord {
    pub mark: String,
    pub advanced_at: DateTime<Utc>,
}

/// Cursor stored as a small JSON file.
#[derive(Debug, Clone)]
pub struct FileRunCursor {
    path: PathBuf,
}

impl FileRunCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self) -> Result<Option<CursorRecord>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&text).map_err(|e| {
            PkgprError::Cursor(format!("{} is not a cursor file: {e}", self.path.display()))
        })?;
        Ok(Some(record))
    }
}

#[async_trait]
impl RunCursor for FileRunCursor {
    async fn read(&self) -> Result<Option<String>> {
        Ok(self.record().await?.map(|r| r.mark))
    }

    async fn advance(&self, mark: &str) -> Result<()> {
        let record = CursorRecord {
            mark: mark.to_string(),
            advanced_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // The record on disk is always complete.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&record)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Cursor stored as a tracker repository variable.
pub struct VariableRunCursor {
    tracker: Arc<dyn PullRequestTracker>,
    name: String,
}

impl VariableRunCursor {
    pub fn new(tracker: Arc<dyn PullRequestTracker>) -> Self {
        Self::with_name(tracker, CURSOR_VARIABLE)
    }

    pub fn with_name(tracker: Arc<dyn PullRequestTracker>, name: &str) -> Self {
        Self {
            tracker,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl RunCursor for VariableRunCursor {
    async fn read(&self) -> Result<Option<String>> {
        Ok(self.tracker.get_variable(&self.name).await?)
    }

    async fn advance(&self, mark: &str) -> Result<()> {
        self.tracker.set_variable(&self.name, mark).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgpr_tracker::fakes::MemoryTracker;

    #[tokio::test]
    async fn test_file_cursor_starts_empty_then_advances() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = FileRunCursor::new(dir.path().join("state/LAST_RUN.json"));
        assert_eq!(cursor.read().await.unwrap(), None);

        cursor.advance("2024-12-21T21:40:00.000Z").await.unwrap();
        assert_eq!(
            cursor.read().await.unwrap().as_deref(),
            Some("2024-12-21T21:40:00.000Z")
        );
        let record = cursor.record().await.unwrap().unwrap();
        assert!(record.advanced_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_file_cursor_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LAST_RUN.json");
        std::fs::write(&path, "not json").unwrap();
        let err = FileRunCursor::new(path).read().await.unwrap_err();
        assert!(matches!(err, PkgprError::Cursor(_)));
    }

    #[tokio::test]
    async fn test_variable_cursor_uses_last_run() {
        let tracker = Arc::new(MemoryTracker::new().with_variable("LAST_RUN", "t0"));
        let cursor = VariableRunCursor::new(tracker.clone());
        assert_eq!(cursor.read().await.unwrap().as_deref(), Some("t0"));
        cursor.advance("t1").await.unwrap();
        assert_eq!(tracker.variable("LAST_RUN").as_deref(), Some("t1"));
    }
}

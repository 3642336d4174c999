//! Working-Tree Controller: the one shared git checkout a batch runs against.
//!
//! Every mutating operation takes `&mut self`, so holding the handle is
//! what grants exclusive use of the tree for one package at a time.
//!
//! Branches are cut from, compared with and merged against the remote
//! trunk (`<remote>/<trunk>`), refreshed before each package. Pull requests
//! are merged on the tracker, so the local trunk only follows the remote.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::error::{PkgprError, Result};
use crate::domain::submission::SubmissionFile;

/// How [`WorkingTree::begin_branch`] obtained the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchStart {
    /// Created locally from trunk; the remote has no such branch yet.
    Fresh,
    /// Checked out from the remote with its existing history.
    Resumed,
}

/// Handle on a local checkout of the trunk branch.
#[derive(Debug)]
pub struct WorkingTree {
    root: PathBuf,
    trunk: String,
    remote: String,
}

impl WorkingTree {
    pub fn new(root: impl Into<PathBuf>, trunk: &str, remote: &str) -> Self {
        Self {
            root: root.into(),
            trunk: trunk.to_string(),
            remote: remote.to_string(),
        }
    }

    /// Open a checkout, failing if `root` is not inside a git work tree.
    pub async fn open(root: impl Into<PathBuf>, trunk: &str, remote: &str) -> Result<Self> {
        let tree = Self::new(root, trunk, remote);
        let inside = tree.git(&["rev-parse", "--is-inside-work-tree"]).await?;
        if inside.trim() != "true" {
            return Err(PkgprError::Git {
                command: "rev-parse --is-inside-work-tree".to_string(),
                stderr: format!("{} is not a git work tree", tree.root.display()),
            });
        }
        Ok(tree)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trunk(&self) -> &str {
        &self.trunk
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Remote-tracking ref of the trunk, e.g. `origin/main`.
    pub fn remote_trunk(&self) -> String {
        format!("{}/{}", self.remote, self.trunk)
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(command = %args.join(" "), "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .env("LC_ALL", "C")
            .env_remove("LANGUAGE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PkgprError::Git {
                command: args.join(" "),
                stderr: format!("failed to run git: {e}"),
            })?;
        Ok(output)
    }

    /// Run git, returning stdout on success.
    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(PkgprError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Discard uncommitted edits and untracked files, leaving trunk checked out.
    pub async fn reset_to_clean(&mut self) -> Result<()> {
        self.git(&["checkout", "-f", &self.trunk]).await?;
        self.git(&["reset", "--hard"]).await?;
        self.git(&["clean", "-fd"]).await?;
        Ok(())
    }

    /// Refresh `<remote>/<trunk>` from the remote.
    pub async fn fetch_trunk(&self) -> Result<()> {
        let refspec = format!(
            "+refs/heads/{trunk}:refs/remotes/{remote}/{trunk}",
            trunk = self.trunk,
            remote = self.remote
        );
        self.git(&["fetch", "--quiet", &self.remote, &refspec]).await?;
        Ok(())
    }

    /// Fetch the remote trunk and move the checked-out trunk onto it.
    ///
    /// Expects a clean tree on trunk, as left by [`Self::reset_to_clean`].
    pub async fn sync_trunk(&mut self) -> Result<()> {
        self.fetch_trunk().await?;
        let upstream = self.remote_trunk();
        self.git(&["reset", "--hard", &upstream]).await?;
        Ok(())
    }

    /// Whether the remote already has `branch`.
    pub async fn remote_branch_exists(&self, branch: &str) -> Result<bool> {
        let out = self
            .git(&["ls-remote", "--heads", &self.remote, branch])
            .await?;
        let wanted = format!("refs/heads/{branch}");
        Ok(out
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(wanted.as_str())))
    }

    /// Check out `branch`, resuming the remote one if it exists.
    ///
    /// The remote trunk is fetched first; a fresh branch starts from it.
    pub async fn begin_branch(&mut self, branch: &str) -> Result<BranchStart> {
        self.fetch_trunk().await?;
        if self.remote_branch_exists(branch).await? {
            let tracking = format!("{}/{branch}", self.remote);
            let refspec = format!("+refs/heads/{branch}:refs/remotes/{tracking}");
            self.git(&["fetch", &self.remote, &refspec]).await?;
            self.git(&["checkout", "-B", branch, &tracking]).await?;
            Ok(BranchStart::Resumed)
        } else {
            let upstream = self.remote_trunk();
            self.git(&["checkout", "--no-track", "-B", branch, &upstream])
                .await?;
            Ok(BranchStart::Fresh)
        }
    }

    /// Number of remote trunk commits missing from HEAD.
    pub async fn behind_count(&self) -> Result<u64> {
        let range = format!("HEAD..{}", self.remote_trunk());
        let out = self.git(&["rev-list", "--count", &range]).await?;
        out.trim().parse().map_err(|e| PkgprError::Git {
            command: format!("rev-list --count {range}"),
            stderr: format!("unexpected output '{}': {e}", out.trim()),
        })
    }

    /// Merge the remote trunk into the checked-out branch if it is behind.
    ///
    /// Returns whether a merge happened. A conflicting merge is aborted and
    /// reported as [`PkgprError::MergeConflict`]; it is never resolved.
    /// Conflicts are read from the index (unmerged entries), not from git's
    /// messages.
    pub async fn reconcile_with_trunk(&mut self, branch: &str) -> Result<bool> {
        if self.behind_count().await? == 0 {
            return Ok(false);
        }
        let upstream = self.remote_trunk();
        let output = self.run(&["merge", "--no-edit", &upstream]).await?;
        if output.status.success() {
            return Ok(true);
        }

        let detail = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
        .trim()
        .to_string();
        let conflicted = match self.git(&["ls-files", "--unmerged"]).await {
            Ok(unmerged) => !unmerged.trim().is_empty(),
            Err(e) => {
                warn!(branch, error = %e, "could not list unmerged paths");
                false
            }
        };
        if let Err(e) = self.git(&["merge", "--abort"]).await {
            warn!(branch, error = %e, "merge --abort failed");
        }
        if conflicted {
            Err(PkgprError::MergeConflict {
                branch: branch.to_string(),
                detail,
            })
        } else {
            Err(PkgprError::Git {
                command: format!("merge --no-edit {upstream}"),
                stderr: detail,
            })
        }
    }

    /// Tracked files matching a `:(glob)` pathspec.
    pub async fn tracked_files(&self, file_id: &str) -> Result<Vec<String>> {
        let pathspec = format!(":(glob){file_id}");
        let out = self.git(&["ls-files", "-z", "--", &pathspec]).await?;
        Ok(out
            .split('\0')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Remove every tracked file under `file_id`, write `files` and stage both.
    ///
    /// Returns the paths that were removed.
    pub async fn replace_files(
        &mut self,
        file_id: &str,
        files: &[SubmissionFile],
    ) -> Result<Vec<String>> {
        let previous = self.tracked_files(file_id).await?;
        if !previous.is_empty() {
            let mut args = vec!["rm", "-q", "-f", "--"];
            args.extend(previous.iter().map(String::as_str));
            self.git(&args).await?;
        }

        for file in files {
            let path = file.absolute(&self.root);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &file.contents).await?;
        }
        if !files.is_empty() {
            let mut args = vec!["add", "--"];
            args.extend(files.iter().map(|f| f.name.as_str()));
            self.git(&args).await?;
        }
        Ok(previous)
    }

    /// Commit whatever is staged (possibly nothing) and return the new HEAD.
    pub async fn commit(&mut self, message: &str) -> Result<String> {
        self.git(&["commit", "--allow-empty", "-m", message]).await?;
        self.head_sha().await
    }

    pub async fn head_sha(&self) -> Result<String> {
        let sha = self.git(&["rev-parse", "HEAD"]).await?.trim().to_string();
        if sha.is_empty() {
            return Err(PkgprError::Git {
                command: "rev-parse HEAD".to_string(),
                stderr: "empty output".to_string(),
            });
        }
        Ok(sha)
    }

    pub async fn push(&mut self, branch: &str) -> Result<()> {
        self.git(&["push", &self.remote, branch]).await?;
        Ok(())
    }

    /// Put trunk back in place and drop the local package branch.
    ///
    /// Safe after any failure: leftover edits are discarded and a branch
    /// that was never created is not an error.
    pub async fn return_to_trunk_and_delete_branch(&mut self, branch: &str) -> Result<()> {
        self.git(&["reset", "--hard"]).await?;
        self.git(&["checkout", "-f", &self.trunk]).await?;
        self.git(&["clean", "-fd"]).await?;

        let local = format!("refs/heads/{branch}");
        let exists = self
            .run(&["rev-parse", "--verify", "--quiet", &local])
            .await?
            .status
            .success();
        if exists {
            self.git(&["branch", "-D", branch]).await?;
        }
        Ok(())
    }

    /// Name of the checked-out branch.
    pub async fn current_branch(&self) -> Result<String> {
        Ok(self
            .git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await?
            .trim()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// A working clone with `main` pushed to a bare `origin`.
    fn make_repo() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let remote = dir.path().join("remote.git");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&work).unwrap();
        run_git(&remote, &["init", "--bare", "-b", "main"]);
        run_git(&work, &["init", "-b", "main"]);
        run_git(&work, &["config", "user.name", "test-user"]);
        run_git(&work, &["config", "user.email", "test@example.com"]);
        std::fs::create_dir_all(work.join("src/yaml/a")).unwrap();
        std::fs::write(work.join("src/yaml/a/old.yaml"), "group: a\n").unwrap();
        std::fs::write(work.join("src/yaml/a/other.yaml"), "group: other\n").unwrap();
        run_git(&work, &["add", "."]);
        run_git(&work, &["commit", "-m", "initial"]);
        run_git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
        run_git(&work, &["push", "origin", "main"]);
        (dir, work)
    }

    #[tokio::test]
    async fn test_open_rejects_non_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WorkingTree::open(dir.path(), "main", "origin").await.is_err());
    }

    #[tokio::test]
    async fn test_reset_discards_stray_edits() {
        let (_dir, work) = make_repo();
        std::fs::write(work.join("src/yaml/a/old.yaml"), "edited\n").unwrap();
        std::fs::write(work.join("stray.txt"), "x").unwrap();

        let mut tree = WorkingTree::open(&work, "main", "origin").await.unwrap();
        tree.reset_to_clean().await.unwrap();

        assert!(!work.join("stray.txt").exists());
        let content = std::fs::read_to_string(work.join("src/yaml/a/old.yaml")).unwrap();
        assert_eq!(content, "group: a\n");
    }

    #[tokio::test]
    async fn test_fresh_branch_then_resumed() {
        let (_dir, work) = make_repo();
        let mut tree = WorkingTree::open(&work, "main", "origin").await.unwrap();

        let start = tree.begin_branch("package/a/b").await.unwrap();
        assert_eq!(start, BranchStart::Fresh);
        assert_eq!(tree.current_branch().await.unwrap(), "package/a/b");
        let sha = tree.commit("`a:b@1`").await.unwrap();
        tree.push("package/a/b").await.unwrap();
        tree.return_to_trunk_and_delete_branch("package/a/b").await.unwrap();
        assert_eq!(tree.current_branch().await.unwrap(), "main");

        let start = tree.begin_branch("package/a/b").await.unwrap();
        assert_eq!(start, BranchStart::Resumed);
        assert_eq!(tree.head_sha().await.unwrap(), sha);
    }

    #[tokio::test]
    async fn test_replace_files_removes_renamed_files() {
        let (_dir, work) = make_repo();
        let mut tree = WorkingTree::open(&work, "main", "origin").await.unwrap();
        tree.begin_branch("package/a/b").await.unwrap();

        let files = vec![SubmissionFile::new("src/yaml/a/new.yaml", "group: a\n")];
        let removed = tree.replace_files("src/yaml/a/old*.yaml", &files).await.unwrap();
        assert_eq!(removed, vec!["src/yaml/a/old.yaml".to_string()]);
        tree.commit("rename").await.unwrap();

        let tracked = run_git(&work, &["ls-files", "src/yaml/a"]);
        assert!(tracked.contains("new.yaml"));
        assert!(tracked.contains("other.yaml"));
        assert!(!tracked.contains("old.yaml"));
    }

    #[tokio::test]
    async fn test_commit_allows_empty_diff() {
        let (_dir, work) = make_repo();
        let mut tree = WorkingTree::open(&work, "main", "origin").await.unwrap();
        let before = tree.head_sha().await.unwrap();
        let after = tree.commit("nothing").await.unwrap();
        assert_ne!(before, after);
    }

    /// Commit on trunk from a second clone, so `work` has not seen it.
    fn push_trunk_elsewhere(work: &Path, path: &str, contents: &str) -> String {
        let other = work.with_file_name("other");
        if !other.exists() {
            let remote = work.with_file_name("remote.git");
            run_git(
                work.parent().unwrap(),
                &["clone", "-q", remote.to_str().unwrap(), "other"],
            );
            run_git(&other, &["config", "user.name", "other-user"]);
            run_git(&other, &["config", "user.email", "other@example.com"]);
        }
        run_git(&other, &["pull", "-q", "origin", "main"]);
        let file = other.join(path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, contents).unwrap();
        run_git(&other, &["add", path]);
        run_git(&other, &["commit", "-q", "-m", &format!("trunk: {path}")]);
        run_git(&other, &["push", "-q", "origin", "main"]);
        run_git(&other, &["rev-parse", "HEAD"]).trim().to_string()
    }

    /// A remote branch `package/a/b` whose `old.yaml` conflicts with trunk.
    async fn conflicting_branch(work: &Path) -> WorkingTree {
        let mut tree = WorkingTree::open(work, "main", "origin").await.unwrap();
        tree.begin_branch("package/a/b").await.unwrap();
        std::fs::write(work.join("src/yaml/a/old.yaml"), "branch side\n").unwrap();
        run_git(work, &["commit", "-am", "branch edit"]);
        tree.push("package/a/b").await.unwrap();
        tree.return_to_trunk_and_delete_branch("package/a/b")
            .await
            .unwrap();
        push_trunk_elsewhere(work, "src/yaml/a/old.yaml", "trunk side\n");
        tree
    }

    #[tokio::test]
    async fn test_sync_trunk_follows_remote() {
        let (_dir, work) = make_repo();
        let moved = push_trunk_elsewhere(&work, "src/yaml/b/new.yaml", "group: b\n");

        let mut tree = WorkingTree::open(&work, "main", "origin").await.unwrap();
        tree.reset_to_clean().await.unwrap();
        tree.sync_trunk().await.unwrap();

        assert_eq!(run_git(&work, &["rev-parse", "main"]).trim(), moved);
        assert!(work.join("src/yaml/b/new.yaml").exists());
    }

    #[tokio::test]
    async fn test_fresh_branch_starts_from_remote_trunk() {
        let (_dir, work) = make_repo();
        let moved = push_trunk_elsewhere(&work, "src/yaml/b/new.yaml", "group: b\n");

        let mut tree = WorkingTree::open(&work, "main", "origin").await.unwrap();
        assert_eq!(tree.begin_branch("package/c/d").await.unwrap(), BranchStart::Fresh);
        assert_eq!(tree.head_sha().await.unwrap(), moved);
    }

    #[tokio::test]
    async fn test_reconcile_merges_remote_trunk_when_behind() {
        let (_dir, work) = make_repo();
        let mut tree = WorkingTree::open(&work, "main", "origin").await.unwrap();
        tree.begin_branch("package/a/b").await.unwrap();
        tree.commit("`a:b@1`").await.unwrap();
        tree.push("package/a/b").await.unwrap();
        tree.return_to_trunk_and_delete_branch("package/a/b")
            .await
            .unwrap();

        let moved = push_trunk_elsewhere(&work, "trunk.txt", "new on trunk\n");

        assert_eq!(tree.begin_branch("package/a/b").await.unwrap(), BranchStart::Resumed);
        assert_eq!(tree.behind_count().await.unwrap(), 1);
        assert!(tree.reconcile_with_trunk("package/a/b").await.unwrap());
        assert_eq!(tree.behind_count().await.unwrap(), 0);
        assert!(!tree.reconcile_with_trunk("package/a/b").await.unwrap());
        run_git(&work, &["merge-base", "--is-ancestor", &moved, "HEAD"]);
    }

    #[tokio::test]
    async fn test_conflicting_merge_is_aborted() {
        let (_dir, work) = make_repo();
        let mut tree = conflicting_branch(&work).await;

        tree.begin_branch("package/a/b").await.unwrap();
        let err = tree.reconcile_with_trunk("package/a/b").await.unwrap_err();
        assert!(matches!(err, PkgprError::MergeConflict { .. }));

        let status = run_git(&work, &["status", "--porcelain"]);
        assert!(status.is_empty(), "merge left state behind: {status}");
    }

    #[tokio::test]
    async fn test_conflict_detected_under_translated_locale() {
        let (_dir, work) = make_repo();
        let mut tree = conflicting_branch(&work).await;

        std::env::set_var("LANGUAGE", "de");
        tree.begin_branch("package/a/b").await.unwrap();
        let result = tree.reconcile_with_trunk("package/a/b").await;
        std::env::remove_var("LANGUAGE");

        assert!(matches!(result, Err(PkgprError::MergeConflict { .. })));
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_branch() {
        let (_dir, work) = make_repo();
        let mut tree = WorkingTree::open(&work, "main", "origin").await.unwrap();
        tree.return_to_trunk_and_delete_branch("package/never/created")
            .await
            .unwrap();
    }
}

//! The VCS collaborator contract.
//!
//! The analysis and sync layers depend only on these traits. [`GitCli`]
//! implements both by shelling out to `git`; tests substitute in-memory
//! fakes.
//!
//! [`GitCli`]: super::client::GitCli

use std::path::Path;

use async_trait::async_trait;

use crate::errors::VcsError;
use crate::models::{CommitEntry, FileEntry};

/// Read-only access used by the per-file analysis.
#[async_trait]
pub trait RepositoryReader: Send + Sync {
    /// Every tracked file at `branch` with its blob SHA and last-touching
    /// commit SHA.
    ///
    /// A file the log names no commit for is still listed, with an empty
    /// `last_commit_sha`; the analysis reports it as a per-file failure.
    async fn list_files(&self, repo: &Path, branch: &str) -> Result<Vec<FileEntry>, VcsError>;

    /// Commit log for `path` at `branch`, newest first, following renames.
    ///
    /// Returns an empty list when the file never existed on that branch and
    /// an error when the history could not be determined.
    async fn commit_history(
        &self,
        repo: &Path,
        branch: &str,
        path: &str,
    ) -> Result<Vec<CommitEntry>, VcsError>;
}

/// Mutating operations used by the sync orchestrator against one checkout.
#[async_trait]
pub trait WorkingTree: Send + Sync {
    /// Make sure remote `name` exists in `repo` and points at `url`.
    async fn ensure_remote(&self, repo: &Path, name: &str, url: &str) -> Result<(), VcsError>;

    async fn fetch(&self, repo: &Path, remote: &str) -> Result<(), VcsError>;

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<(), VcsError>;

    /// Merge `reference` into the current branch without committing.
    ///
    /// An error is returned for any non-zero exit, including conflicts;
    /// callers inspect [`merge_in_progress`](Self::merge_in_progress) to
    /// tell the two apart.
    async fn merge(
        &self,
        repo: &Path,
        reference: &str,
        allow_unrelated_histories: bool,
    ) -> Result<(), VcsError>;

    /// Whether the working tree carries the "merge in progress" marker.
    async fn merge_in_progress(&self, repo: &Path) -> Result<bool, VcsError>;

    /// Replace `path` in the working tree and index with its content at
    /// `reference`.
    async fn stage_version(&self, repo: &Path, reference: &str, path: &str)
        -> Result<(), VcsError>;

    /// Paths the index still marks as unmerged, including modify/delete
    /// conflicts.
    async fn unmerged_paths(&self, repo: &Path) -> Result<Vec<String>, VcsError>;
}

//! `git` CLI backend.
//!
//! History and listing go through the `git` binary so that `--follow` rename
//! tracking matches what developers see. Remote configuration and merge-state
//! inspection use `git2`.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use git2::{ErrorCode, Repository, RepositoryState};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::backend::{RepositoryReader, WorkingTree};
use super::parser::{
    parse_commit_log, parse_last_commits, parse_ls_tree, HISTORY_FORMAT, LAST_COMMIT_FORMAT,
};
use crate::errors::VcsError;
use crate::models::{CommitEntry, FileEntry};

/// Asynchronous client that runs `git` as a child process.
///
/// Child processes are killed when the awaiting future is dropped, so
/// cancelling a run also stops its in-flight git calls.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    identity: Option<(String, String)>,
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass `user.name` / `user.email` to every invocation.
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    async fn run_git(&self, repo: &Path, args: &[&str]) -> Result<String, VcsError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(repo).args(["-c", "core.quotepath=false"]);
        if let Some((name, email)) = &self.identity {
            cmd.arg("-c")
                .arg(format!("user.name={name}"))
                .arg("-c")
                .arg(format!("user.email={email}"));
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(repo = %repo.display(), cmd = ?format!("git {}", args.join(" ")), "running git command");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VcsError::BinaryNotFound("git".into())
            } else {
                VcsError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            let command = args.first().copied().unwrap_or_default().to_string();
            warn!(command, exit_code, %stderr, "git command failed");
            return Err(VcsError::CommandFailed {
                command,
                exit_code,
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Run a blocking `git2` operation off the async runtime.
async fn with_repository<T, F>(repo: &Path, op: F) -> Result<T, VcsError>
where
    T: Send + 'static,
    F: FnOnce(&Repository) -> Result<T, VcsError> + Send + 'static,
{
    let path = repo.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let repository = Repository::open(&path)
            .map_err(|_| VcsError::RepositoryNotFound(path.display().to_string()))?;
        op(&repository)
    })
    .await
    .map_err(|e| VcsError::IoError(std::io::Error::other(e.to_string())))?
}

#[async_trait]
impl RepositoryReader for GitCli {
    #[instrument(skip(self, repo), fields(repo = %repo.display()))]
    async fn list_files(&self, repo: &Path, branch: &str) -> Result<Vec<FileEntry>, VcsError> {
        let tree = self
            .run_git(repo, &["ls-tree", "-r", "-z", "--full-tree", branch])
            .await?;
        let blobs = parse_ls_tree(&tree)?;

        let log = self
            .run_git(repo, &["log", "-z", LAST_COMMIT_FORMAT, "--name-only", branch, "--"])
            .await?;
        let mut last_commits = parse_last_commits(&log);

        let mut files = Vec::with_capacity(blobs.len());
        for blob in blobs {
            let commit = last_commits.remove(&blob.path).unwrap_or_else(|| {
                warn!(path = %blob.path, "no commit found touching tracked file");
                String::new()
            });
            files.push(FileEntry::new(blob.path, blob.blob_sha, commit));
        }
        info!(count = files.len(), branch, "listed tracked files");
        Ok(files)
    }

    #[instrument(skip(self, repo), fields(repo = %repo.display()))]
    async fn commit_history(
        &self,
        repo: &Path,
        branch: &str,
        path: &str,
    ) -> Result<Vec<CommitEntry>, VcsError> {
        let output = self
            .run_git(repo, &["log", "--follow", HISTORY_FORMAT, branch, "--", path])
            .await?;
        let history = parse_commit_log(&output)?;
        debug!(count = history.len(), "collected file history");
        Ok(history)
    }
}

#[async_trait]
impl WorkingTree for GitCli {
    #[instrument(skip(self, repo), fields(repo = %repo.display()))]
    async fn ensure_remote(&self, repo: &Path, name: &str, url: &str) -> Result<(), VcsError> {
        let name = name.to_string();
        let url = url.to_string();
        with_repository(repo, move |repository| {
            match repository.find_remote(&name) {
                Ok(remote) => {
                    if remote.url() != Some(url.as_str()) {
                        info!(remote = %name, %url, "updating remote url");
                        repository.remote_set_url(&name, &url)?;
                    } else {
                        debug!(remote = %name, "remote already configured");
                    }
                }
                Err(e) if e.code() == ErrorCode::NotFound => {
                    info!(remote = %name, %url, "adding remote");
                    repository.remote(&name, &url)?;
                }
                Err(e) => return Err(e.into()),
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, repo), fields(repo = %repo.display()))]
    async fn fetch(&self, repo: &Path, remote: &str) -> Result<(), VcsError> {
        self.run_git(repo, &["fetch", "--no-tags", remote]).await?;
        info!(remote, "fetch completed");
        Ok(())
    }

    #[instrument(skip(self, repo), fields(repo = %repo.display()))]
    async fn checkout(&self, repo: &Path, branch: &str) -> Result<(), VcsError> {
        self.run_git(repo, &["checkout", branch]).await?;
        info!(branch, "checked out branch");
        Ok(())
    }

    #[instrument(skip(self, repo), fields(repo = %repo.display()))]
    async fn merge(
        &self,
        repo: &Path,
        reference: &str,
        allow_unrelated_histories: bool,
    ) -> Result<(), VcsError> {
        let mut args = vec!["merge", "--no-ff", "--no-commit"];
        if allow_unrelated_histories {
            args.push("--allow-unrelated-histories");
        }
        args.push(reference);
        self.run_git(repo, &args).await?;
        info!(reference, "merge completed without conflicts");
        Ok(())
    }

    async fn merge_in_progress(&self, repo: &Path) -> Result<bool, VcsError> {
        with_repository(repo, |repository| {
            Ok(repository.state() == RepositoryState::Merge)
        })
        .await
    }

    #[instrument(skip(self, repo), fields(repo = %repo.display()))]
    async fn stage_version(
        &self,
        repo: &Path,
        reference: &str,
        path: &str,
    ) -> Result<(), VcsError> {
        self.run_git(repo, &["checkout", reference, "--", path]).await?;
        self.run_git(repo, &["add", "--", path]).await?;
        debug!(reference, path, "staged version");
        Ok(())
    }

    #[instrument(skip(self, repo), fields(repo = %repo.display()))]
    async fn unmerged_paths(&self, repo: &Path) -> Result<Vec<String>, VcsError> {
        let output = self
            .run_git(repo, &["diff", "--name-only", "-z", "--diff-filter=U"])
            .await?;
        let mut paths: Vec<String> = output
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        paths.dedup();
        debug!(count = paths.len(), "listed unmerged paths");
        Ok(paths)
    }
}

//! Error types for the forksync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

use crate::models::RepoRole;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// VCS errors
// ---------------------------------------------------------------------------

/// Errors from the VCS backend (git CLI and `git2`).
#[derive(Debug, Error)]
pub enum VcsError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// A `git` command exited with a non-zero status.
    #[error("git {command} failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Could not parse output produced by `git`.
    #[error("failed to parse git output: {0}")]
    ParseError(String),

    /// The command did not finish within the configured timeout.
    #[error("git {command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Analysis errors
// ---------------------------------------------------------------------------

/// Errors from the per-file analysis pipeline.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Only local repositories can be compared.
    #[error("{role} repository mode '{mode}' is unsupported for analysis")]
    UnsupportedRepositoryMode { role: RepoRole, mode: String },

    /// Listing tracked files failed for one side.
    #[error("failed to list {role} files: {source}")]
    ListingFailed {
        role: RepoRole,
        #[source]
        source: VcsError,
    },

    /// Commit history could not be determined for one file.
    ///
    /// Distinct from an empty history, which means the file never existed
    /// on that branch.
    #[error("{role} history unavailable for '{path}': {source}")]
    HistoryUnavailable {
        path: String,
        role: RepoRole,
        #[source]
        source: VcsError,
    },

    /// The listing found the file but no commit that touched it.
    #[error("{role} log names no commit touching '{path}'")]
    NoLastCommit { path: String, role: RepoRole },

    /// A worker task panicked or was aborted.
    #[error("analysis task failed: {0}")]
    TaskFailed(String),

    /// The run was cancelled; partial results are discarded.
    #[error("analysis run cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Errors from the merge orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another orchestrator run holds the lock for this fork path.
    #[error("sync already in progress for fork '{fork_path}'")]
    AlreadyRunning { fork_path: String },

    /// A state-machine transition was invalid.
    #[error("invalid sync state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// A fetch/checkout/merge step failed. The working tree is left as-is.
    #[error("sync step '{state}' failed (merge in progress: {merge_in_progress}): {source}")]
    StepFailed {
        state: String,
        merge_in_progress: bool,
        #[source]
        source: VcsError,
    },

    /// The repositories cannot be synced in their configured mode.
    #[error("sync configuration error: {0}")]
    Analysis(#[from] AnalysisError),

    /// The run was cancelled between steps.
    #[error("sync run cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = VcsError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/repo'");

        let err = AnalysisError::UnsupportedRepositoryMode {
            role: RepoRole::Fork,
            mode: "remote".into(),
        };
        assert_eq!(
            err.to_string(),
            "fork repository mode 'remote' is unsupported for analysis"
        );

        let err = AnalysisError::HistoryUnavailable {
            path: "src/a.ts".into(),
            role: RepoRole::Boilerplate,
            source: VcsError::Timeout {
                command: "log".into(),
                secs: 5,
            },
        };
        assert!(err.to_string().contains("src/a.ts"));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = VcsError::ParseError("x".into()).into();
        assert!(matches!(core_err, CoreError::Vcs(_)));

        let core_err: CoreError = SyncError::Cancelled.into();
        assert!(matches!(core_err, CoreError::Sync(_)));
    }
}

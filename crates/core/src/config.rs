//! TOML-based configuration system for forksync.
//!
//! Configuration is passed explicitly to the analysis runner and the sync
//! orchestrator; nothing is read from module-level state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{AnalysisError, ConfigError};
use crate::models::RepoRole;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// The upstream template repository.
    pub boilerplate: RepositoryDescriptor,

    /// The downstream repository being re-synced.
    pub fork: RepositoryDescriptor,

    /// Per-file analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Ignore rules applied to boilerplate-relative paths.
    #[serde(default)]
    pub ignore: IgnoreConfig,

    /// Merge orchestration settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_log_level() -> String {
    "info".into()
}

// ---------------------------------------------------------------------------
// Repository descriptor
// ---------------------------------------------------------------------------

/// Where a repository lives and which branch to read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RepositoryDescriptor {
    /// A checkout on the local filesystem.
    Local {
        path: PathBuf,
        #[serde(default = "default_branch")]
        branch: String,
    },
    /// A hosted repository. Not supported by the analysis engine.
    Remote {
        owner: String,
        repo: String,
        #[serde(default = "default_branch")]
        branch: String,
    },
}

fn default_branch() -> String {
    "main".into()
}

impl RepositoryDescriptor {
    pub fn local(path: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self::Local {
            path: path.into(),
            branch: branch.into(),
        }
    }

    pub fn branch(&self) -> &str {
        match self {
            Self::Local { branch, .. } | Self::Remote { branch, .. } => branch,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Remote { .. } => "remote",
        }
    }

    /// The local checkout path, or the "unsupported" error for remote repos.
    pub fn require_local(&self, role: RepoRole) -> Result<&Path, AnalysisError> {
        match self {
            Self::Local { path, .. } => Ok(path),
            Self::Remote { .. } => Err(AnalysisError::UnsupportedRepositoryMode {
                role,
                mode: self.mode().to_string(),
            }),
        }
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.branch().trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{field}.branch"),
                detail: "branch must not be empty".into(),
            });
        }
        match self {
            Self::Local { path, .. } if path.as_os_str().is_empty() => {
                Err(ConfigError::InvalidValue {
                    field: format!("{field}.path"),
                    detail: "local repository path must not be empty".into(),
                })
            }
            Self::Remote { owner, repo, .. } if owner.is_empty() || repo.is_empty() => {
                Err(ConfigError::InvalidValue {
                    field: format!("{field}.owner"),
                    detail: "remote repository needs both owner and repo".into(),
                })
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// What to do when a file's commit history cannot be read.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryErrorPolicy {
    /// Count the file as errored and leave it out of the summary.
    #[default]
    Fail,
    /// Record a warning and treat the comparison as `Unrelated` with
    /// `Unknown` coverage.
    Downgrade,
}

/// Per-file analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum number of files analysed at once (default 10).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout for each git history call in seconds; 0 disables it.
    #[serde(default = "default_git_timeout")]
    pub git_timeout_secs: u64,

    /// Compare per-file commit histories. When off, differing files are
    /// classified as `Outdated`.
    #[serde(default = "default_true")]
    pub compare_history: bool,

    #[serde(default)]
    pub on_history_error: HistoryErrorPolicy,
}

fn default_concurrency() -> usize {
    10
}
fn default_git_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl AnalysisConfig {
    pub fn git_timeout(&self) -> Option<Duration> {
        (self.git_timeout_secs > 0).then(|| Duration::from_secs(self.git_timeout_secs))
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            git_timeout_secs: default_git_timeout(),
            compare_history: true,
            on_history_error: HistoryErrorPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ignore rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IgnoreConfig {
    /// Ordered glob patterns; the first match wins.
    #[serde(default)]
    pub patterns: Vec<String>,
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

/// Merge orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Name of the remote in the fork that points at the boilerplate.
    #[serde(default = "default_remote_name")]
    pub remote_name: String,

    /// Pass `--allow-unrelated-histories` to the merge.
    #[serde(default)]
    pub allow_unrelated_histories: bool,

    /// Identity used for git commands that need one.
    #[serde(default)]
    pub committer_name: Option<String>,

    #[serde(default)]
    pub committer_email: Option<String>,
}

fn default_remote_name() -> String {
    "boilerplate".into()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_name: default_remote_name(),
            allow_unrelated_histories: false,
            committer_name: None,
            committer_email: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Build a config for two local checkouts with default settings.
    pub fn for_local(
        boilerplate: impl Into<PathBuf>,
        boilerplate_branch: &str,
        fork: impl Into<PathBuf>,
        fork_branch: &str,
    ) -> Self {
        Self {
            log_level: default_log_level(),
            boilerplate: RepositoryDescriptor::local(boilerplate, boilerplate_branch),
            fork: RepositoryDescriptor::local(fork, fork_branch),
            analysis: AnalysisConfig::default(),
            ignore: IgnoreConfig::default(),
            sync: SyncConfig::default(),
        }
    }

    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// Relative repository paths are resolved against the config file's
    /// directory.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;

        if let Some(base) = path.parent() {
            config.boilerplate.resolve_relative_to(base);
            config.fork.resolve_relative_to(base);
        }

        debug!("configuration parsed successfully");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.boilerplate.validate("boilerplate")?;
        self.fork.validate("fork")?;

        if self.analysis.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "analysis.concurrency".into(),
                detail: "concurrency must be > 0".into(),
            });
        }
        if self.sync.remote_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sync.remote_name".into(),
                detail: "remote name must not be empty".into(),
            });
        }
        for pattern in &self.ignore.patterns {
            if pattern.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "ignore.patterns".into(),
                    detail: "patterns must not be empty strings".into(),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Generate a commented default configuration as TOML.
    pub fn default_toml() -> String {
        r#"# forksync configuration
log_level = "info"

[boilerplate]
mode = "local"
path = "../boilerplate"
branch = "main"

[fork]
mode = "local"
path = "."
branch = "main"

[analysis]
# Number of files analysed concurrently.
concurrency = 10
# Per git call; 0 disables the timeout.
git_timeout_secs = 30
compare_history = true
# "fail" counts the file as errored, "downgrade" treats it as unrelated.
on_history_error = "fail"

[ignore]
patterns = []

[sync]
remote_name = "boilerplate"
allow_unrelated_histories = false
"#
        .to_string()
    }
}

impl RepositoryDescriptor {
    fn resolve_relative_to(&mut self, base: &Path) {
        if let Self::Local { path, .. } = self {
            if path.is_relative() && !base.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        }
    }
}

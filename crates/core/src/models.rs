//! Domain model types used throughout forksync.
//!
//! Every record here is created fresh per analysis run and never mutated
//! after construction. Nothing is persisted between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of hex characters used for short SHA display.
pub const SHORT_SHA_LEN: usize = 7;

fn short_sha(sha: &str) -> &str {
    sha.get(..SHORT_SHA_LEN).unwrap_or(sha)
}

// ---------------------------------------------------------------------------
// Repository roles
// ---------------------------------------------------------------------------

/// Which side of the sync a repository, history or staged version belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RepoRole {
    /// The upstream template.
    Boilerplate,
    /// The downstream repository being re-synced.
    Fork,
}

impl std::fmt::Display for RepoRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boilerplate => write!(f, "boilerplate"),
            Self::Fork => write!(f, "fork"),
        }
    }
}

// ---------------------------------------------------------------------------
// Files and commits
// ---------------------------------------------------------------------------

/// One tracked file's content and provenance at a repo snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Repo-relative, forward-slash separated path.
    pub path: String,
    /// Content hash of the file.
    pub blob_sha: String,
    /// Most recent commit on the branch that touched this path.
    pub last_commit_sha: String,
}

impl FileEntry {
    pub fn new(
        path: impl Into<String>,
        blob_sha: impl Into<String>,
        last_commit_sha: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            blob_sha: blob_sha.into(),
            last_commit_sha: last_commit_sha.into(),
        }
    }

    pub fn short_blob_sha(&self) -> &str {
        short_sha(&self.blob_sha)
    }

    pub fn short_commit_sha(&self) -> &str {
        short_sha(&self.last_commit_sha)
    }
}

/// A node of a linear, per-file commit log (newest first).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitEntry {
    pub sha: String,
    pub date: DateTime<Utc>,
}

impl CommitEntry {
    pub fn new(sha: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            sha: sha.into(),
            date,
        }
    }
}

// ---------------------------------------------------------------------------
// Commit comparison
// ---------------------------------------------------------------------------

/// Raw status derived from two per-file commit logs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommitSyncStatus {
    Ahead,
    Behind,
    Diverged,
    Unrelated,
}

impl std::fmt::Display for CommitSyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ahead => write!(f, "ahead"),
            Self::Behind => write!(f, "behind"),
            Self::Diverged => write!(f, "diverged"),
            Self::Unrelated => write!(f, "unrelated"),
        }
    }
}

/// How much of the boilerplate's per-file history the fork has seen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommitHistoryCoverage {
    Complete,
    Partial,
    Unknown,
}

impl std::fmt::Display for CommitHistoryCoverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Partial => write!(f, "partial"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Comparator output for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitComparisonSummary {
    pub status: CommitSyncStatus,
    /// Fork commits strictly newer than the shared ancestor.
    pub commits_ahead: usize,
    /// Boilerplate commits strictly newer than the shared ancestor.
    pub commits_behind: usize,
    pub shared_ancestor_sha: Option<String>,
    /// Date of the shared ancestor commit.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub commit_history_coverage: CommitHistoryCoverage,
}

impl CommitComparisonSummary {
    /// Explicit downgrade used when history could not be read in time.
    pub fn unavailable() -> Self {
        Self {
            status: CommitSyncStatus::Unrelated,
            commits_ahead: 0,
            commits_behind: 0,
            shared_ancestor_sha: None,
            last_synced_at: None,
            commit_history_coverage: CommitHistoryCoverage::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification and conflict analysis
// ---------------------------------------------------------------------------

/// Classification of a fork file relative to its boilerplate version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileSyncState {
    UpToDate,
    Ahead,
    Behind,
    Diverged,
    Unrelated,
    Missing,
    /// Conservative fallback when no commit comparison is available.
    Outdated,
}

impl FileSyncState {
    pub const ALL: [FileSyncState; 7] = [
        Self::UpToDate,
        Self::Ahead,
        Self::Behind,
        Self::Diverged,
        Self::Unrelated,
        Self::Missing,
        Self::Outdated,
    ];
}

impl From<CommitSyncStatus> for FileSyncState {
    fn from(status: CommitSyncStatus) -> Self {
        match status {
            CommitSyncStatus::Ahead => Self::Ahead,
            CommitSyncStatus::Behind => Self::Behind,
            CommitSyncStatus::Diverged => Self::Diverged,
            CommitSyncStatus::Unrelated => Self::Unrelated,
        }
    }
}

impl std::fmt::Display for FileSyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => write!(f, "up_to_date"),
            Self::Ahead => write!(f, "ahead"),
            Self::Behind => write!(f, "behind"),
            Self::Diverged => write!(f, "diverged"),
            Self::Unrelated => write!(f, "unrelated"),
            Self::Missing => write!(f, "missing"),
            Self::Outdated => write!(f, "outdated"),
        }
    }
}

/// Blob-level content comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BlobStatus {
    Identical,
    Different,
    /// The fork file is absent.
    Unknown,
}

impl std::fmt::Display for BlobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identical => write!(f, "identical"),
            Self::Different => write!(f, "different"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Ordinal estimate of manual-merge risk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictLikelihood {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConflictLikelihood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Why a file may conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    None,
    DivergedHistories,
    UnrelatedHistories,
    MissingInFork,
    OutdatedInFork,
    BlobMismatch,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::DivergedHistories => write!(f, "diverged_histories"),
            Self::UnrelatedHistories => write!(f, "unrelated_histories"),
            Self::MissingInFork => write!(f, "missing_in_fork"),
            Self::OutdatedInFork => write!(f, "outdated_in_fork"),
            Self::BlobMismatch => write!(f, "blob_mismatch"),
        }
    }
}

/// Whether the VCS can settle the file's merge mechanically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AutoResolvable {
    Git,
    None,
}

impl std::fmt::Display for AutoResolvable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git => write!(f, "git"),
            Self::None => write!(f, "none"),
        }
    }
}

/// The chosen way to settle a file's content during sync.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    KeepBoilerplate,
    KeepFork,
    ManualMerge,
    /// Forced by an ignore rule.
    Ignored,
    Unknown,
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepBoilerplate => write!(f, "keep_boilerplate"),
            Self::KeepFork => write!(f, "keep_fork"),
            Self::ManualMerge => write!(f, "manual_merge"),
            Self::Ignored => write!(f, "ignored"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    ForkHasNewerCommits,
    BoilerplateHasNewerCommits,
    ShouldBeIdentical,
    ShouldBeAutoMerged,
    ManualMergeRequired,
    Unknown,
}

impl std::fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForkHasNewerCommits => write!(f, "fork_has_newer_commits"),
            Self::BoilerplateHasNewerCommits => write!(f, "boilerplate_has_newer_commits"),
            Self::ShouldBeIdentical => write!(f, "should_be_identical"),
            Self::ShouldBeAutoMerged => write!(f, "should_be_auto_merged"),
            Self::ManualMergeRequired => write!(f, "manual_merge_required"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Conflict assessment for one file. A pure function of its inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictAnalysis {
    pub sync_state: FileSyncState,
    pub blob_status: BlobStatus,
    pub conflict_likelihood: ConflictLikelihood,
    pub conflict_reason: ConflictReason,
    pub auto_resolvable: AutoResolvable,
    pub resolution_strategy: ResolutionStrategy,
    pub resolution_reason: Option<ResolutionReason>,
}

impl ConflictAnalysis {
    /// Boolean view of [`AutoResolvable`].
    pub fn can_auto_resolve(&self) -> bool {
        self.auto_resolvable == AutoResolvable::Git
    }

    /// `true` when the likelihood is at least `Medium`.
    pub fn is_possible_conflict(&self) -> bool {
        self.conflict_likelihood >= ConflictLikelihood::Medium
    }
}

// ---------------------------------------------------------------------------
// Per-file aggregate and run summary
// ---------------------------------------------------------------------------

/// The central per-file record of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSyncAnalysis {
    pub file_path: String,
    pub boilerplate_file: FileEntry,
    pub forked_file: Option<FileEntry>,
    pub commit_comparison: Option<CommitComparisonSummary>,
    pub conflict_analysis: ConflictAnalysis,
    /// The ignore pattern that forced `Ignored`, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_by: Option<String>,
    /// Explicit downgrades applied while analysing this file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl FileSyncAnalysis {
    pub fn is_ignored(&self) -> bool {
        self.conflict_analysis.resolution_strategy == ResolutionStrategy::Ignored
    }

    /// Counts toward "expected conflicts": possible conflict and not ignored.
    pub fn expects_conflict(&self) -> bool {
        !self.is_ignored() && self.conflict_analysis.is_possible_conflict()
    }
}

/// Run-level counts folded from every [`FileSyncAnalysis`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSyncSummary {
    pub total_files: usize,
    pub up_to_date: usize,
    pub ahead: usize,
    pub behind: usize,
    pub diverged: usize,
    pub unrelated: usize,
    pub missing: usize,
    pub outdated: usize,
    pub ignored: usize,
    pub possible_conflicts: usize,
    pub auto_resolvable_conflicts_by_git: usize,
    pub manual_resolvable_conflicts: usize,
    /// Files whose analysis failed and were left out of the counts above.
    pub errored_files: usize,
}

impl FileSyncSummary {
    pub fn count_for(&self, state: FileSyncState) -> usize {
        match state {
            FileSyncState::UpToDate => self.up_to_date,
            FileSyncState::Ahead => self.ahead,
            FileSyncState::Behind => self.behind,
            FileSyncState::Diverged => self.diverged,
            FileSyncState::Unrelated => self.unrelated,
            FileSyncState::Missing => self.missing,
            FileSyncState::Outdated => self.outdated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_forms() {
        let entry = FileEntry::new("a.ts", "0123456789abcdef", "abc");
        assert_eq!(entry.short_blob_sha(), "0123456");
        assert_eq!(entry.short_commit_sha(), "abc");
    }

    #[test]
    fn test_likelihood_ordering() {
        assert!(ConflictLikelihood::Low < ConflictLikelihood::Medium);
        assert!(ConflictLikelihood::Medium < ConflictLikelihood::High);
    }

    #[test]
    fn test_state_from_commit_status() {
        assert_eq!(
            FileSyncState::from(CommitSyncStatus::Diverged),
            FileSyncState::Diverged
        );
        assert_eq!(
            FileSyncState::from(CommitSyncStatus::Unrelated),
            FileSyncState::Unrelated
        );
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&ResolutionStrategy::KeepBoilerplate).unwrap();
        assert_eq!(json, "\"keep_boilerplate\"");
        let state: FileSyncState = serde_json::from_str("\"up_to_date\"").unwrap();
        assert_eq!(state, FileSyncState::UpToDate);
    }
}

//! File sync classification.

use crate::models::{CommitComparisonSummary, FileEntry, FileSyncState};

/// Classify a fork file relative to its boilerplate version.
///
/// Rules, first match wins:
///
/// | Condition | State |
/// |-----------|-------|
/// | No fork file | `Missing` |
/// | Same last-touching commit | `UpToDate` |
/// | Comparator result available | its status |
/// | Otherwise | `Outdated` |
pub fn classify(
    boilerplate: &FileEntry,
    fork: Option<&FileEntry>,
    comparison: Option<&CommitComparisonSummary>,
) -> FileSyncState {
    let Some(fork) = fork else {
        return FileSyncState::Missing;
    };
    if boilerplate.last_commit_sha == fork.last_commit_sha {
        return FileSyncState::UpToDate;
    }
    comparison.map_or(FileSyncState::Outdated, |c| c.status.into())
}

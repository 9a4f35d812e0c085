//! Run-level summary aggregation.

use crate::models::{FileSyncAnalysis, FileSyncState, FileSyncSummary};

/// Fold every per-file analysis of one run into counts.
///
/// Ignored files still count toward their sync state but never toward the
/// conflict counters.
pub fn summarize(analyses: &[FileSyncAnalysis], errored_files: usize) -> FileSyncSummary {
    analyses.iter().fold(
        FileSyncSummary {
            errored_files,
            ..Default::default()
        },
        |mut summary, analysis| {
            summary.total_files += 1;
            let counter = match analysis.conflict_analysis.sync_state {
                FileSyncState::UpToDate => &mut summary.up_to_date,
                FileSyncState::Ahead => &mut summary.ahead,
                FileSyncState::Behind => &mut summary.behind,
                FileSyncState::Diverged => &mut summary.diverged,
                FileSyncState::Unrelated => &mut summary.unrelated,
                FileSyncState::Missing => &mut summary.missing,
                FileSyncState::Outdated => &mut summary.outdated,
            };
            *counter += 1;

            if analysis.is_ignored() {
                summary.ignored += 1;
            } else if analysis.expects_conflict() {
                summary.possible_conflicts += 1;
                if analysis.conflict_analysis.can_auto_resolve() {
                    summary.auto_resolvable_conflicts_by_git += 1;
                } else {
                    summary.manual_resolvable_conflicts += 1;
                }
            }
            summary
        },
    )
}

//! Per-file commit history comparison.
//!
//! Both logs are treated as linear and totally ordered (newest first). The
//! shared ancestor is the newest fork commit that also appears in the
//! boilerplate log. This is an intersection of two linear logs, not a graph
//! merge-base: merge commits and rewritten history are not accounted for.

use std::collections::HashMap;

use tracing::debug;

use crate::models::{
    CommitComparisonSummary, CommitEntry, CommitHistoryCoverage, CommitSyncStatus,
};

/// Stateless comparator for two per-file commit logs.
pub struct CommitComparator;

impl CommitComparator {
    /// Compare the boilerplate log `boilerplate` against the fork log `fork`.
    pub fn compare(boilerplate: &[CommitEntry], fork: &[CommitEntry]) -> CommitComparisonSummary {
        // sha -> position in the boilerplate log
        let boilerplate_index: HashMap<&str, usize> = boilerplate
            .iter()
            .enumerate()
            .map(|(i, c)| (c.sha.as_str(), i))
            .collect();

        let ancestor = fork
            .iter()
            .enumerate()
            .find_map(|(fork_pos, c)| {
                boilerplate_index
                    .get(c.sha.as_str())
                    .map(|&bp_pos| (fork_pos, bp_pos, c))
            });

        let (commits_ahead, commits_behind, shared_ancestor_sha, last_synced_at) = match ancestor {
            Some((ahead, behind, commit)) => {
                (ahead, behind, Some(commit.sha.clone()), Some(commit.date))
            }
            None => (0, 0, None, None),
        };

        let status = classify_status(shared_ancestor_sha.is_some(), commits_ahead, commits_behind);
        let commit_history_coverage = coverage(boilerplate, fork);

        debug!(
            %status,
            commits_ahead,
            commits_behind,
            %commit_history_coverage,
            "compared commit histories"
        );

        CommitComparisonSummary {
            status,
            commits_ahead,
            commits_behind,
            shared_ancestor_sha,
            last_synced_at,
            commit_history_coverage,
        }
    }
}

/// Status decision table; the first matching row wins.
///
/// An ancestor at the tip of both logs (ahead = behind = 0) falls through to
/// `Unrelated`.
fn classify_status(has_ancestor: bool, ahead: usize, behind: usize) -> CommitSyncStatus {
    if !has_ancestor {
        return CommitSyncStatus::Unrelated;
    }
    match (ahead > 0, behind > 0) {
        (true, false) => CommitSyncStatus::Ahead,
        (false, true) => CommitSyncStatus::Behind,
        (true, true) => CommitSyncStatus::Diverged,
        (false, false) => CommitSyncStatus::Unrelated,
    }
}

/// Share of boilerplate commits present in the fork log.
fn coverage(boilerplate: &[CommitEntry], fork: &[CommitEntry]) -> CommitHistoryCoverage {
    let fork_shas: std::collections::HashSet<&str> = fork.iter().map(|c| c.sha.as_str()).collect();
    let covered = boilerplate
        .iter()
        .filter(|c| fork_shas.contains(c.sha.as_str()))
        .count();

    if covered == 0 {
        CommitHistoryCoverage::Unknown
    } else if covered == boilerplate.len() {
        CommitHistoryCoverage::Complete
    } else {
        CommitHistoryCoverage::Partial
    }
}

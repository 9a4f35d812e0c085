//! Conflict analysis.
//!
//! Derives blob comparison, conflict likelihood and reason,
//! auto-resolvability and the resolution strategy for one file. Every
//! function here is pure; identical inputs always produce identical output.

use crate::models::{
    AutoResolvable, BlobStatus, CommitComparisonSummary, ConflictAnalysis, ConflictLikelihood,
    ConflictReason, FileEntry, FileSyncState, ResolutionReason, ResolutionStrategy,
};

use super::classifier::classify;

/// Stateless analyzer combining classification and conflict assessment.
pub struct ConflictAnalyzer;

impl ConflictAnalyzer {
    /// Classify and analyse one file.
    pub fn analyze(
        boilerplate: &FileEntry,
        fork: Option<&FileEntry>,
        comparison: Option<&CommitComparisonSummary>,
    ) -> ConflictAnalysis {
        let sync_state = classify(boilerplate, fork, comparison);
        Self::analyze_state(sync_state, blob_status(boilerplate, fork))
    }

    /// Analyse an already classified file.
    pub fn analyze_state(sync_state: FileSyncState, blob_status: BlobStatus) -> ConflictAnalysis {
        let conflict_likelihood = conflict_likelihood(sync_state, blob_status);
        let auto_resolvable = auto_resolvable(sync_state, blob_status);
        ConflictAnalysis {
            sync_state,
            blob_status,
            conflict_likelihood,
            conflict_reason: conflict_reason(sync_state, blob_status),
            auto_resolvable,
            resolution_strategy: resolution_strategy(
                sync_state,
                conflict_likelihood,
                auto_resolvable,
            ),
            resolution_reason: Some(resolution_reason(sync_state, blob_status)),
        }
    }
}

pub fn blob_status(boilerplate: &FileEntry, fork: Option<&FileEntry>) -> BlobStatus {
    match fork {
        None => BlobStatus::Unknown,
        Some(f) if f.blob_sha == boilerplate.blob_sha => BlobStatus::Identical,
        Some(_) => BlobStatus::Different,
    }
}

pub fn conflict_likelihood(state: FileSyncState, blob: BlobStatus) -> ConflictLikelihood {
    use BlobStatus::{Different, Identical};
    use FileSyncState::*;

    match (state, blob) {
        (Missing, _) => ConflictLikelihood::High,
        (UpToDate, Identical) => ConflictLikelihood::Low,
        (Diverged, Different) => ConflictLikelihood::High,
        (Unrelated, _) => ConflictLikelihood::High,
        (Ahead | Behind, Different) => ConflictLikelihood::Medium,
        (Outdated, Different) => ConflictLikelihood::Medium,
        (Outdated | Behind, Identical) => ConflictLikelihood::Low,
        _ => ConflictLikelihood::Medium,
    }
}

pub fn conflict_reason(state: FileSyncState, blob: BlobStatus) -> ConflictReason {
    match state {
        FileSyncState::Diverged => ConflictReason::DivergedHistories,
        FileSyncState::Unrelated => ConflictReason::UnrelatedHistories,
        FileSyncState::Missing => ConflictReason::MissingInFork,
        FileSyncState::Behind | FileSyncState::Outdated => ConflictReason::OutdatedInFork,
        FileSyncState::UpToDate | FileSyncState::Ahead => {
            if blob == BlobStatus::Different {
                ConflictReason::BlobMismatch
            } else {
                ConflictReason::None
            }
        }
    }
}

pub fn auto_resolvable(state: FileSyncState, blob: BlobStatus) -> AutoResolvable {
    if state == FileSyncState::Missing {
        return AutoResolvable::None;
    }
    if blob == BlobStatus::Identical {
        return AutoResolvable::Git;
    }
    // fast-forward safe
    if matches!(state, FileSyncState::Ahead | FileSyncState::Behind) {
        return AutoResolvable::Git;
    }
    AutoResolvable::None
}

/// Strategy table. Rows are evaluated in order and the order is load-bearing:
/// a `Low` likelihood wins over the per-state rows, and the per-state rows
/// win over auto-resolvability.
pub fn resolution_strategy(
    state: FileSyncState,
    likelihood: ConflictLikelihood,
    auto: AutoResolvable,
) -> ResolutionStrategy {
    if likelihood == ConflictLikelihood::Low {
        return ResolutionStrategy::KeepBoilerplate;
    }
    if state == FileSyncState::Ahead {
        return ResolutionStrategy::KeepFork;
    }
    if state == FileSyncState::Behind {
        return ResolutionStrategy::KeepBoilerplate;
    }
    if state == FileSyncState::Missing {
        return ResolutionStrategy::ManualMerge;
    }
    if auto == AutoResolvable::Git {
        return ResolutionStrategy::KeepBoilerplate;
    }
    if matches!(likelihood, ConflictLikelihood::Medium | ConflictLikelihood::High) {
        return ResolutionStrategy::ManualMerge;
    }
    ResolutionStrategy::Unknown
}

pub fn resolution_reason(state: FileSyncState, blob: BlobStatus) -> ResolutionReason {
    match state {
        FileSyncState::Ahead => ResolutionReason::ForkHasNewerCommits,
        FileSyncState::Behind => ResolutionReason::BoilerplateHasNewerCommits,
        FileSyncState::UpToDate if blob == BlobStatus::Identical => {
            ResolutionReason::ShouldBeIdentical
        }
        FileSyncState::UpToDate => ResolutionReason::ShouldBeAutoMerged,
        FileSyncState::Missing
        | FileSyncState::Diverged
        | FileSyncState::Unrelated
        | FileSyncState::Outdated => ResolutionReason::ManualMergeRequired,
    }
}

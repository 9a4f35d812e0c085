//! Boilerplate → fork merge orchestration.
//!
//! The [`SyncOrchestrator`] drives one re-sync of the fork working tree:
//!
//! 1. Ensure a remote pointing at the boilerplate exists and fetch it.
//! 2. Check out the fork branch and merge the boilerplate branch without
//!    committing.
//! 3. Apply each file's resolution strategy to the working tree.
//! 4. Finish `Completed`, or `Failed` with the files that still need a
//!    manual merge.
//!
//! Paths git still reports as unmerged after step 3 are added to the manual
//! list, so a run only completes when the index is clean.
//!
//! Fetch, checkout and merge failures abort the run immediately. Nothing is
//! retried or rolled back; the working tree is left for inspection.
//! Runs against the same fork path are serialized by [`ForkLockRegistry`].

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analysis::{AnalysisReport, FileAnalysisFailure};
use crate::config::{AppConfig, RepositoryDescriptor, SyncConfig};
use crate::errors::{SyncError, VcsError};
use crate::git::WorkingTree;
use crate::models::{FileSyncAnalysis, RepoRole, ResolutionStrategy};

// ---------------------------------------------------------------------------
// Sync state machine
// ---------------------------------------------------------------------------

/// How the merge step left the working tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    /// The merge command has not finished yet.
    Pending,
    /// The merge applied without conflicts (left uncommitted).
    Clean,
    /// The merge stopped with conflicts; the marker is present.
    InProgress,
}

impl std::fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Clean => write!(f, "clean"),
            Self::InProgress => write!(f, "in_progress"),
        }
    }
}

/// States of one orchestrator run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    FetchingRemote,
    Merging(MergeStatus),
    ApplyingResolutions,
    Completed,
    /// Terminal: either a fatal step failure or files left for manual merge.
    Failed,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: SyncState) -> bool {
        use MergeStatus::{Clean, InProgress, Pending};
        use SyncState::*;

        match (*self, next) {
            (Idle, FetchingRemote) => true,
            (FetchingRemote, Merging(Pending)) => true,
            (Merging(Pending), Merging(Clean | InProgress)) => true,
            (Merging(Clean | InProgress), ApplyingResolutions) => true,
            (ApplyingResolutions, Completed) => true,
            (Completed | Failed, Idle) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::FetchingRemote => write!(f, "fetching_remote"),
            Self::Merging(status) => write!(f, "merging({status})"),
            Self::ApplyingResolutions => write!(f, "applying_resolutions"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution planning
// ---------------------------------------------------------------------------

/// What the orchestrator does with one path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "side")]
pub enum ResolutionAction {
    /// Take this side's content for the path.
    Stage(RepoRole),
    /// Leave the path conflicted for a human.
    Manual,
    /// Leave the path as the merge produced it.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedResolution {
    pub path: String,
    pub strategy: ResolutionStrategy,
    pub action: ResolutionAction,
}

/// Map every file's resolution strategy to a working-tree action.
///
/// `Unknown` is treated as a manual merge. Ignored files keep the fork's
/// content when the fork has the file.
pub fn plan_resolutions(analyses: &[FileSyncAnalysis]) -> Vec<PlannedResolution> {
    analyses
        .iter()
        .map(|analysis| {
            let strategy = analysis.conflict_analysis.resolution_strategy;
            let action = match strategy {
                ResolutionStrategy::KeepBoilerplate => ResolutionAction::Stage(RepoRole::Boilerplate),
                ResolutionStrategy::KeepFork => ResolutionAction::Stage(RepoRole::Fork),
                ResolutionStrategy::ManualMerge => ResolutionAction::Manual,
                ResolutionStrategy::Unknown => {
                    warn!(path = %analysis.file_path, "unknown resolution strategy; treating as manual merge");
                    ResolutionAction::Manual
                }
                ResolutionStrategy::Ignored if analysis.forked_file.is_some() => {
                    ResolutionAction::Stage(RepoRole::Fork)
                }
                ResolutionStrategy::Ignored => ResolutionAction::Skip,
            };
            PlannedResolution {
                path: analysis.file_path.clone(),
                strategy,
                action,
            }
        })
        .collect()
}

/// Files whose analysis failed are left for a manual merge.
pub fn plan_failures(failures: &[FileAnalysisFailure]) -> Vec<PlannedResolution> {
    failures
        .iter()
        .map(|failure| PlannedResolution {
            path: failure.path.clone(),
            strategy: ResolutionStrategy::Unknown,
            action: ResolutionAction::Manual,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of a run that reached a terminal state without a fatal error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub run_id: Uuid,
    pub final_state: SyncState,
    /// `None` for dry runs.
    pub merge_status: Option<MergeStatus>,
    pub resolutions: Vec<PlannedResolution>,
    /// Paths that still need a manual merge.
    pub manual_files: Vec<String>,
    pub dry_run: bool,
}

impl SyncOutcome {
    pub fn needs_manual_resolution(&self) -> bool {
        !self.manual_files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Plan resolutions without touching the working tree.
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Single-flight lock
// ---------------------------------------------------------------------------

/// File created inside the fork's `.git` directory while a run holds it.
pub const LOCK_FILE_NAME: &str = "forksync.lock";

/// Registry of fork paths with a run in progress.
///
/// Share one registry (it is cheap to clone) between every orchestrator that
/// may target the same fork. Across processes, a lock file in the fork's
/// `.git` directory holds the same role.
#[derive(Debug, Clone, Default)]
pub struct ForkLockRegistry {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ForkLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `fork_path`, failing if it is already held by this
    /// process or another one.
    pub fn acquire(&self, fork_path: &Path) -> Result<ForkLockGuard, SyncError> {
        let key = std::fs::canonicalize(fork_path).unwrap_or_else(|_| fork_path.to_path_buf());
        {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            if !held.insert(key.clone()) {
                return Err(SyncError::AlreadyRunning {
                    fork_path: key.display().to_string(),
                });
            }
        }

        let lock_file = match create_lock_file(&key) {
            Ok(lock_file) => lock_file,
            Err(e) => {
                self.release(&key);
                return Err(e);
            }
        };
        debug!(fork = %key.display(), "acquired fork lock");
        Ok(ForkLockGuard {
            registry: self.clone(),
            key,
            lock_file,
        })
    }

    pub fn is_locked(&self, fork_path: &Path) -> bool {
        let key = std::fs::canonicalize(fork_path).unwrap_or_else(|_| fork_path.to_path_buf());
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key)
    }

    fn release(&self, key: &Path) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(key);
    }
}

/// Create `<fork>/.git/forksync.lock` holding our PID.
///
/// Returns `None` when the fork has no `.git` directory (bare path, linked
/// worktree) or the file cannot be written; the in-process lock still holds.
fn create_lock_file(fork: &Path) -> Result<Option<PathBuf>, SyncError> {
    let git_dir = fork.join(".git");
    if !git_dir.is_dir() {
        return Ok(None);
    }
    let path = git_dir.join(LOCK_FILE_NAME);
    let opened = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path);
    match opened {
        Ok(mut file) => {
            use std::io::Write;
            if let Err(e) = write!(file, "{}", std::process::id()) {
                warn!(path = %path.display(), error = %e, "could not write PID to lock file");
            }
            Ok(Some(path))
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            warn!(
                path = %path.display(),
                "lock file present; another sync is running or a previous one crashed"
            );
            Err(SyncError::AlreadyRunning {
                fork_path: fork.display().to_string(),
            })
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not create lock file");
            Ok(None)
        }
    }
}

/// RAII guard that releases the fork lock on drop (even on panic).
#[derive(Debug)]
pub struct ForkLockGuard {
    registry: ForkLockRegistry,
    key: PathBuf,
    lock_file: Option<PathBuf>,
}

impl Drop for ForkLockGuard {
    fn drop(&mut self) {
        if let Some(path) = &self.lock_file {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove lock file");
            }
        }
        self.registry.release(&self.key);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives fetch → merge → resolution against one fork working tree.
pub struct SyncOrchestrator {
    tree: Arc<dyn WorkingTree>,
    boilerplate: RepositoryDescriptor,
    fork: RepositoryDescriptor,
    config: SyncConfig,
    locks: ForkLockRegistry,
    state: Mutex<SyncState>,
}

impl SyncOrchestrator {
    pub fn new(
        tree: Arc<dyn WorkingTree>,
        boilerplate: RepositoryDescriptor,
        fork: RepositoryDescriptor,
        config: SyncConfig,
        locks: ForkLockRegistry,
    ) -> Self {
        Self {
            tree,
            boilerplate,
            fork,
            config,
            locks,
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn from_app_config(
        tree: Arc<dyn WorkingTree>,
        config: &AppConfig,
        locks: ForkLockRegistry,
    ) -> Self {
        Self::new(
            tree,
            config.boilerplate.clone(),
            config.fork.clone(),
            config.sync.clone(),
            locks,
        )
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Execute one run over a full analysis report. Files that failed
    /// analysis are planned as manual merges.
    pub async fn run_report(
        &self,
        report: &AnalysisReport,
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let mut plan = plan_resolutions(&report.analyses);
        plan.extend(plan_failures(&report.failures));
        self.run_plan(plan, options, cancel).await
    }

    /// Execute one run over a completed analysis.
    ///
    /// Returns `Ok` with `final_state = Failed` when files are left for a
    /// manual merge; returns `Err` for fatal step failures, lock contention,
    /// unsupported repository modes and cancellation.
    pub async fn run(
        &self,
        analyses: &[FileSyncAnalysis],
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        self.run_plan(plan_resolutions(analyses), options, cancel).await
    }

    async fn run_plan(
        &self,
        plan: Vec<PlannedResolution>,
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let boilerplate_path = self.boilerplate.require_local(RepoRole::Boilerplate)?;
        let fork_path = self.fork.require_local(RepoRole::Fork)?;
        let _guard = self.locks.acquire(fork_path)?;

        let run_id = Uuid::new_v4();
        self.reset();
        info!(%run_id, files = plan.len(), dry_run = options.dry_run, "starting sync run");

        if options.dry_run {
            let manual_files = manual_paths(&plan);
            let final_state = if manual_files.is_empty() {
                SyncState::Completed
            } else {
                SyncState::Failed
            };
            self.record_dry_run(final_state);
            return Ok(SyncOutcome {
                run_id,
                final_state,
                merge_status: None,
                resolutions: plan,
                manual_files,
                dry_run: true,
            });
        }

        let result = self
            .execute(boilerplate_path, fork_path, plan, cancel)
            .await;
        match result {
            Ok((merge_status, resolutions, manual_files)) => {
                let final_state = if manual_files.is_empty() {
                    SyncState::Completed
                } else {
                    SyncState::Failed
                };
                self.transition(final_state)?;
                info!(
                    %run_id,
                    state = %final_state,
                    manual = manual_files.len(),
                    "sync run finished"
                );
                Ok(SyncOutcome {
                    run_id,
                    final_state,
                    merge_status: Some(merge_status),
                    resolutions,
                    manual_files,
                    dry_run: false,
                })
            }
            Err(e) => {
                self.force_failed();
                error!(%run_id, error = %e, "sync run aborted");
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        boilerplate_path: &Path,
        fork_path: &Path,
        plan: Vec<PlannedResolution>,
        cancel: &CancellationToken,
    ) -> Result<(MergeStatus, Vec<PlannedResolution>, Vec<String>), SyncError> {
        let remote = self.config.remote_name.as_str();
        let remote_url = std::fs::canonicalize(boilerplate_path)
            .unwrap_or_else(|_| boilerplate_path.to_path_buf())
            .display()
            .to_string();

        // Fetch
        self.transition(SyncState::FetchingRemote)?;
        let step = cancellable(cancel, self.tree.ensure_remote(fork_path, remote, &remote_url)).await?;
        self.check_step(fork_path, step, cancel).await?;
        let step = cancellable(cancel, self.tree.fetch(fork_path, remote)).await?;
        self.check_step(fork_path, step, cancel).await?;

        // Merge
        self.transition(SyncState::Merging(MergeStatus::Pending))?;
        let step = cancellable(cancel, self.tree.checkout(fork_path, self.fork.branch())).await?;
        self.check_step(fork_path, step, cancel).await?;

        let theirs = format!("{remote}/{}", self.boilerplate.branch());
        let merged = cancellable(
            cancel,
            self.tree
                .merge(fork_path, &theirs, self.config.allow_unrelated_histories),
        )
        .await?;
        let merge_status = match merged {
            Ok(()) => MergeStatus::Clean,
            Err(e) => {
                let in_progress = cancellable(cancel, self.tree.merge_in_progress(fork_path))
                    .await?
                    .unwrap_or(false);
                if !in_progress {
                    return Err(self.step_failed(false, e));
                }
                info!(error = %e, "merge stopped with conflicts");
                MergeStatus::InProgress
            }
        };
        self.transition(SyncState::Merging(merge_status))?;

        // Resolutions
        self.transition(SyncState::ApplyingResolutions)?;
        let mut manual_files = Vec::new();
        let mut applied = Vec::with_capacity(plan.len());
        for mut resolution in plan {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let action = resolution.action;
            match action {
                ResolutionAction::Stage(role) => {
                    let reference = match role {
                        RepoRole::Fork => "HEAD",
                        RepoRole::Boilerplate => theirs.as_str(),
                    };
                    let staged = cancellable(
                        cancel,
                        self.tree.stage_version(fork_path, reference, &resolution.path),
                    )
                    .await?;
                    if let Err(e) = staged {
                        warn!(path = %resolution.path, %role, error = %e, "could not stage version; leaving for manual merge");
                        resolution.action = ResolutionAction::Manual;
                        manual_files.push(resolution.path.clone());
                    } else {
                        debug!(path = %resolution.path, %role, "staged version");
                    }
                }
                ResolutionAction::Manual => manual_files.push(resolution.path.clone()),
                ResolutionAction::Skip => {
                    debug!(path = %resolution.path, "leaving path as merged");
                }
            }
            applied.push(resolution);
        }

        // Conflicts outside the plan, e.g. modify/delete on files the
        // boilerplate removed, still block completion.
        let unmerged = cancellable(cancel, self.tree.unmerged_paths(fork_path)).await?;
        let unmerged = unmerged.map_err(|e| self.step_failed(merge_status == MergeStatus::InProgress, e))?;
        for path in unmerged {
            if !manual_files.contains(&path) {
                warn!(path = %path, "path still unmerged after resolutions; leaving for manual merge");
                manual_files.push(path);
            }
        }

        Ok((merge_status, applied, manual_files))
    }

    /// Turn a failed fetch/checkout step into a fatal error.
    async fn check_step(
        &self,
        fork_path: &Path,
        step: Result<(), VcsError>,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        match step {
            Ok(()) => Ok(()),
            Err(e) => {
                let in_progress = cancellable(cancel, self.tree.merge_in_progress(fork_path))
                    .await?
                    .unwrap_or(false);
                Err(self.step_failed(in_progress, e))
            }
        }
    }

    fn step_failed(&self, merge_in_progress: bool, source: VcsError) -> SyncError {
        SyncError::StepFailed {
            state: self.state().to_string(),
            merge_in_progress,
            source,
        }
    }

    fn transition(&self, next: SyncState) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.can_transition_to(next) {
            return Err(SyncError::InvalidStateTransition {
                from: state.to_string(),
                to: next.to_string(),
            });
        }
        info!(from = %*state, to = %next, "state transition");
        *state = next;
        Ok(())
    }

    fn force_failed(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.is_terminal() {
            info!(from = %*state, to = %SyncState::Failed, "state transition");
            *state = SyncState::Failed;
        }
    }

    /// Dry runs never touch the tree, so the terminal state is recorded
    /// without walking the intermediate states.
    fn record_dry_run(&self, final_state: SyncState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        info!(from = %*state, to = %final_state, dry_run = true, "state transition");
        *state = final_state;
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = SyncState::Idle;
    }
}

fn manual_paths(plan: &[PlannedResolution]) -> Vec<String> {
    plan.iter()
        .filter(|r| r.action == ResolutionAction::Manual)
        .map(|r| r.path.clone())
        .collect()
}

/// Await `fut` unless the run is cancelled first. Dropping the future kills
/// any child process it spawned.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, SyncError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        out = fut => Ok(out),
    }
}

//! One analysis run: list both repositories, analyse every boilerplate file
//! on the worker pool, then fold the results into a summary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::comparator::CommitComparator;
use super::conflict::ConflictAnalyzer;
use super::ignore::IgnoreRules;
use super::pool::WorkerPool;
use super::summary::summarize;
use crate::config::{AnalysisConfig, AppConfig, HistoryErrorPolicy, RepositoryDescriptor};
use crate::errors::{AnalysisError, VcsError};
use crate::git::RepositoryReader;
use crate::models::{
    CommitComparisonSummary, CommitEntry, FileEntry, FileSyncAnalysis, FileSyncSummary,
    RepoRole, ResolutionStrategy,
};

/// A file whose analysis failed. The rest of the run is unaffected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysisFailure {
    pub path: String,
    pub message: String,
}

/// Everything produced by one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Sorted by path.
    pub analyses: Vec<FileSyncAnalysis>,
    pub failures: Vec<FileAnalysisFailure>,
    pub summary: FileSyncSummary,
}

/// Drives the comparator → classifier → analyzer pipeline for every file.
pub struct AnalysisRunner {
    reader: Arc<dyn RepositoryReader>,
    config: AnalysisConfig,
    ignore: IgnoreRules,
}

impl AnalysisRunner {
    pub fn new(
        reader: Arc<dyn RepositoryReader>,
        config: AnalysisConfig,
        ignore: IgnoreRules,
    ) -> Self {
        Self {
            reader,
            config,
            ignore,
        }
    }

    pub fn from_app_config(reader: Arc<dyn RepositoryReader>, config: &AppConfig) -> Self {
        Self::new(
            reader,
            config.analysis.clone(),
            IgnoreRules::from(&config.ignore),
        )
    }

    /// Analyse every file tracked by the boilerplate.
    ///
    /// Remote descriptors are rejected before any git command runs. A
    /// cancelled run returns [`AnalysisError::Cancelled`] and nothing else.
    pub async fn run(
        &self,
        boilerplate: &RepositoryDescriptor,
        fork: &RepositoryDescriptor,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, AnalysisError> {
        let boilerplate_path = boilerplate.require_local(RepoRole::Boilerplate)?.to_path_buf();
        let fork_path = fork.require_local(RepoRole::Fork)?.to_path_buf();

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, boilerplate = %boilerplate_path.display(), fork = %fork_path.display(), "starting analysis run");

        let listing = async {
            tokio::join!(
                self.reader.list_files(&boilerplate_path, boilerplate.branch()),
                self.reader.list_files(&fork_path, fork.branch()),
            )
        };
        let (boilerplate_files, fork_files) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            listed = listing => listed,
        };
        let boilerplate_files = boilerplate_files.map_err(|source| AnalysisError::ListingFailed {
            role: RepoRole::Boilerplate,
            source,
        })?;
        let fork_files = fork_files.map_err(|source| AnalysisError::ListingFailed {
            role: RepoRole::Fork,
            source,
        })?;

        let mut fork_by_path: HashMap<String, FileEntry> = fork_files
            .into_iter()
            .map(|f| (f.path.clone(), f))
            .collect();
        let jobs: Vec<FileJob> = boilerplate_files
            .into_iter()
            .map(|boilerplate| FileJob {
                fork: fork_by_path.remove(&boilerplate.path),
                boilerplate,
            })
            .collect();
        debug!(files = jobs.len(), "scheduling file analyses");

        let ctx = Arc::new(FileContext {
            reader: self.reader.clone(),
            boilerplate_path,
            boilerplate_branch: boilerplate.branch().to_string(),
            fork_path,
            fork_branch: fork.branch().to_string(),
            timeout: self.config.git_timeout(),
            compare_history: self.config.compare_history,
            on_history_error: self.config.on_history_error,
            ignore: self.ignore.clone(),
        });

        let pool = WorkerPool::new(self.config.concurrency);
        let results = pool
            .run(jobs, cancel, move |job| {
                let ctx = ctx.clone();
                async move {
                    let path = job.boilerplate.path.clone();
                    (path, ctx.analyze(job).await)
                }
            })
            .await?;

        let mut analyses = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (path, result) in results {
            match result {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => {
                    warn!(path = %path, error = %e, "file analysis failed");
                    failures.push(FileAnalysisFailure {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }
        analyses.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        let summary = summarize(&analyses, failures.len());
        info!(
            %run_id,
            files = summary.total_files,
            possible_conflicts = summary.possible_conflicts,
            errored = summary.errored_files,
            "analysis run complete"
        );

        Ok(AnalysisReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            analyses,
            failures,
            summary,
        })
    }
}

struct FileJob {
    boilerplate: FileEntry,
    fork: Option<FileEntry>,
}

/// Immutable state shared by every per-file task of one run.
struct FileContext {
    reader: Arc<dyn RepositoryReader>,
    boilerplate_path: PathBuf,
    boilerplate_branch: String,
    fork_path: PathBuf,
    fork_branch: String,
    timeout: Option<Duration>,
    compare_history: bool,
    on_history_error: HistoryErrorPolicy,
    ignore: IgnoreRules,
}

impl FileContext {
    async fn analyze(&self, job: FileJob) -> Result<FileSyncAnalysis, AnalysisError> {
        let path = job.boilerplate.path.clone();
        if job.boilerplate.last_commit_sha.is_empty() {
            return Err(AnalysisError::NoLastCommit { path, role: RepoRole::Boilerplate });
        }
        if job.fork.as_ref().is_some_and(|f| f.last_commit_sha.is_empty()) {
            return Err(AnalysisError::NoLastCommit { path, role: RepoRole::Fork });
        }
        let mut warnings = Vec::new();

        // Histories only matter when the fork has the file and the last
        // touching commits differ.
        let comparison = match &job.fork {
            Some(fork)
                if self.compare_history
                    && fork.last_commit_sha != job.boilerplate.last_commit_sha =>
            {
                Some(self.compare(&path, &mut warnings).await?)
            }
            _ => None,
        };

        let mut conflict_analysis =
            ConflictAnalyzer::analyze(&job.boilerplate, job.fork.as_ref(), comparison.as_ref());

        let ignored_by = self.ignore.matching_pattern(&path).map(str::to_string);
        if ignored_by.is_some() {
            conflict_analysis.resolution_strategy = ResolutionStrategy::Ignored;
            conflict_analysis.resolution_reason = None;
        }

        debug!(
            path = %path,
            state = %conflict_analysis.sync_state,
            likelihood = %conflict_analysis.conflict_likelihood,
            strategy = %conflict_analysis.resolution_strategy,
            "file analysed"
        );

        Ok(FileSyncAnalysis {
            file_path: path,
            boilerplate_file: job.boilerplate,
            forked_file: job.fork,
            commit_comparison: comparison,
            conflict_analysis,
            ignored_by,
            warnings,
        })
    }

    async fn compare(
        &self,
        path: &str,
        warnings: &mut Vec<String>,
    ) -> Result<CommitComparisonSummary, AnalysisError> {
        let (boilerplate, fork) = tokio::join!(
            self.history(RepoRole::Boilerplate, path),
            self.history(RepoRole::Fork, path),
        );

        let histories = boilerplate
            .map_err(|source| AnalysisError::HistoryUnavailable {
                path: path.to_string(),
                role: RepoRole::Boilerplate,
                source,
            })
            .and_then(|bp| {
                fork.map(|fk| (bp, fk))
                    .map_err(|source| AnalysisError::HistoryUnavailable {
                        path: path.to_string(),
                        role: RepoRole::Fork,
                        source,
                    })
            });

        match histories {
            Ok((bp, fk)) => Ok(CommitComparator::compare(&bp, &fk)),
            Err(err) => {
                let timed_out = matches!(
                    err,
                    AnalysisError::HistoryUnavailable {
                        source: VcsError::Timeout { .. },
                        ..
                    }
                );
                if timed_out || self.on_history_error == HistoryErrorPolicy::Downgrade {
                    warn!(path, error = %err, "history unavailable; treating as unrelated");
                    warnings.push(format!("{err}; treated as unrelated with unknown coverage"));
                    Ok(CommitComparisonSummary::unavailable())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn history(&self, role: RepoRole, path: &str) -> Result<Vec<CommitEntry>, VcsError> {
        let (repo, branch) = match role {
            RepoRole::Boilerplate => (&self.boilerplate_path, &self.boilerplate_branch),
            RepoRole::Fork => (&self.fork_path, &self.fork_branch),
        };
        let call = self.reader.commit_history(repo, branch, path);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                VcsError::Timeout {
                    command: "log".into(),
                    secs: limit.as_secs(),
                }
            })?,
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::models::{
        AutoResolvable, CommitSyncStatus, ConflictLikelihood, FileSyncState, ResolutionReason,
    };

    /// In-memory repository pair keyed by repo path.
    #[derive(Default)]
    struct FakeReader {
        files: HashMap<PathBuf, Vec<FileEntry>>,
        histories: HashMap<(PathBuf, String), Vec<&'static str>>,
        failing: Vec<(PathBuf, String)>,
        slow: Vec<(PathBuf, String)>,
        history_calls: AtomicUsize,
    }

    impl FakeReader {
        fn file(mut self, repo: &str, path: &str, blob: &str, commit: &str) -> Self {
            self.files
                .entry(PathBuf::from(repo))
                .or_default()
                .push(FileEntry::new(path, blob, commit));
            self
        }

        fn history(mut self, repo: &str, path: &str, shas: Vec<&'static str>) -> Self {
            self.histories
                .insert((PathBuf::from(repo), path.to_string()), shas);
            self
        }
    }

    #[async_trait]
    impl RepositoryReader for FakeReader {
        async fn list_files(&self, repo: &Path, _branch: &str) -> Result<Vec<FileEntry>, VcsError> {
            Ok(self.files.get(repo).cloned().unwrap_or_default())
        }

        async fn commit_history(
            &self,
            repo: &Path,
            _branch: &str,
            path: &str,
        ) -> Result<Vec<CommitEntry>, VcsError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            let key = (repo.to_path_buf(), path.to_string());
            if self.slow.contains(&key) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.failing.contains(&key) {
                return Err(VcsError::CommandFailed {
                    command: "log".into(),
                    exit_code: 128,
                    stderr: "fatal: bad object".into(),
                });
            }
            let date = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
            Ok(self
                .histories
                .get(&key)
                .map(|shas| shas.iter().map(|s| CommitEntry::new(*s, date)).collect())
                .unwrap_or_default())
        }
    }

    fn descriptors() -> (RepositoryDescriptor, RepositoryDescriptor) {
        (
            RepositoryDescriptor::local("/bp", "main"),
            RepositoryDescriptor::local("/fork", "main"),
        )
    }

    fn runner(reader: FakeReader, config: AnalysisConfig, ignore: &[&str]) -> AnalysisRunner {
        AnalysisRunner::new(
            Arc::new(reader),
            config,
            IgnoreRules::new(ignore.iter().map(|s| s.to_string()).collect()),
        )
    }

    fn find<'a>(report: &'a AnalysisReport, path: &str) -> &'a FileSyncAnalysis {
        report
            .analyses
            .iter()
            .find(|a| a.file_path == path)
            .expect("analysis present")
    }

    #[tokio::test]
    async fn test_scenarios() {
        let reader = FakeReader::default()
            .file("/bp", "a.ts", "blobA", "H1")
            .file("/fork", "a.ts", "blobA", "H1")
            .file("/bp", "b.ts", "blobB", "H1")
            .file("/bp", "c.ts", "blobC2", "H3")
            .file("/fork", "c.ts", "blobC1", "F2")
            .file("/bp", "d.ts", "blobD2", "H2")
            .file("/fork", "d.ts", "blobD1", "H1")
            .history("/bp", "c.ts", vec!["H3", "H2", "H1"])
            .history("/fork", "c.ts", vec!["F2", "F1", "H1"])
            .history("/bp", "d.ts", vec!["H2", "H1"])
            .history("/fork", "d.ts", vec!["H1"]);

        let (bp, fork) = descriptors();
        let report = runner(reader, AnalysisConfig::default(), &[])
            .run(&bp, &fork, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.analyses.len(), 4);
        assert!(report.failures.is_empty());

        let a = find(&report, "a.ts");
        assert_eq!(a.conflict_analysis.sync_state, FileSyncState::UpToDate);
        assert!(a.commit_comparison.is_none());

        let b = find(&report, "b.ts");
        assert_eq!(b.conflict_analysis.sync_state, FileSyncState::Missing);
        assert_eq!(b.conflict_analysis.conflict_likelihood, ConflictLikelihood::High);
        assert_eq!(b.conflict_analysis.auto_resolvable, AutoResolvable::None);
        assert_eq!(b.conflict_analysis.resolution_strategy, ResolutionStrategy::ManualMerge);

        let c = find(&report, "c.ts");
        let cmp = c.commit_comparison.as_ref().unwrap();
        assert_eq!(cmp.shared_ancestor_sha.as_deref(), Some("H1"));
        assert_eq!((cmp.commits_ahead, cmp.commits_behind), (2, 2));
        assert_eq!(cmp.status, CommitSyncStatus::Diverged);
        assert_eq!(c.conflict_analysis.sync_state, FileSyncState::Diverged);

        let d = find(&report, "d.ts");
        assert_eq!(d.conflict_analysis.sync_state, FileSyncState::Behind);
        assert_eq!(d.conflict_analysis.conflict_likelihood, ConflictLikelihood::Medium);
        assert_eq!(d.conflict_analysis.auto_resolvable, AutoResolvable::Git);
        assert_eq!(d.conflict_analysis.resolution_strategy, ResolutionStrategy::KeepBoilerplate);
        assert_eq!(
            d.conflict_analysis.resolution_reason,
            Some(ResolutionReason::BoilerplateHasNewerCommits)
        );

        // sorted output
        let paths: Vec<_> = report.analyses.iter().map(|a| a.file_path.as_str()).collect();
        assert_eq!(paths, vec!["a.ts", "b.ts", "c.ts", "d.ts"]);
        assert_eq!(report.summary.possible_conflicts, 3);
    }

    #[tokio::test]
    async fn test_ignored_file() {
        let reader = FakeReader::default().file("/bp", "config/app.ts", "blob", "H1");
        let (bp, fork) = descriptors();
        let report = runner(reader, AnalysisConfig::default(), &["config/*"])
            .run(&bp, &fork, &CancellationToken::new())
            .await
            .unwrap();

        let a = find(&report, "config/app.ts");
        assert_eq!(a.conflict_analysis.resolution_strategy, ResolutionStrategy::Ignored);
        assert_eq!(a.ignored_by.as_deref(), Some("config/*"));
        assert_eq!(report.summary.possible_conflicts, 0);
        assert_eq!(report.summary.ignored, 1);
    }

    #[tokio::test]
    async fn test_remote_mode_fails_before_work() {
        let reader = Arc::new(FakeReader::default());
        let runner = AnalysisRunner::new(reader.clone(), AnalysisConfig::default(), IgnoreRules::default());
        let remote = RepositoryDescriptor::Remote {
            owner: "acme".into(),
            repo: "fork".into(),
            branch: "main".into(),
        };
        let (bp, _) = descriptors();
        let err = runner
            .run(&bp, &remote, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::UnsupportedRepositoryMode { role: RepoRole::Fork, .. }
        ));
        assert_eq!(reader.history_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_history_failure_is_file_scoped() {
        let mut reader = FakeReader::default()
            .file("/bp", "ok.ts", "b1", "H1")
            .file("/fork", "ok.ts", "b1", "H1")
            .file("/bp", "broken.ts", "b2", "H2")
            .file("/fork", "broken.ts", "b3", "F1");
        reader.failing.push((PathBuf::from("/fork"), "broken.ts".into()));

        let (bp, fork) = descriptors();
        let report = runner(reader, AnalysisConfig::default(), &[])
            .run(&bp, &fork, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.analyses.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "broken.ts");
        assert!(report.failures[0].message.contains("history unavailable"));
        assert_eq!(report.summary.errored_files, 1);
    }

    #[tokio::test]
    async fn test_missing_last_commit_is_file_scoped() {
        let reader = FakeReader::default()
            .file("/bp", "ok.ts", "b1", "H1")
            .file("/fork", "ok.ts", "b1", "H1")
            .file("/bp", "orphan.ts", "b2", "H2")
            .file("/fork", "orphan.ts", "b3", "");

        let (bp, fork) = descriptors();
        let report = runner(reader, AnalysisConfig::default(), &[])
            .run(&bp, &fork, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.analyses.len(), 1);
        assert_eq!(report.analyses[0].file_path, "ok.ts");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "orphan.ts");
        assert!(report.failures[0].message.contains("fork log names no commit"));
        assert_eq!(report.summary.errored_files, 1);
    }

    #[tokio::test]
    async fn test_history_failure_downgrade() {
        let mut reader = FakeReader::default()
            .file("/bp", "broken.ts", "b2", "H2")
            .file("/fork", "broken.ts", "b3", "F1");
        reader.failing.push((PathBuf::from("/bp"), "broken.ts".into()));

        let config = AnalysisConfig {
            on_history_error: HistoryErrorPolicy::Downgrade,
            ..Default::default()
        };
        let (bp, fork) = descriptors();
        let report = runner(reader, config, &[])
            .run(&bp, &fork, &CancellationToken::new())
            .await
            .unwrap();

        let a = find(&report, "broken.ts");
        assert_eq!(a.conflict_analysis.sync_state, FileSyncState::Unrelated);
        assert_eq!(a.commit_comparison, Some(CommitComparisonSummary::unavailable()));
        assert_eq!(a.warnings.len(), 1);
        assert!(report.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_downgrades_to_unrelated() {
        let mut reader = FakeReader::default()
            .file("/bp", "slow.ts", "b2", "H2")
            .file("/fork", "slow.ts", "b3", "F1");
        reader.slow.push((PathBuf::from("/fork"), "slow.ts".into()));

        let config = AnalysisConfig {
            git_timeout_secs: 5,
            ..Default::default()
        };
        let (bp, fork) = descriptors();
        let report = runner(reader, config, &[])
            .run(&bp, &fork, &CancellationToken::new())
            .await
            .unwrap();

        let a = find(&report, "slow.ts");
        let cmp = a.commit_comparison.as_ref().unwrap();
        assert_eq!(cmp.status, CommitSyncStatus::Unrelated);
        assert_eq!(
            cmp.commit_history_coverage,
            crate::models::CommitHistoryCoverage::Unknown
        );
        assert!(a.warnings[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_compare_history_disabled_yields_outdated() {
        let reader = FakeReader::default()
            .file("/bp", "x.ts", "b2", "H2")
            .file("/fork", "x.ts", "b1", "F1");
        let config = AnalysisConfig {
            compare_history: false,
            ..Default::default()
        };
        let (bp, fork) = descriptors();
        let report = runner(reader, config, &[])
            .run(&bp, &fork, &CancellationToken::new())
            .await
            .unwrap();
        let a = find(&report, "x.ts");
        assert_eq!(a.conflict_analysis.sync_state, FileSyncState::Outdated);
        assert_eq!(a.conflict_analysis.conflict_likelihood, ConflictLikelihood::Medium);
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_nothing() {
        let reader = FakeReader::default().file("/bp", "a.ts", "b", "H1");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (bp, fork) = descriptors();
        let result = runner(reader, AnalysisConfig::default(), &[])
            .run(&bp, &fork, &cancel)
            .await;
        assert!(matches!(result, Err(AnalysisError::Cancelled)));
    }
}

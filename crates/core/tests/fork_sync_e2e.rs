//! End-to-end tests for analysis and sync against real git repositories.
//!
//! Each test builds a boilerplate repo in a temp dir, clones it as the fork,
//! then diverges the two. No network I/O: the fork fetches the boilerplate
//! through a local path remote.
//!
//! Tests skip gracefully if `git` is not installed.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use forksync_core::analysis::AnalysisRunner;
use forksync_core::config::AppConfig;
use forksync_core::errors::VcsError;
use forksync_core::git::{GitCli, RepositoryReader};
use forksync_core::models::{
    CommitHistoryCoverage, CommitSyncStatus, FileSyncState, ResolutionStrategy,
};
use forksync_core::sync_engine::{
    ForkLockRegistry, MergeStatus, SyncOptions, SyncOrchestrator, SyncState,
};

// ===========================================================================
// Helpers
// ===========================================================================

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn write(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
}

/// Boilerplate with a few files, cloned into a fork. Returns
/// `(tempdir, boilerplate_path, fork_path)`.
fn setup_pair() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let boilerplate = tmp.path().join("boilerplate");
    std::fs::create_dir_all(&boilerplate).unwrap();

    git(&boilerplate, &["init", "-q"]);
    git(&boilerplate, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    write(&boilerplate, "fork_change.txt", "base\n");
    write(&boilerplate, "upstream_change.txt", "base\n");
    write(&boilerplate, "shared.txt", "line one\nline two\n");
    write(&boilerplate, "config/app.ts", "export const name = 'app';\n");
    commit_all(&boilerplate, "initial boilerplate");

    let fork = tmp.path().join("fork");
    git(
        tmp.path(),
        &["clone", "-q", boilerplate.to_str().unwrap(), fork.to_str().unwrap()],
    );

    (tmp, boilerplate, fork)
}

/// Diverge the pair without touching the same lines.
fn diverge_cleanly(boilerplate: &Path, fork: &Path) {
    write(fork, "fork_change.txt", "fork edit\n");
    commit_all(fork, "fork customization");

    write(boilerplate, "upstream_change.txt", "upstream edit\n");
    write(boilerplate, "new_upstream.txt", "brand new\n");
    commit_all(boilerplate, "upstream improvements");
}

fn config_for(boilerplate: &Path, fork: &Path) -> AppConfig {
    let mut config = AppConfig::for_local(boilerplate, "main", fork, "main");
    config.analysis.concurrency = 2;
    config.ignore.patterns = vec!["config/".into()];
    config
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_git_cli_lists_and_follows_history() {
    if !git_available() {
        eprintln!("skipping: git not installed");
        return;
    }
    let (_tmp, boilerplate, fork) = setup_pair();
    diverge_cleanly(&boilerplate, &fork);

    let cli = GitCli::new();
    let files = cli.list_files(&boilerplate, "main").await.unwrap();
    let mut paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "config/app.ts",
            "fork_change.txt",
            "new_upstream.txt",
            "shared.txt",
            "upstream_change.txt",
        ]
    );
    assert!(files.iter().all(|f| f.blob_sha.len() == 40 && f.last_commit_sha.len() == 40));

    let history = cli
        .commit_history(&boilerplate, "main", "upstream_change.txt")
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].date >= history[1].date);
}

#[tokio::test]
async fn test_analysis_classifies_diverged_pair() {
    if !git_available() {
        eprintln!("skipping: git not installed");
        return;
    }
    let (_tmp, boilerplate, fork) = setup_pair();
    diverge_cleanly(&boilerplate, &fork);

    let config = config_for(&boilerplate, &fork);
    let runner = AnalysisRunner::from_app_config(Arc::new(GitCli::new()), &config);
    let report = runner
        .run(&config.boilerplate, &config.fork, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.failures.is_empty());
    let find = |path: &str| {
        report
            .analyses
            .iter()
            .find(|a| a.file_path == path)
            .unwrap_or_else(|| panic!("no analysis for {path}"))
    };

    let ahead = find("fork_change.txt");
    assert_eq!(ahead.conflict_analysis.sync_state, FileSyncState::Ahead);
    assert_eq!(ahead.conflict_analysis.resolution_strategy, ResolutionStrategy::KeepFork);
    let comparison = ahead.commit_comparison.as_ref().unwrap();
    assert_eq!(comparison.status, CommitSyncStatus::Ahead);
    assert_eq!(comparison.commits_ahead, 1);
    assert_eq!(comparison.commit_history_coverage, CommitHistoryCoverage::Complete);

    let behind = find("upstream_change.txt");
    assert_eq!(behind.conflict_analysis.sync_state, FileSyncState::Behind);
    assert_eq!(
        behind.conflict_analysis.resolution_strategy,
        ResolutionStrategy::KeepBoilerplate
    );
    let comparison = behind.commit_comparison.as_ref().unwrap();
    assert_eq!(comparison.commits_behind, 1);
    assert_eq!(comparison.commit_history_coverage, CommitHistoryCoverage::Partial);

    let missing = find("new_upstream.txt");
    assert_eq!(missing.conflict_analysis.sync_state, FileSyncState::Missing);
    assert_eq!(missing.conflict_analysis.resolution_strategy, ResolutionStrategy::ManualMerge);

    let same = find("shared.txt");
    assert_eq!(same.conflict_analysis.sync_state, FileSyncState::UpToDate);
    assert!(same.commit_comparison.is_none());

    let ignored = find("config/app.ts");
    assert_eq!(ignored.ignored_by.as_deref(), Some("config/"));
    assert_eq!(ignored.conflict_analysis.resolution_strategy, ResolutionStrategy::Ignored);

    assert_eq!(report.summary.total_files, 5);
    assert_eq!(report.summary.ignored, 1);
    assert_eq!(report.summary.missing, 1);
    assert_eq!(
        report.summary.possible_conflicts,
        report.summary.auto_resolvable_conflicts_by_git + report.summary.manual_resolvable_conflicts
    );
}

#[tokio::test]
async fn test_sync_applies_resolutions_after_clean_merge() {
    if !git_available() {
        eprintln!("skipping: git not installed");
        return;
    }
    let (_tmp, boilerplate, fork) = setup_pair();
    diverge_cleanly(&boilerplate, &fork);

    let config = config_for(&boilerplate, &fork);
    let cli = Arc::new(GitCli::new().with_identity("Sync Bot", "sync@example.com"));
    let report = AnalysisRunner::from_app_config(cli.clone(), &config)
        .run(&config.boilerplate, &config.fork, &CancellationToken::new())
        .await
        .unwrap();

    let orchestrator = SyncOrchestrator::from_app_config(cli, &config, ForkLockRegistry::new());
    let outcome = orchestrator
        .run(&report.analyses, SyncOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.merge_status, Some(MergeStatus::Clean));
    // the file only the boilerplate has still needs a human decision
    assert_eq!(outcome.final_state, SyncState::Failed);
    assert_eq!(outcome.manual_files, vec!["new_upstream.txt".to_string()]);

    let read = |rel: &str| std::fs::read_to_string(fork.join(rel)).unwrap();
    assert_eq!(read("upstream_change.txt"), "upstream edit\n");
    assert_eq!(read("fork_change.txt"), "fork edit\n");
    assert_eq!(read("config/app.ts"), "export const name = 'app';\n");
}

#[tokio::test]
async fn test_sync_reports_conflicting_merge() {
    if !git_available() {
        eprintln!("skipping: git not installed");
        return;
    }
    let (_tmp, boilerplate, fork) = setup_pair();
    write(&fork, "shared.txt", "line one\nfork version\n");
    commit_all(&fork, "fork edits shared");
    write(&boilerplate, "shared.txt", "line one\nupstream version\n");
    commit_all(&boilerplate, "upstream edits shared");

    let config = config_for(&boilerplate, &fork);
    let cli = Arc::new(GitCli::new().with_identity("Sync Bot", "sync@example.com"));
    let report = AnalysisRunner::from_app_config(cli.clone(), &config)
        .run(&config.boilerplate, &config.fork, &CancellationToken::new())
        .await
        .unwrap();

    let shared = report
        .analyses
        .iter()
        .find(|a| a.file_path == "shared.txt")
        .unwrap();
    assert_eq!(shared.conflict_analysis.sync_state, FileSyncState::Diverged);
    assert!(shared.expects_conflict());
    assert_eq!(report.summary.manual_resolvable_conflicts, 1);

    let orchestrator = SyncOrchestrator::from_app_config(cli, &config, ForkLockRegistry::new());
    let outcome = orchestrator
        .run(&report.analyses, SyncOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.merge_status, Some(MergeStatus::InProgress));
    assert_eq!(outcome.final_state, SyncState::Failed);
    assert_eq!(outcome.manual_files, vec!["shared.txt".to_string()]);
    assert!(fork.join(".git").join("MERGE_HEAD").exists());
}

#[tokio::test]
async fn test_sync_flags_modify_delete_conflict() {
    if !git_available() {
        eprintln!("skipping: git not installed");
        return;
    }
    let (_tmp, boilerplate, fork) = setup_pair();
    write(&fork, "fork_change.txt", "fork edit\n");
    commit_all(&fork, "fork customization");
    git(&boilerplate, &["rm", "-q", "fork_change.txt"]);
    git(&boilerplate, &["commit", "-q", "-m", "drop fork_change"]);

    let config = config_for(&boilerplate, &fork);
    let cli = Arc::new(GitCli::new().with_identity("Sync Bot", "sync@example.com"));
    let report = AnalysisRunner::from_app_config(cli.clone(), &config)
        .run(&config.boilerplate, &config.fork, &CancellationToken::new())
        .await
        .unwrap();
    // the boilerplate no longer lists the file, so nothing plans it
    assert!(report.analyses.iter().all(|a| a.file_path != "fork_change.txt"));

    let orchestrator = SyncOrchestrator::from_app_config(cli, &config, ForkLockRegistry::new());
    let outcome = orchestrator
        .run_report(&report, SyncOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.merge_status, Some(MergeStatus::InProgress));
    assert_eq!(outcome.final_state, SyncState::Failed);
    assert_eq!(outcome.manual_files, vec!["fork_change.txt".to_string()]);
    assert_eq!(orchestrator.state(), SyncState::Failed);
}

#[tokio::test]
async fn test_analysis_handles_names_git_would_quote() {
    if !git_available() {
        eprintln!("skipping: git not installed");
        return;
    }
    let (_tmp, boilerplate, fork) = setup_pair();
    write(&boilerplate, "ok.txt", "plain\n");
    write(&boilerplate, "we\"ird.txt", "quoted\n");
    write(&boilerplate, "back\\slash.txt", "escaped\n");
    commit_all(&boilerplate, "awkward names");
    git(&fork, &["pull", "-q", "--ff-only", "origin", "main"]);
    write(&fork, "we\"ird.txt", "fork edit\n");
    commit_all(&fork, "fork edits awkward name");

    let cli = GitCli::new();
    let files = cli.list_files(&boilerplate, "main").await.unwrap();
    for name in ["ok.txt", "we\"ird.txt", "back\\slash.txt"] {
        let entry = files
            .iter()
            .find(|f| f.path == name)
            .unwrap_or_else(|| panic!("{name} not listed"));
        assert_eq!(entry.last_commit_sha.len(), 40);
    }

    let config = config_for(&boilerplate, &fork);
    let report = AnalysisRunner::from_app_config(Arc::new(cli), &config)
        .run(&config.boilerplate, &config.fork, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.failures.is_empty(), "unexpected failures: {:?}", report.failures);
    let weird = report
        .analyses
        .iter()
        .find(|a| a.file_path == "we\"ird.txt")
        .unwrap();
    assert_eq!(weird.conflict_analysis.sync_state, FileSyncState::Ahead);
    let ok = report.analyses.iter().find(|a| a.file_path == "ok.txt").unwrap();
    assert_eq!(ok.conflict_analysis.sync_state, FileSyncState::UpToDate);
}

#[tokio::test]
async fn test_commit_history_of_unknown_path_and_branch() {
    if !git_available() {
        eprintln!("skipping: git not installed");
        return;
    }
    let (_tmp, boilerplate, _fork) = setup_pair();
    let cli = GitCli::new();

    let history = cli
        .commit_history(&boilerplate, "main", "never_existed.txt")
        .await
        .unwrap();
    assert!(history.is_empty());

    let err = cli
        .commit_history(&boilerplate, "no-such-branch", "shared.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, VcsError::CommandFailed { .. }), "got {err:?}");
}

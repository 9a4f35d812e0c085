//! ForkSync core library.
//!
//! This crate compares a fork against the boilerplate it was created from,
//! predicts per-file merge conflicts, and drives the merge that brings the
//! fork back in sync: configuration, git access, analysis, and the sync
//! orchestrator.

pub mod analysis;
pub mod config;
pub mod errors;
pub mod git;
pub mod models;
pub mod sync_engine;

// Re-exports for convenience.
pub use analysis::{AnalysisReport, AnalysisRunner};
pub use config::AppConfig;
pub use git::GitCli;
pub use sync_engine::{ForkLockRegistry, SyncOptions, SyncOrchestrator, SyncOutcome};

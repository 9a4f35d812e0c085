//! Per-file conflict analysis between a boilerplate and its fork.

pub mod classifier;
pub mod comparator;
pub mod conflict;
pub mod ignore;
pub mod pool;
pub mod runner;
pub mod summary;

pub use classifier::classify;
pub use comparator::CommitComparator;
pub use conflict::ConflictAnalyzer;
pub use ignore::IgnoreRules;
pub use pool::WorkerPool;
pub use runner::{AnalysisReport, AnalysisRunner, FileAnalysisFailure};
pub use summary::summarize;

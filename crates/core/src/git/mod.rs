//! Git operations for forksync.

pub mod backend;
pub mod client;
pub mod parser;

pub use backend::{RepositoryReader, WorkingTree};
pub use client::GitCli;

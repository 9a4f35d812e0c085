//! Shared styling utilities for terminal output.

use console::Style;

use forksync_core::models::{ConflictLikelihood, FileSyncState};

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Sync state label, colored by how much attention it needs.
pub fn sync_state(state: FileSyncState) -> String {
    let style = match state {
        FileSyncState::UpToDate => Style::new().green(),
        FileSyncState::Ahead | FileSyncState::Behind => Style::new().cyan(),
        FileSyncState::Outdated => Style::new().yellow(),
        FileSyncState::Diverged | FileSyncState::Unrelated | FileSyncState::Missing => {
            Style::new().red()
        }
    };
    style.apply_to(state.to_string()).to_string()
}

pub fn likelihood(likelihood: ConflictLikelihood) -> String {
    let style = match likelihood {
        ConflictLikelihood::Low => Style::new().green(),
        ConflictLikelihood::Medium => Style::new().yellow(),
        ConflictLikelihood::High => Style::new().red().bold(),
    };
    style.apply_to(likelihood.to_string()).to_string()
}

//! Table and summary rendering for analysis reports and sync outcomes.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use forksync_core::analysis::AnalysisReport;
use forksync_core::models::FileSyncState;
use forksync_core::sync_engine::{ResolutionAction, SyncOutcome};

use crate::style;

/// Print the per-file table followed by the grouped summary.
pub fn print_report(report: &AnalysisReport) {
    println!();
    println!(
        "{}",
        style::header(&format!("Fork Sync Analysis ({} files)", report.summary.total_files))
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["File", "State", "Blob", "Risk", "Strategy", "Ahead/Behind"]);

    for analysis in &report.analyses {
        let ca = &analysis.conflict_analysis;
        let counts = analysis
            .commit_comparison
            .as_ref()
            .map(|c| format!("+{} / -{}", c.commits_ahead, c.commits_behind))
            .unwrap_or_else(|| "—".to_string());
        let strategy = match &analysis.ignored_by {
            Some(pattern) => format!("{} ({})", ca.resolution_strategy, pattern),
            None => ca.resolution_strategy.to_string(),
        };

        table.add_row(vec![
            Cell::new(&analysis.file_path),
            Cell::new(style::sync_state(ca.sync_state)),
            Cell::new(ca.blob_status.to_string()),
            Cell::new(style::likelihood(ca.conflict_likelihood)),
            Cell::new(strategy),
            Cell::new(counts),
        ]);
    }
    println!("{}", table);

    for analysis in report.analyses.iter().filter(|a| !a.warnings.is_empty()) {
        for warning in &analysis.warnings {
            println!("{}", style::warn(&format!("{}: {}", analysis.file_path, warning)));
        }
    }
    for failure in &report.failures {
        println!("{}", style::error(&format!("{}: {}", failure.path, failure.message)));
    }

    print_summary(report);
}

fn print_summary(report: &AnalysisReport) {
    let s = &report.summary;
    println!();
    println!("  {}", style::header("Summary"));
    println!("  {}", "─".repeat(40));
    for state in FileSyncState::ALL {
        let count = s.count_for(state);
        if count > 0 {
            println!("  {:<22} {}", state.to_string(), count);
        }
    }
    println!("  {:<22} {}", "ignored", s.ignored);
    if s.errored_files > 0 {
        println!("  {:<22} {}", "errored", s.errored_files);
    }
    println!();
    println!("  {:<22} {}", "possible conflicts", s.possible_conflicts);
    println!("  {:<22} {}", "  auto-resolvable", s.auto_resolvable_conflicts_by_git);
    println!("  {:<22} {}", "  manual", s.manual_resolvable_conflicts);
    println!();
    println!(
        "  {}",
        style::dim(&format!(
            "run {} in {}ms",
            report.run_id,
            (report.completed_at - report.started_at).num_milliseconds()
        ))
    );
    println!();
}

/// Print the result of a sync run.
pub fn print_outcome(outcome: &SyncOutcome) {
    println!();
    let title = if outcome.dry_run {
        "Sync Plan (dry run)"
    } else {
        "Sync Result"
    };
    println!("{}", style::header(title));
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["File", "Strategy", "Action"]);
    for resolution in &outcome.resolutions {
        let action = match resolution.action {
            ResolutionAction::Stage(role) => format!("take {role}"),
            ResolutionAction::Manual => "manual merge".to_string(),
            ResolutionAction::Skip => "keep merged".to_string(),
        };
        table.add_row(vec![
            Cell::new(&resolution.path),
            Cell::new(resolution.strategy.to_string()),
            Cell::new(action),
        ]);
    }
    println!("{}", table);
    println!();

    if let Some(status) = outcome.merge_status {
        println!("  Merge      {}", status);
    }
    println!("  State      {}", outcome.final_state);
    println!();

    if outcome.needs_manual_resolution() {
        println!(
            "{}",
            style::warn(&format!(
                "{} file(s) need a manual merge:",
                outcome.manual_files.len()
            ))
        );
        for path in &outcome.manual_files {
            println!("    {}", path);
        }
    } else {
        println!("{}", style::success("All files resolved"));
    }
    println!();
}

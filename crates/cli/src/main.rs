//! forksync command-line tool.
//!
//! Analyses how far a fork has drifted from its boilerplate, predicts which
//! files will conflict on the next re-sync, and drives that re-sync.

mod report;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use forksync_core::analysis::{AnalysisReport, AnalysisRunner};
use forksync_core::config::{AppConfig, RepositoryDescriptor};
use forksync_core::git::GitCli;
use forksync_core::sync_engine::{ForkLockRegistry, SyncOptions, SyncOrchestrator};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// forksync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "forksync",
    version,
    about = "Compare a fork with its boilerplate and re-sync it"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./forksync.toml")]
    config: PathBuf,

    /// Log at the configured level instead of warnings only.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse every boilerplate file against the fork.
    Analyze {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Merge the boilerplate into the fork and apply resolutions.
    Sync {
        /// Plan resolutions without touching the working tree.
        #[arg(long)]
        dry_run: bool,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./forksync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise `warn`, or the configured level with `-v`.
fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if cli.verbose {
            AppConfig::load_from_file(&cli.config)
                .map(|c| c.log_level)
                .unwrap_or_else(|_| "info".to_string())
        } else {
            "warn".to_string()
        };
        EnvFilter::new(level)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output).map(|()| ExitCode::SUCCESS),
        Commands::Validate => cmd_validate(&cli.config).map(|()| ExitCode::SUCCESS),
        Commands::Analyze { json } => {
            let config = load_config(&cli.config)?;
            let cancel = cancel_on_ctrl_c();
            let report = analyze(&config, &cancel).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report::print_report(&report);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sync { dry_run, json } => {
            let config = load_config(&cli.config)?;
            let cancel = cancel_on_ctrl_c();
            cmd_sync(&config, dry_run, json, &cancel).await
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_validate(path).context("failed to load configuration file")
}

/// Cancel the run on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling");
            trigger.cancel();
        }
    });
    cancel
}

fn git_client(config: &AppConfig) -> GitCli {
    match (&config.sync.committer_name, &config.sync.committer_email) {
        (Some(name), Some(email)) => GitCli::new().with_identity(name, email),
        _ => GitCli::new(),
    }
}

async fn analyze(config: &AppConfig, cancel: &CancellationToken) -> Result<AnalysisReport> {
    let runner = AnalysisRunner::from_app_config(Arc::new(git_client(config)), config);
    runner
        .run(&config.boilerplate, &config.fork, cancel)
        .await
        .context("analysis failed")
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, AppConfig::default_toml()).context("failed to write config file")?;

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Point [boilerplate] and [fork] at your local checkouts");
    println!("  2. Validate with: forksync validate --config {}", output.display());
    println!("  3. Preview with:  forksync analyze --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Boilerplate   : {} ({})", describe(&config.boilerplate), config.boilerplate.branch());
    println!("  Fork          : {} ({})", describe(&config.fork), config.fork.branch());
    println!("  Concurrency   : {}", config.analysis.concurrency);
    match config.analysis.git_timeout() {
        Some(timeout) => println!("  Git timeout   : {}s", timeout.as_secs()),
        None => println!("  Git timeout   : none"),
    }
    println!("  Ignore rules  : {}", config.ignore.patterns.len());
    println!("  Sync remote   : {}", config.sync.remote_name);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn describe(repo: &RepositoryDescriptor) -> String {
    match repo {
        RepositoryDescriptor::Local { path, .. } => path.display().to_string(),
        RepositoryDescriptor::Remote { owner, repo, .. } => {
            format!("{owner}/{repo} (remote, not supported)")
        }
    }
}

async fn cmd_sync(
    config: &AppConfig,
    dry_run: bool,
    json: bool,
    cancel: &CancellationToken,
) -> Result<ExitCode> {
    let report = analyze(config, cancel).await?;
    if !report.failures.is_empty() {
        warn!(failed = report.failures.len(), "some files could not be analysed; they need manual resolution");
    }
    debug!(run_id = %report.run_id, "analysis done, starting sync");

    // The registry only spans this process; the lock file it places under
    // `.git/` keeps a second forksync process off the same fork.
    let orchestrator = SyncOrchestrator::from_app_config(
        Arc::new(git_client(config)),
        config,
        ForkLockRegistry::new(),
    );
    let outcome = orchestrator
        .run_report(&report, SyncOptions { dry_run }, cancel)
        .await
        .context("sync failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        report::print_outcome(&outcome);
    }

    if outcome.needs_manual_resolution() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

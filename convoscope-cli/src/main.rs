//! convoscope-sync - index AI coding assistant transcripts
//!
//! Resolves configuration, opens the index database, runs a full sync, and
//! optionally stays resident watching the configured directories for
//! changes.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/convoscope/index.db
//! - Logs: $XDG_STATE_HOME/convoscope/convoscope.log
//! - Config: $XDG_CONFIG_HOME/convoscope/config.toml

use anyhow::{Context, Result};
use clap::Parser;
use convoscope_core::registry::spec_for;
use convoscope_core::{ConfigFile, EngineConfig, Store, SyncEngine, SyncReport, Watcher};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "convoscope-sync")]
#[command(about = "Index AI coding assistant transcripts")]
#[command(version)]
struct Args {
    /// Verbose output (print every file failure)
    #[arg(short, long)]
    verbose: bool,

    /// Discover files but don't sync
    #[arg(long)]
    dry_run: bool,

    /// Stay resident after the initial sync and re-index on file changes
    #[arg(long)]
    watch: bool,

    /// Index database path (defaults to the XDG data dir)
    #[arg(long)]
    database: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let file = ConfigFile::load().context("failed to load configuration")?;
    let _log_guard =
        convoscope_core::logging::init(&file.logging).context("failed to initialize logging")?;

    let config = EngineConfig::resolve(&file);
    tracing::info!(machine = %config.machine, "convoscope-sync starting");

    let db_path = args.database.clone().unwrap_or_else(ConfigFile::database_path);
    println!("Database: {}", db_path.display());

    let store = Arc::new(Store::open(&db_path).context("failed to open index database")?);
    store.migrate().context("failed to run migrations")?;

    if args.dry_run {
        for (kind, dirs) in &config.dirs {
            for dir in dirs {
                if !dir.exists() {
                    continue;
                }
                match (spec_for(*kind).discover)(dir) {
                    Ok(files) => println!(
                        "  {}: {} file(s) at {}",
                        kind.display_name(),
                        files.len(),
                        dir.display()
                    ),
                    Err(e) => println!(
                        "  {}: discovery error at {}: {}",
                        kind.display_name(),
                        dir.display(),
                        e
                    ),
                }
            }
        }
        println!("\nDry run - no sync performed");
        return Ok(());
    }

    let engine = Arc::new(SyncEngine::new(config, store));

    // Ctrl-C cancels the run at the next file boundary and, in watch
    // mode, ends the watch loop.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            eprintln!("cancelling...");
            shutdown.store(true, Ordering::SeqCst);
            engine.cancel();
        })
        .context("failed to install signal handler")?;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message("syncing...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let report = engine.sync_all().context("sync failed")?;
    spinner.finish_and_clear();
    print_report(&report, args.verbose);

    if args.watch && !shutdown.load(Ordering::SeqCst) {
        let watcher = Watcher::spawn(engine.clone()).context("failed to start watcher")?;
        println!("\nWatching for changes (Ctrl+C to exit)...");
        while !shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
        watcher.stop();
    }

    engine.close();
    Ok(())
}

fn print_report(report: &SyncReport, verbose: bool) {
    println!("\nSync complete:");
    println!(
        "  {:<12} {:>10} {:>8} {:>8} {:>8}",
        "agent", "discovered", "synced", "skipped", "errors"
    );
    for (kind, stats) in &report.agents {
        if stats.discovered == 0 && stats.errored == 0 {
            continue;
        }
        println!(
            "  {:<12} {:>10} {:>8} {:>8} {:>8}",
            kind.as_str(),
            stats.discovered,
            stats.synced,
            stats.skipped,
            stats.errored
        );
    }
    println!(
        "  {:<12} {:>10} {:>8} {:>8} {:>8}",
        "total",
        report.total_discovered(),
        report.total_synced(),
        report.total_skipped(),
        report.total_errored()
    );

    if report.cancelled {
        println!("\nRun cancelled; completed files are listed above.");
    }

    if !report.errors.is_empty() {
        println!("\nErrors ({}):", report.errors.len());
        let shown = if verbose {
            report.errors.len()
        } else {
            report.errors.len().min(10)
        };
        for (path, err) in report.errors.iter().take(shown) {
            println!("  {}: {}", path.display(), err);
        }
        if shown < report.errors.len() {
            println!("  ... and {} more (use --verbose)", report.errors.len() - shown);
        }
    }

    tracing::info!(
        discovered = report.total_discovered(),
        synced = report.total_synced(),
        skipped = report.total_skipped(),
        errored = report.total_errored(),
        "sync complete"
    );
}

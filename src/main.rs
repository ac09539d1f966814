use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use housing_sync::config::AppConfig;
use housing_sync::scrapers::build_fetchers;
use housing_sync::store::{PropertyStore, RunLog, SyncRun};
use housing_sync::sync::{run_periodic, PeriodicSchedule, SyncOrchestrator};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "housing-sync")]
#[command(version)]
#[command(about = "Incremental property listing sync")]
#[command(
    long_about = "Scrapes property listings from a search and keeps a local JSON store \
up to date. Each run only fetches detail pages for new or changed listings and \
marks listings that disappeared as removed."
)]
struct Cli {
    /// Config file (default: ./housing-sync.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store directory (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one incremental sync
    Sync {
        /// Search results URL (first page)
        #[arg(long)]
        url: Option<String>,
        /// Maximum new or changed properties to fetch
        #[arg(long)]
        max_new: Option<usize>,
        /// Concurrent detail fetches
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Sync repeatedly on an interval until interrupted
    Periodic {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        max_new: Option<usize>,
        /// Hours between runs
        #[arg(long)]
        interval_hours: Option<u64>,
    },
    /// Show store size and the last run
    Status,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info,housing_sync=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Cancel `token` on Ctrl+C; a second Ctrl+C exits immediately.
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Shutdown requested, finishing current operations (Ctrl+C again to force quit)");
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Commands::Sync {
            url,
            max_new,
            concurrency,
        } => {
            if let Some(n) = concurrency {
                config.sync.concurrency = n.max(1);
            }
            let url = url.unwrap_or_else(|| config.listing_url.clone());
            let max_new = max_new.unwrap_or(config.sync.max_new_properties);

            info!("🏠 Housing Sync");
            let orchestrator = build_orchestrator(&config).await?;
            let cancel = CancellationToken::new();
            spawn_shutdown_listener(cancel.clone());

            let run = orchestrator.run_sync(&url, max_new, &cancel).await?;
            print_run(&run);
        }
        Commands::Periodic {
            url,
            max_new,
            interval_hours,
        } => {
            if let Some(hours) = interval_hours {
                config.sync.interval_hours = hours;
            }
            let url = url.unwrap_or_else(|| config.listing_url.clone());
            let max_new = max_new.unwrap_or(config.sync.max_new_properties);

            info!("🏠 Housing Sync - periodic every {} hours", config.sync.interval_hours);
            let orchestrator = build_orchestrator(&config).await?;
            let cancel = CancellationToken::new();
            spawn_shutdown_listener(cancel.clone());

            let schedule = PeriodicSchedule::every(config.sync.interval());
            let runs = run_periodic(&orchestrator, &url, max_new, &schedule, &cancel).await;
            info!("Periodic sync finished after {} runs", runs);
        }
        Commands::Status => show_status(&config).await?,
    }

    Ok(())
}

async fn build_orchestrator(config: &AppConfig) -> Result<SyncOrchestrator> {
    let store = PropertyStore::open(&config.data_dir)
        .await
        .with_context(|| format!("Store directory {} is not writable", config.data_dir.display()))?;
    let run_log = RunLog::new(store.run_log_path(), config.sync.run_log_capacity);
    let (listings, details) = build_fetchers(&config.transport)?;
    info!("Using source {}", listings.source_name());

    Ok(SyncOrchestrator::new(
        listings,
        details,
        store,
        run_log,
        config.sync.to_options(),
    ))
}

fn print_run(run: &SyncRun) {
    println!();
    println!("{}", if run.completed { "Sync completed" } else { "Sync aborted" });
    println!("  Timestamp:  {}", run.timestamp.to_rfc3339());
    println!("  Found:      {}", run.found_count);
    println!("  New:        {}", run.new_ids.len());
    println!("  Changed:    {}", run.changed_ids.len());
    println!("  Unchanged:  {}", run.unchanged_count);
    println!("  Removed:    {}", run.removed_ids.len());
    println!("  Failed:     {}", run.failed_ids.len());
    if !run.failed_ids.is_empty() {
        println!("    {}", run.failed_ids.join(", "));
    }
    if !run.skipped_ids.is_empty() {
        println!("  Deferred:   {}", run.skipped_ids.len());
    }
    println!("  Success:    {:.1}%", run.success_rate);
    if run.credits_used > 0 {
        println!("  Credits:    {}", run.credits_used);
    }
}

async fn show_status(config: &AppConfig) -> Result<()> {
    let store = PropertyStore::new(&config.data_dir);
    let summary = store.summary().await?;
    let run_log = RunLog::new(store.run_log_path(), config.sync.run_log_capacity);

    println!("{}", "=".repeat(50));
    println!("SYNC STATUS ({})", config.data_dir.display());
    println!("{}", "=".repeat(50));
    println!("Total properties: {}", summary.total);
    println!("  Active:  {}", summary.active);
    println!("  Removed: {}", summary.removed);

    match run_log.latest().await? {
        Some(run) => print_run(&run),
        None => println!("Last sync: Never"),
    }
    println!("{}", "=".repeat(50));

    Ok(())
}

//! Property-Harvest main entry point
//!
//! This is the command-line interface for the Property-Harvest listing scraper.
//! Logs go to stderr; stdout carries only the JSON response envelope.

use anyhow::Context;
use clap::Parser;
use property_harvest::config::{load_config_with_hash, Config};
use property_harvest::crawler::{plan_batches, resolve_range, Harvester};
use property_harvest::output::Envelope;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Property-Harvest: a bulk scraper for paginated property listings
///
/// Fetches listing pages in adaptive, concurrency-bounded batches, keeps a
/// raw copy of every page, and merges the extracted records into one JSON file.
#[derive(Parser, Debug)]
#[command(name = "property-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A bulk scraper for paginated property listings", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// First page of the range (default 1)
    #[arg(long, conflicts_with_all = ["page", "status", "combine"])]
    start: Option<u32>,

    /// Last page of the range (default: configured total pages)
    #[arg(long, conflicts_with_all = ["page", "status", "combine"])]
    end: Option<u32>,

    /// Fetch and extract a single page
    #[arg(long, value_name = "N", conflicts_with_all = ["status", "combine", "dry_run"])]
    page: Option<u32>,

    /// Report checkpoint coverage and exit
    #[arg(long, conflicts_with_all = ["combine", "dry_run"])]
    status: bool,

    /// Combine checkpointed pages into one artifact without fetching
    #[arg(long, conflicts_with_all = ["status", "dry_run"])]
    combine: bool,

    /// Validate config and show the batch plan without fetching
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// What a range scrape would do
#[derive(Debug, Serialize)]
struct DryRunReport {
    listing_url: String,
    start_page: u32,
    end_page: u32,
    batches: usize,
    batch_size: u32,
    initial_concurrency: usize,
    min_concurrency: usize,
    max_retries: u32,
    backoff_base_ms: u64,
    backoff_cap_ms: u64,
    checkpoint_dir: String,
    output_dir: String,
    config_hash: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            emit(&Envelope::<()>::failure("Failed to load configuration", &e))?;
            std::process::exit(1);
        }
    };

    // Handle different modes
    let success = if cli.dry_run {
        handle_dry_run(&config, &config_hash, cli.start, cli.end)?
    } else if cli.status {
        handle_status(config)?
    } else if cli.combine {
        handle_combine(config)?
    } else if let Some(page) = cli.page {
        handle_page(config, page).await?
    } else {
        handle_scrape(config, config_hash, cli.start, cli.end).await?
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("property_harvest=info,warn"),
            1 => EnvFilter::new("property_harvest=debug,info"),
            2 => EnvFilter::new("property_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Prints an envelope to stdout
fn emit<T: Serialize>(envelope: &Envelope<T>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(envelope).context("Failed to serialize response")?;
    println!("{}", json);
    Ok(())
}

/// Prints the outcome of an operation and reports whether it succeeded
fn respond<T: Serialize, E: std::fmt::Display>(
    result: Result<T, E>,
    ok_message: &str,
    err_message: &str,
) -> anyhow::Result<bool> {
    match result {
        Ok(data) => {
            emit(&Envelope::ok(ok_message, data))?;
            Ok(true)
        }
        Err(e) => {
            tracing::error!("{}: {}", err_message, e);
            emit(&Envelope::<T>::failure(err_message, e))?;
            Ok(false)
        }
    }
}

/// Handles the --dry-run mode: validates config and shows the batch plan
fn handle_dry_run(
    config: &Config,
    config_hash: &str,
    start: Option<u32>,
    end: Option<u32>,
) -> anyhow::Result<bool> {
    let (start, end) = match resolve_range(start, end, config.source.total_pages) {
        Ok(range) => range,
        Err(e) => return respond::<(), _>(Err(e), "", "Invalid page range"),
    };
    let batches = plan_batches(start, end, config.scraper.batch_size);

    let report = DryRunReport {
        listing_url: config.source.listing_url.clone(),
        start_page: start,
        end_page: end,
        batches: batches.len(),
        batch_size: config.scraper.batch_size,
        initial_concurrency: config.scraper.initial_concurrency(),
        min_concurrency: config.scraper.min_concurrency,
        max_retries: config.scraper.max_retries,
        backoff_base_ms: config.scraper.backoff_base_ms,
        backoff_cap_ms: config.scraper.backoff_cap_ms,
        checkpoint_dir: config.output.checkpoint_dir.clone(),
        output_dir: config.output.output_dir.clone(),
        config_hash: config_hash.to_string(),
    };

    emit(&Envelope::ok("Configuration is valid", report))?;
    Ok(true)
}

/// Handles the --status mode: reports checkpoint coverage
fn handle_status(config: Config) -> anyhow::Result<bool> {
    let result = Harvester::new(config).and_then(|harvester| harvester.status());
    respond(result, "Checkpoint status", "Failed to read checkpoint status")
}

/// Handles the --combine mode: merges checkpointed pages into one artifact
fn handle_combine(config: Config) -> anyhow::Result<bool> {
    let result = Harvester::new(config).and_then(|harvester| harvester.combine());
    respond(result, "Combined checkpointed pages", "Failed to combine checkpoints")
}

/// Handles the --page mode: single-page smoke test
async fn handle_page(config: Config, page: u32) -> anyhow::Result<bool> {
    let result = match Harvester::new(config) {
        Ok(harvester) => harvester.scrape_page(page).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(report) if !report.fetched => {
            let message = format!("Page {} could not be fetched", page);
            emit(&Envelope {
                success: false,
                message,
                error: report.error.clone(),
                data: Some(report),
            })?;
            Ok(false)
        }
        other => respond(other, "Page scraped", "Failed to scrape page"),
    }
}

/// Handles the main range scrape
async fn handle_scrape(
    config: Config,
    config_hash: String,
    start: Option<u32>,
    end: Option<u32>,
) -> anyhow::Result<bool> {
    let harvester = match Harvester::new(config) {
        Ok(harvester) => harvester.with_config_hash(config_hash),
        Err(e) => return respond::<(), _>(Err(e), "", "Failed to start scrape"),
    };

    let cancel = CancellationToken::new();
    let scheduler = harvester.scheduler().with_cancellation(cancel.clone());
    let progress = scheduler.progress();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(
                "Interrupt received at {}, stopping after the current batch",
                progress.snapshot()
            );
            cancel.cancel();
        }
    });

    let result = harvester.scrape_range_with(scheduler, start, end).await;
    let message = match &result {
        Ok(summary) if summary.cancelled => "Scrape cancelled; partial results written",
        _ => "Scrape completed",
    };
    respond(result, message, "Scrape failed")
}

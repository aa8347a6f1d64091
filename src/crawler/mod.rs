//! Crawler module for page fetching and processing
//!
//! This module contains the core scraping logic, including:
//! - HTTP fetching with retry, backoff and header rotation
//! - Record extraction from listing table rows
//! - Adaptive batch scheduling
//! - The collaborator-facing harvest operations

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;

pub use coordinator::{resolve_range, Harvester};
pub use fetcher::{build_http_client, FetchError, PageFetcher, RetryPolicy, TransientError};
pub use parser::{extract_records, PropertyRecord};
pub use scheduler::{plan_batches, BatchScheduler, ProgressHandle, RunOutcome, SchedulerSettings};

use crate::config::Config;
use crate::output::RangeSummary;
use crate::HarvestError;
use tokio_util::sync::CancellationToken;

/// Runs a complete range scrape over the whole configured dataset
///
/// This is the main entry point for a full harvest. It will:
/// 1. Open the checkpoint store
/// 2. Build the HTTP client
/// 3. Fetch every page in adaptive batches
/// 4. Extract and merge records
/// 5. Write the JSON artifact
pub async fn harvest(config: Config, cancel: CancellationToken) -> Result<RangeSummary, HarvestError> {
    Harvester::new(config)?.scrape_range(None, None, cancel).await
}

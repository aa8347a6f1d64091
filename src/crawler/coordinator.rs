//! Harvest coordinator - the collaborator-facing operations
//!
//! This module wires configuration, checkpoint storage, the fetcher and the
//! batch scheduler together and exposes:
//! - Range scrape (the full pipeline, ending in a JSON artifact)
//! - Single-page smoke test
//! - Checkpoint coverage status
//! - Combine checkpointed pages into an artifact without the network

use crate::config::Config;
use crate::crawler::fetcher::{FetchError, PageFetcher};
use crate::crawler::parser::extract_records;
use crate::crawler::scheduler::{BatchScheduler, SchedulerSettings};
use crate::output::{
    write_artifact, Aggregator, CombineSummary, PageReport, RangeSummary, StatusReport,
    COMBINED_ARTIFACT_PREFIX, RANGE_ARTIFACT_PREFIX,
};
use crate::state::PageTask;
use crate::storage::{open_storage, CheckpointStore};
use crate::HarvestError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main harvest coordinator structure
pub struct Harvester {
    config: Arc<Config>,
    config_hash: Option<String>,
    store: Arc<dyn CheckpointStore>,
    fetcher: Arc<PageFetcher>,
}

impl Harvester {
    /// Creates a new harvester with a filesystem checkpoint store
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Ready to run operations
    /// * `Err(HarvestError)` - The checkpoint directory could not be created or
    ///   the HTTP client could not be built
    pub fn new(config: Config) -> Result<Self, HarvestError> {
        let store = open_storage(&PathBuf::from(&config.output.checkpoint_dir))?;
        tracing::debug!("Checkpoint store at {}", store.dir().display());
        Self::with_store(config, Arc::new(store))
    }

    /// Creates a harvester over an existing checkpoint store
    pub fn with_store(config: Config, store: Arc<dyn CheckpointStore>) -> Result<Self, HarvestError> {
        let fetcher = PageFetcher::new(&config, Arc::clone(&store))?;

        Ok(Self {
            config: Arc::new(config),
            config_hash: None,
            store,
            fetcher: Arc::new(fetcher),
        })
    }

    /// Attaches the configuration hash echoed in range summaries
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn store(&self) -> &dyn CheckpointStore {
        self.store.as_ref()
    }

    /// Builds a scheduler for one range scrape
    pub fn scheduler(&self) -> BatchScheduler {
        BatchScheduler::new(
            Arc::clone(&self.fetcher),
            &self.config.source.site_origin,
            SchedulerSettings::from(&self.config.scraper),
        )
    }

    /// Resolves optional range bounds against the configured dataset size
    pub fn resolve_range(
        &self,
        start: Option<u32>,
        end: Option<u32>,
    ) -> Result<(u32, u32), HarvestError> {
        resolve_range(start, end, self.config.source.total_pages)
    }

    /// Scrapes a page range and writes the merged records to a JSON artifact
    ///
    /// Every page in the range is fetched, even if it is already checkpointed.
    /// A cancelled run still writes what it collected.
    pub async fn scrape_range(
        &self,
        start: Option<u32>,
        end: Option<u32>,
        cancel: CancellationToken,
    ) -> Result<RangeSummary, HarvestError> {
        let scheduler = self.scheduler().with_cancellation(cancel);
        self.scrape_range_with(scheduler, start, end).await
    }

    /// Scrapes a page range on a scheduler obtained from [`Harvester::scheduler`]
    ///
    /// Callers keep `scheduler.progress()` to watch the run while it is in flight.
    pub async fn scrape_range_with(
        &self,
        scheduler: BatchScheduler,
        start: Option<u32>,
        end: Option<u32>,
    ) -> Result<RangeSummary, HarvestError> {
        let (start, end) = self.resolve_range(start, end)?;

        let outcome = scheduler.run(start, end).await?;
        let aggregator = outcome.aggregator;

        let output_file = write_artifact(
            &PathBuf::from(&self.config.output.output_dir),
            RANGE_ARTIFACT_PREFIX,
            aggregator.records(),
        )?;

        let summary = RangeSummary {
            start_page: start,
            end_page: end,
            total_records: aggregator.record_count(),
            pages_processed: aggregator.pages_attempted(),
            pages_succeeded: aggregator.pages_succeeded(),
            pages_empty: aggregator.pages_empty(),
            pages_failed: aggregator.failed_pages().len() as u64,
            failed_pages: aggregator.failed_pages().to_vec(),
            average_records_per_page: aggregator.average_records_per_page(),
            output_file,
            elapsed_secs: outcome.progress.elapsed_secs,
            pages_per_second: outcome.progress.rate,
            final_concurrency: outcome.progress.concurrency,
            cancelled: outcome.cancelled,
            config_hash: self.config_hash.clone(),
        };

        tracing::info!(
            "Scraped {} records from {} pages ({} failed, {} empty) in {:.1}s",
            summary.total_records,
            summary.pages_processed,
            summary.pages_failed,
            summary.pages_empty,
            summary.elapsed_secs
        );

        Ok(summary)
    }

    /// Fetches and extracts a single page
    ///
    /// An exhausted page is reported with `fetched: false` rather than as an error.
    pub async fn scrape_page(&self, page: u32) -> Result<PageReport, HarvestError> {
        if page < 1 {
            return Err(HarvestError::InvalidRange {
                start: page,
                end: page,
            });
        }

        let mut task = PageTask::new(page);
        match self.fetcher.fetch_page(&mut task).await {
            Ok(body) => {
                let records = extract_records(&body, &self.config.source.site_origin);
                Ok(PageReport {
                    page,
                    fetched: true,
                    count: records.len(),
                    records,
                    error: None,
                })
            }
            Err(FetchError::Exhausted(exhausted)) => {
                tracing::warn!("{}", exhausted);
                Ok(PageReport {
                    page,
                    fetched: false,
                    count: 0,
                    records: Vec::new(),
                    error: Some(exhausted.to_string()),
                })
            }
            Err(FetchError::Checkpoint(error)) => Err(error.into()),
        }
    }

    /// Reports checkpoint coverage of the dataset
    ///
    /// Computed purely from the checkpoint store; independent of any run.
    pub fn status(&self) -> Result<StatusReport, HarvestError> {
        let stored = self.store.list_stored()?;
        let stored = u32::try_from(stored.len()).unwrap_or(u32::MAX);
        Ok(StatusReport::compute(self.config.source.total_pages, stored))
    }

    /// Re-extracts every checkpointed page and writes a combined artifact
    pub fn combine(&self) -> Result<CombineSummary, HarvestError> {
        let aggregator =
            Aggregator::from_checkpoints(self.store.as_ref(), &self.config.source.site_origin)?;

        let output_file = write_artifact(
            &PathBuf::from(&self.config.output.output_dir),
            COMBINED_ARTIFACT_PREFIX,
            aggregator.records(),
        )?;

        Ok(CombineSummary {
            total_records: aggregator.record_count(),
            files_processed: aggregator.pages_attempted(),
            pages_empty: aggregator.pages_empty(),
            output_file,
        })
    }
}

/// Resolves optional range bounds
///
/// Defaults are page 1 and `total_pages`. The range must satisfy
/// `1 <= start <= end`; `end` may exceed `total_pages`.
pub fn resolve_range(
    start: Option<u32>,
    end: Option<u32>,
    total_pages: u32,
) -> Result<(u32, u32), HarvestError> {
    let start = start.unwrap_or(1);
    let end = end.unwrap_or(total_pages);

    if start < 1 || start > end {
        return Err(HarvestError::InvalidRange { start, end });
    }
    Ok((start, end))
}

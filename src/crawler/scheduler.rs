//! Batch scheduler for range scrapes
//!
//! This module handles:
//! - Splitting a page range into contiguous, strictly sequential batches
//! - Running each batch through a semaphore-gated worker set
//! - Throttling every task with a fixed pre-fetch delay
//! - Reducing concurrency at batch boundaries when failures pile up
//! - Pausing between batches, longer after a bad batch
//! - Exposing progress while the run is in flight

use crate::config::ScraperConfig;
use crate::crawler::fetcher::{FetchError, PageFetcher};
use crate::crawler::parser::extract_records;
use crate::output::Aggregator;
use crate::state::{PageTask, ProgressSnapshot, SchedulerPhase, SchedulerState};
use crate::HarvestError;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Failure fraction above which the long inter-batch pause is used
const HIGH_FAILURE_FRACTION: f64 = 0.1;

/// Scheduler tuning, resolved from configuration
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub batch_size: u32,
    pub initial_concurrency: usize,
    pub min_concurrency: usize,
    pub failure_threshold: u32,
    pub request_delay: Duration,
    pub pause_low: Duration,
    pub pause_high: Duration,
}

impl From<&ScraperConfig> for SchedulerSettings {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            initial_concurrency: config.initial_concurrency(),
            min_concurrency: config.min_concurrency,
            failure_threshold: config.failure_threshold,
            request_delay: config.request_delay(),
            pause_low: Duration::from_millis(config.pause_low_ms),
            pause_high: Duration::from_millis(config.pause_high_ms),
        }
    }
}

/// Splits `[start, end]` into contiguous batches of at most `batch_size` pages
pub fn plan_batches(start: u32, end: u32, batch_size: u32) -> Vec<RangeInclusive<u32>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut batch_start = start;

    while batch_start <= end {
        let batch_end = batch_start.saturating_add(batch_size - 1).min(end);
        batches.push(batch_start..=batch_end);
        if batch_end == u32::MAX {
            break;
        }
        batch_start = batch_end + 1;
    }

    batches
}

/// Read-only view of a scheduler's progress, usable from another task
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    state: Arc<Mutex<SchedulerState>>,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> ProgressSnapshot {
        lock(&self.state).snapshot()
    }
}

/// Result of a finished (or cancelled) range scrape
#[derive(Debug)]
pub struct RunOutcome {
    /// Records and page tallies in completion order
    pub aggregator: Aggregator,

    /// Final counters
    pub progress: ProgressSnapshot,

    /// True if the run stopped early on cancellation
    pub cancelled: bool,
}

/// Tallies for one settled batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BatchReport {
    settled: u32,
    failed: u32,
}

impl BatchReport {
    fn is_high_failure(&self) -> bool {
        self.settled > 0 && f64::from(self.failed) / f64::from(self.settled) > HIGH_FAILURE_FRACTION
    }
}

/// Adaptive, concurrency-bounded batch scheduler
///
/// The scheduler coordinates:
/// - Sequential batches (batch N+1 never starts before batch N settles)
/// - A concurrency limit per batch, fixed for that batch's duration
/// - A single "task settled" update of the shared counters per page
/// - Multiplicative concurrency reduction, evaluated only between batches
pub struct BatchScheduler {
    fetcher: Arc<PageFetcher>,
    site_origin: Arc<str>,
    settings: SchedulerSettings,
    state: Arc<Mutex<SchedulerState>>,
    cancel: CancellationToken,
}

impl BatchScheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Fetches and checkpoints pages
    /// * `site_origin` - Origin for resolving detail-view links
    /// * `settings` - Batch size, concurrency and pacing
    pub fn new(fetcher: Arc<PageFetcher>, site_origin: &str, settings: SchedulerSettings) -> Self {
        let state = SchedulerState::new(0, settings.initial_concurrency);
        Self {
            fetcher,
            site_origin: Arc::from(site_origin),
            settings,
            state: Arc::new(Mutex::new(state)),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops the run at the next batch boundary once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn progress(&self) -> ProgressHandle {
        ProgressHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Scrapes `[start, end]` and returns every record in completion order
    ///
    /// # Returns
    ///
    /// * `Ok(RunOutcome)` - All batches settled, or the run was cancelled
    /// * `Err(HarvestError::InvalidRange)` - `start` is 0 or greater than `end`
    /// * `Err(HarvestError)` - A page could not be checkpointed; the batch it
    ///   belonged to was allowed to settle first
    pub async fn run(&self, start: u32, end: u32) -> Result<RunOutcome, HarvestError> {
        if start < 1 || start > end {
            lock(&self.state).transition(SchedulerPhase::Failed);
            return Err(HarvestError::InvalidRange { start, end });
        }

        let total = u64::from(end - start) + 1;
        *lock(&self.state) = SchedulerState::new(total, self.settings.initial_concurrency);
        lock(&self.state).transition(SchedulerPhase::Running);

        let batches = plan_batches(start, end, self.settings.batch_size);
        let batch_count = batches.len();
        let mut aggregator = Aggregator::new();
        let mut cancelled = false;

        tracing::info!(
            "Scraping pages {}..={} in {} batches of up to {} (concurrency {})",
            start,
            end,
            batch_count,
            self.settings.batch_size,
            self.settings.initial_concurrency
        );

        for (index, pages) in batches.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let report = self.run_batch(index, pages, &mut aggregator).await?;

            {
                let mut state = lock(&self.state);
                state.transition(SchedulerPhase::Adapting);
                let before = state.concurrency;
                if let Some(next) = state
                    .adapt(self.settings.failure_threshold, self.settings.min_concurrency)
                {
                    tracing::warn!(
                        "Too many failures, reducing concurrency {} -> {}",
                        before,
                        next
                    );
                }
                tracing::info!("Batch {}/{} done: {}", index + 1, batch_count, state.snapshot());
            }

            if index + 1 < batch_count {
                let pause = if report.is_high_failure() {
                    self.settings.pause_high
                } else {
                    self.settings.pause_low
                };
                tracing::debug!("Pausing {:?} before next batch", pause);

                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        if cancelled {
            tracing::warn!("Range scrape cancelled at a batch boundary");
        }

        let progress = {
            let mut state = lock(&self.state);
            state.transition(SchedulerPhase::Done);
            state.snapshot()
        };

        Ok(RunOutcome {
            aggregator,
            progress,
            cancelled,
        })
    }

    /// Runs one batch to completion and folds its tasks into `aggregator`
    async fn run_batch(
        &self,
        index: usize,
        pages: RangeInclusive<u32>,
        aggregator: &mut Aggregator,
    ) -> Result<BatchReport, HarvestError> {
        let concurrency = {
            let mut state = lock(&self.state);
            state.transition(SchedulerPhase::Dispatching);
            state.concurrency
        };

        tracing::debug!(
            "Batch {}: pages {}..={} at concurrency {}",
            index + 1,
            pages.start(),
            pages.end(),
            concurrency
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut workers = JoinSet::new();

        for page in pages {
            workers.spawn(process_page(
                page,
                Arc::clone(&self.fetcher),
                Arc::clone(&self.site_origin),
                Arc::clone(&semaphore),
                Arc::clone(&self.state),
                self.settings.request_delay,
            ));
        }

        lock(&self.state).transition(SchedulerPhase::Waiting);

        let mut report = BatchReport::default();
        let mut fatal = None;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(task)) => {
                    report.settled += 1;
                    if task.status.is_failed() {
                        report.failed += 1;
                    }
                    aggregator.push(task);
                }
                Ok(Err(error)) => {
                    tracing::error!("Page task failed fatally: {}", error);
                    fatal.get_or_insert(error);
                }
                Err(join_error) => {
                    tracing::error!("Page task aborted: {}", join_error);
                    fatal.get_or_insert(HarvestError::Join(join_error));
                }
            }
        }

        if let Some(error) = fatal {
            lock(&self.state).transition(SchedulerPhase::Failed);
            return Err(error);
        }

        Ok(report)
    }
}

/// One worker: throttle, fetch with retries, extract, settle
async fn process_page(
    page: u32,
    fetcher: Arc<PageFetcher>,
    site_origin: Arc<str>,
    semaphore: Arc<Semaphore>,
    state: Arc<Mutex<SchedulerState>>,
    request_delay: Duration,
) -> Result<PageTask, HarvestError> {
    // The semaphore is never closed, so acquisition only fails on shutdown
    let _permit = semaphore.acquire_owned().await.ok();

    tokio::time::sleep(request_delay).await;

    // Faults still settle the page as failed before stopping the run
    let mut task = PageTask::new(page);
    match fetcher.fetch_page(&mut task).await {
        Ok(body) => {
            let extracted =
                tokio::task::spawn_blocking(move || extract_records(&body, &site_origin)).await;
            let records = match extracted {
                Ok(records) => records,
                Err(join_error) => {
                    lock(&state).settle(true);
                    return Err(join_error.into());
                }
            };
            task.settle(Ok(records));
            tracing::trace!("Page {} {}: {} records", page, task.status, task.record_count());
        }
        Err(FetchError::Exhausted(exhausted)) => {
            tracing::warn!("{}", exhausted);
            task.settle(Err(exhausted));
        }
        Err(FetchError::Checkpoint(error)) => {
            lock(&state).settle(true);
            return Err(error.into());
        }
    }

    lock(&state).settle(task.status.is_failed());
    Ok(task)
}

/// Locks the shared state, recovering the data if a worker panicked mid-update
fn lock(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

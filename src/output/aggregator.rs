//! Record aggregation
//!
//! Merges per-page record sequences into one collection, either live from a
//! scheduler run (completion order) or by replaying the checkpoint store
//! (enumeration order).

use crate::crawler::{extract_records, PropertyRecord};
use crate::state::PageTask;
use crate::storage::CheckpointStore;
use crate::HarvestError;

/// Merged records plus per-page tallies
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    records: Vec<PropertyRecord>,
    pages_attempted: u64,
    pages_succeeded: u64,
    pages_empty: u64,
    failed_pages: Vec<u32>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a settled task into the aggregate, consuming it
    pub fn push(&mut self, task: PageTask) {
        self.pages_attempted += 1;
        if !task.status.is_terminal() {
            tracing::warn!("Unsettled task for page {} reached the aggregator", task.page);
        }
        match task.into_outcome() {
            Ok(records) => self.push_records(records),
            Err(exhausted) => self.failed_pages.push(exhausted.page),
        }
    }

    /// Appends one successfully fetched page's records
    fn push_records(&mut self, records: Vec<PropertyRecord>) {
        self.pages_succeeded += 1;
        if records.is_empty() {
            self.pages_empty += 1;
        }
        self.records.extend(records);
    }

    /// Rebuilds an aggregate from every checkpointed page, without the network
    ///
    /// Pages are replayed in the store's enumeration order.
    pub fn from_checkpoints(
        store: &dyn CheckpointStore,
        site_origin: &str,
    ) -> Result<Self, HarvestError> {
        let mut aggregator = Self::new();
        let pages = store.list_stored()?;

        tracing::info!("Combining {} checkpointed pages", pages.len());

        for page in pages {
            let content = store.read(page)?;
            let records = extract_records(&content, site_origin);
            tracing::trace!("Replayed page {}: {} records", page, records.len());
            aggregator.pages_attempted += 1;
            aggregator.push_records(records);
        }

        Ok(aggregator)
    }

    pub fn records(&self) -> &[PropertyRecord] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Pages folded in, whatever their outcome
    pub fn pages_attempted(&self) -> u64 {
        self.pages_attempted
    }

    pub fn pages_succeeded(&self) -> u64 {
        self.pages_succeeded
    }

    /// Fetched pages that had no qualifying rows
    pub fn pages_empty(&self) -> u64 {
        self.pages_empty
    }

    /// Exhausted page numbers, in completion order
    pub fn failed_pages(&self) -> &[u32] {
        &self.failed_pages
    }

    /// Records per attempted page
    pub fn average_records_per_page(&self) -> f64 {
        if self.pages_attempted == 0 {
            return 0.0;
        }
        self.records.len() as f64 / self.pages_attempted as f64
    }
}

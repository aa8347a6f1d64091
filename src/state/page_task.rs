//! Per-page task lifecycle
//!
//! A `PageTask` is created by the scheduler when a batch starts, carries the
//! retry counter while the fetcher works on it, and ends in exactly one
//! terminal status before being folded into the aggregate.

use crate::crawler::PropertyRecord;
use std::fmt;
use thiserror::Error;

/// A page whose fetch attempts were all used up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page {page} exhausted after {attempts} attempts: {last_error}")]
pub struct Exhausted {
    /// The page number
    pub page: u32,

    /// Total attempts made (first try plus retries)
    pub attempts: u32,

    /// Description of the last transient fault
    pub last_error: String,
}

/// Outcome of one page: its records, or the fact that it could not be fetched
///
/// `Ok(vec![])` means the page was fetched but had no qualifying rows; it is
/// never conflated with `Err(Exhausted)`.
pub type PageOutcome = Result<Vec<PropertyRecord>, Exhausted>;

/// Status of a page task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStatus {
    /// Not yet settled
    Pending,

    /// Fetched and extracted (possibly zero records)
    Success(Vec<PropertyRecord>),

    /// Retries exhausted; contributes no records
    Failed(Exhausted),
}

impl PageStatus {
    /// Returns true once the task has settled
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Success(_) => "success",
            Self::Failed(_) => "failed",
        };
        write!(f, "{}", label)
    }
}

/// One page number scheduled for fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTask {
    /// The page number (1-based)
    pub page: u32,

    /// Retries used so far (0 on the first attempt)
    pub retries: u32,

    /// Current status
    pub status: PageStatus,
}

impl PageTask {
    pub fn new(page: u32) -> Self {
        Self {
            page,
            retries: 0,
            status: PageStatus::Pending,
        }
    }

    /// Records that another retry is about to be made
    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    /// Settles the task from a page outcome
    pub fn settle(&mut self, outcome: PageOutcome) {
        self.status = match outcome {
            Ok(records) => PageStatus::Success(records),
            Err(exhausted) => PageStatus::Failed(exhausted),
        };
    }

    /// Number of records this task contributes
    pub fn record_count(&self) -> usize {
        match &self.status {
            PageStatus::Success(records) => records.len(),
            _ => 0,
        }
    }

    /// Consumes the task and returns its outcome
    ///
    /// A task that never settled is reported as exhausted with zero attempts.
    pub fn into_outcome(self) -> PageOutcome {
        match self.status {
            PageStatus::Success(records) => Ok(records),
            PageStatus::Failed(exhausted) => Err(exhausted),
            PageStatus::Pending => Err(Exhausted {
                page: self.page,
                attempts: 0,
                last_error: "task never settled".to_string(),
            }),
        }
    }
}

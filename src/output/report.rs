//! Report types returned by the collaborator-facing operations
//!
//! Every operation answers with an [`Envelope`]: a success flag, a message,
//! and either data or an error description.

use crate::crawler::PropertyRecord;
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;

/// Structured response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Display) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Summary of a range scrape
#[derive(Debug, Clone, Serialize)]
pub struct RangeSummary {
    pub start_page: u32,
    pub end_page: u32,
    pub total_records: usize,
    pub pages_processed: u64,
    pub pages_succeeded: u64,
    /// Fetched pages with no qualifying rows
    pub pages_empty: u64,
    /// Pages that exhausted their retries
    pub pages_failed: u64,
    pub failed_pages: Vec<u32>,
    pub average_records_per_page: f64,
    pub output_file: PathBuf,
    pub elapsed_secs: f64,
    pub pages_per_second: f64,
    pub final_concurrency: usize,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

/// Result of a single-page smoke test
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub page: u32,
    /// False when every attempt failed
    pub fetched: bool,
    pub count: usize,
    pub records: Vec<PropertyRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Checkpoint coverage of the dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub total_pages: u32,
    pub pages_stored: u32,
    pub progress_percent: u32,
    pub pages_remaining: u32,
}

impl StatusReport {
    /// Coverage after checkpointing `stored` distinct pages out of `total`
    pub fn compute(total_pages: u32, pages_stored: u32) -> Self {
        let progress_percent = if total_pages == 0 {
            0
        } else {
            (100.0 * f64::from(pages_stored) / f64::from(total_pages)).round() as u32
        };

        Self {
            total_pages,
            pages_stored,
            progress_percent,
            pages_remaining: total_pages.saturating_sub(pages_stored),
        }
    }
}

/// Result of combining checkpointed pages
#[derive(Debug, Clone, Serialize)]
pub struct CombineSummary {
    pub total_records: usize,
    pub files_processed: u64,
    pub pages_empty: u64,
    pub output_file: PathBuf,
}

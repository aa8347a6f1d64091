//! Output module for merging records and reporting results
//!
//! This module handles:
//! - Aggregating per-page records into one collection
//! - Writing timestamped JSON artifacts
//! - Structured summaries for each collaborator-facing operation

mod aggregator;
mod json;
mod report;

pub use aggregator::Aggregator;
pub use json::{
    artifact_file_name, write_artifact, COMBINED_ARTIFACT_PREFIX, RANGE_ARTIFACT_PREFIX,
};
pub use report::{CombineSummary, Envelope, PageReport, RangeSummary, StatusReport};

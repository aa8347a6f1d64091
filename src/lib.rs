//! Property-Harvest: a checkpointing bulk scraper for paginated property listings
//!
//! This crate fetches a fixed-size, page-numbered remote listing in adaptive,
//! concurrency-bounded batches, checkpoints every raw page to disk, extracts
//! property records from each page's table rows, and merges everything into
//! a single JSON artifact.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Property-Harvest operations
///
/// Only setup, configuration and storage faults surface through this type.
/// Per-page network faults are values (see [`state::PageOutcome`]).
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid page range: start {start}, end {end}")]
    InvalidRange { start: u32, end: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Property-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{extract_records, BatchScheduler, Harvester, PageFetcher, PropertyRecord};
pub use output::{Aggregator, Envelope};
pub use storage::{CheckpointStore, FsCheckpointStore};

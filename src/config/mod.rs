//! Configuration module for Property-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use property_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Batch size: {}", config.scraper.batch_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, OutputConfig, ScraperConfig, SourceConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

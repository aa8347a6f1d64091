//! Storage traits and error types
//!
//! This module defines the trait interface for page checkpoint backends and
//! associated error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cannot create checkpoint directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write page {page}: {source}")]
    Write { page: u32, source: std::io::Error },

    #[error("Failed to read page {page}: {source}")]
    Read { page: u32, source: std::io::Error },

    #[error("Page not checkpointed: {0}")]
    PageNotFound(u32),

    #[error("Failed to list checkpoint directory {path}: {source}")]
    List {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable raw-page storage keyed by page number
///
/// Implementations must tolerate concurrent `put` calls for distinct pages.
pub trait CheckpointStore: Send + Sync {
    /// Stores the raw content of a page; the last write wins
    fn put(&self, page: u32, content: &str) -> StorageResult<()>;

    /// Returns true if the page has been checkpointed
    fn exists(&self, page: u32) -> bool;

    /// Lists stored page numbers in the backend's enumeration order
    ///
    /// No numeric ordering is implied.
    fn list_stored(&self) -> StorageResult<Vec<u32>>;

    /// Reads the raw content of a stored page
    fn read(&self, page: u32) -> StorageResult<String>;
}

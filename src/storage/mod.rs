//! Storage module for persisting raw pages
//!
//! Every successfully fetched page is written through to a checkpoint store
//! under its page number. The store doubles as the only input of the
//! combine mode, which rebuilds a result set without touching the network.

mod fs;
mod traits;

pub use fs::{page_file_name, parse_page_file_name, FsCheckpointStore};
pub use traits::{CheckpointStore, StorageError, StorageResult};

use std::path::Path;

/// Opens the filesystem checkpoint store at `dir`
///
/// # Returns
///
/// * `Ok(FsCheckpointStore)` - The directory exists or was created
/// * `Err(StorageError)` - The directory could not be created
pub fn open_storage(dir: &Path) -> StorageResult<FsCheckpointStore> {
    FsCheckpointStore::new(dir)
}

//! Filesystem checkpoint storage
//!
//! One file per page, named `page_NNNNNN.html`, inside a dedicated directory.

use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "page_";
const FILE_EXTENSION: &str = "html";
const PAGE_WIDTH: usize = 6;

/// Checkpoint store backed by a directory of raw page files
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    dir: PathBuf,
}

impl FsCheckpointStore {
    /// Opens the store, creating the directory if needed
    ///
    /// # Returns
    ///
    /// * `Ok(FsCheckpointStore)` - The directory exists and is usable
    /// * `Err(StorageError::CreateDir)` - The directory could not be created
    pub fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `page`
    pub fn page_path(&self, page: u32) -> PathBuf {
        self.dir.join(page_file_name(page))
    }
}

/// File name for a page: fixed-width zero-padded number plus extension
pub fn page_file_name(page: u32) -> String {
    format!(
        "{}{:0width$}.{}",
        FILE_PREFIX,
        page,
        FILE_EXTENSION,
        width = PAGE_WIDTH
    )
}

/// Parses a page number back out of a checkpoint file name
///
/// Only the canonical name of a page is accepted, so every listed page can
/// be read back through [`page_file_name`].
pub fn parse_page_file_name(name: &str) -> Option<u32> {
    let digits = name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_EXTENSION)?
        .strip_suffix('.')?;

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let page: u32 = digits.parse().ok()?;
    (page_file_name(page) == name).then_some(page)
}

impl CheckpointStore for FsCheckpointStore {
    fn put(&self, page: u32, content: &str) -> StorageResult<()> {
        let path = self.page_path(page);
        let tmp = path.with_extension(format!("{}.tmp", FILE_EXTENSION));

        // Write-then-rename keeps a crash from leaving a truncated page file
        fs::write(&tmp, content).map_err(|source| StorageError::Write { page, source })?;
        fs::rename(&tmp, &path).map_err(|source| StorageError::Write { page, source })?;

        tracing::trace!("Checkpointed page {} to {}", page, path.display());
        Ok(())
    }

    fn exists(&self, page: u32) -> bool {
        self.page_path(page).is_file()
    }

    fn list_stored(&self) -> StorageResult<Vec<u32>> {
        let list_error = |source: std::io::Error| StorageError::List {
            path: self.dir.clone(),
            source,
        };
        let mut seen = HashSet::new();
        let mut pages = Vec::new();

        for entry in fs::read_dir(&self.dir).map_err(list_error)? {
            let entry = entry.map_err(list_error)?;
            if !entry.file_type().map_err(list_error)?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(page) = name.to_str().and_then(parse_page_file_name) {
                if seen.insert(page) {
                    pages.push(page);
                }
            }
        }

        Ok(pages)
    }

    fn read(&self, page: u32) -> StorageResult<String> {
        fs::read_to_string(self.page_path(page)).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                StorageError::PageNotFound(page)
            } else {
                StorageError::Read { page, source }
            }
        })
    }
}

//! JSON artifact writer
//!
//! Each artifact is a pretty-printed JSON array of property records, named
//! with the time it was written.

use crate::crawler::PropertyRecord;
use crate::HarvestError;
use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Prefix for artifacts produced by a range scrape
pub const RANGE_ARTIFACT_PREFIX: &str = "properties";

/// Prefix for artifacts produced by combining checkpoints
pub const COMBINED_ARTIFACT_PREFIX: &str = "properties_combined";

/// Artifact file name, e.g. `properties_20240105T093012345.json`
pub fn artifact_file_name(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}_{}.json", prefix, at.format("%Y%m%dT%H%M%S%3f"))
}

/// Writes `records` to a new timestamped artifact in `dir`
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path of the written artifact
/// * `Err(HarvestError)` - The directory or file could not be written
pub fn write_artifact(
    dir: &Path,
    prefix: &str,
    records: &[PropertyRecord],
) -> Result<PathBuf, HarvestError> {
    write_artifact_at(dir, prefix, Local::now(), records)
}

/// Writes an artifact stamped with `at`, never replacing an existing file
fn write_artifact_at(
    dir: &Path,
    prefix: &str,
    at: DateTime<Local>,
    records: &[PropertyRecord],
) -> Result<PathBuf, HarvestError> {
    fs::create_dir_all(dir)?;
    let (path, file) = create_unique(dir, &artifact_file_name(prefix, at))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;

    tracing::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(path)
}

/// Creates `name` in `dir`, falling back to `<stem>_<n>.json` while taken
fn create_unique(dir: &Path, name: &str) -> io::Result<(PathBuf, File)> {
    let stem = name.strip_suffix(".json").unwrap_or(name);
    let mut suffix = 0u32;

    loop {
        let path = if suffix == 0 {
            dir.join(name)
        } else {
            dir.join(format!("{}_{}.json", stem, suffix))
        };

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e),
        }
    }
}

//! Source side of the pipeline: discovering and reading NDJSON input files.
//!
//! Input files may be plain, gzip-compressed (`.gz`) or zstd-compressed
//! (`.zst`). Listing is delegated to the storage provider and filtered by
//! extension.

pub mod reader;

use tracing::debug;

use crate::error::StorageError;
use crate::storage::StorageProvider;

pub use reader::{Compression, NdjsonReader, ReadResult};

const RECORD_EXTENSIONS: [&str; 3] = [".ndjson", ".jsonl", ".json"];

/// Whether a path names a readable input file.
pub fn is_source_file(path: &str) -> bool {
    let stem = Compression::from_path(path).strip_suffix(path);
    RECORD_EXTENSIONS.iter().any(|ext| stem.ends_with(ext))
}

/// List input files below the storage location, sorted by path.
pub async fn list_source_files(storage: &StorageProvider) -> Result<Vec<String>, StorageError> {
    let all = storage.list_files().await?;
    let total = all.len();
    let files: Vec<String> = all.into_iter().filter(|p| is_source_file(p)).collect();

    if files.len() < total {
        debug!(
            "Ignoring {} non-input files under {}",
            total - files.len(),
            storage.canonical_url()
        );
    }
    Ok(files)
}

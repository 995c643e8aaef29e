//! Sinks persist normalized batches.
//!
//! A sink receives each committed [`AssembledBatch`] exactly once. File
//! sinks append one part file per table and batch under
//! `<table>/part-<batch>-<uuid>.<ext>`, writing only the dimension rows a
//! batch created plus its fact rows.

pub mod console;
pub mod memory;
pub mod ndjson;
pub mod parquet;
mod table;

use async_trait::async_trait;
use bytes::Bytes;
use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{SinkConfig, SinkFormat};
use crate::emit;
use crate::error::{SinkError, SinkStorageSnafu, StorageError};
use crate::metrics::events::BytesWritten;
use crate::pipeline::AssembledBatch;
use crate::storage::StorageProvider;

pub use console::ConsoleSink;
pub use memory::MemorySink;
pub use ndjson::NdjsonSink;
pub use parquet::ParquetSink;

/// Persistence collaborator for normalized batches.
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Persist one batch.
    async fn write(&self, batch: &AssembledBatch) -> Result<SinkReceipt, SinkError>;
}

/// Information about a written part file.
#[derive(Debug, Clone)]
pub struct FinishedFile {
    /// Path relative to the sink root.
    pub filename: String,
    /// Encoded size in bytes.
    pub size: usize,
    /// Number of rows in the file.
    pub record_count: usize,
}

/// What a sink wrote for one batch.
#[derive(Debug, Clone, Default)]
pub struct SinkReceipt {
    pub files: Vec<FinishedFile>,
}

impl SinkReceipt {
    pub fn bytes_written(&self) -> usize {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn rows_written(&self) -> usize {
        self.files.iter().map(|f| f.record_count).sum()
    }
}

/// Build the sink selected by `config`.
pub async fn from_config(config: &SinkConfig) -> Result<Arc<dyn TableSink>, StorageError> {
    let sink: Arc<dyn TableSink> = match config.format {
        SinkFormat::Parquet | SinkFormat::Ndjson => {
            let storage = Arc::new(
                StorageProvider::for_url_with_options(
                    &config.path,
                    config.storage_options.clone(),
                )
                .await?,
            );
            info!("Writing {} tables to {}", config.format, storage.canonical_url());
            if config.format == SinkFormat::Parquet {
                Arc::new(ParquetSink::new(storage, config.compression))
            } else {
                Arc::new(NdjsonSink::new(storage))
            }
        }
        SinkFormat::Console => Arc::new(ConsoleSink::new()),
        SinkFormat::Memory => Arc::new(MemorySink::new()),
    };
    Ok(sink)
}

/// One table of a batch, encoded and ready to upload.
pub(crate) struct EncodedPart {
    pub table: &'static str,
    pub bytes: Bytes,
    pub record_count: usize,
}

/// Upload the parts of one batch.
///
/// File sinks encode every table before calling this, so a batch that
/// cannot be encoded leaves nothing behind.
pub(crate) async fn upload_parts(
    storage: &StorageProvider,
    batch_id: u64,
    extension: &str,
    parts: Vec<EncodedPart>,
) -> Result<SinkReceipt, SinkError> {
    let mut receipt = SinkReceipt::default();
    for part in parts {
        let filename = part_filename(part.table, batch_id, extension);
        let size = part.bytes.len();
        storage
            .put(&filename, part.bytes)
            .await
            .context(SinkStorageSnafu { table: part.table })?;

        emit!(BytesWritten { bytes: size as u64 });
        debug!(
            "Wrote {} ({} rows, {} bytes)",
            filename, part.record_count, size
        );
        receipt.files.push(FinishedFile {
            filename,
            size,
            record_count: part.record_count,
        });
    }
    Ok(receipt)
}

/// Relative path of a new part file for `table`.
pub(crate) fn part_filename(table: &str, batch_id: u64, extension: &str) -> String {
    format!(
        "{table}/part-{batch_id:05}-{}.{extension}",
        Uuid::new_v4().simple()
    )
}

//! Dead Letter Queue implementation.

use bytes::Bytes;
use chrono::Utc;
use snafu::prelude::*;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::ErrorHandlingConfig;
use crate::error::{DlqError, DlqSerializeSnafu, DlqStorageSnafu, DlqWriteSnafu};
use crate::storage::{StorageProvider, StorageProviderRef};

use super::types::{FailedBatch, FailureStats};

const FLUSH_THRESHOLD: usize = 100;

#[derive(Default)]
struct QueueState {
    buffer: Vec<FailedBatch>,
    stats: FailureStats,
    parts_written: usize,
}

/// Records failures as NDJSON under the configured location.
///
/// Each run writes its own `failures-<timestamp>-<part>.ndjson` files; every
/// flush produces a new part so earlier records are never overwritten.
pub struct DeadLetterQueue {
    storage: StorageProviderRef,
    prefix: String,
    state: Mutex<QueueState>,
}

impl DeadLetterQueue {
    /// Create a DLQ from configuration, or `None` when no path is set.
    pub async fn from_config(config: &ErrorHandlingConfig) -> Result<Option<Self>, DlqError> {
        let Some(dlq_path) = &config.dlq_path else {
            return Ok(None);
        };

        let storage =
            StorageProvider::for_url_with_options(dlq_path, config.dlq_storage_options.clone())
                .await
                .context(DlqStorageSnafu)?;

        info!("DLQ enabled: {}", storage.canonical_url());
        Ok(Some(Self::new(storage.into())))
    }

    pub fn new(storage: StorageProviderRef) -> Self {
        Self {
            storage,
            prefix: format!("failures-{}", Utc::now().format("%Y%m%d-%H%M%S")),
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Buffer a failure, flushing once enough have accumulated.
    pub async fn record(&self, failed: FailedBatch) {
        debug!(
            "Recording DLQ failure: {} at stage {}",
            failed.source,
            failed.stage.as_str()
        );

        let should_flush = {
            let mut state = self.state.lock().await;
            state.stats.increment(failed.stage);
            state.buffer.push(failed);
            state.buffer.len() >= FLUSH_THRESHOLD
        };

        if should_flush && let Err(e) = self.flush().await {
            error!("Failed to flush DLQ: {}", e);
        }
    }

    /// Write buffered records as a new part file.
    pub async fn flush(&self) -> Result<(), DlqError> {
        let mut state = self.state.lock().await;
        if state.buffer.is_empty() {
            return Ok(());
        }

        let mut ndjson = String::new();
        for record in &state.buffer {
            ndjson.push_str(&serde_json::to_string(record).context(DlqSerializeSnafu)?);
            ndjson.push('\n');
        }

        let filename = format!("{}-{:04}.ndjson", self.prefix, state.parts_written);
        self.storage
            .put(&filename, Bytes::from(ndjson))
            .await
            .context(DlqWriteSnafu)?;

        info!("Flushed {} records to DLQ {}", state.buffer.len(), filename);
        state.buffer.clear();
        state.parts_written += 1;
        Ok(())
    }

    /// Flush remaining records and log a summary.
    pub async fn finalize(&self) -> Result<(), DlqError> {
        self.flush().await?;
        let stats = self.stats().await;
        info!(
            "DLQ finalized: {} total failures (read={}, validate={}, allocate={}, persist={})",
            stats.total(),
            stats.read,
            stats.validate,
            stats.allocate,
            stats.persist
        );
        Ok(())
    }

    pub async fn stats(&self) -> FailureStats {
        self.state.lock().await.stats
    }
}

//! Main processing pipeline.
//!
//! Lists the source files, reads them in batches, normalizes each batch into
//! the star schema and hands every committed batch to the sink exactly once.
//!
//! # Batch lifecycle
//!
//! Batches are processed strictly one after another. A batch either commits
//! (sink write, then checkpoint) or is rejected as a whole and recorded in
//! the dead letter queue. Shutdown requests are honoured between batches,
//! never in the middle of one.

mod normalizer;
mod signal;

pub use normalizer::{AssembledBatch, BatchNormalizer, BatchState};
pub use signal::shutdown_signal;

use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointState, CheckpointStore};
use crate::config::Config;
use crate::dimension::DimensionRegistry;
use crate::dlq::{DeadLetterQueue, FailedBatch, FailureTracker};
use crate::emit;
use crate::error::{
    CheckpointSnafu, ConfigSnafu, DlqSnafu, NormalizeError, PipelineError, PipelineStorageSnafu,
    TaskJoinSnafu,
};
use crate::metrics::events::{
    BatchProcessed, BatchStatus, FactRowsWritten, FailureStage, FileProcessed, FileStatus,
    RecordsProcessed, SinkWriteCompleted,
};
use crate::schema::RawRecord;
use crate::sink::{self, TableSink};
use crate::source::{NdjsonReader, ReadResult, list_source_files};
use crate::storage::{StorageProvider, StorageProviderRef};

/// Statistics about the pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub files_processed: usize,
    /// Files already finished by an earlier run, or that vanished before download.
    pub files_skipped: usize,
    pub files_failed: usize,
    pub batches_committed: usize,
    pub batches_failed: usize,
    pub records_processed: usize,
    pub fact_rows_written: usize,
    pub dimension_rows_created: usize,
    pub checkpoints_saved: usize,
}

/// How a file ended.
enum FileOutcome {
    Finished,
    Interrupted,
}

/// Main processing pipeline.
pub struct Pipeline {
    config: Config,
    source_storage: StorageProviderRef,
    sink: Arc<dyn TableSink>,
    checkpoint_store: Option<CheckpointStore>,
    checkpoint: CheckpointState,
    stats: PipelineStats,
    shutdown: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline writing to the sink described by the configuration.
    pub async fn new(config: Config, shutdown: CancellationToken) -> Result<Self, PipelineError> {
        let sink = sink::from_config(&config.sink)
            .await
            .context(PipelineStorageSnafu)?;
        Self::with_sink(config, sink, shutdown).await
    }

    /// Create a pipeline writing to an explicit sink.
    pub async fn with_sink(
        config: Config,
        sink: Arc<dyn TableSink>,
        shutdown: CancellationToken,
    ) -> Result<Self, PipelineError> {
        let source_storage = Arc::new(
            StorageProvider::for_url_with_options(
                &config.source.path,
                config.source.storage_options.clone(),
            )
            .await
            .context(PipelineStorageSnafu)?,
        );

        let checkpoint_store = match &config.checkpoint {
            Some(checkpoint) => Some(CheckpointStore::new(Arc::new(
                StorageProvider::for_url_with_options(
                    &checkpoint.path,
                    checkpoint.storage_options.clone(),
                )
                .await
                .context(PipelineStorageSnafu)?,
            ))),
            None => None,
        };

        Ok(Self {
            config,
            source_storage,
            sink,
            checkpoint_store,
            checkpoint: CheckpointState::default(),
            stats: PipelineStats::default(),
            shutdown,
        })
    }

    /// Process every pending source file once.
    pub async fn run(&mut self) -> Result<PipelineStats, PipelineError> {
        info!("Starting pipeline");

        let mut normalizer = self.restore().await?;

        let files = list_source_files(&self.source_storage)
            .await
            .context(PipelineStorageSnafu)?;
        info!("Found {} source files", files.len());

        let pending: Vec<String> = files
            .into_iter()
            .filter(|path| {
                let finished = self.checkpoint.is_finished(path);
                if finished {
                    self.stats.files_skipped += 1;
                }
                !finished
            })
            .collect();
        info!("{} files remaining to process", pending.len());

        let dlq = DeadLetterQueue::from_config(&self.config.error_handling)
            .await
            .context(DlqSnafu)?
            .map(Arc::new);
        let mut failures = FailureTracker::new(self.config.error_handling.max_failures, dlq);
        let reader = NdjsonReader::new(self.config.source.batch_size);

        let result = self
            .process_files(pending, &reader, &mut normalizer, &mut failures)
            .await;
        failures.finalize_dlq().await;
        result?;

        if failures.has_failures() {
            warn!(
                "Run completed with {} failures (recorded to DLQ if configured)",
                failures.count()
            );
        }
        info!("Pipeline completed: {:?}", self.stats);
        Ok(self.stats.clone())
    }

    async fn process_files(
        &mut self,
        pending: Vec<String>,
        reader: &NdjsonReader,
        normalizer: &mut BatchNormalizer,
        failures: &mut FailureTracker,
    ) -> Result<(), PipelineError> {
        let remaining = pending.len();
        for (idx, path) in pending.into_iter().enumerate() {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested, stopping before {}", path);
                break;
            }

            let Some(read) = self.read_file(&path, reader, failures).await? else {
                continue;
            };

            match self.process_file(&path, read, normalizer, failures).await? {
                FileOutcome::Finished => {
                    self.checkpoint.mark_finished(&path);
                    self.save_checkpoint().await?;
                    self.stats.files_processed += 1;
                    emit!(FileProcessed {
                        status: FileStatus::Success
                    });
                    debug!(
                        "[-] Finished file (remaining: {}): {}",
                        remaining - idx - 1,
                        path
                    );
                }
                FileOutcome::Interrupted => {
                    info!("Shutdown requested, stopping inside {}", path);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Download and parse a file. Unreadable files are recorded and skipped.
    async fn read_file(
        &mut self,
        path: &str,
        reader: &NdjsonReader,
        failures: &mut FailureTracker,
    ) -> Result<Option<ReadResult>, PipelineError> {
        let bytes = match self.source_storage.get(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                warn!("Skipping file that disappeared before download: {}", path);
                self.stats.files_skipped += 1;
                emit!(FileProcessed {
                    status: FileStatus::Skipped
                });
                return Ok(None);
            }
            Err(e) => {
                let error = describe(&e);
                warn!("Skipping failed file (download error): {}: {}", path, error);
                self.record_file_failure(path, error, failures).await?;
                return Ok(None);
            }
        };

        let parsed = tokio::task::spawn_blocking({
            let reader = reader.clone();
            let path = path.to_string();
            move || reader.read(bytes, &path)
        })
        .await
        .context(TaskJoinSnafu)?;

        match parsed {
            Ok(read) => Ok(Some(read)),
            Err(e) => {
                let error = describe(&e);
                warn!("Skipping failed file (read error): {}: {}", path, error);
                self.record_file_failure(path, error, failures).await?;
                Ok(None)
            }
        }
    }

    async fn record_file_failure(
        &mut self,
        path: &str,
        error: String,
        failures: &mut FailureTracker,
    ) -> Result<(), PipelineError> {
        self.stats.files_failed += 1;
        emit!(FileProcessed {
            status: FileStatus::Failed
        });
        failures
            .record_failure(FailedBatch::file(path, error, FailureStage::Read))
            .await
    }

    async fn process_file(
        &mut self,
        path: &str,
        read: ReadResult,
        normalizer: &mut BatchNormalizer,
        failures: &mut FailureTracker,
    ) -> Result<FileOutcome, PipelineError> {
        let skip = self.checkpoint.records_to_skip(path);
        if skip > 0 {
            info!("Resuming {} after {} committed records", path, skip);
        }

        let mut offset = 0;
        for (batch_idx, batch) in read.batches.iter().enumerate() {
            let batch_start = offset;
            offset += batch.len();
            if offset <= skip {
                continue;
            }
            if self.shutdown.is_cancelled() {
                return Ok(FileOutcome::Interrupted);
            }

            let start = skip.saturating_sub(batch_start);
            let records = &batch[start..];
            self.process_batch(path, batch_idx, batch_start + start, records, normalizer, failures)
                .await?;
            self.checkpoint.update_records(path, offset);
        }
        Ok(FileOutcome::Finished)
    }

    async fn process_batch(
        &mut self,
        path: &str,
        batch_idx: usize,
        record_offset: usize,
        records: &[RawRecord],
        normalizer: &mut BatchNormalizer,
        failures: &mut FailureTracker,
    ) -> Result<(), PipelineError> {
        self.stats.records_processed += records.len();
        emit!(RecordsProcessed {
            count: records.len() as u64
        });

        let result = normalizer.process_batch(records);
        normalizer.reset();

        let assembled = match result {
            Ok(assembled) => assembled,
            Err(e) => {
                let stage = match e {
                    NormalizeError::Validation { .. } => FailureStage::Validate,
                    NormalizeError::Allocation { .. } => FailureStage::Allocate,
                };
                let error = describe(&e);
                warn!(
                    "Rejected batch {} of {} (records {}..{}): {}",
                    batch_idx,
                    path,
                    record_offset,
                    record_offset + records.len(),
                    error
                );
                self.stats.batches_failed += 1;
                emit!(BatchProcessed {
                    status: BatchStatus::Failed
                });
                let position = e.validation().map(|v| v.position());
                return failures
                    .record_failure(FailedBatch::batch(
                        path,
                        batch_idx,
                        record_offset,
                        position,
                        error,
                        stage,
                    ))
                    .await;
            }
        };

        let start = Instant::now();
        let receipt = match self.sink.write(&assembled).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let error = PipelineError::Sink { source: e };
                // The run stops here; the tracker only gets the chance to
                // write the batch to the DLQ.
                if let Err(dlq_error) = failures
                    .record_failure(FailedBatch::batch(
                        path,
                        batch_idx,
                        record_offset,
                        None,
                        describe(&error),
                        FailureStage::Persist,
                    ))
                    .await
                {
                    warn!(
                        "Could not record persist failure for batch {} of {}: {}",
                        batch_idx,
                        path,
                        describe(&dlq_error)
                    );
                }
                return Err(error);
            }
        };
        emit!(SinkWriteCompleted {
            duration: start.elapsed()
        });

        self.stats.batches_committed += 1;
        self.stats.fact_rows_written += assembled.facts().len();
        self.stats.dimension_rows_created += assembled.new_row_count();
        emit!(BatchProcessed {
            status: BatchStatus::Committed
        });
        emit!(FactRowsWritten {
            count: assembled.facts().len() as u64
        });
        debug!(
            "[batch] {} #{}: {} facts, {} new dimension rows, {} files",
            path,
            assembled.batch_id(),
            assembled.facts().len(),
            assembled.new_row_count(),
            receipt.files.len()
        );

        self.checkpoint.record_batch(&assembled);
        self.checkpoint
            .update_records(path, record_offset + records.len());
        // Release the snapshot so the next batch resolves in place.
        drop(assembled);
        self.save_checkpoint().await
    }

    /// Load the checkpoint, if configured, and build the normalizer from it.
    async fn restore(&mut self) -> Result<BatchNormalizer, PipelineError> {
        let allocator = self.config.keys.allocator().context(ConfigSnafu)?;

        let Some(store) = &self.checkpoint_store else {
            return Ok(BatchNormalizer::new(DimensionRegistry::new(allocator)));
        };

        let loaded = store.load().await.context(CheckpointSnafu)?;
        match loaded {
            Some(state) => {
                let registry = state.to_registry(allocator).context(CheckpointSnafu)?;
                info!(
                    "Restored {} dimension rows from checkpoint",
                    registry.total_rows()
                );
                let normalizer =
                    BatchNormalizer::new(registry).resume_after(state.batches_committed);
                self.checkpoint = state;
                Ok(normalizer)
            }
            None => Ok(BatchNormalizer::new(DimensionRegistry::new(allocator))),
        }
    }

    async fn save_checkpoint(&mut self) -> Result<(), PipelineError> {
        let Some(store) = &self.checkpoint_store else {
            return Ok(());
        };
        store
            .save(&self.checkpoint)
            .await
            .context(CheckpointSnafu)?;
        self.stats.checkpoints_saved += 1;
        Ok(())
    }
}

/// An error and all of its sources on one line.
fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Run the pipeline with the given configuration, stopping on SIGINT/SIGTERM.
pub async fn run_pipeline(config: Config) -> Result<PipelineStats, PipelineError> {
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let mut pipeline = Pipeline::new(config, shutdown).await?;
    pipeline.run().await
}

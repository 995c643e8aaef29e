//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! metric through the `metrics` facade.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

use crate::schema::Dimension;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when input records have been normalized.
pub struct RecordsProcessed {
    pub count: u64,
}

impl InternalEvent for RecordsProcessed {
    fn emit(self) {
        trace!(count = self.count, "Records processed");
        counter!("flurry_records_processed_total").increment(self.count);
    }
}

/// Event emitted when fact rows have been handed to the sink.
pub struct FactRowsWritten {
    pub count: u64,
}

impl InternalEvent for FactRowsWritten {
    fn emit(self) {
        trace!(count = self.count, "Fact rows written");
        counter!("flurry_fact_rows_written_total").increment(self.count);
    }
}

/// Event emitted when raw bytes are read from the source.
pub struct BytesRead {
    pub bytes: u64,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes read");
        counter!("flurry_bytes_read_total").increment(self.bytes);
    }
}

/// Event emitted when a sink writes encoded bytes.
pub struct BytesWritten {
    pub bytes: u64,
}

impl InternalEvent for BytesWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes written");
        counter!("flurry_bytes_written_total").increment(self.bytes);
    }
}

/// Outcome of a dimension lookup.
#[derive(Debug, Clone, Copy)]
pub enum LookupOutcome {
    /// The attribute tuple was already known.
    Hit,
    /// A new row was created.
    Miss,
}

impl LookupOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Hit => "hit",
            LookupOutcome::Miss => "miss",
        }
    }
}

/// Event emitted on every get-or-insert resolution.
pub struct DimensionLookup {
    pub dimension: Dimension,
    pub outcome: LookupOutcome,
}

impl InternalEvent for DimensionLookup {
    fn emit(self) {
        counter!(
            "flurry_dimension_lookups_total",
            "dimension" => self.dimension.as_str(),
            "outcome" => self.outcome.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a dimension row is created.
pub struct DimensionRowCreated {
    pub dimension: Dimension,
}

impl InternalEvent for DimensionRowCreated {
    fn emit(self) {
        trace!(dimension = self.dimension.as_str(), "Dimension row created");
        counter!(
            "flurry_dimension_rows_created_total",
            "dimension" => self.dimension.as_str()
        )
        .increment(1);
    }
}

/// Status of a processed batch.
#[derive(Debug, Clone, Copy)]
pub enum BatchStatus {
    Committed,
    Failed,
}

impl BatchStatus {
    fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Committed => "committed",
            BatchStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a batch reaches a terminal state.
pub struct BatchProcessed {
    pub status: BatchStatus,
}

impl InternalEvent for BatchProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Batch processed");
        counter!("flurry_batches_processed_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Stage at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Read,
    Validate,
    Allocate,
    Persist,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Read => "read",
            FailureStage::Validate => "validate",
            FailureStage::Allocate => "allocate",
            FailureStage::Persist => "persist",
        }
    }
}

/// Event emitted when a file or batch fails.
pub struct FailureRecorded {
    pub stage: FailureStage,
}

impl InternalEvent for FailureRecorded {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), "Failure recorded");
        counter!("flurry_failures_total", "stage" => self.stage.as_str()).increment(1);
    }
}

/// Status of a source file.
#[derive(Debug, Clone, Copy)]
pub enum FileStatus {
    Success,
    Skipped,
    Failed,
}

impl FileStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Skipped => "skipped",
            FileStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a source file is finished.
pub struct FileProcessed {
    pub status: FileStatus,
}

impl InternalEvent for FileProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "File processed");
        counter!("flurry_files_processed_total", "status" => self.status.as_str()).increment(1);
    }
}

// ============================================================================
// Histogram events for timing
// ============================================================================

/// Event emitted when a batch has been normalized.
pub struct BatchNormalized {
    pub duration: Duration,
}

impl InternalEvent for BatchNormalized {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "Batch normalized");
        histogram!("flurry_batch_normalize_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a sink finished writing a batch.
pub struct SinkWriteCompleted {
    pub duration: Duration,
}

impl InternalEvent for SinkWriteCompleted {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "Sink write completed");
        histogram!("flurry_sink_write_duration_seconds").record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
}

impl StorageOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted for each storage request.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        counter!(
            "flurry_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the latency of a storage request.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        histogram!(
            "flurry_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

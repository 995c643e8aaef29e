//! Error types for flurry using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

use crate::schema::Dimension;

// ============ Validation Errors ============

/// A raw record that cannot be turned into a transaction.
///
/// Every variant carries the record's position in its batch and the name of
/// the offending field.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum ValidationError {
    /// Required field is absent or null.
    #[snafu(display("Record {position}: missing required field {field}"))]
    MissingField { position: usize, field: &'static str },

    /// Field holds a JSON type that cannot carry the attribute.
    #[snafu(display("Record {position}: field {field} must be a {expected}"))]
    WrongType {
        position: usize,
        field: &'static str,
        expected: &'static str,
    },

    /// Measure is not an integer.
    #[snafu(display("Record {position}: field {field} is not an integer: {value}"))]
    InvalidMeasure {
        position: usize,
        field: &'static str,
        value: String,
    },

    /// Price is not a decimal number.
    #[snafu(display("Record {position}: field {field} is not a decimal: {value}"))]
    InvalidPrice {
        position: usize,
        field: &'static str,
        value: String,
    },

    /// Date is not a YYYY-MM-DD calendar date.
    #[snafu(display("Record {position}: field {field} is not a YYYY-MM-DD date: {value}"))]
    InvalidDate {
        position: usize,
        field: &'static str,
        value: String,
    },
}

impl ValidationError {
    /// Position of the offending record within its batch.
    pub fn position(&self) -> usize {
        match self {
            ValidationError::MissingField { position, .. }
            | ValidationError::WrongType { position, .. }
            | ValidationError::InvalidMeasure { position, .. }
            | ValidationError::InvalidPrice { position, .. }
            | ValidationError::InvalidDate { position, .. } => *position,
        }
    }

    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField { field, .. }
            | ValidationError::WrongType { field, .. }
            | ValidationError::InvalidMeasure { field, .. }
            | ValidationError::InvalidPrice { field, .. }
            | ValidationError::InvalidDate { field, .. } => field,
        }
    }
}

// ============ Allocator Errors ============

/// Errors raised by surrogate key allocation.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum AllocatorError {
    /// The key space of the allocator is used up.
    #[snafu(display("Surrogate key space exhausted for {dimension}"))]
    Exhausted { dimension: Dimension },

    /// Partition id does not fit the partitioned key layout.
    #[snafu(display("Partition id {partition} exceeds the 31-bit partition space"))]
    PartitionOutOfRange { partition: u32 },
}

// ============ Normalize Errors ============

/// Errors that abort a single batch.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NormalizeError {
    /// A record failed validation.
    #[snafu(display("Batch validation failed"))]
    Validation { source: ValidationError },

    /// A surrogate key could not be allocated.
    #[snafu(display("Key allocation failed"))]
    Allocation { source: AllocatorError },
}

impl NormalizeError {
    /// The validation error behind this failure, if any.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            NormalizeError::Validation { source } => Some(source),
            NormalizeError::Allocation { .. } => None,
        }
    }
}

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source path is empty.
    #[snafu(display("Source path cannot be empty"))]
    EmptySourcePath,

    /// Sink path is empty for a sink that writes to storage.
    #[snafu(display("Sink path cannot be empty for the {format} sink"))]
    EmptySinkPath { format: String },

    /// Batch size is zero.
    #[snafu(display("Batch size must be greater than zero"))]
    ZeroBatchSize,

    /// An output location lies inside the source location or contains it.
    #[snafu(display("The {role} location {path} overlaps the source location {source_path}"))]
    OverlappingPaths {
        role: &'static str,
        path: String,
        source_path: String,
    },

    /// Key strategy settings are invalid.
    #[snafu(display("Invalid key configuration"))]
    InvalidKeys { source: AllocatorError },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Reader Errors ============

/// Errors that can occur during NDJSON file reading.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// Gzip decompression failed.
    #[snafu(display("Gzip decompression failed for {path}"))]
    GzipDecompression {
        source: std::io::Error,
        path: String,
    },

    /// Zstd decompression failed.
    #[snafu(display("Zstd decompression failed for {path}"))]
    ZstdDecompression {
        source: std::io::Error,
        path: String,
    },

    /// A line is not valid JSON.
    #[snafu(display("Failed to decode JSON for {path} at line {line}"))]
    JsonDecode {
        source: serde_json::Error,
        path: String,
        line: usize,
    },

    /// A line is valid JSON but not an object.
    #[snafu(display("Line {line} of {path} is not a JSON object"))]
    NotAnObject { path: String, line: usize },
}

// ============ Sink Errors ============

/// Errors that can occur while persisting tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Building an Arrow record batch failed.
    #[snafu(display("Failed to build record batch for {table}"))]
    RecordBatch {
        source: arrow::error::ArrowError,
        table: String,
    },

    /// Parquet encoding failed.
    #[snafu(display("Parquet write error for {table}"))]
    ParquetWrite {
        source: parquet::errors::ParquetError,
        table: String,
    },

    /// Row serialization failed.
    #[snafu(display("Failed to serialize rows for {table}"))]
    RowSerialize {
        source: serde_json::Error,
        table: String,
    },

    /// Writing a part file to storage failed.
    #[snafu(display("Failed to store part file for {table}"))]
    SinkStorage { source: StorageError, table: String },

    /// Decimal scale does not fit Arrow's Decimal128.
    #[snafu(display("Decimal with scale {scale} cannot be written to {table}"))]
    DecimalOverflow { scale: u32, table: String },

    /// Formatting tables for display failed.
    #[snafu(display("Failed to render {table}"))]
    Render {
        source: arrow::error::ArrowError,
        table: String,
    },

    /// In-memory sink lock was poisoned.
    #[snafu(display("Memory sink lock poisoned"))]
    MemoryLock,
}

// ============ Checkpoint Errors ============

/// Errors that can occur while loading or saving checkpoints.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckpointError {
    /// Checkpoint storage failed.
    #[snafu(display("Checkpoint storage failed"))]
    CheckpointStorage { source: StorageError },

    /// Checkpoint document is not valid JSON.
    #[snafu(display("Checkpoint JSON error"))]
    CheckpointJson { source: serde_json::Error },

    /// Checkpoint was written by an incompatible version.
    #[snafu(display("Unsupported checkpoint version {version}"))]
    UnsupportedVersion { version: u32 },

    /// Checkpoint contents violate table invariants.
    #[snafu(display("Checkpoint corrupted: {message}"))]
    Corrupt { message: String },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Failed to bind the metrics listener.
    #[snafu(display("Failed to bind metrics server to {addr}"))]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    /// Failed to read the bound metrics address.
    #[snafu(display("Failed to read metrics server address"))]
    LocalAddr { source: std::io::Error },
}

// ============ DLQ Errors ============

/// Errors that can occur during Dead Letter Queue operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
// Prefix is intentional to avoid snafu selector conflicts (e.g., WriteSnafu)
#[allow(clippy::enum_variant_names)]
pub enum DlqError {
    /// Failed to write to DLQ.
    #[snafu(display("Failed to write to DLQ"))]
    DlqWrite { source: StorageError },

    /// Failed to serialize failed batch record.
    #[snafu(display("Failed to serialize DLQ record"))]
    DlqSerialize { source: serde_json::Error },

    /// Failed to create DLQ storage provider.
    #[snafu(display("Failed to create DLQ storage"))]
    DlqStorage { source: StorageError },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Storage error.
    #[snafu(display("Storage error"))]
    PipelineStorage { source: StorageError },

    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Sink error.
    #[snafu(display("Sink error"))]
    Sink { source: SinkError },

    /// Checkpoint error.
    #[snafu(display("Checkpoint error"))]
    Checkpoint { source: CheckpointError },

    /// Task join error.
    #[snafu(display("Task join error"))]
    TaskJoin { source: tokio::task::JoinError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// DLQ error.
    #[snafu(display("DLQ error"))]
    Dlq { source: DlqError },

    /// Max failures exceeded.
    #[snafu(display("Max failures exceeded: {count} failures"))]
    MaxFailuresExceeded { count: usize },
}

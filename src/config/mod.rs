//! Configuration loading.
//!
//! Reads a YAML file (with environment variable interpolation) describing
//! where transactions come from, where the star schema goes, and how
//! surrogate keys are allocated.

mod vars;

pub use vars::{interpolate, interpolate_with};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::dimension::Allocator;
use crate::error::{
    ConfigError, EmptySinkPathSnafu, EmptySourcePathSnafu, EnvInterpolationSnafu,
    InvalidKeysSnafu, OverlappingPathsSnafu, ReadFileSnafu, YamlParseSnafu, ZeroBatchSizeSnafu,
};

/// Main configuration structure for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    /// Surrogate key allocation (optional, sequential from 0 by default).
    #[serde(default)]
    pub keys: KeyConfig,
    /// Cross-run dimension persistence (optional).
    #[serde(default)]
    pub checkpoint: Option<CheckpointConfig>,
    /// Metrics configuration (optional, disabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Error handling configuration (optional).
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
}

/// Source configuration for reading transaction NDJSON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory or prefix holding input files.
    /// Examples: "s3://bucket/sales/", "/data/sales"
    pub path: String,

    /// Number of records normalized and committed together (default: 8192).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

fn default_batch_size() -> usize {
    8192
}

/// Output format of the sink.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    #[default]
    Parquet,
    Ndjson,
    /// Print tables to stdout.
    Console,
    /// Keep tables in memory (dry runs, tests).
    Memory,
}

impl SinkFormat {
    /// Whether this format writes to storage and therefore needs a path.
    pub fn needs_path(&self) -> bool {
        matches!(self, SinkFormat::Parquet | SinkFormat::Ndjson)
    }
}

impl fmt::Display for SinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkFormat::Parquet => "parquet",
            SinkFormat::Ndjson => "ndjson",
            SinkFormat::Console => "console",
            SinkFormat::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// Sink configuration for persisting the star schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub format: SinkFormat,

    /// Root under which one directory per table is written.
    /// Examples: "s3://bucket/warehouse/sales", "/local/warehouse"
    #[serde(default)]
    pub path: String,

    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

/// Surrogate key strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum KeyConfig {
    /// Consecutive integers from `start`.
    Sequential {
        #[serde(default)]
        start: i64,
    },
    /// Spark-compatible partition-prefixed keys.
    Partitioned {
        #[serde(default)]
        partition: u32,
    },
}

impl Default for KeyConfig {
    fn default() -> Self {
        KeyConfig::Sequential { start: 0 }
    }
}

impl KeyConfig {
    /// Build the allocator template used by every dimension table.
    pub fn allocator(&self) -> Result<Allocator, ConfigError> {
        match *self {
            KeyConfig::Sequential { start } => Ok(Allocator::sequential(start)),
            KeyConfig::Partitioned { partition } => {
                Allocator::partitioned(partition).context(InvalidKeysSnafu)
            }
        }
    }
}

/// Checkpoint configuration for incremental runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory holding the checkpoint document.
    pub path: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Metrics configuration for Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Error handling configuration for resilient pipeline execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    /// Maximum failures before stopping pipeline (0 = unlimited, default: 0).
    #[serde(default)]
    pub max_failures: usize,
    /// Path to write failed batch records (required for DLQ).
    #[serde(default)]
    pub dlq_path: Option<String>,
    /// Storage options for DLQ (credentials, region, etc.)
    #[serde(default)]
    pub dlq_storage_options: HashMap<String, String>,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            interpolate(&content).map_err(|errors| {
                EnvInterpolationSnafu {
                    message: errors.join("\n"),
                }
                .build()
            })?
        } else {
            content
        };

        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.path.is_empty(), EmptySourcePathSnafu);
        ensure!(self.source.batch_size > 0, ZeroBatchSizeSnafu);
        ensure!(
            !self.sink.format.needs_path() || !self.sink.path.is_empty(),
            EmptySinkPathSnafu {
                format: self.sink.format.to_string(),
            }
        );
        self.keys.allocator()?;

        // Sink parts, checkpoints and DLQ files all look like source files.
        for (role, path) in self.output_locations() {
            ensure!(
                !locations_overlap(&self.source.path, path),
                OverlappingPathsSnafu {
                    role,
                    path,
                    source_path: &self.source.path,
                }
            );
        }
        Ok(())
    }

    fn output_locations(&self) -> Vec<(&'static str, &str)> {
        let mut locations = Vec::with_capacity(3);
        if self.sink.format.needs_path() {
            locations.push(("sink", self.sink.path.as_str()));
        }
        if let Some(checkpoint) = &self.checkpoint {
            locations.push(("checkpoint", checkpoint.path.as_str()));
        }
        if let Some(dlq_path) = &self.error_handling.dlq_path {
            locations.push(("DLQ", dlq_path.as_str()));
        }
        locations
    }
}

/// Whether one location equals the other or lies beneath it.
fn locations_overlap(a: &str, b: &str) -> bool {
    fn normalize(path: &str) -> &str {
        path.strip_prefix("file://")
            .unwrap_or(path)
            .trim_end_matches('/')
    }
    fn within(inner: &str, outer: &str) -> bool {
        inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    let (a, b) = (normalize(a), normalize(b));
    a == b || within(a, b) || within(b, a)
}

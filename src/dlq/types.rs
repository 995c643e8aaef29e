//! DLQ record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::events::FailureStage;

/// A batch, or a whole file, that could not be committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedBatch {
    /// Source file the records came from.
    pub source: String,
    /// Batch index within the file; absent when the file itself failed.
    pub batch: Option<usize>,
    /// Offset of the batch's first record within the file.
    pub record_offset: Option<usize>,
    /// Position within the batch of the record that caused the failure.
    pub record: Option<usize>,
    /// Error message.
    pub error: String,
    pub stage: FailureStage,
    pub timestamp: DateTime<Utc>,
}

impl FailedBatch {
    /// A file that could not be downloaded or parsed.
    pub fn file(source: &str, error: impl ToString, stage: FailureStage) -> Self {
        Self {
            source: source.to_string(),
            batch: None,
            record_offset: None,
            record: None,
            error: error.to_string(),
            stage,
            timestamp: Utc::now(),
        }
    }

    /// A batch that was rejected during normalization or persistence.
    pub fn batch(
        source: &str,
        batch: usize,
        record_offset: usize,
        record: Option<usize>,
        error: impl ToString,
        stage: FailureStage,
    ) -> Self {
        Self {
            source: source.to_string(),
            batch: Some(batch),
            record_offset: Some(record_offset),
            record,
            error: error.to_string(),
            stage,
            timestamp: Utc::now(),
        }
    }
}

/// Failure counts by stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureStats {
    pub read: usize,
    pub validate: usize,
    pub allocate: usize,
    pub persist: usize,
}

impl FailureStats {
    pub fn increment(&mut self, stage: FailureStage) {
        match stage {
            FailureStage::Read => self.read += 1,
            FailureStage::Validate => self.validate += 1,
            FailureStage::Allocate => self.allocate += 1,
            FailureStage::Persist => self.persist += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.read + self.validate + self.allocate + self.persist
    }
}

//! Checkpoint document.
//!
//! Captures everything needed to continue a previous run: the rows of every
//! dimension table and how far each source file has been read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dimension::{Allocator, DimensionRegistry, DimensionRow};
use crate::error::CheckpointError;
use crate::pipeline::AssembledBatch;
use crate::schema::Dimension;

/// Current checkpoint document version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Progress through a single source file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileReadState {
    /// Every batch of the file has been committed.
    Finished,
    /// The first `n` records have been committed.
    RecordsRead(usize),
}

/// Persisted rows of one dimension table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DimensionState {
    pub dimension: Dimension,
    pub rows: Vec<DimensionRow>,
}

/// The checkpoint document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointState {
    pub version: u32,
    pub dimensions: Vec<DimensionState>,
    #[serde(default)]
    pub files: BTreeMap<String, FileReadState>,
    #[serde(default)]
    pub batches_committed: u64,
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            dimensions: Vec::new(),
            files: BTreeMap::new(),
            batches_committed: 0,
        }
    }
}

impl CheckpointState {
    /// Append the dimension rows created by a committed batch.
    pub fn record_batch(&mut self, batch: &AssembledBatch) {
        for dimension in Dimension::ALL {
            let rows = batch.new_rows(dimension);
            if rows.is_empty() {
                continue;
            }
            match self
                .dimensions
                .iter_mut()
                .find(|state| state.dimension == dimension)
            {
                Some(state) => state.rows.extend_from_slice(rows),
                None => self.dimensions.push(DimensionState {
                    dimension,
                    rows: rows.to_vec(),
                }),
            }
        }
        self.batches_committed = batch.batch_id();
    }

    /// Rebuild the registry, drawing new keys from `allocator`.
    pub fn to_registry(&self, allocator: Allocator) -> Result<DimensionRegistry, CheckpointError> {
        DimensionRegistry::restore(
            allocator,
            self.dimensions
                .iter()
                .map(|state| (state.dimension, state.rows.clone()))
                .collect(),
        )
    }

    /// Record that the first `records` records of `path` are committed.
    pub fn update_records(&mut self, path: &str, records: usize) {
        self.files
            .insert(path.to_string(), FileReadState::RecordsRead(records));
    }

    /// Mark a file as fully processed.
    pub fn mark_finished(&mut self, path: &str) {
        self.files.insert(path.to_string(), FileReadState::Finished);
    }

    pub fn is_finished(&self, path: &str) -> bool {
        matches!(self.files.get(path), Some(FileReadState::Finished))
    }

    /// Records of `path` already committed by an earlier run.
    pub fn records_to_skip(&self, path: &str) -> usize {
        match self.files.get(path) {
            Some(FileReadState::RecordsRead(n)) => *n,
            _ => 0,
        }
    }
}

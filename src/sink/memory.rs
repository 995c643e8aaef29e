//! In-memory sink for tests and dry runs.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{SinkReceipt, TableSink};
use crate::dimension::DimensionRow;
use crate::error::{MemoryLockSnafu, SinkError};
use crate::fact::FactRow;
use crate::pipeline::AssembledBatch;
use crate::schema::Dimension;

#[derive(Debug, Default)]
struct MemoryState {
    latest: Option<AssembledBatch>,
    facts: Vec<FactRow>,
    batches: Vec<u64>,
}

/// Keeps every fact row and the latest dimension snapshot.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All fact rows received so far, in arrival order.
    pub fn facts(&self) -> Vec<FactRow> {
        self.state
            .lock()
            .map(|state| state.facts.clone())
            .unwrap_or_default()
    }

    /// Rows of `dimension` as of the latest batch.
    pub fn dimension_rows(&self, dimension: Dimension) -> Vec<DimensionRow> {
        self.state
            .lock()
            .ok()
            .and_then(|state| {
                state
                    .latest
                    .as_ref()
                    .map(|batch| batch.dimension(dimension).rows().to_vec())
            })
            .unwrap_or_default()
    }

    /// Ids of the batches written, in order.
    pub fn batch_ids(&self) -> Vec<u64> {
        self.state
            .lock()
            .map(|state| state.batches.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TableSink for MemorySink {
    async fn write(&self, batch: &AssembledBatch) -> Result<SinkReceipt, SinkError> {
        let mut state = self.state.lock().map_err(|_| MemoryLockSnafu.build())?;
        state.facts.extend_from_slice(batch.facts());
        state.batches.push(batch.batch_id());
        state.latest = Some(batch.clone());
        Ok(SinkReceipt::default())
    }
}

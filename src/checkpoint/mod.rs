//! Checkpointing between batches and across runs.
//!
//! The checkpoint is a single JSON document stored next to the configured
//! checkpoint location. It is rewritten after every committed batch, so a
//! restarted run resumes after the last batch the sink accepted and keeps
//! issuing keys consistent with the rows it already persisted.

pub mod state;

pub use state::{CHECKPOINT_VERSION, CheckpointState, DimensionState, FileReadState};

use bytes::Bytes;
use snafu::prelude::*;
use tracing::{debug, info};

use crate::error::{
    CheckpointError, CheckpointJsonSnafu, CheckpointStorageSnafu, UnsupportedVersionSnafu,
};
use crate::storage::StorageProviderRef;

/// Name of the checkpoint document under the checkpoint location.
pub const CHECKPOINT_FILE: &str = "flurry-checkpoint.json";

/// Loads and saves the checkpoint document.
pub struct CheckpointStore {
    storage: StorageProviderRef,
}

impl CheckpointStore {
    pub fn new(storage: StorageProviderRef) -> Self {
        Self { storage }
    }

    /// Load the last saved checkpoint. A missing document means a fresh start.
    pub async fn load(&self) -> Result<Option<CheckpointState>, CheckpointError> {
        let bytes = match self.storage.get(CHECKPOINT_FILE).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                info!(
                    "No checkpoint found at {}, starting fresh",
                    self.storage.canonical_url()
                );
                return Ok(None);
            }
            Err(e) => return Err(e).context(CheckpointStorageSnafu),
        };

        let state: CheckpointState = serde_json::from_slice(&bytes).context(CheckpointJsonSnafu)?;
        ensure!(
            state.version == CHECKPOINT_VERSION,
            UnsupportedVersionSnafu {
                version: state.version
            }
        );

        info!(
            "Restored checkpoint: {} batches committed, {} files tracked",
            state.batches_committed,
            state.files.len()
        );
        Ok(Some(state))
    }

    /// Replace the stored checkpoint.
    pub async fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec(state).context(CheckpointJsonSnafu)?;
        let size = json.len();
        self.storage
            .put(CHECKPOINT_FILE, Bytes::from(json))
            .await
            .context(CheckpointStorageSnafu)?;
        debug!(
            "Saved checkpoint after batch {} ({} bytes)",
            state.batches_committed, size
        );
        Ok(())
    }
}

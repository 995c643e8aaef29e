//! Failure tracking with DLQ integration and `max_failures` enforcement.

use std::sync::Arc;
use tracing::error;

use crate::emit;
use crate::error::{MaxFailuresExceededSnafu, PipelineError};
use crate::metrics::events::FailureRecorded;

use super::{DeadLetterQueue, FailedBatch};

/// Counts failures, forwards them to the DLQ, and stops the run at the limit.
pub struct FailureTracker {
    count: usize,
    max_failures: usize,
    dlq: Option<Arc<DeadLetterQueue>>,
}

impl FailureTracker {
    /// `max_failures` of 0 means unlimited.
    pub fn new(max_failures: usize, dlq: Option<Arc<DeadLetterQueue>>) -> Self {
        Self {
            count: 0,
            max_failures,
            dlq,
        }
    }

    /// Record a failure. Returns `Err` once `max_failures` is reached.
    pub async fn record_failure(&mut self, failed: FailedBatch) -> Result<(), PipelineError> {
        self.count += 1;
        emit!(FailureRecorded {
            stage: failed.stage
        });

        if let Some(dlq) = &self.dlq {
            dlq.record(failed).await;
        }

        if self.max_failures > 0 && self.count >= self.max_failures {
            error!("Max failures ({}) reached, stopping pipeline", self.count);
            self.finalize_dlq().await;
            return MaxFailuresExceededSnafu { count: self.count }.fail();
        }

        Ok(())
    }

    /// Flush the DLQ, logging any error.
    pub async fn finalize_dlq(&self) {
        if let Some(dlq) = &self.dlq
            && let Err(e) = dlq.finalize().await
        {
            error!("Failed to finalize DLQ: {}", e);
        }
    }

    pub fn has_failures(&self) -> bool {
        self.count > 0
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::events::FailureStage;
    use crate::storage::StorageProvider;

    fn failure() -> FailedBatch {
        FailedBatch::file("x.ndjson", "boom", FailureStage::Read)
    }

    #[tokio::test]
    async fn test_unlimited_failures() {
        let mut tracker = FailureTracker::new(0, None);
        for _ in 0..10 {
            tracker.record_failure(failure()).await.unwrap();
        }
        assert_eq!(tracker.count(), 10);
        assert!(tracker.has_failures());
    }

    #[tokio::test]
    async fn test_max_failures_stops_at_limit() {
        let mut tracker = FailureTracker::new(2, None);
        tracker.record_failure(failure()).await.unwrap();
        let err = tracker.record_failure(failure()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MaxFailuresExceeded { count: 2 }
        ));
    }

    #[tokio::test]
    async fn test_limit_flushes_dlq() {
        let storage = Arc::new(StorageProvider::in_memory());
        let dlq = Arc::new(DeadLetterQueue::new(storage.clone()));
        let mut tracker = FailureTracker::new(1, Some(dlq));

        assert!(tracker.record_failure(failure()).await.is_err());
        assert_eq!(storage.list_files().await.unwrap().len(), 1);
    }
}

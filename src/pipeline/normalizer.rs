//! Per-batch normalization with all-or-nothing semantics.
//!
//! A batch moves through `Init -> Populating -> Assembled` or
//! `Init -> Populating -> Failed`. Resolution runs against the live registry
//! after marking every table; a failed batch is rolled back to the mark and
//! leaves no trace.
//!
//! An [`AssembledBatch`] shares the registry with the normalizer. Holding one
//! while the next batch runs makes that batch copy the registry first.

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::dimension::{DimensionRegistry, DimensionRow, DimensionTable};
use crate::emit;
use crate::error::NormalizeError;
use crate::fact::{FactAssembler, FactRow};
use crate::metrics::events::BatchNormalized;
use crate::schema::{Dimension, RawRecord};

/// Lifecycle of the batch currently held by a [`BatchNormalizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Ready to accept a batch.
    Init,
    /// Dimensions are being resolved.
    Populating,
    /// The last batch produced a fact table.
    Assembled,
    /// The last batch was rejected; the registry is unchanged.
    Failed,
}

/// Output of a successfully normalized batch.
///
/// Holds a read-only snapshot of the dimension tables as of the end of the
/// batch, the rows each dimension gained in this batch, and the batch's
/// fact rows.
#[derive(Debug, Clone)]
pub struct AssembledBatch {
    batch_id: u64,
    registry: Arc<DimensionRegistry>,
    new_rows_from: [usize; 4],
    facts: Vec<FactRow>,
}

impl AssembledBatch {
    /// Sequence number of the batch within this normalizer, starting at 1.
    pub fn batch_id(&self) -> u64 {
        self.batch_id
    }

    /// The fact rows of this batch, one per input record, in input order.
    pub fn facts(&self) -> &[FactRow] {
        &self.facts
    }

    /// The full table for `dimension` after this batch.
    pub fn dimension(&self, dimension: Dimension) -> &DimensionTable {
        self.registry.table(dimension)
    }

    /// Rows `dimension` gained in this batch.
    pub fn new_rows(&self, dimension: Dimension) -> &[DimensionRow] {
        let rows = self.registry.table(dimension).rows();
        &rows[self.new_rows_from[dimension_index(dimension)].min(rows.len())..]
    }

    /// Number of dimension rows created by this batch across all tables.
    pub fn new_row_count(&self) -> usize {
        Dimension::ALL
            .iter()
            .map(|dimension| self.new_rows(*dimension).len())
            .sum()
    }

    /// Snapshot of all dimension tables after this batch.
    pub fn registry(&self) -> &DimensionRegistry {
        &self.registry
    }
}

/// Position of `dimension` in [`Dimension::ALL`].
fn dimension_index(dimension: Dimension) -> usize {
    match dimension {
        Dimension::Customer => 0,
        Dimension::Product => 1,
        Dimension::SalesPerson => 2,
        Dimension::TransactionDate => 3,
    }
}

/// Owns the dimension registry and normalizes batches one at a time.
#[derive(Debug)]
pub struct BatchNormalizer {
    registry: Arc<DimensionRegistry>,
    state: BatchState,
    batches_assembled: u64,
}

impl BatchNormalizer {
    /// Normalizer starting from `registry`, empty or restored.
    pub fn new(registry: DimensionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            state: BatchState::Init,
            batches_assembled: 0,
        }
    }

    /// Continue batch numbering after `batches` already committed batches.
    pub fn resume_after(mut self, batches: u64) -> Self {
        self.batches_assembled = batches;
        self
    }

    /// Current batch state.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// The live registry; only reflects committed batches.
    pub fn registry(&self) -> &DimensionRegistry {
        &self.registry
    }

    /// Return to `Init` after a batch has been handed off or rejected.
    pub fn reset(&mut self) {
        self.state = BatchState::Init;
    }

    /// Normalize one batch.
    ///
    /// Starting from any state other than `Populating`, the normalizer is
    /// implicitly reset first. On error the registry is exactly as it was
    /// before the call.
    pub fn process_batch(
        &mut self,
        records: &[RawRecord],
    ) -> Result<AssembledBatch, NormalizeError> {
        let start = Instant::now();
        self.state = BatchState::Populating;

        let new_rows_from = self.registry.row_counts();
        let registry = Arc::make_mut(&mut self.registry);
        let mark = registry.mark();

        let result = FactAssembler::new(registry).assemble(records);
        let facts = match result {
            Ok(facts) => facts,
            Err(e) => {
                registry.rollback(mark);
                self.state = BatchState::Failed;
                debug!("Batch of {} records rejected: {}", records.len(), e);
                return Err(e);
            }
        };

        self.batches_assembled += 1;
        self.state = BatchState::Assembled;

        emit!(BatchNormalized {
            duration: start.elapsed(),
        });

        let batch = AssembledBatch {
            batch_id: self.batches_assembled,
            registry: Arc::clone(&self.registry),
            new_rows_from,
            facts,
        };
        debug!(
            "Batch {} assembled: {} facts, {} new dimension rows",
            batch.batch_id,
            batch.facts.len(),
            batch.new_row_count()
        );
        Ok(batch)
    }
}

impl Default for BatchNormalizer {
    fn default() -> Self {
        Self::new(DimensionRegistry::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{Allocator, SurrogateKey};
    use serde_json::json;

    fn record(customer: &str, quantity: serde_json::Value) -> RawRecord {
        let value = json!({
            "CustomerName": customer,
            "CustomerEmail": format!("{}@example.com", customer.to_lowercase()),
            "CustomerAddress": "1 Main Street",
            "ProductName": "Laptop",
            "ProductCategory": "Electronics",
            "ProductPrice": 999.99,
            "QuantitySold": quantity,
            "TransactionDate": "2024-02-07",
            "SalesPerson": "Alice Johnson",
        });
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_successful_batch_transitions_to_assembled() {
        let mut normalizer = BatchNormalizer::default();
        assert_eq!(normalizer.state(), BatchState::Init);

        let batch = normalizer
            .process_batch(&[record("John", json!(2)), record("Emily", json!(1))])
            .unwrap();

        assert_eq!(normalizer.state(), BatchState::Assembled);
        assert_eq!(batch.batch_id(), 1);
        assert_eq!(batch.facts().len(), 2);
        assert_eq!(batch.new_rows(Dimension::Customer).len(), 2);
        assert_eq!(batch.new_rows(Dimension::Product).len(), 1);
        assert_eq!(batch.new_row_count(), 5);
    }

    #[test]
    fn test_failed_batch_leaves_registry_untouched() {
        let mut normalizer = BatchNormalizer::default();
        normalizer
            .process_batch(&[record("John", json!(2))])
            .unwrap();
        normalizer.reset();
        let before = normalizer.registry().row_counts();

        let err = normalizer
            .process_batch(&[record("Emily", json!(1)), record("David", json!("abc"))])
            .unwrap_err();

        assert_eq!(err.validation().map(|v| v.position()), Some(1));
        assert_eq!(normalizer.state(), BatchState::Failed);
        assert_eq!(normalizer.registry().row_counts(), before);
        assert!(
            normalizer
                .registry()
                .table(Dimension::Customer)
                .rows()
                .iter()
                .all(|row| row.attributes.values()[0].to_string() == "John")
        );
    }

    #[test]
    fn test_allocation_failure_rolls_back_earlier_records() {
        let registry = DimensionRegistry::new(Allocator::sequential(i64::MAX - 2));
        let mut normalizer = BatchNormalizer::new(registry);

        // Each record needs a fresh customer; the third cannot get a key.
        let result = normalizer.process_batch(&[
            record("A", json!(1)),
            record("B", json!(1)),
            record("C", json!(1)),
        ]);

        assert!(matches!(result, Err(NormalizeError::Allocation { .. })));
        assert_eq!(normalizer.registry().total_rows(), 0);
        assert_eq!(normalizer.state(), BatchState::Failed);
    }

    #[test]
    fn test_dimensions_accumulate_across_batches() {
        let mut normalizer = BatchNormalizer::default();
        let first = normalizer
            .process_batch(&[record("John", json!(2))])
            .unwrap();
        normalizer.reset();
        let second = normalizer
            .process_batch(&[record("John", json!(5)), record("Emily", json!(1))])
            .unwrap();

        assert_eq!(second.batch_id(), 2);
        assert_eq!(first.facts()[0].customer_id, second.facts()[0].customer_id);
        assert_eq!(second.new_rows(Dimension::Customer).len(), 1);
        assert_eq!(second.new_rows(Dimension::Product).len(), 0);
        assert_eq!(second.dimension(Dimension::Customer).len(), 2);
        // The first snapshot is unaffected by later batches.
        assert_eq!(first.dimension(Dimension::Customer).len(), 1);
        assert_eq!(
            second.new_rows(Dimension::Customer)[0].key,
            SurrogateKey::new(1)
        );
    }

    #[test]
    fn test_allocation_failure_keeps_earlier_batches() {
        let registry = DimensionRegistry::new(Allocator::sequential(i64::MAX - 2));
        let mut normalizer = BatchNormalizer::new(registry);
        let committed = normalizer
            .process_batch(&[record("A", json!(1))])
            .unwrap();
        drop(committed);
        normalizer.reset();

        let result = normalizer.process_batch(&[record("B", json!(1)), record("C", json!(1))]);
        assert!(matches!(result, Err(NormalizeError::Allocation { .. })));
        assert_eq!(normalizer.registry().row_counts(), [1, 1, 1, 1]);

        // The rewound allocator still has room for one more customer.
        normalizer.reset();
        let batch = normalizer
            .process_batch(&[record("B", json!(1))])
            .unwrap();
        assert_eq!(batch.new_rows(Dimension::Customer).len(), 1);
        assert_eq!(batch.batch_id(), 2);
    }

    #[test]
    fn test_resume_after_continues_numbering() {
        let mut normalizer = BatchNormalizer::default().resume_after(41);
        let batch = normalizer
            .process_batch(&[record("John", json!(1))])
            .unwrap();
        assert_eq!(batch.batch_id(), 42);
    }

    #[test]
    fn test_empty_batch() {
        let mut normalizer = BatchNormalizer::default();
        let batch = normalizer.process_batch(&[]).unwrap();
        assert!(batch.facts().is_empty());
        assert_eq!(batch.new_row_count(), 0);
        assert_eq!(normalizer.state(), BatchState::Assembled);
    }
}

//! Fact table assembly.
//!
//! Turns a batch of raw records into fact rows that reference dimension rows
//! by surrogate key. One fact row per input record, measures copied as-is.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::dimension::{DimensionKeys, DimensionRegistry, SurrogateKey};
use crate::error::{AllocationSnafu, NormalizeError, ValidationSnafu};
use crate::schema::{Dimension, RawRecord, TransactionRecord};

/// A row of the sales fact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FactRow {
    #[serde(rename = "CustomerID")]
    pub customer_id: SurrogateKey,
    #[serde(rename = "ProductID")]
    pub product_id: SurrogateKey,
    #[serde(rename = "SalesPersonID")]
    pub sales_person_id: SurrogateKey,
    #[serde(rename = "TransactionDateID")]
    pub transaction_date_id: SurrogateKey,
    pub quantity_sold: i64,
}

impl FactRow {
    fn new(keys: DimensionKeys, quantity_sold: i64) -> Self {
        Self {
            customer_id: keys.customer,
            product_id: keys.product,
            sales_person_id: keys.sales_person,
            transaction_date_id: keys.transaction_date,
            quantity_sold,
        }
    }

    /// Foreign key for one dimension.
    pub fn key(&self, dimension: Dimension) -> SurrogateKey {
        match dimension {
            Dimension::Customer => self.customer_id,
            Dimension::Product => self.product_id,
            Dimension::SalesPerson => self.sales_person_id,
            Dimension::TransactionDate => self.transaction_date_id,
        }
    }
}

/// Resolves records against a registry and emits fact rows.
pub struct FactAssembler<'a> {
    registry: &'a mut DimensionRegistry,
}

impl<'a> FactAssembler<'a> {
    pub fn new(registry: &'a mut DimensionRegistry) -> Self {
        Self { registry }
    }

    /// Assemble fact rows for `records`, in input order.
    ///
    /// Every record is validated before the first key is allocated, so a
    /// validation failure leaves the registry untouched. Allocation failures
    /// can occur after some rows were created; see
    /// [`BatchNormalizer`](crate::pipeline::BatchNormalizer) for the
    /// all-or-nothing variant.
    pub fn assemble(&mut self, records: &[RawRecord]) -> Result<Vec<FactRow>, NormalizeError> {
        let validated = records
            .iter()
            .enumerate()
            .map(|(position, raw)| TransactionRecord::from_raw(position, raw))
            .collect::<Result<Vec<_>, _>>()
            .context(ValidationSnafu)?;

        validated
            .iter()
            .map(|record| -> Result<FactRow, NormalizeError> {
                let keys = self.registry.resolve_all(record).context(AllocationSnafu)?;
                Ok(FactRow::new(keys, record.quantity_sold))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::Allocator;
    use crate::error::ValidationError;
    use serde_json::{Value, json};

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn sample_batch() -> Vec<RawRecord> {
        vec![
            raw(json!({
                "CustomerName": "John Smith", "ProductName": "Laptop",
                "ProductCategory": "Electronics", "ProductPrice": 999.99,
                "QuantitySold": 2, "TransactionDate": "2024-02-07",
                "SalesPerson": "Alice Johnson", "CustomerEmail": "john@example.com",
                "CustomerAddress": "123 Main Street"
            })),
            raw(json!({
                "CustomerName": "Emily Brown", "ProductName": "Smartphone",
                "ProductCategory": "Electronics", "ProductPrice": 599.99,
                "QuantitySold": 1, "TransactionDate": "2024-02-06",
                "SalesPerson": "Bob Williams", "CustomerEmail": "emily@example.com",
                "CustomerAddress": "456 Elm Avenue"
            })),
            raw(json!({
                "CustomerName": "David Lee", "ProductName": "Headphones",
                "ProductCategory": "Electronics", "ProductPrice": 99.99,
                "QuantitySold": 3, "TransactionDate": "2024-02-05",
                "SalesPerson": "Cindy Davis", "CustomerEmail": "david@example.com",
                "CustomerAddress": "789 Oak Lane"
            })),
        ]
    }

    #[test]
    fn test_sample_batch() {
        let mut registry = DimensionRegistry::default();
        let facts = FactAssembler::new(&mut registry)
            .assemble(&sample_batch())
            .unwrap();

        assert_eq!(facts.len(), 3);
        assert_eq!(registry.row_counts(), [3, 3, 3, 3]);
        let quantities: Vec<i64> = facts.iter().map(|f| f.quantity_sold).collect();
        assert_eq!(quantities, vec![2, 1, 3]);
    }

    #[test]
    fn test_referential_integrity() {
        let mut registry = DimensionRegistry::default();
        let facts = FactAssembler::new(&mut registry)
            .assemble(&sample_batch())
            .unwrap();

        for fact in &facts {
            for dimension in Dimension::ALL {
                assert!(
                    registry.table(dimension).get(fact.key(dimension)).is_some(),
                    "dangling {dimension} key"
                );
            }
        }
    }

    #[test]
    fn test_duplicate_records_are_not_aggregated() {
        let mut batch = sample_batch();
        batch.push(batch[0].clone());

        let mut registry = DimensionRegistry::default();
        let facts = FactAssembler::new(&mut registry).assemble(&batch).unwrap();

        assert_eq!(facts.len(), 4);
        assert_eq!(facts[0], facts[3]);
        assert_eq!(registry.row_counts(), [3, 3, 3, 3]);
    }

    #[test]
    fn test_shared_customer() {
        let mut second = sample_batch()[0].clone();
        second.insert("ProductName".into(), json!("Mouse"));
        let batch = vec![sample_batch()[0].clone(), second];

        let mut registry = DimensionRegistry::default();
        let facts = FactAssembler::new(&mut registry).assemble(&batch).unwrap();

        assert_eq!(facts[0].customer_id, facts[1].customer_id);
        assert_ne!(facts[0].product_id, facts[1].product_id);
        assert_eq!(registry.table(Dimension::Customer).len(), 1);
        assert_eq!(registry.table(Dimension::Product).len(), 2);
    }

    #[test]
    fn test_invalid_record_allocates_nothing() {
        let mut batch = sample_batch();
        batch[2].insert("QuantitySold".into(), json!("abc"));

        let mut registry = DimensionRegistry::default();
        let err = FactAssembler::new(&mut registry)
            .assemble(&batch)
            .unwrap_err();

        let validation = err.validation().unwrap();
        assert_eq!(validation.position(), 2);
        assert_eq!(validation.field(), "QuantitySold");
        assert_eq!(registry.total_rows(), 0);
    }

    #[test]
    fn test_missing_attribute_allocates_nothing() {
        let mut batch = sample_batch();
        batch[1].remove("CustomerName");

        let mut registry = DimensionRegistry::default();
        let err = FactAssembler::new(&mut registry)
            .assemble(&batch)
            .unwrap_err();

        assert_eq!(
            err.validation(),
            Some(&ValidationError::MissingField {
                position: 1,
                field: "CustomerName"
            })
        );
        assert_eq!(registry.total_rows(), 0);
    }

    #[test]
    fn test_allocation_failure_surfaces() {
        let mut registry = DimensionRegistry::new(Allocator::sequential(i64::MAX - 1));
        let err = FactAssembler::new(&mut registry)
            .assemble(&sample_batch())
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Allocation { .. }));
    }

    #[test]
    fn test_fact_row_json_columns() {
        let mut registry = DimensionRegistry::default();
        let facts = FactAssembler::new(&mut registry)
            .assemble(&sample_batch()[..1])
            .unwrap();
        let json = serde_json::to_value(facts[0]).unwrap();
        assert_eq!(
            json,
            json!({
                "CustomerID": 0,
                "ProductID": 0,
                "SalesPersonID": 0,
                "TransactionDateID": 0,
                "QuantitySold": 2
            })
        );
    }
}

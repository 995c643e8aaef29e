//! Conversion of dimension and fact rows into Arrow record batches.

use arrow::array::{Array, ArrayRef, Date32Array, Decimal128Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Datelike;
use snafu::prelude::*;
use std::sync::Arc;

use crate::dimension::DimensionRow;
use crate::error::{DecimalOverflowSnafu, RecordBatchSnafu, SinkError};
use crate::fact::FactRow;
use crate::schema::{
    AttributeKind, AttributeValue, Decimal, Dimension, FACT_TABLE, MEASURE_COLUMN,
    MAX_DECIMAL_DIGITS,
};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Dimension rows as a record batch: attribute columns then the key column.
///
/// Decimal columns use the largest scale present in `rows`.
pub(crate) fn dimension_batch(
    dimension: Dimension,
    rows: &[DimensionRow],
) -> Result<RecordBatch, SinkError> {
    let table = dimension.table_name();
    let mut fields = Vec::with_capacity(dimension.attributes().len() + 1);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());

    for (idx, name) in dimension.attributes().iter().enumerate() {
        let values = rows.iter().map(|row| row.attributes.values().get(idx));
        let (data_type, column): (DataType, ArrayRef) = match dimension.attribute_kind(idx) {
            AttributeKind::Text => (
                DataType::Utf8,
                Arc::new(
                    values
                        .map(|v| match v {
                            Some(AttributeValue::Text(text)) => Some(text.as_str()),
                            _ => None,
                        })
                        .collect::<StringArray>(),
                ),
            ),
            AttributeKind::Date => (
                DataType::Date32,
                Arc::new(
                    values
                        .map(|v| match v {
                            Some(AttributeValue::Date(date)) => {
                                Some(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
                            }
                            _ => None,
                        })
                        .collect::<Date32Array>(),
                ),
            ),
            AttributeKind::Decimal => {
                let decimals: Vec<Option<&Decimal>> = values
                    .map(|v| match v {
                        Some(AttributeValue::Decimal(d)) => Some(d),
                        _ => None,
                    })
                    .collect();
                let scale = decimals
                    .iter()
                    .flatten()
                    .map(|d| d.scale())
                    .max()
                    .unwrap_or_default();
                let array = decimal_array(&decimals, scale, table)?;
                (array.data_type().clone(), Arc::new(array))
            }
        };
        fields.push(Field::new(*name, data_type, false));
        columns.push(column);
    }

    fields.push(Field::new(dimension.key_column(), DataType::Int64, false));
    columns.push(Arc::new(Int64Array::from_iter_values(
        rows.iter().map(|row| row.key.value()),
    )));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context(RecordBatchSnafu { table })
}

fn decimal_array(
    decimals: &[Option<&Decimal>],
    scale: u32,
    table: &str,
) -> Result<Decimal128Array, SinkError> {
    ensure!(
        scale as usize <= MAX_DECIMAL_DIGITS,
        DecimalOverflowSnafu { scale, table }
    );
    let mantissas = decimals
        .iter()
        .map(|d| match d {
            Some(d) => d
                .rescaled_mantissa(scale)
                .map(Some)
                .context(DecimalOverflowSnafu { scale, table }),
            None => Ok(None),
        })
        .collect::<Result<Decimal128Array, SinkError>>()?;

    mantissas
        .with_precision_and_scale(MAX_DECIMAL_DIGITS as u8, scale as i8)
        .context(RecordBatchSnafu { table })
}

/// Fact rows as a record batch: four key columns then the measure.
pub(crate) fn fact_batch(facts: &[FactRow]) -> Result<RecordBatch, SinkError> {
    let mut fields = Vec::with_capacity(5);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(5);

    for dimension in Dimension::ALL {
        fields.push(Field::new(dimension.key_column(), DataType::Int64, false));
        columns.push(Arc::new(Int64Array::from_iter_values(
            facts.iter().map(|fact| fact.key(dimension).value()),
        )));
    }
    fields.push(Field::new(MEASURE_COLUMN, DataType::Int64, false));
    columns.push(Arc::new(Int64Array::from_iter_values(
        facts.iter().map(|fact| fact.quantity_sold),
    )));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(RecordBatchSnafu {
        table: FACT_TABLE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::SurrogateKey;
    use crate::schema::{AttributeTuple, MAX_DECIMAL_SCALE, MAX_INTEGER_DIGITS};
    use chrono::NaiveDate;

    fn product(name: &str, price: &str, key: i64) -> DimensionRow {
        DimensionRow {
            key: SurrogateKey::new(key),
            attributes: AttributeTuple::new(vec![
                AttributeValue::Text(name.to_string()),
                AttributeValue::Text("Electronics".to_string()),
                AttributeValue::Decimal(Decimal::parse(price).unwrap()),
            ]),
        }
    }

    #[test]
    fn test_dimension_batch_schema() {
        let batch = dimension_batch(
            Dimension::Product,
            &[product("Laptop", "999.99", 0), product("Cable", "5", 1)],
        )
        .unwrap();

        let schema = batch.schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec!["ProductName", "ProductCategory", "ProductPrice", "ProductID"]
        );
        assert_eq!(
            schema.field(2).data_type(),
            &DataType::Decimal128(38, 2)
        );

        let prices = batch
            .column(2)
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(prices.value(0), 99999);
        assert_eq!(prices.value(1), 500);
    }

    #[test]
    fn test_mixed_scales_widest_values_fit() {
        let widest = "9".repeat(MAX_INTEGER_DIGITS);
        let finest = format!("0.{}1", "0".repeat(MAX_DECIMAL_SCALE - 1));
        let batch = dimension_batch(
            Dimension::Product,
            &[
                product("Yacht", &widest, 0),
                product("Screw", &finest, 1),
                product("Cable", "0.5", 2),
            ],
        )
        .unwrap();

        assert_eq!(
            batch.schema().field(2).data_type(),
            &DataType::Decimal128(38, MAX_DECIMAL_SCALE as i8)
        );
        let prices = batch
            .column(2)
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        let widest_units: i128 = widest.parse().unwrap();
        assert_eq!(prices.value(0), widest_units * 10i128.pow(18));
        assert_eq!(prices.value(1), 1);
        assert_eq!(prices.value(2), 5 * 10i128.pow(17));
    }

    #[test]
    fn test_date_column_is_days_since_epoch() {
        let row = DimensionRow {
            key: SurrogateKey::new(3),
            attributes: AttributeTuple::new(vec![AttributeValue::Date(
                NaiveDate::from_ymd_opt(1970, 1, 2).unwrap(),
            )]),
        };
        let batch = dimension_batch(Dimension::TransactionDate, &[row]).unwrap();
        let dates = batch
            .column(0)
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        assert_eq!(dates.value(0), 1);
    }

    #[test]
    fn test_mistyped_value_is_rejected() {
        let row = DimensionRow {
            key: SurrogateKey::new(0),
            attributes: AttributeTuple::new(vec![AttributeValue::Text("yesterday".into())]),
        };
        assert!(matches!(
            dimension_batch(Dimension::TransactionDate, &[row]),
            Err(SinkError::RecordBatch { .. })
        ));
    }

    #[test]
    fn test_fact_batch_columns() {
        let fact = FactRow {
            customer_id: SurrogateKey::new(1),
            product_id: SurrogateKey::new(2),
            sales_person_id: SurrogateKey::new(3),
            transaction_date_id: SurrogateKey::new(4),
            quantity_sold: 7,
        };
        let batch = fact_batch(&[fact]).unwrap();
        assert_eq!(batch.num_columns(), 5);
        assert_eq!(batch.schema().field(4).name(), MEASURE_COLUMN);
        let quantity = batch
            .column(4)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(quantity.value(0), 7);
        assert_eq!(quantity.null_count(), 0);
    }
}

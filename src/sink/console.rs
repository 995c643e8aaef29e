//! Console sink printing the star schema as text tables.

use arrow::util::pretty::pretty_format_batches;
use async_trait::async_trait;
use snafu::prelude::*;
use std::io::Write;

use super::table::{dimension_batch, fact_batch};
use super::{SinkReceipt, TableSink};
use crate::error::{RenderSnafu, SinkError};
use crate::pipeline::AssembledBatch;
use crate::schema::{Dimension, FACT_TABLE};

/// Prints the batch's fact table followed by every dimension table in full.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }

    /// Render a batch the way [`TableSink::write`] prints it.
    pub fn render(batch: &AssembledBatch) -> Result<String, SinkError> {
        let mut out = String::new();

        let facts = fact_batch(batch.facts())?;
        let grid = pretty_format_batches(&[facts])
            .context(RenderSnafu { table: FACT_TABLE })?;
        out.push_str(&format!("Normalized Fact Table:\n{grid}\n"));

        for dimension in Dimension::ALL {
            let table = dimension.table_name();
            let rows = dimension_batch(dimension, batch.dimension(dimension).rows())?;
            let grid = pretty_format_batches(&[rows]).context(RenderSnafu { table })?;
            out.push_str(&format!("\n{} Dimension Table:\n{grid}\n", title(dimension)));
        }
        Ok(out)
    }
}

fn title(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Customer => "Customer",
        Dimension::Product => "Product",
        Dimension::SalesPerson => "Salesperson",
        Dimension::TransactionDate => "Transaction Date",
    }
}

#[async_trait]
impl TableSink for ConsoleSink {
    async fn write(&self, batch: &AssembledBatch) -> Result<SinkReceipt, SinkError> {
        let rendered = Self::render(batch)?;
        let mut stdout = std::io::stdout().lock();
        // A closed stdout is not worth failing the batch over.
        let _ = stdout.write_all(rendered.as_bytes());
        let _ = stdout.flush();
        Ok(SinkReceipt::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BatchNormalizer;
    use serde_json::json;

    #[test]
    fn test_render_contains_all_tables() {
        let record = json!({
            "CustomerName": "John Smith",
            "CustomerEmail": "john@example.com",
            "CustomerAddress": "123 Main Street",
            "ProductName": "Laptop",
            "ProductCategory": "Electronics",
            "ProductPrice": 999.99,
            "QuantitySold": 2,
            "TransactionDate": "2024-02-07",
            "SalesPerson": "Alice Johnson",
        });
        let batch = BatchNormalizer::default()
            .process_batch(&[record.as_object().cloned().unwrap()])
            .unwrap();

        let text = ConsoleSink::render(&batch).unwrap();
        assert!(text.starts_with("Normalized Fact Table:"));
        for heading in [
            "Customer Dimension Table:",
            "Product Dimension Table:",
            "Salesperson Dimension Table:",
            "Transaction Date Dimension Table:",
        ] {
            assert!(text.contains(heading), "missing {heading}");
        }
        assert!(text.contains("| QuantitySold |"));
        assert!(text.contains("john@example.com"));
        assert!(text.contains("999.99"));
        assert!(text.contains("2024-02-07"));
    }

    #[test]
    fn test_render_mixed_price_scales() {
        let records: Vec<_> = [("Yacht", "12345678901234567890"), ("Cable", "0.5")]
            .into_iter()
            .map(|(product, price)| {
                json!({
                    "CustomerName": "John Smith",
                    "CustomerEmail": "john@example.com",
                    "CustomerAddress": "123 Main Street",
                    "ProductName": product,
                    "ProductCategory": "Marine",
                    "ProductPrice": price,
                    "QuantitySold": 1,
                    "TransactionDate": "2024-02-07",
                    "SalesPerson": "Alice Johnson",
                })
                .as_object()
                .cloned()
                .unwrap()
            })
            .collect();
        let batch = BatchNormalizer::default().process_batch(&records).unwrap();

        let text = ConsoleSink::render(&batch).unwrap();
        assert!(text.contains("12345678901234567890.0"));
        assert!(text.contains("0.5"));
    }
}

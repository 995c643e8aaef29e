//! Parquet table sink.
//!
//! Every table of a batch is encoded as a single Parquet file in memory.
//! Uploads start only once all of them are encoded.

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;

use super::table::{dimension_batch, fact_batch};
use super::{EncodedPart, SinkReceipt, TableSink, upload_parts};
use crate::config::ParquetCompression;
use crate::error::{ParquetWriteSnafu, SinkError};
use crate::pipeline::AssembledBatch;
use crate::schema::{Dimension, FACT_TABLE};
use crate::storage::StorageProviderRef;

/// Writes every table of a batch as Parquet part files.
pub struct ParquetSink {
    storage: StorageProviderRef,
    properties: WriterProperties,
}

impl ParquetSink {
    pub fn new(storage: StorageProviderRef, compression: ParquetCompression) -> Self {
        Self {
            storage,
            properties: writer_properties(compression),
        }
    }

    /// Encode the new dimension rows and the facts of `batch`, skipping empty tables.
    fn encode_parts(&self, batch: &AssembledBatch) -> Result<Vec<EncodedPart>, SinkError> {
        let mut parts = Vec::with_capacity(Dimension::ALL.len() + 1);

        for dimension in Dimension::ALL {
            let rows = batch.new_rows(dimension);
            if rows.is_empty() {
                continue;
            }
            let records = dimension_batch(dimension, rows)?;
            parts.push(self.encode_part(dimension.table_name(), &records)?);
        }

        if !batch.facts().is_empty() {
            let records = fact_batch(batch.facts())?;
            parts.push(self.encode_part(FACT_TABLE, &records)?);
        }

        Ok(parts)
    }

    fn encode_part(
        &self,
        table: &'static str,
        records: &RecordBatch,
    ) -> Result<EncodedPart, SinkError> {
        Ok(EncodedPart {
            table,
            bytes: encode(records, self.properties.clone(), table)?,
            record_count: records.num_rows(),
        })
    }
}

#[async_trait]
impl TableSink for ParquetSink {
    async fn write(&self, batch: &AssembledBatch) -> Result<SinkReceipt, SinkError> {
        let parts = self.encode_parts(batch)?;
        upload_parts(&self.storage, batch.batch_id(), "parquet", parts).await
    }
}

fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(match compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        })
        .build()
}

fn encode(
    records: &RecordBatch,
    properties: WriterProperties,
    table: &str,
) -> Result<Bytes, SinkError> {
    let mut writer = ArrowWriter::try_new(Vec::new(), records.schema(), Some(properties))
        .context(ParquetWriteSnafu { table })?;
    writer.write(records).context(ParquetWriteSnafu { table })?;
    let buffer = writer.into_inner().context(ParquetWriteSnafu { table })?;
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BatchNormalizer;
    use crate::storage::StorageProvider;
    use arrow::array::{Array, Decimal128Array};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use serde_json::json;
    use std::sync::Arc;

    fn sample() -> Vec<crate::schema::RawRecord> {
        [
            ("John Smith", "Laptop", "999.99", 2, "2024-02-07", "Alice Johnson"),
            ("Emily Brown", "Smartphone", "599.99", 1, "2024-02-06", "Bob Williams"),
            ("John Smith", "Laptop", "999.99", 4, "2024-02-07", "Alice Johnson"),
        ]
        .into_iter()
        .map(|(customer, product, price, quantity, date, seller)| {
            let value = json!({
                "CustomerName": customer,
                "CustomerEmail": "someone@example.com",
                "CustomerAddress": "123 Main Street",
                "ProductName": product,
                "ProductCategory": "Electronics",
                "ProductPrice": price,
                "QuantitySold": quantity,
                "TransactionDate": date,
                "SalesPerson": seller,
            });
            value.as_object().cloned().unwrap()
        })
        .collect()
    }

    #[tokio::test]
    async fn test_writes_one_part_per_table() {
        let storage = Arc::new(StorageProvider::in_memory());
        let sink = ParquetSink::new(storage.clone(), ParquetCompression::Zstd);
        let mut normalizer = BatchNormalizer::default();
        let batch = normalizer.process_batch(&sample()).unwrap();

        let receipt = sink.write(&batch).await.unwrap();
        assert_eq!(receipt.files.len(), 5);
        // 2 customers + 2 products + 2 sellers + 2 dates + 3 facts
        assert_eq!(receipt.rows_written(), 11);

        let files = storage.list_files().await.unwrap();
        let fact_file = files
            .iter()
            .find(|f| f.starts_with("fact_sales/part-00001-"))
            .unwrap();

        let bytes = storage.get(fact_file).await.unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 3);
    }

    #[tokio::test]
    async fn test_skips_tables_without_new_rows() {
        let storage = Arc::new(StorageProvider::in_memory());
        let sink = ParquetSink::new(storage.clone(), ParquetCompression::Snappy);
        let mut normalizer = BatchNormalizer::default();
        normalizer.process_batch(&sample()).unwrap();
        normalizer.reset();

        let again = normalizer.process_batch(&sample()[..1]).unwrap();
        let receipt = sink.write(&again).await.unwrap();

        assert_eq!(receipt.files.len(), 1);
        assert!(receipt.files[0].filename.starts_with("fact_sales/part-00002-"));
    }

    #[tokio::test]
    async fn test_mixed_price_scales_round_trip() {
        let storage = Arc::new(StorageProvider::in_memory());
        let sink = ParquetSink::new(storage.clone(), ParquetCompression::Snappy);
        let mut records = sample();
        records[0].insert("ProductPrice".into(), json!("12345678901234567890"));
        records[1].insert("ProductPrice".into(), json!("0.5"));
        records.truncate(2);
        let batch = BatchNormalizer::default().process_batch(&records).unwrap();

        let receipt = sink.write(&batch).await.unwrap();
        assert_eq!(receipt.files.len(), 5);

        let product_file = receipt
            .files
            .iter()
            .find(|f| f.filename.starts_with("product_dim/"))
            .unwrap();
        let bytes = storage.get(&product_file.filename).await.unwrap();
        let batches: Vec<_> = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .unwrap()
            .build()
            .unwrap()
            .map(|b| b.unwrap())
            .collect();
        let prices = batches[0]
            .column(2)
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(prices.value(0), 123456789012345678900);
        assert_eq!(prices.value(1), 5);
    }

    #[tokio::test]
    async fn test_encoding_happens_before_upload() {
        let storage = Arc::new(StorageProvider::in_memory());
        let sink = ParquetSink::new(storage.clone(), ParquetCompression::Snappy);
        let batch = BatchNormalizer::default().process_batch(&sample()).unwrap();

        let parts = sink.encode_parts(&batch).unwrap();
        assert_eq!(parts.len(), 5);
        assert!(storage.list_files().await.unwrap().is_empty());
    }

    #[test]
    fn test_oversized_price_never_reaches_the_sink() {
        let mut records = sample();
        records[0].insert("ProductPrice".into(), json!("12345678901234567890123456789012345678"));
        records[1].insert("ProductPrice".into(), json!("0.5"));

        let mut normalizer = BatchNormalizer::default();
        assert!(normalizer.process_batch(&records).is_err());
        assert_eq!(normalizer.registry().total_rows(), 0);
    }
}

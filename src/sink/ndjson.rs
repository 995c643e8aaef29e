//! Newline-delimited JSON table sink.

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde_json::{Map, Value};
use snafu::prelude::*;

use super::{EncodedPart, SinkReceipt, TableSink, upload_parts};
use crate::dimension::DimensionRow;
use crate::error::{RowSerializeSnafu, SinkError};
use crate::pipeline::AssembledBatch;
use crate::schema::{AttributeValue, Dimension, FACT_TABLE};
use crate::storage::StorageProviderRef;

/// Writes every table of a batch as `.ndjson` part files.
///
/// Dimension rows are objects keyed by column name. Prices are written as
/// strings to keep them exact; dates as `YYYY-MM-DD`.
pub struct NdjsonSink {
    storage: StorageProviderRef,
}

impl NdjsonSink {
    pub fn new(storage: StorageProviderRef) -> Self {
        Self { storage }
    }
}

/// Serialize `rows` one per line; `None` when there are no rows.
fn encode_part<T: Serialize>(
    table: &'static str,
    rows: impl Iterator<Item = T>,
) -> Result<Option<EncodedPart>, SinkError> {
    let mut buffer = BytesMut::new().writer();
    let mut record_count = 0;
    for row in rows {
        serde_json::to_writer(&mut buffer, &row).context(RowSerializeSnafu { table })?;
        buffer.get_mut().put_u8(b'\n');
        record_count += 1;
    }
    Ok((record_count > 0).then(|| EncodedPart {
        table,
        bytes: buffer.into_inner().freeze(),
        record_count,
    }))
}

/// A dimension row as a JSON object in output column order.
pub(crate) fn dimension_row_json(dimension: Dimension, row: &DimensionRow) -> Value {
    let mut object = Map::new();
    for (name, value) in dimension.attributes().iter().zip(row.attributes.values()) {
        let json = match value {
            AttributeValue::Text(text) => Value::String(text.clone()),
            other => Value::String(other.to_string()),
        };
        object.insert((*name).to_string(), json);
    }
    object.insert(
        dimension.key_column().to_string(),
        Value::from(row.key.value()),
    );
    Value::Object(object)
}

#[async_trait]
impl TableSink for NdjsonSink {
    async fn write(&self, batch: &AssembledBatch) -> Result<SinkReceipt, SinkError> {
        let mut parts = Vec::with_capacity(Dimension::ALL.len() + 1);
        for dimension in Dimension::ALL {
            let rows = batch
                .new_rows(dimension)
                .iter()
                .map(|row| dimension_row_json(dimension, row));
            parts.extend(encode_part(dimension.table_name(), rows)?);
        }
        parts.extend(encode_part(FACT_TABLE, batch.facts().iter())?);

        upload_parts(&self.storage, batch.batch_id(), "ndjson", parts).await
    }
}

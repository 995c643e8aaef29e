//! NDJSON reader.
//!
//! Decompresses a downloaded file and parses it into raw records, split
//! into batches of a configured size.

use bytes::Bytes;
use serde_json::Value;
use snafu::prelude::*;
use std::io::Read;
use tracing::debug;

use crate::emit;
use crate::error::{
    GzipDecompressionSnafu, JsonDecodeSnafu, NotAnObjectSnafu, ReaderError,
    ZstdDecompressionSnafu,
};
use crate::metrics::events::BytesRead;
use crate::schema::RawRecord;

/// Compression of an input file, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Infer compression from a file path.
    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".gz") {
            Compression::Gzip
        } else if path.ends_with(".zst") {
            Compression::Zstd
        } else {
            Compression::None
        }
    }

    /// The path with this compression's extension removed.
    pub fn strip_suffix<'a>(&self, path: &'a str) -> &'a str {
        let suffix = match self {
            Compression::None => return path,
            Compression::Gzip => ".gz",
            Compression::Zstd => ".zst",
        };
        path.strip_suffix(suffix).unwrap_or(path)
    }
}

/// Records parsed from one file.
#[derive(Debug)]
pub struct ReadResult {
    /// Records grouped into batches, in file order.
    pub batches: Vec<Vec<RawRecord>>,
    /// Total number of records read.
    pub total_records: usize,
}

/// A reader for NDJSON files that yields batches of raw records.
#[derive(Debug, Clone)]
pub struct NdjsonReader {
    batch_size: usize,
}

impl NdjsonReader {
    /// Create a reader producing batches of at most `batch_size` records.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Decompress and parse a file.
    ///
    /// Blank lines are skipped. Line numbers in errors are 1-based.
    pub fn read(&self, data: Bytes, path: &str) -> Result<ReadResult, ReaderError> {
        emit!(BytesRead {
            bytes: data.len() as u64,
        });

        let decompressed = decompress(data, path)?;
        debug!("Decompressed {} bytes for {}", decompressed.len(), path);

        let mut records = Vec::new();
        for (idx, line) in decompressed.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let value: Value = serde_json::from_slice(line).context(JsonDecodeSnafu {
                path,
                line: idx + 1,
            })?;
            match value {
                Value::Object(record) => records.push(record),
                _ => {
                    return NotAnObjectSnafu {
                        path,
                        line: idx + 1,
                    }
                    .fail();
                }
            }
        }

        let total_records = records.len();
        let mut batches = Vec::with_capacity(total_records.div_ceil(self.batch_size));
        let mut rest = records.into_iter().peekable();
        while rest.peek().is_some() {
            batches.push(rest.by_ref().take(self.batch_size).collect());
        }

        debug!(
            "Parsed {} batches ({} records) from {}",
            batches.len(),
            total_records,
            path
        );

        Ok(ReadResult {
            batches,
            total_records,
        })
    }
}

fn decompress(data: Bytes, path: &str) -> Result<Vec<u8>, ReaderError> {
    match Compression::from_path(path) {
        Compression::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(&data[..]);
            let mut buf = Vec::new();
            decoder
                .read_to_end(&mut buf)
                .context(GzipDecompressionSnafu { path })?;
            Ok(buf)
        }
        Compression::Zstd => zstd::decode_all(&data[..]).context(ZstdDecompressionSnafu { path }),
        Compression::None => Ok(data.to_vec()),
    }
}

//! Append-only dimension table with get-or-insert resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use super::allocator::{Allocator, KeyAllocator, SurrogateKey};
use crate::emit;
use crate::error::{AllocatorError, CheckpointError};
use crate::metrics::events::{DimensionLookup, DimensionRowCreated, LookupOutcome};
use crate::schema::{AttributeTuple, Dimension};

/// One row of a dimension table. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRow {
    pub key: SurrogateKey,
    pub attributes: AttributeTuple,
}

/// Table length and allocator position to roll back to.
#[derive(Debug, Clone)]
pub struct TableMark {
    len: usize,
    allocator: Allocator,
}

/// Deduplicated storage for one dimension.
///
/// Rows are kept in insertion order. The attribute index gives O(1)
/// get-or-insert; the key index backs referential checks.
#[derive(Debug, Clone)]
pub struct DimensionTable {
    dimension: Dimension,
    rows: Vec<DimensionRow>,
    by_attributes: HashMap<AttributeTuple, usize>,
    by_key: HashMap<SurrogateKey, usize>,
    allocator: Allocator,
}

impl DimensionTable {
    /// Create an empty table that draws keys from `allocator`.
    pub fn new(dimension: Dimension, allocator: Allocator) -> Self {
        Self {
            dimension,
            rows: Vec::new(),
            by_attributes: HashMap::new(),
            by_key: HashMap::new(),
            allocator,
        }
    }

    /// Rebuild a table from previously persisted rows.
    ///
    /// The allocator is advanced past every restored key so no key is reissued.
    pub fn from_rows(
        dimension: Dimension,
        rows: Vec<DimensionRow>,
        mut allocator: Allocator,
    ) -> Result<Self, CheckpointError> {
        let mut by_attributes = HashMap::with_capacity(rows.len());
        let mut by_key = HashMap::with_capacity(rows.len());
        let arity = dimension.attributes().len();

        for (idx, row) in rows.iter().enumerate() {
            if row.attributes.len() != arity {
                return Err(CheckpointError::Corrupt {
                    message: format!(
                        "{dimension} row {} has {} attributes, expected {arity}",
                        row.key,
                        row.attributes.len()
                    ),
                });
            }
            if let Some(pos) = row
                .attributes
                .values()
                .iter()
                .enumerate()
                .position(|(i, value)| value.kind() != dimension.attribute_kind(i))
            {
                return Err(CheckpointError::Corrupt {
                    message: format!(
                        "{dimension} row {} has the wrong type for {}",
                        row.key,
                        dimension.attributes()[pos]
                    ),
                });
            }
            if by_key.insert(row.key, idx).is_some() {
                return Err(CheckpointError::Corrupt {
                    message: format!("{dimension} key {} appears twice", row.key),
                });
            }
            if by_attributes.insert(row.attributes.clone(), idx).is_some() {
                return Err(CheckpointError::Corrupt {
                    message: format!("{dimension} attributes {} appear twice", row.attributes),
                });
            }
            allocator.reserve_past(row.key);
        }

        Ok(Self {
            dimension,
            rows,
            by_attributes,
            by_key,
            allocator,
        })
    }

    /// Return the key for `attrs`, creating a row with a fresh key on first sight.
    ///
    /// Idempotent: resolving an equal tuple again returns the same key and
    /// leaves the table unchanged.
    pub fn resolve(&mut self, attrs: AttributeTuple) -> Result<SurrogateKey, AllocatorError> {
        debug_assert_eq!(attrs.len(), self.dimension.attributes().len());

        match self.by_attributes.entry(attrs) {
            Entry::Occupied(entry) => {
                emit!(DimensionLookup {
                    dimension: self.dimension,
                    outcome: LookupOutcome::Hit,
                });
                Ok(self.rows[*entry.get()].key)
            }
            Entry::Vacant(entry) => {
                let key = self
                    .allocator
                    .next_key()
                    .ok_or(AllocatorError::Exhausted {
                        dimension: self.dimension,
                    })?;
                let idx = self.rows.len();
                self.rows.push(DimensionRow {
                    key,
                    attributes: entry.key().clone(),
                });
                entry.insert(idx);
                self.by_key.insert(key, idx);

                emit!(DimensionLookup {
                    dimension: self.dimension,
                    outcome: LookupOutcome::Miss,
                });
                emit!(DimensionRowCreated {
                    dimension: self.dimension,
                });
                Ok(key)
            }
        }
    }

    /// Remember the current length so rows added afterwards can be dropped.
    pub fn mark(&self) -> TableMark {
        TableMark {
            len: self.rows.len(),
            allocator: self.allocator.clone(),
        }
    }

    /// Drop every row created since `mark` and rewind the allocator.
    pub fn rollback(&mut self, mark: TableMark) {
        let len = mark.len.min(self.rows.len());
        for row in self.rows.drain(len..) {
            self.by_attributes.remove(&row.attributes);
            self.by_key.remove(&row.key);
        }
        self.allocator = mark.allocator;
    }

    /// Key of an existing row, without inserting.
    pub fn lookup(&self, attrs: &AttributeTuple) -> Option<SurrogateKey> {
        self.by_attributes.get(attrs).map(|&idx| self.rows[idx].key)
    }

    /// Row carrying `key`, if any.
    pub fn get(&self, key: SurrogateKey) -> Option<&DimensionRow> {
        self.by_key.get(&key).map(|&idx| &self.rows[idx])
    }

    /// All rows in insertion order.
    pub fn rows(&self) -> &[DimensionRow] {
        &self.rows
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

//! Surrogate key allocation.
//!
//! The only contract an allocator offers is distinctness: a key is never
//! returned twice by the same allocator. Consumers must not rely on keys
//! being contiguous or ordered.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;

use crate::error::{AllocatorError, PartitionOutOfRangeSnafu};

/// Number of low bits holding the per-partition counter in the partitioned layout.
pub const PARTITION_COUNTER_BITS: u32 = 33;

/// Largest partition id representable in the partitioned layout.
pub const MAX_PARTITION: u32 = (1 << 31) - 1;

const COUNTER_LIMIT: u64 = 1 << PARTITION_COUNTER_BITS;

/// A 64-bit surrogate key, unique within its dimension table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateKey(i64);

impl SurrogateKey {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of fresh surrogate keys.
pub trait KeyAllocator {
    /// Return a key distinct from every key this allocator returned before,
    /// or `None` once the key space is exhausted.
    fn next_key(&mut self) -> Option<SurrogateKey>;

    /// Make sure `key` and everything this allocator could confuse with it
    /// is never issued. Used when restoring rows issued by an earlier run.
    fn reserve_past(&mut self, key: SurrogateKey);
}

/// Concrete allocation strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocator {
    /// Counts up from a starting value.
    Sequential { next: i64 },
    /// Spark `monotonically_increasing_id` layout: the partition id sits in
    /// the upper 31 bits, a per-partition counter in the lower 33 bits.
    Partitioned { partition: u32, counter: u64 },
}

impl Default for Allocator {
    fn default() -> Self {
        Self::sequential(0)
    }
}

impl Allocator {
    /// Sequential allocator whose first key is `start`.
    pub fn sequential(start: i64) -> Self {
        Allocator::Sequential { next: start }
    }

    /// Partitioned allocator for the given partition id.
    pub fn partitioned(partition: u32) -> Result<Self, AllocatorError> {
        ensure!(
            partition <= MAX_PARTITION,
            PartitionOutOfRangeSnafu { partition }
        );
        Ok(Allocator::Partitioned {
            partition,
            counter: 0,
        })
    }
}

impl KeyAllocator for Allocator {
    fn next_key(&mut self) -> Option<SurrogateKey> {
        match self {
            Allocator::Sequential { next } => {
                // i64::MAX itself is never issued so `next` can always advance.
                if *next == i64::MAX {
                    return None;
                }
                let key = *next;
                *next += 1;
                Some(SurrogateKey(key))
            }
            Allocator::Partitioned { partition, counter } => {
                if *counter >= COUNTER_LIMIT {
                    return None;
                }
                *counter += 1;
                Some(partitioned_key(*partition, *counter - 1))
            }
        }
    }

    fn reserve_past(&mut self, key: SurrogateKey) {
        match self {
            Allocator::Sequential { next } => {
                if key.0 >= *next {
                    *next = key.0.saturating_add(1);
                }
            }
            Allocator::Partitioned { partition, counter } => {
                // Partitions from 2^30 up set the sign bit, so split the key unsigned.
                let bits = key.0 as u64;
                if bits >> PARTITION_COUNTER_BITS == u64::from(*partition) {
                    let issued = bits & (COUNTER_LIMIT - 1);
                    *counter = (*counter).max(issued + 1);
                }
            }
        }
    }
}

fn partitioned_key(partition: u32, counter: u64) -> SurrogateKey {
    SurrogateKey(((u64::from(partition) << PARTITION_COUNTER_BITS) | counter) as i64)
}

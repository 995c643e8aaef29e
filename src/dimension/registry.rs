//! The four dimension tables of the sales star schema.

use snafu::prelude::*;

use super::allocator::{Allocator, SurrogateKey};
use super::table::{DimensionRow, DimensionTable, TableMark};
use crate::error::{AllocatorError, CheckpointError, CorruptSnafu};
use crate::schema::{AttributeTuple, Dimension, TransactionRecord};

/// Foreign keys of one transaction, one per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionKeys {
    pub customer: SurrogateKey,
    pub product: SurrogateKey,
    pub sales_person: SurrogateKey,
    pub transaction_date: SurrogateKey,
}

impl DimensionKeys {
    /// Key for a single dimension.
    pub fn get(&self, dimension: Dimension) -> SurrogateKey {
        match dimension {
            Dimension::Customer => self.customer,
            Dimension::Product => self.product,
            Dimension::SalesPerson => self.sales_person,
            Dimension::TransactionDate => self.transaction_date,
        }
    }
}

/// Per-table marks, in [`Dimension::ALL`] order.
#[derive(Debug, Clone)]
pub struct RegistryMark([TableMark; 4]);

/// Owns one [`DimensionTable`] per dimension and routes resolution to it.
#[derive(Debug, Clone)]
pub struct DimensionRegistry {
    customer: DimensionTable,
    product: DimensionTable,
    sales_person: DimensionTable,
    transaction_date: DimensionTable,
}

impl Default for DimensionRegistry {
    fn default() -> Self {
        Self::new(Allocator::default())
    }
}

impl DimensionRegistry {
    /// Empty registry; every table gets its own copy of `allocator`.
    pub fn new(allocator: Allocator) -> Self {
        let table = |dimension| DimensionTable::new(dimension, allocator.clone());
        Self {
            customer: table(Dimension::Customer),
            product: table(Dimension::Product),
            sales_person: table(Dimension::SalesPerson),
            transaction_date: table(Dimension::TransactionDate),
        }
    }

    /// Rebuild a registry from persisted rows, one entry per dimension.
    pub fn restore(
        allocator: Allocator,
        tables: Vec<(Dimension, Vec<DimensionRow>)>,
    ) -> Result<Self, CheckpointError> {
        let mut registry = Self::new(allocator.clone());
        let mut seen = Vec::with_capacity(tables.len());
        for (dimension, rows) in tables {
            ensure!(
                !seen.contains(&dimension),
                CorruptSnafu {
                    message: format!("{dimension} table appears twice"),
                }
            );
            seen.push(dimension);
            *registry.table_mut(dimension) =
                DimensionTable::from_rows(dimension, rows, allocator.clone())?;
        }
        Ok(registry)
    }

    /// Get-or-insert `attrs` in the table for `dimension`.
    pub fn resolve(
        &mut self,
        dimension: Dimension,
        attrs: AttributeTuple,
    ) -> Result<SurrogateKey, AllocatorError> {
        self.table_mut(dimension).resolve(attrs)
    }

    /// Resolve every dimension of a validated record.
    ///
    /// The four resolutions are independent; a failure part way through can
    /// leave rows created for earlier dimensions, so callers needing
    /// atomicity take a [`mark`](Self::mark) first.
    pub fn resolve_all(
        &mut self,
        record: &TransactionRecord,
    ) -> Result<DimensionKeys, AllocatorError> {
        Ok(DimensionKeys {
            customer: self.resolve(Dimension::Customer, record.attributes(Dimension::Customer))?,
            product: self.resolve(Dimension::Product, record.attributes(Dimension::Product))?,
            sales_person: self.resolve(
                Dimension::SalesPerson,
                record.attributes(Dimension::SalesPerson),
            )?,
            transaction_date: self.resolve(
                Dimension::TransactionDate,
                record.attributes(Dimension::TransactionDate),
            )?,
        })
    }

    /// Read-only view of one table.
    pub fn table(&self, dimension: Dimension) -> &DimensionTable {
        match dimension {
            Dimension::Customer => &self.customer,
            Dimension::Product => &self.product,
            Dimension::SalesPerson => &self.sales_person,
            Dimension::TransactionDate => &self.transaction_date,
        }
    }

    fn table_mut(&mut self, dimension: Dimension) -> &mut DimensionTable {
        match dimension {
            Dimension::Customer => &mut self.customer,
            Dimension::Product => &mut self.product,
            Dimension::SalesPerson => &mut self.sales_person,
            Dimension::TransactionDate => &mut self.transaction_date,
        }
    }

    /// Mark every table so a failed batch can be undone.
    pub fn mark(&self) -> RegistryMark {
        RegistryMark(Dimension::ALL.map(|dimension| self.table(dimension).mark()))
    }

    /// Undo everything resolved since `mark`.
    pub fn rollback(&mut self, mark: RegistryMark) {
        for (dimension, table_mark) in Dimension::ALL.into_iter().zip(mark.0) {
            self.table_mut(dimension).rollback(table_mark);
        }
    }

    /// Row counts per dimension, in [`Dimension::ALL`] order.
    pub fn row_counts(&self) -> [usize; 4] {
        Dimension::ALL.map(|dimension| self.table(dimension).len())
    }

    /// Total number of dimension rows across all tables.
    pub fn total_rows(&self) -> usize {
        self.row_counts().iter().sum()
    }
}

//! Star schema layout.
//!
//! Defines the four dimensions, the attribute values they are keyed on, and
//! the validation that turns a raw input record into a typed transaction.

mod record;
mod value;

pub use record::{RawRecord, TransactionRecord, fields};
pub use value::{
    AttributeTuple, AttributeValue, Decimal, MAX_DECIMAL_DIGITS, MAX_DECIMAL_SCALE,
    MAX_INTEGER_DIGITS,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the fact table in sink output.
pub const FACT_TABLE: &str = "fact_sales";

/// Fact table column holding the measure.
pub const MEASURE_COLUMN: &str = "QuantitySold";

/// Kind of a dimension attribute, used for validation and output typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Text,
    Decimal,
    Date,
}

/// A dimension of the sales star schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    Customer,
    Product,
    SalesPerson,
    TransactionDate,
}

impl Dimension {
    /// All dimensions, in fact-table column order.
    pub const ALL: [Dimension; 4] = [
        Dimension::Customer,
        Dimension::Product,
        Dimension::SalesPerson,
        Dimension::TransactionDate,
    ];

    /// Attribute names that make up this dimension's identity, in column order.
    pub fn attributes(&self) -> &'static [&'static str] {
        match self {
            Dimension::Customer => &[
                fields::CUSTOMER_NAME,
                fields::CUSTOMER_EMAIL,
                fields::CUSTOMER_ADDRESS,
            ],
            Dimension::Product => &[
                fields::PRODUCT_NAME,
                fields::PRODUCT_CATEGORY,
                fields::PRODUCT_PRICE,
            ],
            Dimension::SalesPerson => &[fields::SALES_PERSON],
            Dimension::TransactionDate => &[fields::TRANSACTION_DATE],
        }
    }

    /// Kind of the attribute at `index` in [`Dimension::attributes`].
    pub fn attribute_kind(&self, index: usize) -> AttributeKind {
        match (self, index) {
            (Dimension::Product, 2) => AttributeKind::Decimal,
            (Dimension::TransactionDate, 0) => AttributeKind::Date,
            _ => AttributeKind::Text,
        }
    }

    /// Surrogate key column name, shared by the dimension table and the fact table.
    pub fn key_column(&self) -> &'static str {
        match self {
            Dimension::Customer => "CustomerID",
            Dimension::Product => "ProductID",
            Dimension::SalesPerson => "SalesPersonID",
            Dimension::TransactionDate => "TransactionDateID",
        }
    }

    /// Table name used by sinks.
    pub fn table_name(&self) -> &'static str {
        match self {
            Dimension::Customer => "customer_dim",
            Dimension::Product => "product_dim",
            Dimension::SalesPerson => "salesperson_dim",
            Dimension::TransactionDate => "transaction_date_dim",
        }
    }

    /// Lowercase label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Customer => "customer",
            Dimension::Product => "product",
            Dimension::SalesPerson => "salesperson",
            Dimension::TransactionDate => "transaction_date",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

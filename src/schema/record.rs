//! Raw input records and their validation.

use chrono::NaiveDate;
use serde_json::Value;

use super::{AttributeTuple, AttributeValue, Decimal, Dimension};
use crate::error::{
    InvalidDateSnafu, InvalidMeasureSnafu, InvalidPriceSnafu, MissingFieldSnafu,
    ValidationError, WrongTypeSnafu,
};

/// A denormalized input record as read from the source.
pub type RawRecord = serde_json::Map<String, Value>;

/// Input field names.
pub mod fields {
    pub const CUSTOMER_NAME: &str = "CustomerName";
    pub const CUSTOMER_EMAIL: &str = "CustomerEmail";
    pub const CUSTOMER_ADDRESS: &str = "CustomerAddress";
    pub const PRODUCT_NAME: &str = "ProductName";
    pub const PRODUCT_CATEGORY: &str = "ProductCategory";
    pub const PRODUCT_PRICE: &str = "ProductPrice";
    pub const QUANTITY_SOLD: &str = "QuantitySold";
    pub const TRANSACTION_DATE: &str = "TransactionDate";
    pub const SALES_PERSON: &str = "SalesPerson";
}

/// A fully validated transaction.
///
/// Construction checks every field, so a `TransactionRecord` can be resolved
/// against the dimension tables without any further failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_address: String,
    pub product_name: String,
    pub product_category: String,
    pub product_price: Decimal,
    pub quantity_sold: i64,
    pub transaction_date: NaiveDate,
    pub sales_person: String,
}

impl TransactionRecord {
    /// Validate a raw record found at `position` within its batch.
    pub fn from_raw(position: usize, raw: &RawRecord) -> Result<Self, ValidationError> {
        let field = |name| FieldReader {
            position,
            raw,
            name,
        };

        Ok(Self {
            customer_name: field(fields::CUSTOMER_NAME).text()?,
            customer_email: field(fields::CUSTOMER_EMAIL).text()?,
            customer_address: field(fields::CUSTOMER_ADDRESS).text()?,
            product_name: field(fields::PRODUCT_NAME).text()?,
            product_category: field(fields::PRODUCT_CATEGORY).text()?,
            product_price: field(fields::PRODUCT_PRICE).decimal()?,
            quantity_sold: field(fields::QUANTITY_SOLD).integer()?,
            transaction_date: field(fields::TRANSACTION_DATE).date()?,
            sales_person: field(fields::SALES_PERSON).text()?,
        })
    }

    /// Project this record onto one dimension's attribute tuple.
    pub fn attributes(&self, dimension: Dimension) -> AttributeTuple {
        let text = |s: &String| AttributeValue::Text(s.clone());
        let values = match dimension {
            Dimension::Customer => vec![
                text(&self.customer_name),
                text(&self.customer_email),
                text(&self.customer_address),
            ],
            Dimension::Product => vec![
                text(&self.product_name),
                text(&self.product_category),
                AttributeValue::Decimal(self.product_price),
            ],
            Dimension::SalesPerson => vec![text(&self.sales_person)],
            Dimension::TransactionDate => vec![AttributeValue::Date(self.transaction_date)],
        };
        AttributeTuple::new(values)
    }
}

/// Typed access to one field of a raw record.
struct FieldReader<'a> {
    position: usize,
    raw: &'a RawRecord,
    name: &'static str,
}

impl FieldReader<'_> {
    fn value(&self) -> Result<&Value, ValidationError> {
        match self.raw.get(self.name) {
            Some(Value::Null) | None => MissingFieldSnafu {
                position: self.position,
                field: self.name,
            }
            .fail(),
            Some(value) => Ok(value),
        }
    }

    fn text(&self) -> Result<String, ValidationError> {
        match self.value()? {
            Value::String(s) => Ok(s.clone()),
            _ => WrongTypeSnafu {
                position: self.position,
                field: self.name,
                expected: "string",
            }
            .fail(),
        }
    }

    fn integer(&self) -> Result<i64, ValidationError> {
        let value = self.value()?;
        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| {
            InvalidMeasureSnafu {
                position: self.position,
                field: self.name,
                value: render(value),
            }
            .build()
        })
    }

    fn decimal(&self) -> Result<Decimal, ValidationError> {
        let value = self.value()?;
        let parsed = match value {
            Value::Number(n) => Decimal::parse(&n.to_string()),
            Value::String(s) => Decimal::parse(s),
            _ => None,
        };
        parsed.ok_or_else(|| {
            InvalidPriceSnafu {
                position: self.position,
                field: self.name,
                value: render(value),
            }
            .build()
        })
    }

    fn date(&self) -> Result<NaiveDate, ValidationError> {
        let value = self.value()?;
        let parsed = match value {
            // chrono alone accepts signs, spaces and unpadded fields.
            Value::String(s) if is_iso_date_shape(s) => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
            }
            _ => None,
        };
        parsed.ok_or_else(|| {
            InvalidDateSnafu {
                position: self.position,
                field: self.name,
                value: render(value),
            }
            .build()
        })
    }
}

/// Exactly four digits, `-`, two digits, `-`, two digits.
fn is_iso_date_shape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Render a JSON value for error messages without quoting plain strings.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

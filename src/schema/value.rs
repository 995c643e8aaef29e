//! Attribute values and tuples.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::AttributeKind;

/// Precision of the decimal columns written by the table sinks.
pub const MAX_DECIMAL_DIGITS: usize = 38;

/// Maximum number of fractional digits a [`Decimal`] can hold.
pub const MAX_DECIMAL_SCALE: usize = 18;

/// Maximum number of integer digits a [`Decimal`] can hold.
///
/// Together with [`MAX_DECIMAL_SCALE`] this keeps every value representable
/// at any scale up to the maximum within [`MAX_DECIMAL_DIGITS`] digits, so a
/// column can always be rescaled to its largest scale.
pub const MAX_INTEGER_DIGITS: usize = MAX_DECIMAL_DIGITS - MAX_DECIMAL_SCALE;

/// An exact decimal number.
///
/// Stored as `mantissa * 10^-scale` with trailing fractional zeros removed, so
/// `999.99` and `999.990` are the same value and hash identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    /// Parse a decimal literal such as `999.99`, `-3`, or `1.5e2`.
    ///
    /// Returns `None` for anything that is not a plain number, or that needs
    /// more than [`MAX_INTEGER_DIGITS`] integer or [`MAX_DECIMAL_SCALE`]
    /// fractional digits.
    pub fn parse(input: &str) -> Option<Self> {
        let (negative, rest) = match input.as_bytes().first()? {
            b'-' => (true, &input[1..]),
            b'+' => (false, &input[1..]),
            _ => (false, input),
        };

        let (number, exponent) = match rest.find(['e', 'E']) {
            Some(idx) => (&rest[..idx], rest[idx + 1..].parse::<i32>().ok()?),
            None => (rest, 0),
        };

        let (int_part, frac_part) = match number.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (number, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let mut digits: String = format!("{int_part}{frac_part}")
            .trim_start_matches('0')
            .to_string();
        let mut scale = frac_part.len() as i64 - i64::from(exponent);

        if digits.is_empty() {
            return Some(Self {
                mantissa: 0,
                scale: 0,
            });
        }

        if scale < 0 {
            let padding = usize::try_from(-scale).ok()?;
            if digits.len() + padding > MAX_INTEGER_DIGITS {
                return None;
            }
            digits.extend(std::iter::repeat_n('0', padding));
            scale = 0;
        }

        while scale > 0 && digits.ends_with('0') {
            digits.pop();
            scale -= 1;
        }

        let integer_digits = digits.len().saturating_sub(scale as usize);
        if scale > MAX_DECIMAL_SCALE as i64 || integer_digits > MAX_INTEGER_DIGITS {
            return None;
        }

        let magnitude: i128 = digits.parse().ok()?;
        Some(Self {
            mantissa: if negative { -magnitude } else { magnitude },
            scale: scale as u32,
        })
    }

    /// Unscaled value.
    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    /// Number of fractional digits.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Unscaled value expressed at a larger `scale`, if it fits in 38 digits.
    pub fn rescaled_mantissa(&self, scale: u32) -> Option<i128> {
        let shift = scale.checked_sub(self.scale)?;
        let factor = 10i128.checked_pow(shift)?;
        let value = self.mantissa.checked_mul(factor)?;
        (value.unsigned_abs() < 10u128.pow(MAX_DECIMAL_DIGITS as u32)).then_some(value)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Decimal::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal: {text}")))
    }
}

/// A single attribute value of a dimension row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeValue {
    Text(String),
    Decimal(Decimal),
    Date(NaiveDate),
}

impl AttributeValue {
    /// The kind of attribute this value can fill.
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Text(_) => AttributeKind::Text,
            AttributeValue::Decimal(_) => AttributeKind::Decimal,
            AttributeValue::Date(_) => AttributeKind::Date,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(text) => f.write_str(text),
            AttributeValue::Decimal(decimal) => write!(f, "{decimal}"),
            AttributeValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// The identity of a dimension row: its attribute values in column order.
///
/// Two tuples are equal iff every value is equal. Text is compared exactly;
/// no case or whitespace folding happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeTuple(Vec<AttributeValue>);

impl AttributeTuple {
    pub fn new(values: Vec<AttributeValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AttributeTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

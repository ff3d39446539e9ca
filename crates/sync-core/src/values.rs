//! Decoded cell values and full table rows.
//!
//! Rows are decoded column by column against the table definition, so a
//! [`CellValue`] always reflects the declared column kind rather than
//! whatever shape the driver happened to return.

use crate::key::RowKey;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Exact decimal text, e.g. `"12.50"`
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// `0000-00-00` / `0000-00-00 00:00:00`, which chrono cannot represent
    ZeroDate,
    /// TIME values may be negative and exceed 24 hours
    Time { negative: bool, micros: u64 },
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view used by tolerance comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::UInt(u) => Some(*u as f64),
            CellValue::Float(f) => Some(*f),
            CellValue::Decimal(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_empty_text(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::UInt(u) => write!(f, "{u}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Decimal(s) | CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            CellValue::ZeroDate => write!(f, "0000-00-00 00:00:00"),
            CellValue::Time { negative, micros } => {
                let secs = micros / 1_000_000;
                let frac = micros % 1_000_000;
                let sign = if *negative { "-" } else { "" };
                write!(
                    f,
                    "{sign}{:02}:{:02}:{:02}",
                    secs / 3600,
                    (secs / 60) % 60,
                    secs % 60
                )?;
                if frac > 0 {
                    write!(f, ".{frac:06}")?;
                }
                Ok(())
            }
        }
    }
}

/// A full row payload, values in table declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub key: RowKey,
    pub values: Vec<CellValue>,
}

impl TableRow {
    pub fn new(key: RowKey, values: Vec<CellValue>) -> Self {
        Self { key, values }
    }
}

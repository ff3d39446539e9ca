//! Row fingerprints computed in process.
//!
//! Mirrors the normalization of the SQL projection: floats are rounded to
//! three significant digits, NULL is replaced by a sentinel literal that no
//! real column holds, each column is reduced to a CRC-32C of its canonical
//! text and the joined column hashes are digested once more.
//!
//! Live stores push this work into the database; this version serves
//! in-memory stores and anything else that holds decoded rows.

use crate::values::CellValue;
use sha2::{Digest, Sha256};

/// Stand-in for SQL NULL before hashing.
pub const NULL_SENTINEL: &str = "@9mT&$5CLZ!pd2Q$hxTG46Y";

/// Significant digits kept for float columns.
pub const FLOAT_SIGNIFICANT_DIGITS: i32 = 3;

/// Round to [`FLOAT_SIGNIFICANT_DIGITS`] significant digits.
pub fn round_significant(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let digits = FLOAT_SIGNIFICANT_DIGITS - 1 - value.abs().log10().floor() as i32;
    if digits >= 0 {
        let factor = 10f64.powi(digits);
        (value * factor).round() / factor
    } else {
        let factor = 10f64.powi(-digits);
        (value / factor).round() * factor
    }
}

fn canonical_text(value: &CellValue) -> String {
    match value {
        CellValue::Null => NULL_SENTINEL.to_string(),
        CellValue::Float(f) => round_significant(*f).to_string(),
        other => other.to_string(),
    }
}

/// Checksum of one row, values in table declaration order.
pub fn row_checksum(values: &[CellValue]) -> String {
    let column_hashes: Vec<String> = values
        .iter()
        .map(|v| crc32c::crc32c(canonical_text(v).as_bytes()).to_string())
        .collect();
    hex::encode(Sha256::digest(column_hashes.join(",").as_bytes()))
}

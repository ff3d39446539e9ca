//! Primary key values, their total order, and their text encoding.
//!
//! A [`RowKey`] orders lexicographically by part. [`RowKey::Max`] is the
//! sentinel that compares greater than every real key; a cursor whose
//! stream is exhausted reports it as its head so comparison sites never
//! special-case end of stream.

use crate::types::KeyKind;
use crate::values::CellValue;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum KeyError {
    #[error("primary key column holds NULL")]
    NullKey,

    #[error("expected a {kind:?} key value, got {value}")]
    KindMismatch { kind: KeyKind, value: String },

    #[error("key has {actual} parts, table key has {expected} columns")]
    Arity { expected: usize, actual: usize },

    #[error("malformed key '{input}': {reason}")]
    Malformed { input: String, reason: String },
}

/// One column of a primary key value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyPart {
    /// Signed and unsigned 64-bit integers share one ordered domain
    Int(i128),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl KeyPart {
    /// Convert a decoded cell into a key part of the given kind.
    pub fn from_cell(kind: KeyKind, cell: &CellValue) -> Result<Self, KeyError> {
        let mismatch = || KeyError::KindMismatch {
            kind,
            value: cell.to_string(),
        };
        match (kind, cell) {
            (_, CellValue::Null) => Err(KeyError::NullKey),
            (KeyKind::Integer, CellValue::Int(i)) => Ok(KeyPart::Int(*i as i128)),
            (KeyKind::Integer, CellValue::UInt(u)) => Ok(KeyPart::Int(*u as i128)),
            (KeyKind::Integer, CellValue::Text(s)) => {
                s.trim().parse().map(KeyPart::Int).map_err(|_| mismatch())
            }
            (KeyKind::Text, CellValue::Text(s)) => Ok(KeyPart::Text(s.clone())),
            (KeyKind::Text, CellValue::Bytes(b)) => String::from_utf8(b.clone())
                .map(KeyPart::Text)
                .map_err(|_| mismatch()),
            (KeyKind::Binary, CellValue::Bytes(b)) => Ok(KeyPart::Bytes(b.clone())),
            (KeyKind::Binary, CellValue::Text(s)) => Ok(KeyPart::Bytes(s.as_bytes().to_vec())),
            (KeyKind::Date, CellValue::Date(d)) => Ok(KeyPart::Date(*d)),
            (KeyKind::Date, CellValue::DateTime(dt)) => Ok(KeyPart::Date(dt.date())),
            (KeyKind::DateTime, CellValue::DateTime(dt)) => Ok(KeyPart::DateTime(*dt)),
            (KeyKind::DateTime, CellValue::Date(d)) => Ok(KeyPart::DateTime(
                d.and_hms_opt(0, 0, 0).ok_or_else(mismatch)?,
            )),
            _ => Err(mismatch()),
        }
    }

    /// Cell value used when binding this part as a statement parameter.
    pub fn to_cell(&self) -> CellValue {
        match self {
            KeyPart::Int(i) => match i64::try_from(*i) {
                Ok(v) => CellValue::Int(v),
                Err(_) => CellValue::UInt(*i as u64),
            },
            KeyPart::Text(s) => CellValue::Text(s.clone()),
            KeyPart::Bytes(b) => CellValue::Bytes(b.clone()),
            KeyPart::Date(d) => CellValue::Date(*d),
            KeyPart::DateTime(dt) => CellValue::DateTime(*dt),
        }
    }

    fn encode_into(&self, out: &mut String) {
        match self {
            KeyPart::Int(i) => out.push_str(&i.to_string()),
            KeyPart::Text(s) => {
                for c in s.chars() {
                    match c {
                        '\\' => out.push_str("\\\\"),
                        ',' => out.push_str("\\,"),
                        '\t' => out.push_str("\\t"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        c => out.push(c),
                    }
                }
            }
            KeyPart::Bytes(b) => out.push_str(&hex::encode(b)),
            KeyPart::Date(d) => out.push_str(&d.format(DATE_FORMAT).to_string()),
            KeyPart::DateTime(dt) => out.push_str(&dt.format(DATETIME_FORMAT).to_string()),
        }
    }

    fn decode(kind: KeyKind, text: &str, input: &str) -> Result<Self, KeyError> {
        let malformed = |reason: String| KeyError::Malformed {
            input: input.to_string(),
            reason,
        };
        match kind {
            KeyKind::Integer => text
                .parse()
                .map(KeyPart::Int)
                .map_err(|e| malformed(format!("integer part '{text}': {e}"))),
            KeyKind::Text => Ok(KeyPart::Text(text.to_string())),
            KeyKind::Binary => hex::decode(text)
                .map(KeyPart::Bytes)
                .map_err(|e| malformed(format!("binary part '{text}': {e}"))),
            KeyKind::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
                .map(KeyPart::Date)
                .map_err(|e| malformed(format!("date part '{text}': {e}"))),
            KeyKind::DateTime => NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
                .map(KeyPart::DateTime)
                .map_err(|e| malformed(format!("datetime part '{text}': {e}"))),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Int(i) => write!(f, "{i}"),
            KeyPart::Text(s) => write!(f, "'{s}'"),
            KeyPart::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            KeyPart::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            KeyPart::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

/// Ordered tuple of primary key values.
///
/// Variant order matters: the derived `Ord` places `Max` after every `Key`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RowKey {
    Key(Vec<KeyPart>),
    Max,
}

impl RowKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        RowKey::Key(parts)
    }

    /// Single-column integer key, mostly for tests and CLI input.
    pub fn int(value: i64) -> Self {
        RowKey::Key(vec![KeyPart::Int(value as i128)])
    }

    pub fn text(value: impl Into<String>) -> Self {
        RowKey::Key(vec![KeyPart::Text(value.into())])
    }

    pub fn is_max(&self) -> bool {
        matches!(self, RowKey::Max)
    }

    /// Key parts; the sentinel has none.
    pub fn parts(&self) -> &[KeyPart] {
        match self {
            RowKey::Key(parts) => parts,
            RowKey::Max => &[],
        }
    }

    pub fn to_cells(&self) -> Vec<CellValue> {
        self.parts().iter().map(KeyPart::to_cell).collect()
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Max => write!(f, "<max>"),
            RowKey::Key(parts) if parts.len() == 1 => write!(f, "{}", parts[0]),
            RowKey::Key(parts) => {
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Encodes keys to and from the single-field text form used in audit files
/// and on the command line.
///
/// Parts are joined with `,`; text parts escape `\`, `,`, tab, CR and LF;
/// binary parts are hex. A single integer key encodes as plain digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    kinds: Vec<KeyKind>,
}

impl KeyCodec {
    pub fn new(kinds: Vec<KeyKind>) -> Self {
        Self { kinds }
    }

    pub fn kinds(&self) -> &[KeyKind] {
        &self.kinds
    }

    pub fn encode(&self, key: &RowKey) -> String {
        let mut out = String::new();
        for (i, part) in key.parts().iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            part.encode_into(&mut out);
        }
        out
    }

    pub fn decode(&self, input: &str) -> Result<RowKey, KeyError> {
        let fields = split_escaped(input).map_err(|reason| KeyError::Malformed {
            input: input.to_string(),
            reason,
        })?;
        if fields.len() != self.kinds.len() {
            return Err(KeyError::Arity {
                expected: self.kinds.len(),
                actual: fields.len(),
            });
        }
        let parts = self
            .kinds
            .iter()
            .zip(fields.iter())
            .map(|(kind, field)| KeyPart::decode(*kind, field, input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RowKey::Key(parts))
    }

    /// Build a key from decoded cells in key column order.
    pub fn key_from_cells(&self, cells: &[CellValue]) -> Result<RowKey, KeyError> {
        if cells.len() != self.kinds.len() {
            return Err(KeyError::Arity {
                expected: self.kinds.len(),
                actual: cells.len(),
            });
        }
        let parts = self
            .kinds
            .iter()
            .zip(cells)
            .map(|(kind, cell)| KeyPart::from_cell(*kind, cell))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RowKey::Key(parts))
    }
}

fn split_escaped(input: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('t') => current.push('\t'),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => current.push(other),
                None => return Err("dangling escape".to_string()),
            },
            ',' => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    Ok(fields)
}

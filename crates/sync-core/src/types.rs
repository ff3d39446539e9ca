//! Column kinds shared by every stage of a reconciliation run.
//!
//! The metadata provider maps each catalog type string to a [`ColumnKind`].
//! The kind drives fingerprint normalization, value decoding, key ordering
//! and sentinel handling, so nothing downstream has to re-inspect raw type
//! strings.

use serde::{Deserialize, Serialize};

/// Normalized category of a column's declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnKind {
    /// TINYINT through BIGINT, signed or unsigned
    Integer { unsigned: bool },

    /// FLOAT, DOUBLE, REAL
    Float,

    /// DECIMAL / NUMERIC, kept as exact text
    Decimal,

    /// BIT(n)
    Bit,

    /// CHAR, VARCHAR and the TEXT family
    Text,

    /// ENUM('a','b',...)
    Enum,

    /// SET('a','b',...)
    Set,

    /// JSON documents
    Json,

    /// BINARY, VARBINARY and the BLOB family
    Binary,

    /// DATE
    Date,

    /// DATETIME and TIMESTAMP
    DateTime,

    /// TIME
    Time,

    /// YEAR
    Year,

    /// Spatial types; these cannot be fingerprinted portably
    Geometry,

    /// Anything the catalog reports that is not recognized
    Other { data_type: String },
}

/// How a primary key column is ordered and encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Integer,
    Text,
    Binary,
    Date,
    DateTime,
}

impl ColumnKind {
    pub fn is_float(&self) -> bool {
        matches!(self, ColumnKind::Float)
    }

    /// Kinds the fingerprint projection converts to text before hashing.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnKind::Integer { .. } | ColumnKind::Float | ColumnKind::Decimal | ColumnKind::Year
        )
    }

    /// Kinds that can hold a zero-valued date literal.
    pub fn is_date_like(&self) -> bool {
        matches!(self, ColumnKind::Date | ColumnKind::DateTime)
    }

    pub fn is_fingerprintable(&self) -> bool {
        !matches!(self, ColumnKind::Geometry)
    }

    /// Key ordering for this kind, or `None` when rows keyed by it cannot be
    /// ordered identically on both sides of a comparison.
    pub fn key_kind(&self) -> Option<KeyKind> {
        match self {
            ColumnKind::Integer { .. } | ColumnKind::Year => Some(KeyKind::Integer),
            ColumnKind::Text => Some(KeyKind::Text),
            ColumnKind::Binary | ColumnKind::Bit => Some(KeyKind::Binary),
            ColumnKind::Date => Some(KeyKind::Date),
            ColumnKind::DateTime => Some(KeyKind::DateTime),
            _ => None,
        }
    }
}

impl KeyKind {
    /// Text and binary keys are compared bytewise in SQL so that database
    /// order matches the in-memory order regardless of collation.
    pub fn needs_binary_compare(&self) -> bool {
        matches!(self, KeyKind::Text | KeyKind::Binary)
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKind::Integer { unsigned: true } => write!(f, "unsigned integer"),
            ColumnKind::Integer { unsigned: false } => write!(f, "integer"),
            ColumnKind::Float => write!(f, "float"),
            ColumnKind::Decimal => write!(f, "decimal"),
            ColumnKind::Bit => write!(f, "bit"),
            ColumnKind::Text => write!(f, "text"),
            ColumnKind::Enum => write!(f, "enum"),
            ColumnKind::Set => write!(f, "set"),
            ColumnKind::Json => write!(f, "json"),
            ColumnKind::Binary => write!(f, "binary"),
            ColumnKind::Date => write!(f, "date"),
            ColumnKind::DateTime => write!(f, "datetime"),
            ColumnKind::Time => write!(f, "time"),
            ColumnKind::Year => write!(f, "year"),
            ColumnKind::Geometry => write!(f, "geometry"),
            ColumnKind::Other { data_type } => write!(f, "{data_type}"),
        }
    }
}

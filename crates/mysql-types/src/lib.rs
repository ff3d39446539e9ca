//! MySQL type conversions for rowsync-core types.
//!
//! # Structure
//!
//! - `schema`: MySQL catalog column type → `ColumnKind`
//! - `reverse`: MySQL values → `CellValue`, driven by the column kind
//! - `forward`: `CellValue` → `MySQLValue` (for statement parameters)
//!
//! # Example
//!
//! ```rust
//! use mysql_async::Value;
//! use mysql_types::{decode_value, mysql_column_kind, MySQLValue};
//! use rowsync_core::CellValue;
//!
//! let kind = mysql_column_kind("INT", "int(11)");
//! let cell = decode_value(&kind, Value::Bytes(b"42".to_vec())).unwrap();
//! assert_eq!(cell, CellValue::Int(42));
//!
//! let value: MySQLValue = cell.into();
//! assert_eq!(value.into_inner(), Value::Int(42));
//! ```

pub mod forward;
pub mod reverse;
pub mod schema;

pub use forward::{to_params, MySQLValue};
pub use reverse::{decode_row, decode_value, ConversionError};
pub use schema::mysql_column_kind;

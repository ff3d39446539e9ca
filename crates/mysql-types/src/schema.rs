//! MySQL catalog column type conversion.
//!
//! Maps the `DATA_TYPE` / `COLUMN_TYPE` pair reported by
//! `information_schema.columns` to a [`ColumnKind`].

use rowsync_core::ColumnKind;

/// Convert a MySQL INFORMATION_SCHEMA column type to a [`ColumnKind`].
///
/// # Arguments
///
/// * `data_type` - The MySQL data type name (e.g., "INT", "VARCHAR", "TIMESTAMP")
/// * `column_type` - The full column type string (e.g., "int(10) unsigned", "enum('a','b')")
///
/// # Example
///
/// ```
/// use mysql_types::mysql_column_kind;
/// use rowsync_core::ColumnKind;
///
/// let kind = mysql_column_kind("INT", "int(10) unsigned");
/// assert_eq!(kind, ColumnKind::Integer { unsigned: true });
///
/// let kind = mysql_column_kind("point", "point");
/// assert_eq!(kind, ColumnKind::Geometry);
/// ```
pub fn mysql_column_kind(data_type: &str, column_type: &str) -> ColumnKind {
    let unsigned = column_type.to_lowercase().contains("unsigned");
    match data_type.to_uppercase().as_str() {
        // Numeric types
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" => {
            ColumnKind::Integer { unsigned }
        }
        "BOOLEAN" | "BOOL" => ColumnKind::Integer { unsigned: false },
        "FLOAT" | "DOUBLE" | "REAL" => ColumnKind::Float,
        "DECIMAL" | "NUMERIC" => ColumnKind::Decimal,
        "BIT" => ColumnKind::Bit,
        "YEAR" => ColumnKind::Year,

        // String types
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => ColumnKind::Text,
        "ENUM" => ColumnKind::Enum,
        "SET" => ColumnKind::Set,
        "JSON" => ColumnKind::Json,

        // Binary types
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            ColumnKind::Binary
        }

        // Date/Time types
        "DATE" => ColumnKind::Date,
        "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
        "TIME" => ColumnKind::Time,

        // Geometry types
        "GEOMETRY" | "POINT" | "LINESTRING" | "POLYGON" | "MULTIPOINT" | "MULTILINESTRING"
        | "MULTIPOLYGON" | "GEOMETRYCOLLECTION" | "GEOMCOLLECTION" => ColumnKind::Geometry,

        other => ColumnKind::Other {
            data_type: other.to_lowercase(),
        },
    }
}

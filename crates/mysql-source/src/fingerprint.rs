//! Fingerprint SQL generation.
//!
//! Every column is normalized and reduced to a `CRC32`, the column hashes
//! are joined and digested with `MD5`, and the query returns the primary
//! key columns followed by that checksum, ordered by key.

use rowsync_core::{
    quote_ident, ColumnDefinition, KeyColumns, KeyRange, SkipReason, SqlFragment,
    TableDefinition, NULL_SENTINEL,
};

/// Normalized, hashed projection of one column.
///
/// Applied in order: float rounding to three significant digits, NULL
/// sentinel substitution, numeric to text conversion, `CRC32`.
pub fn column_expr(column: &ColumnDefinition) -> String {
    let mut expr = quote_ident(&column.name);
    if column.kind.is_float() {
        expr = format!("IF({expr} = 0, 0, ROUND({expr}, 2 - FLOOR(LOG10(ABS({expr})))))");
    }
    if column.nullable {
        expr = format!("IFNULL({expr}, '{NULL_SENTINEL}')");
    }
    if column.kind.is_numeric() {
        expr = format!("CONVERT({expr}, CHAR)");
    }
    format!("CRC32({expr})")
}

/// Row checksum expression over every column in declaration order.
pub fn checksum_expr(table: &TableDefinition) -> String {
    let columns: Vec<String> = table.columns.iter().map(column_expr).collect();
    format!("MD5(CONCAT_WS(',', {}))", columns.join(", "))
}

/// Builds the fingerprint query for one table.
#[derive(Debug, Clone)]
pub struct FingerprintQuery {
    table: String,
    keys: KeyColumns,
    checksum: String,
}

impl FingerprintQuery {
    pub fn new(table: &TableDefinition) -> Result<Self, SkipReason> {
        table.check_syncable()?;
        Ok(Self {
            table: table.name.clone(),
            keys: KeyColumns::for_table(table)?,
            checksum: checksum_expr(table),
        })
    }

    pub fn key_columns(&self) -> &KeyColumns {
        &self.keys
    }

    /// `SELECT key..., checksum FROM t WHERE range ORDER BY key [LIMIT n]`
    pub fn build(&self, range: &KeyRange, limit: Option<usize>) -> SqlFragment {
        let predicate = self.keys.range(range);
        let mut sql = format!(
            "SELECT {}, {} FROM {} WHERE {} ORDER BY {}",
            self.keys.select_list(),
            self.checksum,
            quote_ident(&self.table),
            predicate.sql,
            self.keys.order_by()
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        SqlFragment::new(sql, predicate.params)
    }
}

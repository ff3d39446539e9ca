//! Query executor seam.
//!
//! Every read and write the reconciliation drivers perform goes through
//! [`TableStore`]. [`MySqlStore`] runs them against a live server over a
//! single connection; `testing::MemoryStore` keeps rows in memory.

use crate::fingerprint::FingerprintQuery;
use crate::schema::collect_mysql_database_schema;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Pool, Row, Value};
use mysql_types::{decode_row, decode_value, to_params};
use rowsync_core::{
    quote_ident, tuple_set_predicate, CellValue, ColumnKind, ColumnRef, DatabaseSchema, KeyCodec,
    KeyColumns, KeyRange, RowFingerprint, RowKey, SkipReason, TableDefinition, TableRow,
};
use tracing::debug;

/// Reads and writes one database on behalf of the reconciliation drivers.
///
/// Key and tuple slices passed in are already bounded by the caller's batch
/// size; implementations issue one statement per call.
#[async_trait]
pub trait TableStore: Send {
    /// Short label for log lines, e.g. `source` or `destination`.
    fn label(&self) -> &str;

    /// Tables, columns and foreign keys of this database.
    async fn load_schema(&mut self) -> Result<DatabaseSchema>;

    /// Fingerprints of rows whose key falls in `range`, ascending by key.
    async fn fingerprints(
        &mut self,
        table: &TableDefinition,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> Result<Vec<RowFingerprint>>;

    /// Full rows for the given keys, ascending by key. Missing keys are
    /// simply absent from the result.
    async fn fetch_rows(&mut self, table: &TableDefinition, keys: &[RowKey])
        -> Result<Vec<TableRow>>;

    /// Delete rows by key. Returns the affected-row count.
    async fn delete_rows(&mut self, table: &TableDefinition, keys: &[RowKey]) -> Result<u64>;

    /// Insert full rows in one statement. Returns the affected-row count.
    async fn insert_rows(&mut self, table: &TableDefinition, rows: &[TableRow]) -> Result<u64>;

    /// Primary keys of rows whose `columns` equal any of `tuples`.
    async fn select_keys(
        &mut self,
        table: &TableDefinition,
        columns: &[String],
        tuples: &[Vec<CellValue>],
    ) -> Result<Vec<RowKey>>;

    /// Toggle referential-integrity checks for this session.
    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()>;
}

fn skip_error(table: &TableDefinition, reason: SkipReason) -> anyhow::Error {
    anyhow!("table '{}' cannot be reconciled: {}", table.name, reason)
}

/// Decodes result rows into keys using the key columns' kinds.
struct KeyDecoder {
    kinds: Vec<ColumnKind>,
    codec: KeyCodec,
}

impl KeyDecoder {
    fn new(table: &TableDefinition) -> Result<Self> {
        let kinds = table
            .key_columns()
            .map_err(|r| skip_error(table, r))?
            .into_iter()
            .map(|c| c.kind.clone())
            .collect();
        let codec = table.key_codec().map_err(|r| skip_error(table, r))?;
        Ok(Self { kinds, codec })
    }

    fn decode(&self, values: Vec<Value>) -> Result<RowKey> {
        let cells = self
            .kinds
            .iter()
            .zip(values)
            .map(|(kind, value)| decode_value(kind, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.codec.key_from_cells(&cells)?)
    }

    fn key_len(&self) -> usize {
        self.kinds.len()
    }
}

/// Column values of a result row in select order.
fn row_values(mut row: Row) -> Vec<Value> {
    (0..row.len())
        .map(|i| row.take(i).unwrap_or(Value::NULL))
        .collect()
}

/// Key of a full row, taken from the key columns' positions.
pub(crate) fn key_of_row(table: &TableDefinition, codec: &KeyCodec, values: &[CellValue]) -> Result<RowKey> {
    let key_columns = table.key_columns().map_err(|r| skip_error(table, r))?;
    let cells = key_columns
        .iter()
        .map(|c| {
            table
                .column_index(&c.name)
                .and_then(|idx| values.get(idx).cloned())
                .ok_or_else(|| anyhow!("row of '{}' lacks key column '{}'", table.name, c.name))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(codec.key_from_cells(&cells)?)
}

/// [`TableStore`] over one MySQL connection.
///
/// A single connection is held for the store's lifetime because
/// `FOREIGN_KEY_CHECKS` is a session variable.
pub struct MySqlStore {
    label: String,
    conn: Conn,
}

impl MySqlStore {
    pub fn new(label: impl Into<String>, conn: Conn) -> Self {
        Self {
            label: label.into(),
            conn,
        }
    }

    pub async fn connect(label: impl Into<String>, pool: &Pool) -> Result<Self> {
        let label = label.into();
        let conn = pool
            .get_conn()
            .await
            .with_context(|| format!("Failed to connect to {label} database"))?;
        Ok(Self::new(label, conn))
    }

    /// Return the connection to its pool.
    pub fn into_conn(self) -> Conn {
        self.conn
    }

    async fn exec_rows(&mut self, sql: &str, params: Vec<CellValue>) -> Result<Vec<Row>> {
        debug!(store = %self.label, %sql, params = params.len(), "query");
        let rows: Vec<Row> = self
            .conn
            .exec(sql, to_params(params))
            .await
            .with_context(|| format!("{} query failed: {sql}", self.label))?;
        Ok(rows)
    }

    async fn exec_write(&mut self, sql: &str, params: Vec<CellValue>) -> Result<u64> {
        debug!(store = %self.label, %sql, params = params.len(), "write");
        self.conn
            .exec_drop(sql, to_params(params))
            .await
            .with_context(|| format!("{} statement failed: {sql}", self.label))?;
        Ok(self.conn.affected_rows())
    }
}

#[async_trait]
impl TableStore for MySqlStore {
    fn label(&self) -> &str {
        &self.label
    }

    async fn load_schema(&mut self) -> Result<DatabaseSchema> {
        collect_mysql_database_schema(&mut self.conn)
            .await
            .with_context(|| format!("Failed to read {} schema", self.label))
    }

    async fn fingerprints(
        &mut self,
        table: &TableDefinition,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> Result<Vec<RowFingerprint>> {
        let query = FingerprintQuery::new(table).map_err(|r| skip_error(table, r))?;
        let frag = query.build(range, limit);
        let decoder = KeyDecoder::new(table)?;
        let rows = self.exec_rows(&frag.sql, frag.params).await?;
        rows.into_iter()
            .map(|row| {
                let mut values = row_values(row);
                let checksum = match values.pop() {
                    Some(Value::Bytes(b)) => String::from_utf8(b)?,
                    other => return Err(anyhow!("unexpected checksum value {other:?}")),
                };
                if values.len() != decoder.key_len() {
                    return Err(anyhow!(
                        "fingerprint row of '{}' has {} key values",
                        table.name,
                        values.len()
                    ));
                }
                Ok(RowFingerprint::new(decoder.decode(values)?, checksum))
            })
            .collect()
    }

    async fn fetch_rows(
        &mut self,
        table: &TableDefinition,
        keys: &[RowKey],
    ) -> Result<Vec<TableRow>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let key_columns = KeyColumns::for_table(table).map_err(|r| skip_error(table, r))?;
        let codec = table.key_codec().map_err(|r| skip_error(table, r))?;
        let predicate = key_columns.key_set(keys);
        let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            columns.join(", "),
            quote_ident(&table.name),
            predicate.sql,
            key_columns.order_by()
        );
        let rows = self.exec_rows(&sql, predicate.params).await?;
        rows.into_iter()
            .map(|row| {
                let values = decode_row(table, row_values(row))?;
                let key = key_of_row(table, &codec, &values)?;
                Ok(TableRow::new(key, values))
            })
            .collect()
    }

    async fn delete_rows(&mut self, table: &TableDefinition, keys: &[RowKey]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let key_columns = KeyColumns::for_table(table).map_err(|r| skip_error(table, r))?;
        let predicate = key_columns.key_set(keys);
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(&table.name),
            predicate.sql
        );
        self.exec_write(&sql, predicate.params).await
    }

    async fn insert_rows(&mut self, table: &TableDefinition, rows: &[TableRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(&table.name),
            columns.join(", "),
            vec![tuple; rows.len()].join(", ")
        );
        let params: Vec<CellValue> = rows.iter().flat_map(|r| r.values.iter().cloned()).collect();
        self.exec_write(&sql, params).await
    }

    async fn select_keys(
        &mut self,
        table: &TableDefinition,
        columns: &[String],
        tuples: &[Vec<CellValue>],
    ) -> Result<Vec<RowKey>> {
        if tuples.is_empty() {
            return Ok(Vec::new());
        }
        let key_columns = KeyColumns::for_table(table).map_err(|r| skip_error(table, r))?;
        let refs: Vec<ColumnRef> = columns.iter().map(|c| ColumnRef::plain(c.as_str())).collect();
        let predicate = tuple_set_predicate(&refs, tuples);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            key_columns.select_list(),
            quote_ident(&table.name),
            predicate.sql,
            key_columns.order_by()
        );
        let decoder = KeyDecoder::new(table)?;
        let rows = self.exec_rows(&sql, predicate.params).await?;
        rows.into_iter()
            .map(|row| decoder.decode(row_values(row)))
            .collect()
    }

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()> {
        let sql = format!("SET FOREIGN_KEY_CHECKS = {}", u8::from(enabled));
        self.conn
            .query_drop(sql)
            .await
            .with_context(|| format!("Failed to set FOREIGN_KEY_CHECKS on {}", self.label))
    }
}

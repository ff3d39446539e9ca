//! In-memory [`TableStore`] for tests and offline experiments.
//!
//! Rows live in a `BTreeMap` per table keyed by [`RowKey`], so iteration
//! order matches the key order a live server produces with binary
//! collation. Checksums use [`row_checksum`], which normalizes values the
//! same way the fingerprint SQL does.

use crate::store::{key_of_row, TableStore};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rowsync_core::{
    row_checksum, CellValue, DatabaseSchema, KeyRange, RowFingerprint, RowKey, TableDefinition,
    TableRow,
};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

type Rows = BTreeMap<RowKey, Vec<CellValue>>;

pub struct MemoryStore {
    label: String,
    schema: DatabaseSchema,
    tables: BTreeMap<String, Rows>,
    foreign_key_checks: bool,
    foreign_key_history: Vec<bool>,
    fail_inserts_into: Option<String>,
    fail_enabling_checks: bool,
    descending_fingerprints: Option<String>,
    statements: u64,
}

impl MemoryStore {
    pub fn new(label: impl Into<String>, schema: DatabaseSchema) -> Self {
        let tables = schema
            .tables
            .iter()
            .map(|t| (t.name.clone(), Rows::new()))
            .collect();
        Self {
            label: label.into(),
            schema,
            tables,
            foreign_key_checks: true,
            foreign_key_history: Vec::new(),
            fail_inserts_into: None,
            fail_enabling_checks: false,
            descending_fingerprints: None,
            statements: 0,
        }
    }

    fn table(&self, name: &str) -> Result<&TableDefinition> {
        Ok(self.schema.require_table(name)?)
    }

    /// Insert or replace a row, bypassing foreign key checks.
    pub fn put(&mut self, table: &str, values: Vec<CellValue>) -> Result<RowKey> {
        let def = self.table(table)?;
        let codec = def
            .key_codec()
            .map_err(|r| anyhow!("table '{table}' has no usable key: {r}"))?;
        let key = key_of_row(def, &codec, &values)?;
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key.clone(), values);
        Ok(key)
    }

    pub fn remove(&mut self, table: &str, key: &RowKey) -> Option<Vec<CellValue>> {
        self.tables.get_mut(table)?.remove(key)
    }

    pub fn row(&self, table: &str, key: &RowKey) -> Option<&Vec<CellValue>> {
        self.tables.get(table)?.get(key)
    }

    pub fn keys(&self, table: &str) -> Vec<RowKey> {
        self.tables
            .get(table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Every value `FOREIGN_KEY_CHECKS` was set to, in order.
    pub fn foreign_key_history(&self) -> &[bool] {
        &self.foreign_key_history
    }

    pub fn foreign_key_checks(&self) -> bool {
        self.foreign_key_checks
    }

    /// Write statements executed so far.
    pub fn statements(&self) -> u64 {
        self.statements
    }

    /// Make every insert into `table` fail.
    pub fn fail_inserts_into(&mut self, table: impl Into<String>) {
        self.fail_inserts_into = Some(table.into());
    }

    /// Make re-enabling foreign key checks fail.
    pub fn fail_enabling_checks(&mut self) {
        self.fail_enabling_checks = true;
    }

    /// Return the fingerprints of `table` in descending key order, the way
    /// a server with a mismatched collation would.
    pub fn descending_fingerprints(&mut self, table: impl Into<String>) {
        self.descending_fingerprints = Some(table.into());
    }

    fn rows(&self, table: &str) -> Result<&Rows> {
        self.tables
            .get(table)
            .ok_or_else(|| anyhow!("{}: unknown table '{table}'", self.label))
    }

    fn column_positions(&self, table: &TableDefinition, columns: &[impl AsRef<str>]) -> Result<Vec<usize>> {
        columns
            .iter()
            .map(|c| {
                table.column_index(c.as_ref()).ok_or_else(|| {
                    anyhow!("{}: unknown column '{}' in '{}'", self.label, c.as_ref(), table.name)
                })
            })
            .collect()
    }

    /// Reject a row whose foreign key values have no parent row.
    fn check_references(&self, table: &TableDefinition, values: &[CellValue]) -> Result<()> {
        for fk in self.schema.foreign_keys.iter().filter(|fk| fk.child_table == table.name) {
            let child_idx = self.column_positions(table, &fk.child_columns())?;
            let tuple: Vec<&CellValue> = child_idx.iter().filter_map(|&i| values.get(i)).collect();
            if tuple.iter().any(|v| v.is_null()) {
                continue;
            }
            let parent = self.table(&fk.parent_table)?;
            let parent_idx = self.column_positions(parent, &fk.parent_columns())?;
            let found = self.rows(&parent.name)?.values().any(|row| {
                parent_idx
                    .iter()
                    .zip(&tuple)
                    .all(|(&i, v)| row.get(i) == Some(*v))
            });
            if !found {
                bail!(
                    "{}: cannot add row to '{}': foreign key {} fails",
                    self.label,
                    table.name,
                    fk.name
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    fn label(&self) -> &str {
        &self.label
    }

    async fn load_schema(&mut self) -> Result<DatabaseSchema> {
        Ok(self.schema.clone())
    }

    async fn fingerprints(
        &mut self,
        table: &TableDefinition,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> Result<Vec<RowFingerprint>> {
        let lower = range.after.as_ref().map_or(Bound::Unbounded, Bound::Excluded);
        let upper = range.up_to.as_ref().map_or(Bound::Unbounded, Bound::Included);
        if let (Bound::Excluded(lo), Bound::Included(hi)) = (lower, upper) {
            if lo >= hi {
                return Ok(Vec::new());
            }
        }
        let rows = self.rows(&table.name)?;
        let mut fingerprints: Vec<RowFingerprint> = rows
            .range::<RowKey, _>((lower, upper))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, values)| RowFingerprint::new(key.clone(), row_checksum(values)))
            .collect();
        if self.descending_fingerprints.as_deref() == Some(table.name.as_str()) {
            fingerprints.reverse();
        }
        Ok(fingerprints)
    }

    async fn fetch_rows(&mut self, table: &TableDefinition, keys: &[RowKey]) -> Result<Vec<TableRow>> {
        let rows = self.rows(&table.name)?;
        let wanted: BTreeSet<&RowKey> = keys.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|k| rows.get(k).map(|v| TableRow::new(k.clone(), v.clone())))
            .collect())
    }

    async fn delete_rows(&mut self, table: &TableDefinition, keys: &[RowKey]) -> Result<u64> {
        self.statements += 1;
        let label = self.label.clone();
        let rows = self
            .tables
            .get_mut(&table.name)
            .ok_or_else(|| anyhow!("{label}: unknown table '{}'", table.name))?;
        let wanted: BTreeSet<&RowKey> = keys.iter().collect();
        Ok(wanted.into_iter().filter(|k| rows.remove(*k).is_some()).count() as u64)
    }

    async fn insert_rows(&mut self, table: &TableDefinition, rows: &[TableRow]) -> Result<u64> {
        self.statements += 1;
        if self.fail_inserts_into.as_deref() == Some(table.name.as_str()) {
            bail!("{}: insert into '{}' failed", self.label, table.name);
        }
        let existing = self.rows(&table.name)?;
        for row in rows {
            if existing.contains_key(&row.key) {
                bail!("{}: duplicate entry {} for '{}'", self.label, row.key, table.name);
            }
            if self.foreign_key_checks {
                self.check_references(table, &row.values)?;
            }
        }
        let target = self.tables.entry(table.name.clone()).or_default();
        for row in rows {
            target.insert(row.key.clone(), row.values.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn select_keys(
        &mut self,
        table: &TableDefinition,
        columns: &[String],
        tuples: &[Vec<CellValue>],
    ) -> Result<Vec<RowKey>> {
        let positions = self.column_positions(table, columns)?;
        let rows = self.rows(&table.name)?;
        Ok(rows
            .iter()
            .filter(|(_, values)| {
                tuples.iter().any(|tuple| {
                    positions
                        .iter()
                        .zip(tuple)
                        .all(|(&i, v)| !v.is_null() && values.get(i) == Some(v))
                })
            })
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()> {
        self.foreign_key_history.push(enabled);
        if enabled && self.fail_enabling_checks {
            bail!("{}: lost connection while enabling foreign key checks", self.label);
        }
        self.foreign_key_checks = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_core::{ColumnDefinition, ColumnKind};

    fn schema() -> DatabaseSchema {
        DatabaseSchema::new(
            vec![TableDefinition::new(
                "items",
                vec![
                    ColumnDefinition::new("id", "int", ColumnKind::Integer { unsigned: false })
                        .primary_key(1),
                    ColumnDefinition::new("name", "varchar", ColumnKind::Text),
                ],
            )],
            vec![],
        )
    }

    fn item(id: i64, name: &str) -> Vec<CellValue> {
        vec![CellValue::Int(id), CellValue::Text(name.to_string())]
    }

    #[tokio::test]
    async fn test_fingerprints_respect_range_and_limit() {
        let mut store = MemoryStore::new("mem", schema());
        for id in 1..=6 {
            store.put("items", item(id, "x")).unwrap();
        }
        let table = schema().get_table("items").unwrap().clone();
        let page = store
            .fingerprints(&table, &KeyRange::after(Some(RowKey::int(2))), Some(3))
            .await
            .unwrap();
        let keys: Vec<RowKey> = page.into_iter().map(|f| f.key).collect();
        assert_eq!(keys, vec![RowKey::int(3), RowKey::int(4), RowKey::int(5)]);

        let window = store
            .fingerprints(&table, &KeyRange::between(Some(RowKey::int(4)), RowKey::int(5)), None)
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let mut store = MemoryStore::new("mem", schema());
        let key = store.put("items", item(1, "a")).unwrap();
        let table = schema().get_table("items").unwrap().clone();
        let err = store
            .insert_rows(&table, &[TableRow::new(key, item(1, "b"))])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate entry"));
    }
}

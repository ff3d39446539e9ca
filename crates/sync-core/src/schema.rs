//! Schema Model: tables, columns, primary keys and foreign keys.
//!
//! The model is produced once per run by a metadata provider and is
//! read-only afterwards. It is also persisted next to audit artifacts as
//! `schema.json` so an offline comparison can decode keys without a live
//! connection.

use crate::key::KeyCodec;
use crate::types::{ColumnKind, KeyKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for schema operations.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Error reading or writing a schema file
    #[error("Failed to access schema file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing a persisted schema
    #[error("Failed to parse schema JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Table not found in schema
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Column not found in table schema
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },
}

/// Why a table cannot take part in diffing or applying.
///
/// These are not errors: the table is logged and skipped and the run
/// continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoPrimaryKey,
    MultiplePrimaryKeys,
    UnsupportedColumnType { column: String, kind: ColumnKind },
    UnsupportedKeyType { column: String, kind: ColumnKind },
    Excluded,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoPrimaryKey => write!(f, "no primary key"),
            SkipReason::MultiplePrimaryKeys => write!(f, "multiple independent primary keys"),
            SkipReason::UnsupportedColumnType { column, kind } => {
                write!(f, "column '{column}' has unsupported type {kind}")
            }
            SkipReason::UnsupportedKeyType { column, kind } => {
                write!(f, "key column '{column}' has unorderable type {kind}")
            }
            SkipReason::Excluded => write!(f, "excluded by configuration"),
        }
    }
}

// ============================================================================
// Columns and Tables
// ============================================================================

/// Column metadata as reported by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,

    /// Declared data type, e.g. `int`
    pub data_type: String,

    /// Raw type string, e.g. `int(10) unsigned` or `enum('a','b')`
    pub column_type: String,

    /// Normalized kind derived from the two type strings
    pub kind: ColumnKind,

    /// Whether this column is nullable
    #[serde(default)]
    pub nullable: bool,

    /// 1-based position within the primary key, if the column is part of it
    #[serde(default)]
    pub primary_key_position: Option<u32>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, kind: ColumnKind) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            column_type: data_type.clone(),
            data_type,
            kind,
            nullable: false,
            primary_key_position: None,
        }
    }

    pub fn with_column_type(mut self, column_type: impl Into<String>) -> Self {
        self.column_type = column_type.into();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self, position: u32) -> Self {
        self.primary_key_position = Some(position);
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key_position.is_some()
    }
}

/// Table definition with columns in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDefinition {
    /// Table name
    pub name: String,

    /// Column definitions, declaration order
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Get a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Primary key columns in key order.
    ///
    /// A usable key has positions exactly `1..=n`; a gap or a repeated
    /// position means the catalog reported more than one independent key.
    pub fn key_columns(&self) -> Result<Vec<&ColumnDefinition>, SkipReason> {
        let mut keyed: Vec<&ColumnDefinition> =
            self.columns.iter().filter(|c| c.is_primary_key()).collect();
        if keyed.is_empty() {
            return Err(SkipReason::NoPrimaryKey);
        }
        keyed.sort_by_key(|c| c.primary_key_position);
        let contiguous = keyed
            .iter()
            .enumerate()
            .all(|(i, c)| c.primary_key_position == Some(i as u32 + 1));
        if !contiguous {
            return Err(SkipReason::MultiplePrimaryKeys);
        }
        for column in &keyed {
            if column.kind.key_kind().is_none() {
                return Err(SkipReason::UnsupportedKeyType {
                    column: column.name.clone(),
                    kind: column.kind.clone(),
                });
            }
        }
        Ok(keyed)
    }

    pub fn key_kinds(&self) -> Result<Vec<KeyKind>, SkipReason> {
        Ok(self
            .key_columns()?
            .iter()
            .filter_map(|c| c.kind.key_kind())
            .collect())
    }

    pub fn key_codec(&self) -> Result<KeyCodec, SkipReason> {
        Ok(KeyCodec::new(self.key_kinds()?))
    }

    /// Full eligibility check for fingerprinting, diffing and applying.
    pub fn check_syncable(&self) -> Result<(), SkipReason> {
        self.key_columns()?;
        if let Some(column) = self.columns.iter().find(|c| !c.kind.is_fingerprintable()) {
            return Err(SkipReason::UnsupportedColumnType {
                column: column.name.clone(),
                kind: column.kind.clone(),
            });
        }
        Ok(())
    }

    /// Names of columns present in both definitions, in this table's order.
    pub fn common_columns(&self, other: &TableDefinition) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| other.get_column(&c.name).is_some())
            .map(|c| c.name.clone())
            .collect()
    }
}

// ============================================================================
// Foreign Keys
// ============================================================================

/// One referencing/referenced column pair of a foreign key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnPair {
    pub parent: String,
    pub child: String,
}

/// Foreign key constraint: `child(child cols) REFERENCES parent(parent cols)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub parent_table: String,
    pub child_table: String,
    pub columns: Vec<ColumnPair>,
}

impl ForeignKey {
    pub fn parent_columns(&self) -> Vec<&str> {
        self.columns.iter().map(|p| p.parent.as_str()).collect()
    }

    pub fn child_columns(&self) -> Vec<&str> {
        self.columns.iter().map(|p| p.child.as_str()).collect()
    }
}

/// Parent table name → foreign keys in which it is the parent.
#[derive(Debug, Clone, Default)]
pub struct ForeignKeyIndex {
    children: HashMap<String, Vec<ForeignKey>>,
}

impl ForeignKeyIndex {
    pub fn new(foreign_keys: &[ForeignKey]) -> Self {
        let mut children: HashMap<String, Vec<ForeignKey>> = HashMap::new();
        for fk in foreign_keys {
            children
                .entry(fk.parent_table.clone())
                .or_default()
                .push(fk.clone());
        }
        for fks in children.values_mut() {
            fks.sort_by(|a, b| (&a.child_table, &a.name).cmp(&(&b.child_table, &b.name)));
        }
        Self { children }
    }

    pub fn children_of(&self, parent: &str) -> &[ForeignKey] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tables reachable from `root` through child edges, excluding `root`.
    pub fn descendants(&self, root: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![root.to_string()];
        while let Some(table) = stack.pop() {
            for fk in self.children_of(&table) {
                if fk.child_table != root && seen.insert(fk.child_table.clone()) {
                    stack.push(fk.child_table.clone());
                }
            }
        }
        seen
    }
}

// ============================================================================
// Database Schema
// ============================================================================

/// Collection of tables and foreign keys for one database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Table definitions
    pub tables: Vec<TableDefinition>,

    /// Foreign key constraints
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,

    /// Cached table lookup (not serialized)
    #[serde(skip)]
    table_map: HashMap<String, usize>,
}

impl DatabaseSchema {
    pub fn new(tables: Vec<TableDefinition>, foreign_keys: Vec<ForeignKey>) -> Self {
        let mut schema = Self {
            tables,
            foreign_keys,
            table_map: HashMap::new(),
        };
        schema.build_table_map();
        schema
    }

    fn build_table_map(&mut self) {
        self.table_map = self
            .tables
            .iter()
            .enumerate()
            .map(|(idx, table)| (table.name.clone(), idx))
            .collect();
    }

    pub fn get_table(&self, name: &str) -> Option<&TableDefinition> {
        self.table_map
            .get(name)
            .and_then(|&idx| self.tables.get(idx))
    }

    pub fn require_table(&self, name: &str) -> Result<&TableDefinition, SchemaError> {
        self.get_table(name)
            .ok_or_else(|| SchemaError::TableNotFound(name.to_string()))
    }

    /// Table names sorted by name.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn foreign_key_index(&self) -> ForeignKeyIndex {
        ForeignKeyIndex::new(&self.foreign_keys)
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let mut schema: DatabaseSchema = serde_json::from_str(json)?;
        schema.build_table_map();
        Ok(schema)
    }

    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_file(&self, path: &Path) -> Result<(), SchemaError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_col(name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, "int", ColumnKind::Integer { unsigned: false })
    }

    fn orders() -> TableDefinition {
        TableDefinition::new(
            "orders",
            vec![
                int_col("id").primary_key(1),
                int_col("customer_id"),
                ColumnDefinition::new("note", "varchar", ColumnKind::Text).nullable(),
            ],
        )
    }

    #[test]
    fn test_simple_key() {
        let table = orders();
        let keys = table.key_columns().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "id");
        assert_eq!(table.key_kinds().unwrap(), vec![KeyKind::Integer]);
        assert!(table.check_syncable().is_ok());
    }

    #[test]
    fn test_composite_key_uses_position_order() {
        let table = TableDefinition::new(
            "line_items",
            vec![
                int_col("line").primary_key(2),
                int_col("order_id").primary_key(1),
                int_col("qty"),
            ],
        );
        let names: Vec<&str> = table
            .key_columns()
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["order_id", "line"]);
    }

    #[test]
    fn test_skip_reasons() {
        let no_key = TableDefinition::new("log", vec![int_col("at")]);
        assert_eq!(no_key.key_columns().unwrap_err(), SkipReason::NoPrimaryKey);

        let two_keys = TableDefinition::new(
            "odd",
            vec![int_col("a").primary_key(1), int_col("b").primary_key(1)],
        );
        assert_eq!(
            two_keys.key_columns().unwrap_err(),
            SkipReason::MultiplePrimaryKeys
        );

        let float_key = TableDefinition::new(
            "readings",
            vec![ColumnDefinition::new("v", "double", ColumnKind::Float).primary_key(1)],
        );
        assert!(matches!(
            float_key.key_columns().unwrap_err(),
            SkipReason::UnsupportedKeyType { .. }
        ));

        let spatial = TableDefinition::new(
            "places",
            vec![
                int_col("id").primary_key(1),
                ColumnDefinition::new("shape", "geometry", ColumnKind::Geometry),
            ],
        );
        assert!(matches!(
            spatial.check_syncable().unwrap_err(),
            SkipReason::UnsupportedColumnType { .. }
        ));
    }

    #[test]
    fn test_foreign_key_index() {
        let fk = |name: &str, parent: &str, child: &str| ForeignKey {
            name: name.to_string(),
            parent_table: parent.to_string(),
            child_table: child.to_string(),
            columns: vec![ColumnPair {
                parent: "id".to_string(),
                child: format!("{parent}_id"),
            }],
        };
        let index = ForeignKeyIndex::new(&[
            fk("fk_b", "a", "b"),
            fk("fk_c", "a", "c"),
            fk("fk_d", "c", "d"),
            fk("fk_back", "d", "a"),
        ]);
        assert_eq!(index.children_of("a").len(), 2);
        assert!(index.children_of("b").is_empty());
        let reachable: Vec<String> = index.descendants("a").into_iter().collect();
        assert_eq!(reachable, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_json_round_trip_rebuilds_lookup() {
        let schema = DatabaseSchema::new(vec![orders()], vec![]);
        let json = serde_json::to_string(&schema).unwrap();
        let back = DatabaseSchema::from_json(&json).unwrap();
        assert!(back.get_table("orders").is_some());
        assert!(back.require_table("missing").is_err());
    }
}

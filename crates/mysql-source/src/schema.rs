//! MySQL schema collection.
//!
//! Reads columns, primary key positions and foreign keys of the current
//! database from INFORMATION_SCHEMA and builds the [`DatabaseSchema`].

use anyhow::{anyhow, Result};
use mysql_async::prelude::*;
use mysql_async::{Conn, Row};
use mysql_types::mysql_column_kind;
use rowsync_core::{ColumnDefinition, ColumnPair, DatabaseSchema, ForeignKey, TableDefinition};
use std::collections::{BTreeMap, HashMap};

const COLUMNS_QUERY: &str = "
    SELECT c.TABLE_NAME, c.COLUMN_NAME, c.DATA_TYPE, c.COLUMN_TYPE, c.IS_NULLABLE
    FROM INFORMATION_SCHEMA.COLUMNS c
    JOIN INFORMATION_SCHEMA.TABLES t
        ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
    WHERE c.TABLE_SCHEMA = DATABASE()
        AND t.TABLE_TYPE = 'BASE TABLE'
    ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

const PRIMARY_KEY_QUERY: &str = "
    SELECT TABLE_NAME, COLUMN_NAME, ORDINAL_POSITION
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
    WHERE CONSTRAINT_NAME = 'PRIMARY'
        AND TABLE_SCHEMA = DATABASE()
    ORDER BY TABLE_NAME, ORDINAL_POSITION";

const FOREIGN_KEY_QUERY: &str = "
    SELECT CONSTRAINT_NAME, TABLE_NAME, COLUMN_NAME,
           REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = DATABASE()
        AND REFERENCED_TABLE_SCHEMA = DATABASE()
        AND REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION";

fn text(row: &Row, idx: usize, what: &str) -> Result<String> {
    row.get::<Option<String>, _>(idx)
        .flatten()
        .ok_or_else(|| anyhow!("Missing {what} in schema query result"))
}

/// Collect schema information for all base tables of the current database.
pub async fn collect_mysql_database_schema(conn: &mut Conn) -> Result<DatabaseSchema> {
    let pk_rows: Vec<Row> = conn.query(PRIMARY_KEY_QUERY).await?;
    let mut pk_positions: HashMap<(String, String), u32> = HashMap::new();
    for row in pk_rows {
        let table_name = text(&row, 0, "table name")?;
        let column_name = text(&row, 1, "column name")?;
        let position: u32 = row
            .get::<Option<u32>, _>(2)
            .flatten()
            .ok_or_else(|| anyhow!("Missing key position for {table_name}.{column_name}"))?;
        pk_positions.insert((table_name, column_name), position);
    }

    let column_rows: Vec<Row> = conn.query(COLUMNS_QUERY).await?;
    let mut table_columns: BTreeMap<String, Vec<ColumnDefinition>> = BTreeMap::new();
    for row in column_rows {
        let table_name = text(&row, 0, "table name")?;
        let column_name = text(&row, 1, "column name")?;
        let data_type = text(&row, 2, "data type")?;
        let column_type = text(&row, 3, "column type")?;
        let nullable = text(&row, 4, "nullability")?.eq_ignore_ascii_case("YES");

        let kind = mysql_column_kind(&data_type, &column_type);
        let mut column = ColumnDefinition::new(&column_name, data_type.to_lowercase(), kind)
            .with_column_type(column_type);
        if nullable {
            column = column.nullable();
        }
        if let Some(pos) = pk_positions.get(&(table_name.clone(), column_name)) {
            column = column.primary_key(*pos);
        }
        table_columns.entry(table_name).or_default().push(column);
    }

    let tables = table_columns
        .into_iter()
        .map(|(name, columns)| TableDefinition::new(name, columns))
        .collect();

    let fk_rows: Vec<Row> = conn.query(FOREIGN_KEY_QUERY).await?;
    let foreign_keys = group_foreign_keys(
        fk_rows
            .iter()
            .map(|row| {
                Ok(ForeignKeyColumnRow {
                    constraint: text(row, 0, "constraint name")?,
                    child_table: text(row, 1, "table name")?,
                    child_column: text(row, 2, "column name")?,
                    parent_table: text(row, 3, "referenced table name")?,
                    parent_column: text(row, 4, "referenced column name")?,
                })
            })
            .collect::<Result<Vec<_>>>()?,
    );

    Ok(DatabaseSchema::new(tables, foreign_keys))
}

/// One column pair of a foreign key as the catalog reports it.
#[derive(Debug, Clone)]
pub(crate) struct ForeignKeyColumnRow {
    pub constraint: String,
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
}

/// Fold per-column catalog rows into one [`ForeignKey`] per constraint,
/// preserving column order. Rows must be grouped by table and constraint.
pub(crate) fn group_foreign_keys(rows: Vec<ForeignKeyColumnRow>) -> Vec<ForeignKey> {
    let mut foreign_keys: Vec<ForeignKey> = Vec::new();
    for row in rows {
        let pair = ColumnPair {
            parent: row.parent_column,
            child: row.child_column,
        };
        match foreign_keys.last_mut() {
            Some(fk) if fk.name == row.constraint && fk.child_table == row.child_table => {
                fk.columns.push(pair);
            }
            _ => foreign_keys.push(ForeignKey {
                name: row.constraint,
                parent_table: row.parent_table,
                child_table: row.child_table,
                columns: vec![pair],
            }),
        }
    }
    foreign_keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk_row(constraint: &str, child: &str, cc: &str, parent: &str, pc: &str) -> ForeignKeyColumnRow {
        ForeignKeyColumnRow {
            constraint: constraint.to_string(),
            child_table: child.to_string(),
            child_column: cc.to_string(),
            parent_table: parent.to_string(),
            parent_column: pc.to_string(),
        }
    }

    #[test]
    fn test_group_composite_foreign_keys() {
        let fks = group_foreign_keys(vec![
            fk_row("fk_line_order", "line_items", "order_id", "orders", "id"),
            fk_row("fk_ship_line", "shipments", "order_id", "line_items", "order_id"),
            fk_row("fk_ship_line", "shipments", "line_no", "line_items", "line"),
        ]);
        assert_eq!(fks.len(), 2);
        assert_eq!(fks[0].child_columns(), vec!["order_id"]);
        assert_eq!(fks[1].parent_table, "line_items");
        assert_eq!(fks[1].child_columns(), vec!["order_id", "line_no"]);
        assert_eq!(fks[1].parent_columns(), vec!["order_id", "line"]);
    }

    #[test]
    fn test_same_constraint_name_on_different_tables() {
        // Constraint names are only unique per table.
        let fks = group_foreign_keys(vec![
            fk_row("fk_parent", "a", "p_id", "p", "id"),
            fk_row("fk_parent", "b", "p_id", "p", "id"),
        ]);
        assert_eq!(fks.len(), 2);
    }
}

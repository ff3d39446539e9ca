//! Sentinel value normalization applied to rows before they are written.
//!
//! Strict SQL modes reject the zero-date literal and empty enum values that
//! lenient servers happily store, so both become NULL on the way in.

use crate::schema::TableDefinition;
use crate::types::ColumnKind;
use crate::values::{CellValue, TableRow};

/// Replace sentinel values in place. Returns the number of cells changed.
pub fn normalize_row(table: &TableDefinition, row: &mut TableRow) -> usize {
    let mut changed = 0;
    for (column, value) in table.columns.iter().zip(row.values.iter_mut()) {
        if needs_null(&column.kind, value) {
            *value = CellValue::Null;
            changed += 1;
        }
    }
    changed
}

pub fn normalize_rows(table: &TableDefinition, rows: &mut [TableRow]) -> usize {
    rows.iter_mut().map(|row| normalize_row(table, row)).sum()
}

fn needs_null(kind: &ColumnKind, value: &CellValue) -> bool {
    match (kind, value) {
        (_, CellValue::ZeroDate) => true,
        (k, CellValue::Text(s)) if k.is_date_like() => is_zero_date_text(s),
        (ColumnKind::Enum, CellValue::Text(s)) => s.is_empty(),
        (ColumnKind::Enum, CellValue::Bytes(b)) => b.is_empty(),
        _ => false,
    }
}

/// `0000-00-00` with an optional zero time part.
pub fn is_zero_date_text(s: &str) -> bool {
    s == "0000-00-00" || s == "0000-00-00 00:00:00" || s.starts_with("0000-00-00 00:00:00.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::RowKey;
    use crate::schema::ColumnDefinition;

    fn table() -> TableDefinition {
        TableDefinition::new(
            "events",
            vec![
                ColumnDefinition::new("id", "int", ColumnKind::Integer { unsigned: false })
                    .primary_key(1),
                ColumnDefinition::new("at", "datetime", ColumnKind::DateTime).nullable(),
                ColumnDefinition::new("state", "enum", ColumnKind::Enum).nullable(),
                ColumnDefinition::new("note", "varchar", ColumnKind::Text),
            ],
        )
    }

    #[test]
    fn test_zero_date_and_empty_enum_become_null() {
        let mut row = TableRow::new(
            RowKey::int(1),
            vec![
                CellValue::Int(1),
                CellValue::ZeroDate,
                CellValue::Text(String::new()),
                CellValue::Text(String::new()),
            ],
        );
        assert_eq!(normalize_row(&table(), &mut row), 2);
        assert_eq!(row.values[1], CellValue::Null);
        assert_eq!(row.values[2], CellValue::Null);
        // empty text in a plain text column is real data
        assert_eq!(row.values[3], CellValue::Text(String::new()));
    }

    #[test]
    fn test_zero_date_text_form() {
        let mut row = TableRow::new(
            RowKey::int(2),
            vec![
                CellValue::Int(2),
                CellValue::Text("0000-00-00 00:00:00".into()),
                CellValue::Text("open".into()),
                CellValue::Text("0000-00-00".into()),
            ],
        );
        assert_eq!(normalize_row(&table(), &mut row), 1);
        assert_eq!(row.values[1], CellValue::Null);
        assert_eq!(row.values[3], CellValue::Text("0000-00-00".into()));
    }
}

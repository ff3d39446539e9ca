//! Approximate wire size of row payloads, used to keep each multi-row
//! insert under the server's maximum packet size.

use crate::values::{CellValue, TableRow};

/// Estimate charged for a NULL value.
pub const NULL_SIZE_ESTIMATE: usize = 4;

/// Approximate serialized size of one value in bytes.
pub fn estimated_size(value: &CellValue) -> usize {
    match value {
        CellValue::Null => NULL_SIZE_ESTIMATE,
        CellValue::Text(s) | CellValue::Decimal(s) => s.len(),
        CellValue::Bytes(b) => b.len(),
        // Numbers, dates and times travel as their rendered text
        other => other.to_string().len(),
    }
}

pub fn estimated_row_size(row: &TableRow) -> usize {
    row.values.iter().map(estimated_size).sum()
}

/// Maximum cumulative payload for a single statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadBudget {
    max_bytes: usize,
}

impl PayloadBudget {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Number of leading rows whose cumulative size fits the budget.
    ///
    /// Returns at least 1 for a non-empty slice: a row that alone exceeds
    /// the budget is still sent by itself so the caller always progresses.
    pub fn rows_within(&self, rows: &[TableRow]) -> usize {
        let mut total = 0usize;
        for (i, row) in rows.iter().enumerate() {
            total = total.saturating_add(estimated_row_size(row));
            if total > self.max_bytes {
                return i.max(1);
            }
        }
        rows.len()
    }
}

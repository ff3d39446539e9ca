//! Parameterized predicate builders for key sets and key ranges.
//!
//! Everything here produces SQL text with `?` placeholders plus the bound
//! values, independent of any driver. Text and binary key columns are
//! wrapped in `BINARY` so range and order comparisons are bytewise.

use crate::key::RowKey;
use crate::schema::{SkipReason, TableDefinition};
use crate::values::CellValue;

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<CellValue>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>, params: Vec<CellValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Always-true predicate.
    pub fn always() -> Self {
        Self::new("1 = 1", Vec::new())
    }

    /// Always-false predicate, used for empty key sets.
    pub fn never() -> Self {
        Self::new("1 = 0", Vec::new())
    }

    /// Conjunction of two fragments, concatenating parameters in order.
    pub fn and(mut self, other: SqlFragment) -> Self {
        self.sql = format!("({}) AND ({})", self.sql, other.sql);
        self.params.extend(other.params);
        self
    }
}

/// A column reference as it appears in comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub name: String,
    pub binary: bool,
}

impl ColumnRef {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binary: false,
        }
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binary: true,
        }
    }

    fn compare_expr(&self) -> String {
        if self.binary {
            format!("BINARY {}", quote_ident(&self.name))
        } else {
            quote_ident(&self.name)
        }
    }
}

/// Primary key columns of a table, in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumns {
    columns: Vec<ColumnRef>,
}

impl KeyColumns {
    pub fn new(columns: Vec<ColumnRef>) -> Self {
        Self { columns }
    }

    pub fn for_table(table: &TableDefinition) -> Result<Self, SkipReason> {
        let columns = table
            .key_columns()?
            .into_iter()
            .map(|c| ColumnRef {
                name: c.name.clone(),
                binary: c
                    .kind
                    .key_kind()
                    .map(|k| k.needs_binary_compare())
                    .unwrap_or(false),
            })
            .collect();
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Quoted key columns for a select list.
    pub fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `ORDER BY` expression list matching the in-memory key order.
    pub fn order_by(&self) -> String {
        self.columns
            .iter()
            .map(ColumnRef::compare_expr)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn tuple_expr(&self) -> String {
        let exprs: Vec<String> = self.columns.iter().map(ColumnRef::compare_expr).collect();
        if exprs.len() == 1 {
            exprs[0].clone()
        } else {
            format!("({})", exprs.join(", "))
        }
    }

    fn tuple_placeholders(&self) -> String {
        if self.columns.len() == 1 {
            "?".to_string()
        } else {
            format!("({})", vec!["?"; self.columns.len()].join(", "))
        }
    }

    /// Match any of the given keys.
    pub fn key_set(&self, keys: &[RowKey]) -> SqlFragment {
        let tuples: Vec<Vec<CellValue>> = keys.iter().map(RowKey::to_cells).collect();
        tuple_set_predicate(&self.columns, &tuples)
    }

    /// Keys strictly greater than `after` (if any) and at most `up_to` (if any).
    pub fn range(&self, range: &KeyRange) -> SqlFragment {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        if let Some(after) = &range.after {
            clauses.push(format!("{} > {}", self.tuple_expr(), self.tuple_placeholders()));
            params.extend(after.to_cells());
        }
        if let Some(up_to) = &range.up_to {
            clauses.push(format!("{} <= {}", self.tuple_expr(), self.tuple_placeholders()));
            params.extend(up_to.to_cells());
        }
        if clauses.is_empty() {
            return SqlFragment::always();
        }
        SqlFragment::new(clauses.join(" AND "), params)
    }
}

/// Half-open key window `(after, up_to]`; `None` bounds are unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub after: Option<RowKey>,
    pub up_to: Option<RowKey>,
}

impl KeyRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn after(key: Option<RowKey>) -> Self {
        Self {
            after: key,
            up_to: None,
        }
    }

    pub fn between(after: Option<RowKey>, up_to: RowKey) -> Self {
        Self {
            after,
            up_to: Some(up_to),
        }
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.after.as_ref().map(|a| key > a).unwrap_or(true)
            && self.up_to.as_ref().map(|u| key <= u).unwrap_or(true)
    }
}

/// Match rows whose `columns` equal any of `tuples`.
///
/// A single column becomes `col IN (?, ...)`; several columns become a
/// disjunction of per-tuple equality clauses. An empty set matches nothing.
pub fn tuple_set_predicate(columns: &[ColumnRef], tuples: &[Vec<CellValue>]) -> SqlFragment {
    if tuples.is_empty() || columns.is_empty() {
        return SqlFragment::never();
    }
    let mut params = Vec::with_capacity(tuples.len() * columns.len());
    let sql = if columns.len() == 1 {
        for tuple in tuples {
            params.extend(tuple.iter().take(1).cloned());
        }
        format!(
            "{} IN ({})",
            columns[0].compare_expr(),
            vec!["?"; tuples.len()].join(", ")
        )
    } else {
        let clause = format!(
            "({})",
            columns
                .iter()
                .map(|c| format!("{} = ?", c.compare_expr()))
                .collect::<Vec<_>>()
                .join(" AND ")
        );
        for tuple in tuples {
            params.extend(tuple.iter().take(columns.len()).cloned());
        }
        vec![clause; tuples.len()].join(" OR ")
    };
    SqlFragment::new(sql, params)
}

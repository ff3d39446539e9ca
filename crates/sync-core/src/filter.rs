//! Table selection by include and skip lists.

use serde::{Deserialize, Serialize};

/// An empty include list admits every table; the skip list always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableFilter {
    pub include_tables: Vec<String>,
    pub skip_tables: Vec<String>,
}

impl TableFilter {
    pub fn new(include_tables: Vec<String>, skip_tables: Vec<String>) -> Self {
        Self {
            include_tables,
            skip_tables,
        }
    }

    pub fn allows(&self, table: &str) -> bool {
        if self.skip_tables.iter().any(|t| t == table) {
            return false;
        }
        self.include_tables.is_empty() || self.include_tables.iter().any(|t| t == table)
    }
}

//! Resume checkpoints for `rowsync sync`.
//!
//! With `--checkpoint-dir`, the last applied key of the table being synced is
//! written to `resume.json` after every page. `--resume-from` reads it back
//! and the next run starts strictly after that key.
//!
//! # File Format
//!
//! ```json
//! {
//!     "table": "orders",
//!     "last_key": "41877",
//!     "updated_at": "2024-01-01T00:00:00Z"
//! }
//! ```
//!
//! Keys are stored in the same text form as audit files, so the table's key
//! codec is needed to read them back.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rowsync_core::{DatabaseSchema, RowKey, TableDefinition};
use rowsync_mysql::{StartAt, SyncProgress, TableSyncReport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name used inside a checkpoint directory.
pub const RESUME_FILE: &str = "resume.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub table: String,
    /// Encoded last applied key; `None` restarts the table
    pub last_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ResumePoint {
    pub fn new(table: &TableDefinition, last_key: Option<&RowKey>) -> Result<Self> {
        let last_key = match last_key {
            Some(key) => Some(Self::codec(table)?.encode(key)),
            None => None,
        };
        Ok(Self {
            table: table.name.clone(),
            last_key,
            updated_at: Utc::now(),
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint {path:?}"))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid checkpoint {path:?}"))
    }

    /// Write through a temporary file so a crash never leaves half a file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write checkpoint {tmp:?}"))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move checkpoint into place at {path:?}"))?;
        Ok(())
    }

    /// Decode the stored key against `schema`.
    pub fn start_at(&self, schema: &DatabaseSchema) -> Result<StartAt> {
        let table = schema
            .require_table(&self.table)
            .with_context(|| format!("Checkpoint names unknown table '{}'", self.table))?;
        let after = match &self.last_key {
            Some(text) => Some(
                Self::codec(table)?
                    .decode(text)
                    .with_context(|| format!("Bad checkpoint key for '{}'", self.table))?,
            ),
            None => None,
        };
        Ok(StartAt {
            table: self.table.clone(),
            after,
        })
    }

    fn codec(table: &TableDefinition) -> Result<rowsync_core::KeyCodec> {
        table
            .key_codec()
            .map_err(|reason| anyhow::anyhow!("table '{}' has no usable key: {reason}", table.name))
    }
}

/// [`SyncProgress`] that records a [`ResumePoint`] after every page.
pub struct CheckpointWriter {
    path: PathBuf,
    written: u64,
}

impl CheckpointWriter {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create checkpoint directory {dir:?}"))?;
        Ok(Self {
            path: dir.join(RESUME_FILE),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl SyncProgress for CheckpointWriter {
    fn page_done(&mut self, table: &TableDefinition, last_key: &RowKey) -> Result<()> {
        ResumePoint::new(table, Some(last_key))?.write(&self.path)?;
        self.written += 1;
        debug!(table = %table.name, key = %last_key, "checkpoint written");
        Ok(())
    }

    fn table_done(&mut self, report: &TableSyncReport) -> Result<()> {
        debug!(table = %report.table, "table finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_core::{ColumnDefinition, ColumnKind};
    use tempfile::TempDir;

    fn schema() -> DatabaseSchema {
        DatabaseSchema::new(
            vec![TableDefinition::new(
                "tags",
                vec![
                    ColumnDefinition::new("site", "int", ColumnKind::Integer { unsigned: false })
                        .primary_key(1),
                    ColumnDefinition::new("name", "varchar", ColumnKind::Text).primary_key(2),
                ],
            )],
            vec![],
        )
    }

    #[test]
    fn test_write_then_resume() {
        let dir = TempDir::new().unwrap();
        let schema = schema();
        let table = schema.require_table("tags").unwrap();
        let key = table
            .key_codec()
            .unwrap()
            .key_from_cells(&[
                rowsync_core::CellValue::Int(3),
                rowsync_core::CellValue::Text("a,b".to_string()),
            ])
            .unwrap();

        let mut writer = CheckpointWriter::new(dir.path()).unwrap();
        writer.page_done(table, &key).unwrap();
        assert_eq!(writer.written(), 1);

        let point = ResumePoint::read(writer.path()).unwrap();
        assert_eq!(point.table, "tags");
        let start = point.start_at(&schema).unwrap();
        assert_eq!(start.table, "tags");
        assert_eq!(start.after, Some(key));
    }

    #[test]
    fn test_unknown_table_is_an_error() {
        let point = ResumePoint {
            table: "missing".to_string(),
            last_key: None,
            updated_at: Utc::now(),
        };
        assert!(point.start_at(&schema()).is_err());
    }

    #[test]
    fn test_missing_key_restarts_table() {
        let schema = schema();
        let table = schema.require_table("tags").unwrap();
        let point = ResumePoint::new(table, None).unwrap();
        assert_eq!(point.start_at(&schema).unwrap().after, None);
    }
}

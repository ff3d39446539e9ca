//! Audit runner: persists every table's fingerprint stream and rollup.

use crate::cascade::SkippedTable;
use crate::pager::FingerprintPager;
use crate::store::TableStore;
use anyhow::{Context, Result};
use rowsync_core::audit::{manifest_path, prepare_dir, schema_path};
use rowsync_core::{AuditTableWriter, DatabaseSchema, Manifest, ManifestEntry, TableFilter};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    pub page_size: usize,
    /// Stop each table after this many rows
    pub limit: Option<u64>,
    pub filter: TableFilter,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            page_size: 5000,
            limit: None,
            filter: TableFilter::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub entries: Vec<ManifestEntry>,
    pub skipped: Vec<SkippedTable>,
}

impl AuditReport {
    pub fn total_rows(&self) -> u64 {
        self.entries.iter().map(|e| e.rows).sum()
    }
}

/// Write `schema.json`, one fingerprint file per table and the manifest
/// into `dir`. A manifest left by an earlier run in `dir` is replaced.
pub async fn audit_database<S: TableStore + ?Sized>(
    store: &mut S,
    schema: &DatabaseSchema,
    dir: &Path,
    opts: &AuditOptions,
) -> Result<AuditReport> {
    prepare_dir(dir)?;
    schema
        .to_file(&schema_path(dir))
        .with_context(|| format!("Failed to write schema to {}", dir.display()))?;
    let manifest = manifest_path(dir);
    let mut report = AuditReport::default();

    for name in schema.table_names() {
        if !opts.filter.allows(name) {
            continue;
        }
        let Some(table) = schema.get_table(name) else {
            continue;
        };
        let codec = match table.check_syncable().and_then(|()| table.key_codec()) {
            Ok(codec) => codec,
            Err(reason) => {
                warn!(table = name, %reason, "Skipping table");
                report.skipped.push(SkippedTable {
                    table: name.to_string(),
                    reason: reason.to_string(),
                });
                continue;
            }
        };

        let started = Instant::now();
        let mut writer = AuditTableWriter::create(dir, name, codec)?;
        let mut pager = FingerprintPager::new(&mut *store, table, opts.page_size).with_limit(opts.limit);
        while let Some(fingerprint) = pager.next().await? {
            writer.write(&fingerprint)?;
        }
        let entry = writer.finish()?;
        Manifest::append(&manifest, &entry)?;

        let elapsed = started.elapsed().as_secs_f64();
        let krows = if elapsed > 0.0 {
            entry.rows as f64 / elapsed / 1000.0
        } else {
            0.0
        };
        info!(
            table = name,
            rows = entry.rows,
            rollup = %entry.rollup,
            "Audited table {} in {:.1}s ({:.1} krows/s)",
            name,
            elapsed,
            krows
        );
        report.entries.push(entry);
    }

    info!(
        tables = report.entries.len(),
        skipped = report.skipped.len(),
        rows = report.total_rows(),
        dir = %dir.display(),
        "Audit finished"
    );
    Ok(report)
}

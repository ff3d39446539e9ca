//! Table and database sync drivers.
//!
//! Runs the windowed differ over each table and applies every page's
//! verdicts before fetching the next one, so the destination converges
//! page by page and a checkpoint after any page is a valid resume point.

use crate::apply::{ApplyExecutor, ApplyOptions, ApplyPlan, ApplyStats};
use crate::cascade::SkippedTable;
use crate::guard::{restore_foreign_key_checks, suspend_foreign_key_checks};
use crate::store::TableStore;
use crate::window::{WindowOptions, WindowedDiffer};
use anyhow::Result;
use rowsync_core::{DatabaseSchema, RowKey, TableDefinition, TableFilter};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub window: WindowOptions,
    pub apply: ApplyOptions,
}

/// Where a resumed run picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartAt {
    pub table: String,
    /// Resume strictly after this key; `None` restarts the table
    pub after: Option<RowKey>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSyncReport {
    pub table: String,
    pub pages: u64,
    pub source_rows: u64,
    pub destination_rows: u64,
    pub inserts: u64,
    pub deletes: u64,
    pub updates: u64,
    pub equal: u64,
    /// Deletes found by the trailing sweep
    pub trailing_deletes: u64,
    pub applied: ApplyStats,
    pub last_key: Option<RowKey>,
    pub elapsed: Duration,
}

impl TableSyncReport {
    pub fn is_clean(&self) -> bool {
        self.inserts == 0 && self.deletes == 0 && self.updates == 0
    }

    /// Source rows scanned per second, in thousands.
    pub fn krows_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.source_rows as f64 / secs / 1000.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseSyncReport {
    pub tables: Vec<TableSyncReport>,
    pub skipped: Vec<SkippedTable>,
}

impl DatabaseSyncReport {
    pub fn totals(&self) -> ApplyStats {
        let mut total = ApplyStats::default();
        for table in &self.tables {
            total.merge(&table.applied);
        }
        total
    }
}

/// Progress hooks, called after every applied page and finished table.
pub trait SyncProgress {
    fn page_done(&mut self, table: &TableDefinition, last_key: &RowKey) -> Result<()>;

    fn table_done(&mut self, _report: &TableSyncReport) -> Result<()> {
        Ok(())
    }
}

/// Progress sink that does nothing.
pub struct NoProgress;

impl SyncProgress for NoProgress {
    fn page_done(&mut self, _table: &TableDefinition, _last_key: &RowKey) -> Result<()> {
        Ok(())
    }
}

/// Diff and apply one table, page by page.
pub async fn sync_table<S, D>(
    source: &mut S,
    dest: &mut D,
    table: &TableDefinition,
    opts: &SyncOptions,
    start_after: Option<RowKey>,
    progress: &mut dyn SyncProgress,
) -> Result<TableSyncReport>
where
    S: TableStore + ?Sized,
    D: TableStore + ?Sized,
{
    let started = Instant::now();
    let executor = ApplyExecutor::new(opts.apply);
    let mut differ = WindowedDiffer::new(table, opts.window).resume_after(start_after);
    let mut report = TableSyncReport {
        table: table.name.clone(),
        ..Default::default()
    };

    while let Some(page) = differ.next_page(source, dest).await? {
        report.pages += 1;
        report.source_rows += page.source_rows as u64;
        report.destination_rows += page.destination_rows as u64;
        report.inserts += page.summary.only_in_a.count;
        report.deletes += page.summary.only_in_b.count;
        report.updates += page.summary.changed;
        report.equal += page.summary.equal;
        if page.trailing {
            report.trailing_deletes += page.summary.only_in_b.count;
        }

        let plan = ApplyPlan::from_entries(page.changes());
        let stats = executor.apply(source, dest, table, &plan).await?;
        debug!(
            table = %table.name,
            page = report.pages,
            deleted = stats.deleted,
            inserted = stats.inserted,
            statements = stats.statements,
            "page applied"
        );
        report.applied.merge(&stats);

        // a dry run applied nothing, so there is nothing to resume from
        if let (false, Some(key)) = (opts.apply.dry_run, page.max_key()) {
            progress.page_done(table, key)?;
        }
    }

    report.last_key = differ.last_key().cloned();
    report.elapsed = started.elapsed();
    info!(
        table = %table.name,
        rows = report.source_rows,
        inserts = report.inserts,
        deletes = report.deletes,
        updates = report.updates,
        "Synced table {} in {:.1}s ({:.1} krows/s){}",
        table.name,
        report.elapsed.as_secs_f64(),
        report.krows_per_sec(),
        if report.is_clean() { ", no differences" } else { "" }
    );
    if report.applied.discrepancies > 0 {
        warn!(
            table = %table.name,
            discrepancies = report.applied.discrepancies,
            "Table synced with affected-row discrepancies"
        );
    }
    progress.table_done(&report)?;
    Ok(report)
}

/// Why `table` cannot be synced between the two schemas, if anything.
fn skip_reason(table: &TableDefinition, dest_schema: &DatabaseSchema) -> Option<String> {
    if let Err(reason) = table.check_syncable() {
        return Some(reason.to_string());
    }
    let Some(dest_table) = dest_schema.get_table(&table.name) else {
        return Some("missing in destination".to_string());
    };
    if table.column_names() != dest_table.column_names() {
        return Some("column lists differ between source and destination".to_string());
    }
    if table.key_kinds().ok() != dest_table.key_kinds().ok() {
        return Some("primary keys differ between source and destination".to_string());
    }
    None
}

/// Sync every allowed table in name order.
///
/// Destination foreign key checks are off for the whole run unless
/// dry-running, and are restored whatever the outcome.
#[allow(clippy::too_many_arguments)]
pub async fn sync_database<S, D>(
    source: &mut S,
    dest: &mut D,
    source_schema: &DatabaseSchema,
    dest_schema: &DatabaseSchema,
    filter: &TableFilter,
    opts: &SyncOptions,
    start: Option<StartAt>,
    progress: &mut dyn SyncProgress,
) -> Result<DatabaseSyncReport>
where
    S: TableStore + ?Sized,
    D: TableStore + ?Sized,
{
    if opts.apply.dry_run {
        return sync_tables(source, dest, source_schema, dest_schema, filter, opts, start, progress)
            .await;
    }
    suspend_foreign_key_checks(dest).await?;
    let outcome =
        sync_tables(source, dest, source_schema, dest_schema, filter, opts, start, progress).await;
    restore_foreign_key_checks(dest, outcome).await
}

#[allow(clippy::too_many_arguments)]
async fn sync_tables<S, D>(
    source: &mut S,
    dest: &mut D,
    source_schema: &DatabaseSchema,
    dest_schema: &DatabaseSchema,
    filter: &TableFilter,
    opts: &SyncOptions,
    start: Option<StartAt>,
    progress: &mut dyn SyncProgress,
) -> Result<DatabaseSyncReport>
where
    S: TableStore + ?Sized,
    D: TableStore + ?Sized,
{
    let mut report = DatabaseSyncReport::default();
    let names = source_schema.table_names();
    info!("Found {} tables in source", names.len());

    for name in names {
        let mut start_after = None;
        if let Some(start) = &start {
            if name < start.table.as_str() {
                debug!(table = name, "before resume point, skipping");
                continue;
            }
            if name == start.table {
                start_after = start.after.clone();
            }
        }
        if !filter.allows(name) {
            debug!(table = name, "excluded by table filter");
            continue;
        }
        let Some(table) = source_schema.get_table(name) else {
            continue;
        };
        if let Some(reason) = skip_reason(table, dest_schema) {
            warn!(table = name, %reason, "Skipping table");
            report.skipped.push(SkippedTable {
                table: name.to_string(),
                reason,
            });
            continue;
        }
        if let Some(key) = &start_after {
            info!(table = name, "Resuming after key {key}");
        }
        let table_report = sync_table(source, dest, table, opts, start_after, progress).await?;
        report.tables.push(table_report);
    }

    let totals = report.totals();
    info!(
        tables = report.tables.len(),
        skipped = report.skipped.len(),
        deleted = totals.deleted,
        inserted = totals.inserted,
        discrepancies = totals.discrepancies,
        "Sync finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_core::{ColumnDefinition, ColumnKind};

    fn table(name: &str, columns: &[&str]) -> TableDefinition {
        let mut defs = vec![
            ColumnDefinition::new("id", "int", ColumnKind::Integer { unsigned: false })
                .primary_key(1),
        ];
        defs.extend(
            columns
                .iter()
                .map(|c| ColumnDefinition::new(*c, "varchar", ColumnKind::Text)),
        );
        TableDefinition::new(name, defs)
    }

    #[test]
    fn test_skip_reason() {
        let dest = DatabaseSchema::new(vec![table("users", &["email"])], vec![]);
        assert_eq!(skip_reason(&table("users", &["email"]), &dest), None);
        assert_eq!(
            skip_reason(&table("orders", &[]), &dest).as_deref(),
            Some("missing in destination")
        );
        assert!(skip_reason(&table("users", &["email", "name"]), &dest).is_some());
        let keyless = TableDefinition::new(
            "users",
            vec![ColumnDefinition::new("email", "varchar", ColumnKind::Text)],
        );
        assert!(skip_reason(&keyless, &dest).is_some());
    }

    #[test]
    fn test_krows_per_sec() {
        let report = TableSyncReport {
            source_rows: 50_000,
            elapsed: Duration::from_secs(2),
            ..Default::default()
        };
        assert!((report.krows_per_sec() - 25.0).abs() < 1e-9);
        assert_eq!(TableSyncReport::default().krows_per_sec(), 0.0);
    }
}

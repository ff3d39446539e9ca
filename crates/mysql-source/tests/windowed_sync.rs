//! Windowed diff and batched apply against in-memory stores.

mod common;

use anyhow::Result;
use common::*;
use rowsync_core::{CellValue, RowKey, TableDefinition, TableFilter};
use rowsync_mysql::testing::MemoryStore;
use rowsync_mysql::{
    sync_database, sync_table, ApplyOptions, NoProgress, StartAt, SyncOptions, SyncProgress,
    TableSyncReport, WindowOptions,
};
use tracing::info;

fn opts(page_size: usize) -> SyncOptions {
    SyncOptions {
        window: WindowOptions {
            page_size,
            sweep_trailing: false,
        },
        apply: ApplyOptions::default(),
    }
}

fn users_table() -> TableDefinition {
    shop_schema().get_table("users").unwrap().clone()
}

async fn sync_users(
    source: &mut MemoryStore,
    dest: &mut MemoryStore,
    opts: &SyncOptions,
) -> Result<TableSyncReport> {
    sync_table(source, dest, &users_table(), opts, None, &mut NoProgress).await
}

#[derive(Default)]
struct RecordingProgress {
    pages: Vec<(String, RowKey)>,
    tables: Vec<String>,
}

impl SyncProgress for RecordingProgress {
    fn page_done(&mut self, table: &TableDefinition, last_key: &RowKey) -> Result<()> {
        self.pages.push((table.name.clone(), last_key.clone()));
        Ok(())
    }

    fn table_done(&mut self, report: &TableSyncReport) -> Result<()> {
        self.tables.push(report.table.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_missing_row_is_inserted() -> Result<()> {
    init_logging();
    let mut source = store("source");
    let mut dest = store("destination");
    seed_users(&mut source, &mut dest, 10);
    dest.remove("users", &RowKey::int(5));

    let report = sync_users(&mut source, &mut dest, &opts(3)).await?;
    info!("first pass: {report:?}");
    assert_eq!(report.pages, 4);
    assert_eq!(report.inserts, 1);
    assert_eq!(report.deletes, 0);
    assert_eq!(report.updates, 0);
    assert_eq!(report.applied.inserted, 1);
    assert_eq!(dest.row("users", &RowKey::int(5)), source.row("users", &RowKey::int(5)));

    let again = sync_users(&mut source, &mut dest, &opts(3)).await?;
    assert!(again.is_clean());
    assert_eq!(again.equal, 10);
    Ok(())
}

#[tokio::test]
async fn test_changed_row_is_replaced() -> Result<()> {
    init_logging();
    let mut source = store("source");
    let mut dest = store("destination");
    seed_users(&mut source, &mut dest, 10);
    dest.put("users", user(7, "stale"))?;

    let report = sync_users(&mut source, &mut dest, &opts(4)).await?;
    assert_eq!(report.updates, 1);
    assert_eq!(report.applied.deleted, 1);
    assert_eq!(report.applied.inserted, 1);
    assert_eq!(report.applied.discrepancies, 0);
    assert_eq!(
        dest.row("users", &RowKey::int(7)),
        Some(&user(7, "user7"))
    );
    Ok(())
}

#[tokio::test]
async fn test_extra_destination_row_within_source_range_is_deleted() -> Result<()> {
    init_logging();
    let mut source = store("source");
    let mut dest = store("destination");
    for id in [1, 2, 3, 5] {
        source.put("users", user(id, "u"))?;
        dest.put("users", user(id, "u"))?;
    }
    dest.put("users", user(4, "orphan"))?;
    dest.put("users", user(100, "beyond"))?;

    let report = sync_users(&mut source, &mut dest, &opts(10)).await?;
    assert_eq!(report.deletes, 1);
    assert!(dest.row("users", &RowKey::int(4)).is_none());
    // Keys past the source maximum fall in no window.
    assert!(dest.row("users", &RowKey::int(100)).is_some());
    assert_eq!(report.trailing_deletes, 0);
    Ok(())
}

#[tokio::test]
async fn test_trailing_sweep_deletes_keys_past_source_max() -> Result<()> {
    init_logging();
    let mut source = store("source");
    let mut dest = store("destination");
    seed_users(&mut source, &mut dest, 3);
    for id in 100..105 {
        dest.put("users", user(id, "beyond"))?;
    }
    let mut sweeping = opts(2);
    sweeping.window.sweep_trailing = true;

    let report = sync_users(&mut source, &mut dest, &sweeping).await?;
    assert_eq!(report.deletes, 5);
    assert_eq!(report.trailing_deletes, 5);
    assert_eq!(dest.keys("users"), source.keys("users"));
    Ok(())
}

#[tokio::test]
async fn test_trailing_sweep_on_empty_source() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    dest.put("users", user(1, "only here"))?;
    let mut sweeping = opts(10);
    sweeping.window.sweep_trailing = true;

    let report = sync_users(&mut source, &mut dest, &sweeping).await?;
    assert_eq!(report.trailing_deletes, 1);
    assert!(dest.is_empty("users"));
    Ok(())
}

#[tokio::test]
async fn test_float_noise_is_not_a_difference() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    source.put("users", user_with_score(1, "a", 10.0))?;
    dest.put("users", user_with_score(1, "a", 10.005))?;

    let report = sync_users(&mut source, &mut dest, &opts(10)).await?;
    assert!(report.is_clean());
    assert_eq!(report.equal, 1);
    assert_eq!(dest.statements(), 0);
    Ok(())
}

#[tokio::test]
async fn test_empty_tables_yield_nothing() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    let report = sync_users(&mut source, &mut dest, &opts(10)).await?;
    assert_eq!(report.pages, 0);
    assert!(report.is_clean());
    assert_eq!(report.equal, 0);
    Ok(())
}

#[tokio::test]
async fn test_sync_converges_across_pages() -> Result<()> {
    init_logging();
    let mut source = store("source");
    let mut dest = store("destination");
    seed_users(&mut source, &mut dest, 50);
    for id in (1..=50).step_by(7) {
        dest.remove("users", &RowKey::int(id));
    }
    for id in (3..=50).step_by(5) {
        dest.put("users", user(id, "drifted"))?;
    }
    for id in [11, 23, 37] {
        source.remove("users", &RowKey::int(id));
    }

    let first = sync_users(&mut source, &mut dest, &opts(6)).await?;
    assert!(!first.is_clean());
    assert_eq!(first.applied.discrepancies, 0);

    let second = sync_users(&mut source, &mut dest, &opts(6)).await?;
    assert!(second.is_clean(), "second pass found {second:?}");
    assert_eq!(dest.keys("users"), source.keys("users"));
    Ok(())
}

#[tokio::test]
async fn test_payload_budget_splits_inserts() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    for id in 1..=6 {
        source.put("users", user(id, &"n".repeat(40)))?;
    }
    let mut small = opts(100);
    small.apply.max_payload_bytes = 100;

    let report = sync_users(&mut source, &mut dest, &small).await?;
    assert_eq!(report.applied.inserted, 6);
    assert!(report.applied.statements >= 3, "{:?}", report.applied);
    assert_eq!(dest.len("users"), 6);
    Ok(())
}

#[tokio::test]
async fn test_zero_dates_normalized_before_insert() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    let mut row = user(1, "old");
    row[3] = CellValue::ZeroDate;
    source.put("users", row)?;

    let report = sync_users(&mut source, &mut dest, &opts(10)).await?;
    assert_eq!(report.applied.normalized, 1);
    let written = dest.row("users", &RowKey::int(1)).unwrap();
    assert_eq!(written[3], CellValue::Null);
    Ok(())
}

#[tokio::test]
async fn test_dry_run_writes_nothing() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    seed_users(&mut source, &mut dest, 5);
    dest.remove("users", &RowKey::int(2));
    dest.put("users", user(4, "stale"))?;
    let mut dry = opts(10);
    dry.apply.dry_run = true;

    let report = sync_users(&mut source, &mut dest, &dry).await?;
    assert_eq!(report.inserts, 1);
    assert_eq!(report.updates, 1);
    assert_eq!(report.applied.inserted, 2);
    assert_eq!(report.applied.deleted, 1);
    assert_eq!(dest.statements(), 0);
    assert!(dest.row("users", &RowKey::int(2)).is_none());
    Ok(())
}

#[tokio::test]
async fn test_sync_database_skips_and_restores_checks() -> Result<()> {
    init_logging();
    let mut source = store("source");
    let mut dest = store("destination");
    seed_users(&mut source, &mut dest, 4);
    source.put("orders", order(1, Some(2), "first"))?;
    source.put("orders", order(2, Some(3), "second"))?;
    let schema = shop_schema();
    let mut progress = RecordingProgress::default();

    let report = sync_database(
        &mut source,
        &mut dest,
        &schema,
        &schema,
        &TableFilter::new(vec![], vec!["ledger".to_string()]),
        &opts(10),
        None,
        &mut progress,
    )
    .await?;

    assert_eq!(dest.foreign_key_history(), &[false, true]);
    assert!(dest.foreign_key_checks());
    assert_eq!(dest.len("orders"), 2);
    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.table.as_str()).collect();
    assert_eq!(skipped, vec!["places"]);
    assert!(!progress.tables.contains(&"ledger".to_string()));
    assert!(progress
        .pages
        .contains(&("orders".to_string(), RowKey::int(2))));
    Ok(())
}

#[tokio::test]
async fn test_sync_database_resumes_after_key() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    for id in 1..=6 {
        source.put("users", user(id, "u"))?;
        source.put("orders", order(id, None, "o"))?;
    }
    let schema = shop_schema();
    let start = StartAt {
        table: "users".to_string(),
        after: Some(RowKey::int(4)),
    };

    let report = sync_database(
        &mut source,
        &mut dest,
        &schema,
        &schema,
        &TableFilter::new(vec!["orders".to_string(), "users".to_string()], vec![]),
        &opts(10),
        Some(start),
        &mut NoProgress,
    )
    .await?;

    // "orders" sorts before the resume table and is not revisited.
    assert_eq!(report.tables.len(), 1);
    assert!(dest.is_empty("orders"));
    assert_eq!(dest.keys("users"), vec![RowKey::int(5), RowKey::int(6)]);
    Ok(())
}

#[tokio::test]
async fn test_checks_restored_when_sync_fails() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    source.put("users", user(1, "u"))?;
    dest.fail_inserts_into("users");
    let schema = shop_schema();

    let err = sync_database(
        &mut source,
        &mut dest,
        &schema,
        &schema,
        &TableFilter::default(),
        &opts(10),
        None,
        &mut NoProgress,
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("insert into 'users' failed"));
    assert_eq!(dest.foreign_key_history(), &[false, true]);
    assert!(dest.foreign_key_checks());
    Ok(())
}

#[tokio::test]
async fn test_restore_failure_keeps_original_error() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    source.put("users", user(1, "u"))?;
    dest.fail_inserts_into("users");
    dest.fail_enabling_checks();
    let schema = shop_schema();

    let err = sync_database(
        &mut source,
        &mut dest,
        &schema,
        &schema,
        &TableFilter::default(),
        &opts(10),
        None,
        &mut NoProgress,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("insert into 'users' failed"));

    // With a successful body the restore failure is the error.
    let mut clean_dest = store("destination");
    clean_dest.fail_enabling_checks();
    let err = sync_database(
        &mut source,
        &mut clean_dest,
        &schema,
        &schema,
        &TableFilter::default(),
        &opts(10),
        None,
        &mut NoProgress,
    )
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("re-enable foreign key checks"));
    Ok(())
}

#[tokio::test]
async fn test_descending_source_aborts_before_any_write() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    for id in 1..=4 {
        source.put("users", user(id, "fresh"))?;
    }
    dest.put("users", user(2, "stale"))?;
    source.descending_fingerprints("users");
    let schema = shop_schema();

    let err = sync_database(
        &mut source,
        &mut dest,
        &schema,
        &schema,
        &TableFilter::default(),
        &opts(10),
        None,
        &mut NoProgress,
    )
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("not ascending"));
    assert_eq!(dest.keys("users"), vec![RowKey::int(2)]);
    assert_eq!(dest.row("users", &RowKey::int(2)), Some(&user(2, "stale")));
    assert_eq!(dest.statements(), 0);
    assert_eq!(dest.foreign_key_history(), &[false, true]);
    Ok(())
}

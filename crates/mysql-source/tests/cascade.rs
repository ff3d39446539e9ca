//! Foreign-key cascade walks against in-memory stores.

mod common;

use anyhow::Result;
use common::*;
use rowsync_core::{CellValue, RowKey};
use rowsync_mysql::{ApplyExecutor, ApplyOptions, CascadeWalker};

fn walker_options() -> ApplyOptions {
    ApplyOptions {
        batch_size: 2,
        ..ApplyOptions::default()
    }
}

#[tokio::test]
async fn test_cascade_syncs_parent_then_each_child_table() -> Result<()> {
    init_logging();
    let mut source = store("source");
    let mut dest = store("destination");
    seed_users(&mut source, &mut dest, 3);
    source.put("users", user(1, "renamed"))?;
    source.put("orders", order(10, Some(1), "current"))?;
    source.put("reviews", review(20, 1, "great"))?;
    dest.put("orders", order(10, Some(1), "stale"))?;
    // rows of other users are out of scope
    source.put("orders", order(11, Some(2), "other"))?;
    dest.put("reviews", review(21, 2, "untouched"))?;

    let schema = shop_schema();
    let walker = CascadeWalker::new(&schema, ApplyExecutor::new(walker_options()));
    let report = walker
        .run(&mut source, &mut dest, "users", vec![RowKey::int(1)])
        .await?;

    let steps: Vec<(&str, usize)> = report
        .steps
        .iter()
        .map(|s| (s.table.as_str(), s.depth))
        .collect();
    assert_eq!(steps, vec![("users", 0), ("orders", 1), ("reviews", 1)]);
    assert_eq!(report.steps[1].via.as_deref(), Some("fk_orders_user"));
    assert_eq!(report.steps[2].source_keys, 1);
    assert_eq!(report.steps[2].destination_keys, 0);

    assert_eq!(dest.row("users", &RowKey::int(1)), Some(&user(1, "renamed")));
    assert_eq!(
        dest.row("orders", &RowKey::int(10)),
        Some(&order(10, Some(1), "current"))
    );
    assert!(dest.row("reviews", &RowKey::int(20)).is_some());
    assert!(dest.row("orders", &RowKey::int(11)).is_none());
    assert!(dest.row("reviews", &RowKey::int(21)).is_some());
    assert_eq!(dest.foreign_key_history(), &[false, true]);
    assert_eq!(report.totals().discrepancies, 0);
    Ok(())
}

#[tokio::test]
async fn test_cascade_removes_rows_gone_from_source() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    dest.put("users", user(9, "deleted upstream"))?;
    dest.put("orders", order(90, Some(9), "orphan"))?;
    dest.put("orders", order(91, Some(9), "orphan"))?;

    let schema = shop_schema();
    let walker = CascadeWalker::new(&schema, ApplyExecutor::new(walker_options()));
    let report = walker
        .run(&mut source, &mut dest, "users", vec![RowKey::int(9)])
        .await?;

    assert!(dest.is_empty("users"));
    assert!(dest.is_empty("orders"));
    assert_eq!(report.totals().deleted, 3);
    assert_eq!(report.totals().inserted, 0);
    Ok(())
}

#[tokio::test]
async fn test_self_referencing_cycle_terminates() -> Result<()> {
    init_logging();
    let mut source = store("source");
    let mut dest = store("destination");
    let category = |id: i64, parent: i64, label: &str| {
        vec![
            CellValue::Int(id),
            CellValue::Int(parent),
            CellValue::Text(label.to_string()),
        ]
    };
    // 1 -> 3 -> 2 -> 1
    source.put("categories", category(1, 3, "root"))?;
    source.put("categories", category(2, 1, "child"))?;
    source.put("categories", category(3, 2, "grandchild"))?;
    dest.put("categories", category(2, 1, "old child"))?;

    let schema = shop_schema();
    let walker = CascadeWalker::new(&schema, ApplyExecutor::new(walker_options()));
    let report = walker
        .run(&mut source, &mut dest, "categories", vec![RowKey::int(1)])
        .await?;

    assert_eq!(report.steps.len(), 3);
    assert_eq!(report.max_depth(), 2);
    assert_eq!(dest.keys("categories"), source.keys("categories"));
    assert_eq!(
        dest.row("categories", &RowKey::int(2)),
        source.row("categories", &RowKey::int(2))
    );
    Ok(())
}

#[tokio::test]
async fn test_two_table_cycle_terminates() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    source.put("left_side", vec![CellValue::Int(1), CellValue::Int(1)])?;
    source.put("right_side", vec![CellValue::Int(1), CellValue::Int(1)])?;

    let schema = shop_schema();
    let walker = CascadeWalker::new(&schema, ApplyExecutor::new(walker_options()));
    let report = walker
        .run(&mut source, &mut dest, "left_side", vec![RowKey::int(1)])
        .await?;

    let tables: Vec<&str> = report.steps.iter().map(|s| s.table.as_str()).collect();
    assert_eq!(tables, vec!["left_side", "right_side"]);
    assert_eq!(dest.len("left_side"), 1);
    assert_eq!(dest.len("right_side"), 1);
    Ok(())
}

#[tokio::test]
async fn test_non_key_reference_reads_parent_rows() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    let account = vec![CellValue::Int(1), CellValue::Text("ACC-1".into())];
    source.put("accounts", account.clone())?;
    dest.put("accounts", account)?;
    let entry = |id: i64, amount: i64| {
        vec![
            CellValue::Int(id),
            CellValue::Text("ACC-1".into()),
            CellValue::Int(amount),
        ]
    };
    source.put("ledger", entry(1, 5))?;
    source.put("ledger", entry(2, 7))?;
    dest.put("ledger", entry(3, 9))?;

    let schema = shop_schema();
    let walker = CascadeWalker::new(&schema, ApplyExecutor::new(walker_options()));
    let report = walker
        .run(&mut source, &mut dest, "accounts", vec![RowKey::int(1)])
        .await?;

    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[1].table, "ledger");
    assert_eq!(report.steps[1].source_keys, 2);
    assert_eq!(report.steps[1].destination_keys, 1);
    assert_eq!(dest.keys("ledger"), vec![RowKey::int(1), RowKey::int(2)]);
    Ok(())
}

#[tokio::test]
async fn test_null_references_are_not_followed() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    source.put("users", user(1, "u"))?;
    source.put("orders", order(5, None, "guest checkout"))?;

    let schema = shop_schema();
    let walker = CascadeWalker::new(&schema, ApplyExecutor::new(walker_options()));
    let report = walker
        .run(&mut source, &mut dest, "users", vec![RowKey::int(1)])
        .await?;

    assert_eq!(report.steps.len(), 1);
    assert!(dest.is_empty("orders"));
    Ok(())
}

#[tokio::test]
async fn test_dry_run_cascade_leaves_destination_alone() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    source.put("users", user(1, "u"))?;
    source.put("orders", order(10, Some(1), "o"))?;

    let schema = shop_schema();
    let opts = ApplyOptions {
        dry_run: true,
        ..walker_options()
    };
    let walker = CascadeWalker::new(&schema, ApplyExecutor::new(opts));
    let report = walker
        .run(&mut source, &mut dest, "users", vec![RowKey::int(1)])
        .await?;

    assert_eq!(report.totals().inserted, 2);
    assert!(dest.is_empty("users"));
    assert!(dest.foreign_key_history().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unsyncable_root_is_an_error() -> Result<()> {
    let mut source = store("source");
    let mut dest = store("destination");
    let schema = shop_schema();
    let walker = CascadeWalker::new(&schema, ApplyExecutor::new(walker_options()));

    let err = walker
        .run(&mut source, &mut dest, "places", vec![RowKey::int(1)])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cannot be reconciled"));
    // checks were still restored
    assert_eq!(dest.foreign_key_history(), &[false, true]);
    Ok(())
}

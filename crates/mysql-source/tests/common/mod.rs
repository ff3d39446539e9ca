//! Shared fixtures for the reconciliation integration tests.
#![allow(dead_code)]

use chrono::NaiveDate;
use rowsync_core::{
    CellValue, ColumnDefinition, ColumnKind, ColumnPair, DatabaseSchema, ForeignKey,
    TableDefinition,
};
use rowsync_mysql::testing::MemoryStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging for tests
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn int(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, "int", ColumnKind::Integer { unsigned: false })
}

fn text(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, "varchar", ColumnKind::Text)
}

fn fk(name: &str, child: &str, child_col: &str, parent: &str, parent_col: &str) -> ForeignKey {
    ForeignKey {
        name: name.to_string(),
        parent_table: parent.to_string(),
        child_table: child.to_string(),
        columns: vec![ColumnPair {
            parent: parent_col.to_string(),
            child: child_col.to_string(),
        }],
    }
}

/// users ← orders, users ← reviews, categories ← categories,
/// accounts(code) ← ledger, and a two-table cycle left ↔ right.
pub fn shop_schema() -> DatabaseSchema {
    DatabaseSchema::new(
        vec![
            TableDefinition::new(
                "users",
                vec![
                    int("id").primary_key(1),
                    text("name"),
                    ColumnDefinition::new("score", "double", ColumnKind::Float).nullable(),
                    ColumnDefinition::new("created", "datetime", ColumnKind::DateTime).nullable(),
                ],
            ),
            TableDefinition::new(
                "orders",
                vec![int("id").primary_key(1), int("user_id").nullable(), text("note")],
            ),
            TableDefinition::new(
                "reviews",
                vec![int("id").primary_key(1), int("user_id"), text("body")],
            ),
            TableDefinition::new(
                "categories",
                vec![int("id").primary_key(1), int("parent_id").nullable(), text("label")],
            ),
            TableDefinition::new("accounts", vec![int("id").primary_key(1), text("code")]),
            TableDefinition::new(
                "ledger",
                vec![int("id").primary_key(1), text("account_code"), int("amount")],
            ),
            TableDefinition::new(
                "left_side",
                vec![int("id").primary_key(1), int("right_id").nullable()],
            ),
            TableDefinition::new(
                "right_side",
                vec![int("id").primary_key(1), int("left_id").nullable()],
            ),
            TableDefinition::new(
                "places",
                vec![
                    int("id").primary_key(1),
                    ColumnDefinition::new("shape", "geometry", ColumnKind::Geometry),
                ],
            ),
        ],
        vec![
            fk("fk_orders_user", "orders", "user_id", "users", "id"),
            fk("fk_reviews_user", "reviews", "user_id", "users", "id"),
            fk("fk_categories_parent", "categories", "parent_id", "categories", "id"),
            fk("fk_ledger_account", "ledger", "account_code", "accounts", "code"),
            fk("fk_left_right", "left_side", "right_id", "right_side", "id"),
            fk("fk_right_left", "right_side", "left_id", "left_side", "id"),
        ],
    )
}

pub fn store(label: &str) -> MemoryStore {
    MemoryStore::new(label, shop_schema())
}

pub fn user(id: i64, name: &str) -> Vec<CellValue> {
    vec![
        CellValue::Int(id),
        CellValue::Text(name.to_string()),
        CellValue::Null,
        CellValue::DateTime(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .expect("valid datetime"),
        ),
    ]
}

pub fn user_with_score(id: i64, name: &str, score: f64) -> Vec<CellValue> {
    let mut row = user(id, name);
    row[2] = CellValue::Float(score);
    row
}

pub fn order(id: i64, user_id: Option<i64>, note: &str) -> Vec<CellValue> {
    vec![
        CellValue::Int(id),
        user_id.map_or(CellValue::Null, CellValue::Int),
        CellValue::Text(note.to_string()),
    ]
}

pub fn review(id: i64, user_id: i64, body: &str) -> Vec<CellValue> {
    vec![
        CellValue::Int(id),
        CellValue::Int(user_id),
        CellValue::Text(body.to_string()),
    ]
}

/// Seed `count` users with ids `1..=count` into both stores.
pub fn seed_users(source: &mut MemoryStore, dest: &mut MemoryStore, count: i64) {
    for id in 1..=count {
        let name = format!("user{id}");
        source.put("users", user(id, &name)).unwrap();
        dest.put("users", user(id, &name)).unwrap();
    }
}

//! One driver per subcommand.
//!
//! Each driver resolves its configuration, opens the connections it needs,
//! runs the library operation and logs the outcome. Differences found
//! between databases are output, not errors; only failures to run end in
//! an error.

pub mod audit;
pub mod cascade;
pub mod compare;
pub mod sync;

pub use audit::{run_audit, AuditArgs};
pub use cascade::{run_cascade, CascadeArgs};
pub use compare::{run_compare, CompareArgs};
pub use sync::{run_sync, SyncArgs};

use anyhow::{Context, Result};
use mysql_async::Pool;
use rowsync_core::{DatabaseSchema, KeyCodec, RowKey};
use rowsync_mysql::{new_mysql_pool, sanitize_connection_string, MySqlStore, TableStore};
use tracing::{info, warn};

/// A pool plus the single session a [`MySqlStore`] runs on.
pub(crate) struct Connected {
    pool: Pool,
    pub store: MySqlStore,
    pub schema: DatabaseSchema,
}

impl Connected {
    pub async fn open(label: &str, url: &str) -> Result<Self> {
        info!("Connecting to {label} database {}", sanitize_connection_string(url));
        let pool = new_mysql_pool(url)?;
        let mut store = MySqlStore::connect(label, &pool).await?;
        let schema = store
            .load_schema()
            .await
            .with_context(|| format!("Failed to read {label} schema"))?;
        info!("{label}: {} tables", schema.tables.len());
        Ok(Self {
            pool,
            store,
            schema,
        })
    }

    pub async fn close(self) -> Result<()> {
        drop(self.store.into_conn());
        self.pool
            .disconnect()
            .await
            .context("Failed to close connection pool")?;
        Ok(())
    }
}

/// Close every connection, then hand back the outcome of the run.
pub(crate) async fn finish<T>(outcome: Result<T>, sides: Vec<Connected>) -> Result<T> {
    let mut closed = Vec::with_capacity(sides.len());
    for side in sides {
        let label = side.store.label().to_string();
        closed.push((label, side.close().await));
    }
    settle(outcome, closed)
}

/// A failed close is logged; it never replaces the outcome.
fn settle<T>(outcome: Result<T>, closed: Vec<(String, Result<()>)>) -> Result<T> {
    for (label, result) in closed {
        if let Err(e) = result {
            warn!("Failed to close {label} connection: {e:#}");
        }
    }
    outcome
}

pub(crate) fn table_codec(schema: &DatabaseSchema, table: &str) -> Result<KeyCodec> {
    let definition = schema.require_table(table)?;
    definition
        .key_codec()
        .map_err(|reason| anyhow::anyhow!("table '{table}' cannot be reconciled: {reason}"))
}

/// Decode `--key` values with the table's key codec.
pub(crate) fn parse_keys(codec: &KeyCodec, table: &str, raw: &[String]) -> Result<Vec<RowKey>> {
    raw.iter()
        .map(|text| {
            codec
                .decode(text)
                .with_context(|| format!("Invalid key '{text}' for table '{table}'"))
        })
        .collect()
}

//! Live MySQL reconciliation for rowsync.
//!
//! Everything here talks to a database through [`TableStore`]:
//! [`MySqlStore`] for a live server and [`testing::MemoryStore`] for tests.
//!
//! - [`WindowedDiffer`] pages a source table and diffs each page against the
//!   matching destination key range
//! - [`ApplyExecutor`] turns verdicts into bounded delete and insert batches
//! - [`CascadeWalker`] re-syncs rows along foreign keys
//! - [`audit_database`] and [`compare_audits`] persist and compare audits

pub mod apply;
pub mod audit;
pub mod cascade;
mod client;
pub mod compare;
pub mod fingerprint;
mod guard;
pub mod pager;
mod schema;
pub mod store;
pub mod sync;
pub mod testing;
pub mod window;

pub use apply::{ApplyExecutor, ApplyOptions, ApplyPlan, ApplyStats};
pub use audit::{audit_database, AuditOptions, AuditReport};
pub use cascade::{CascadeReport, CascadeStep, CascadeWalker, SkippedTable};
pub use client::{new_mysql_pool, sanitize_connection_string, ConnectionTarget};
pub use compare::{
    compare_audits, drill_into, log_report, ColumnDifference, CompareOptions, CompareReport,
    DrillDown, TableComparison,
};
pub use fingerprint::{checksum_expr, column_expr, FingerprintQuery};
pub use guard::{restore_foreign_key_checks, suspend_foreign_key_checks};
pub use pager::FingerprintPager;
pub use schema::collect_mysql_database_schema;
pub use store::{MySqlStore, TableStore};
pub use sync::{
    sync_database, sync_table, DatabaseSyncReport, NoProgress, StartAt, SyncOptions, SyncProgress,
    TableSyncReport,
};
pub use window::{WindowOptions, WindowPage, WindowedDiffer};

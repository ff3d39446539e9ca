//! Core types and algorithms for rowsync.
//!
//! This crate holds everything that does not need a live database:
//!
//! - [`DatabaseSchema`] - tables, columns, primary and foreign keys
//! - [`RowKey`] and [`KeyCodec`] - ordered key tuples and their text form
//! - [`MergeDiff`] - the sorted-stream differ over two fingerprint streams
//! - [`KeyColumns`] - parameterized key-set and key-range predicates
//! - [`PayloadBudget`] - insert batching by approximate wire size
//! - [`EquivalenceRules`] - relaxed column value comparison
//! - [`audit`] - manifest, per-table fingerprint files and rollups
//!
//! # Architecture
//!
//! ```text
//! rowsync-core (this crate)
//!    │
//!    ├─── mysql-types     (catalog type mapping, value decode/encode)
//!    │
//!    └─── rowsync-mysql   (metadata, fingerprint SQL, differ drivers)
//! ```
//!
//! # Example
//!
//! ```rust
//! use rowsync_core::{diff_sorted, DiffVerdict, RowFingerprint, RowKey};
//!
//! let source = vec![RowFingerprint::new(RowKey::int(5), "a1")];
//! let dest: Vec<RowFingerprint> = Vec::new();
//! let (entries, summary) = diff_sorted(&source, &dest).unwrap();
//! assert_eq!(entries[0].verdict, DiffVerdict::Insert);
//! assert_eq!(summary.only_in_a.count, 1);
//! ```

pub mod audit;
pub mod diff;
pub mod equivalence;
pub mod filter;
pub mod fingerprint;
pub mod key;
pub mod normalize;
pub mod payload;
pub mod predicate;
pub mod schema;
pub mod types;
pub mod values;

// Re-exports for convenience
pub use audit::{
    AuditFileError, AuditTableWriter, FingerprintReader, Manifest, ManifestEntry,
    RollupAccumulator,
};
pub use diff::{
    diff_sorted, DiffEntry, DiffError, DiffSummary, DiffVerdict, Divergence, KeyRun, MergeDiff,
    RowFingerprint, Side,
};
pub use equivalence::{CompareResult, EquivalenceRule, EquivalenceRules};
pub use filter::TableFilter;
pub use fingerprint::{round_significant, row_checksum, NULL_SENTINEL};
pub use key::{KeyCodec, KeyError, KeyPart, RowKey};
pub use normalize::{normalize_row, normalize_rows};
pub use payload::{estimated_row_size, estimated_size, PayloadBudget};
pub use predicate::{quote_ident, tuple_set_predicate, ColumnRef, KeyColumns, KeyRange, SqlFragment};
pub use schema::{
    ColumnDefinition, ColumnPair, DatabaseSchema, ForeignKey, ForeignKeyIndex, SchemaError,
    SkipReason, TableDefinition,
};
pub use types::{ColumnKind, KeyKind};
pub use values::{CellValue, TableRow};

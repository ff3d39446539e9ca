//! Batched apply executor.
//!
//! Turns diff verdicts into bounded delete and insert statements against
//! the destination. Updates are realized as delete then insert of the same
//! key, and all deletes of a plan run before its inserts.

use crate::store::TableStore;
use anyhow::Result;
use rowsync_core::{
    estimated_row_size, normalize_rows, DiffEntry, DiffVerdict, PayloadBudget, RowKey,
    TableDefinition,
};
use tracing::{debug, warn};

/// Largest number of keys quoted in a discrepancy warning.
const KEY_PREVIEW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Keys per delete statement and per source re-select
    pub batch_size: usize,
    /// Maximum approximate payload of one insert statement
    pub max_payload_bytes: usize,
    /// Count operations without writing
    pub dry_run: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_payload_bytes: 16 * 1024 * 1024,
            dry_run: false,
        }
    }
}

/// Keys to delete from and insert into the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyPlan {
    pub deletes: Vec<RowKey>,
    pub inserts: Vec<RowKey>,
}

impl ApplyPlan {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a DiffEntry>) -> Self {
        let mut plan = Self::default();
        for entry in entries {
            match entry.verdict {
                DiffVerdict::Insert => plan.inserts.push(entry.key.clone()),
                DiffVerdict::Delete => plan.deletes.push(entry.key.clone()),
                DiffVerdict::Update => {
                    plan.deletes.push(entry.key.clone());
                    plan.inserts.push(entry.key.clone());
                }
                DiffVerdict::Equal => {}
            }
        }
        plan
    }

    /// Re-sync exactly `keys`: delete them wherever they exist and insert
    /// whatever the source holds.
    pub fn resync(keys: Vec<RowKey>) -> Self {
        Self {
            deletes: keys.clone(),
            inserts: keys,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub deleted: u64,
    pub inserted: u64,
    pub statements: u64,
    /// Statements whose affected-row count did not match
    pub discrepancies: u64,
    /// Cells replaced by NULL before inserting
    pub normalized: u64,
    /// Insert keys the source no longer had when re-selected
    pub missing_in_source: u64,
}

impl ApplyStats {
    pub fn merge(&mut self, other: &ApplyStats) {
        self.deleted += other.deleted;
        self.inserted += other.inserted;
        self.statements += other.statements;
        self.discrepancies += other.discrepancies;
        self.normalized += other.normalized;
        self.missing_in_source += other.missing_in_source;
    }
}

fn key_preview(keys: &[RowKey]) -> String {
    let shown: Vec<String> = keys.iter().take(KEY_PREVIEW).map(|k| k.to_string()).collect();
    if keys.len() > KEY_PREVIEW {
        format!("[{}, ... {} more]", shown.join("; "), keys.len() - KEY_PREVIEW)
    } else {
        format!("[{}]", shown.join("; "))
    }
}

pub struct ApplyExecutor {
    opts: ApplyOptions,
    budget: PayloadBudget,
}

impl ApplyExecutor {
    pub fn new(opts: ApplyOptions) -> Self {
        let opts = ApplyOptions {
            batch_size: opts.batch_size.max(1),
            ..opts
        };
        Self {
            budget: PayloadBudget::new(opts.max_payload_bytes),
            opts,
        }
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.opts
    }

    /// Realize `plan` against `dest`, re-selecting inserted rows from `source`.
    ///
    /// Affected-row mismatches are logged and counted; query failures abort.
    pub async fn apply<S, D>(
        &self,
        source: &mut S,
        dest: &mut D,
        table: &TableDefinition,
        plan: &ApplyPlan,
    ) -> Result<ApplyStats>
    where
        S: TableStore + ?Sized,
        D: TableStore + ?Sized,
    {
        let mut stats = ApplyStats::default();
        if plan.is_empty() {
            return Ok(stats);
        }
        if self.opts.dry_run {
            stats.deleted = plan.deletes.len() as u64;
            stats.inserted = plan.inserts.len() as u64;
            debug!(
                table = %table.name,
                deletes = plan.deletes.len(),
                inserts = plan.inserts.len(),
                "dry run, nothing written"
            );
            return Ok(stats);
        }

        for chunk in plan.deletes.chunks(self.opts.batch_size) {
            let affected = dest.delete_rows(table, chunk).await?;
            stats.statements += 1;
            stats.deleted += affected;
            if affected != chunk.len() as u64 {
                stats.discrepancies += 1;
                warn!(
                    table = %table.name,
                    expected = chunk.len(),
                    affected,
                    "Delete affected unexpected row count for keys {}",
                    key_preview(chunk)
                );
            }
        }

        for chunk in plan.inserts.chunks(self.opts.batch_size) {
            let mut rows = source.fetch_rows(table, chunk).await?;
            if rows.len() < chunk.len() {
                stats.missing_in_source += (chunk.len() - rows.len()) as u64;
                debug!(
                    table = %table.name,
                    requested = chunk.len(),
                    found = rows.len(),
                    "some rows vanished from source before insert"
                );
            }
            stats.normalized += normalize_rows(table, &mut rows) as u64;

            let mut rest = rows.as_slice();
            while !rest.is_empty() {
                let take = self.budget.rows_within(rest);
                let (batch, tail) = rest.split_at(take);
                rest = tail;
                if take == 1 && estimated_row_size(&batch[0]) > self.budget.max_bytes() {
                    warn!(
                        table = %table.name,
                        key = %batch[0].key,
                        size = estimated_row_size(&batch[0]),
                        max = self.budget.max_bytes(),
                        "Row exceeds payload budget, sending it alone"
                    );
                }
                let affected = dest.insert_rows(table, batch).await?;
                stats.statements += 1;
                stats.inserted += affected;
                if affected != batch.len() as u64 {
                    stats.discrepancies += 1;
                    let keys: Vec<RowKey> = batch.iter().map(|r| r.key.clone()).collect();
                    warn!(
                        table = %table.name,
                        expected = batch.len(),
                        affected,
                        "Insert affected unexpected row count for keys {}",
                        key_preview(&keys)
                    );
                }
            }
        }
        Ok(stats)
    }
}

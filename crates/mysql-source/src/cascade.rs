//! Foreign-key cascade walker.
//!
//! Re-syncs a set of root rows and then, breadth first, every row of every
//! child table that references a row synced before it. Each `(table, key)`
//! pair is synced at most once per walk, which bounds reference cycles and
//! self-referencing tables.

use crate::apply::{ApplyExecutor, ApplyPlan, ApplyStats};
use crate::guard::{restore_foreign_key_checks, suspend_foreign_key_checks};
use crate::store::TableStore;
use anyhow::{anyhow, Context, Result};
use rowsync_core::{
    CellValue, DatabaseSchema, ForeignKey, ForeignKeyIndex, RowKey, TableDefinition,
};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

/// One table visited by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeStep {
    pub table: String,
    /// Distance from the root table
    pub depth: usize,
    /// Foreign key that led here; `None` for the root
    pub via: Option<String>,
    pub source_keys: usize,
    pub destination_keys: usize,
    pub stats: ApplyStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTable {
    pub table: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub steps: Vec<CascadeStep>,
    pub skipped: Vec<SkippedTable>,
}

impl CascadeReport {
    pub fn totals(&self) -> ApplyStats {
        let mut total = ApplyStats::default();
        for step in &self.steps {
            total.merge(&step.stats);
        }
        total
    }

    pub fn max_depth(&self) -> usize {
        self.steps.iter().map(|s| s.depth).max().unwrap_or(0)
    }

    fn skip(&mut self, table: &str, reason: String) {
        if self.skipped.iter().any(|s| s.table == table) {
            return;
        }
        warn!(table, %reason, "Skipping table in cascade");
        self.skipped.push(SkippedTable {
            table: table.to_string(),
            reason,
        });
    }
}

struct Pending {
    table: String,
    depth: usize,
    via: Option<String>,
    source_keys: Vec<RowKey>,
    destination_keys: Vec<RowKey>,
}

pub struct CascadeWalker<'s> {
    schema: &'s DatabaseSchema,
    index: ForeignKeyIndex,
    executor: ApplyExecutor,
}

impl<'s> CascadeWalker<'s> {
    pub fn new(schema: &'s DatabaseSchema, executor: ApplyExecutor) -> Self {
        Self {
            schema,
            index: schema.foreign_key_index(),
            executor,
        }
    }

    /// Re-sync `keys` of `root` and everything that references them.
    ///
    /// Destination foreign key checks are off for the duration of the walk
    /// (unless dry-running) and are restored whatever the outcome.
    pub async fn run<S, D>(
        &self,
        source: &mut S,
        dest: &mut D,
        root: &str,
        keys: Vec<RowKey>,
    ) -> Result<CascadeReport>
    where
        S: TableStore + ?Sized,
        D: TableStore + ?Sized,
    {
        if self.executor.options().dry_run {
            return self.walk(source, dest, root, keys).await;
        }
        suspend_foreign_key_checks(dest).await?;
        let outcome = self.walk(source, dest, root, keys).await;
        restore_foreign_key_checks(dest, outcome).await
    }

    async fn walk<S, D>(
        &self,
        source: &mut S,
        dest: &mut D,
        root: &str,
        keys: Vec<RowKey>,
    ) -> Result<CascadeReport>
    where
        S: TableStore + ?Sized,
        D: TableStore + ?Sized,
    {
        let root_table = self.schema.require_table(root)?;
        root_table
            .check_syncable()
            .map_err(|reason| anyhow!("table '{root}' cannot be reconciled: {reason}"))?;
        let batch = self.executor.options().batch_size;
        let key_columns: Vec<String> = root_table
            .key_columns()
            .map_err(|reason| anyhow!("table '{root}' cannot be reconciled: {reason}"))?
            .into_iter()
            .map(|c| c.name.clone())
            .collect();
        let tuples: Vec<Vec<CellValue>> = keys.iter().map(RowKey::to_cells).collect();

        let mut queue = VecDeque::new();
        queue.push_back(Pending {
            table: root.to_string(),
            depth: 0,
            via: None,
            source_keys: select_keys(source, root_table, &key_columns, &tuples, batch).await?,
            destination_keys: select_keys(dest, root_table, &key_columns, &tuples, batch).await?,
        });

        let mut visited: HashSet<(String, RowKey)> = HashSet::new();
        let mut report = CascadeReport::default();

        while let Some(pending) = queue.pop_front() {
            let Some(table) = self.schema.get_table(&pending.table) else {
                report.skip(&pending.table, "not present in schema".to_string());
                continue;
            };
            let unvisited = |keys: Vec<RowKey>| -> Vec<RowKey> {
                keys.into_iter()
                    .filter(|k| !visited.contains(&(table.name.clone(), k.clone())))
                    .collect()
            };
            let source_keys = unvisited(pending.source_keys);
            let destination_keys = unvisited(pending.destination_keys);
            if source_keys.is_empty() && destination_keys.is_empty() {
                debug!(table = %table.name, "all referencing keys already synced");
                continue;
            }
            for key in source_keys.iter().chain(&destination_keys) {
                visited.insert((table.name.clone(), key.clone()));
            }

            // Referenced values are read before the parent rows change.
            let mut children = Vec::new();
            for fk in self.index.children_of(&table.name) {
                let tuples =
                    referenced_tuples(source, dest, table, fk, &source_keys, &destination_keys, batch)
                        .await
                        .with_context(|| format!("Failed to follow foreign key {}", fk.name))?;
                children.push((fk, tuples));
            }

            let plan = ApplyPlan {
                deletes: destination_keys.clone(),
                inserts: source_keys.clone(),
            };
            let stats = self.executor.apply(source, dest, table, &plan).await?;
            info!(
                table = %table.name,
                depth = pending.depth,
                via = pending.via.as_deref().unwrap_or("-"),
                deleted = stats.deleted,
                inserted = stats.inserted,
                "Cascade step synced"
            );
            report.steps.push(CascadeStep {
                table: table.name.clone(),
                depth: pending.depth,
                via: pending.via,
                source_keys: source_keys.len(),
                destination_keys: destination_keys.len(),
                stats,
            });

            for (fk, tuples) in children {
                if tuples.is_empty() {
                    continue;
                }
                let Some(child) = self.schema.get_table(&fk.child_table) else {
                    report.skip(&fk.child_table, "not present in schema".to_string());
                    continue;
                };
                if let Err(reason) = child.check_syncable() {
                    report.skip(&child.name, reason.to_string());
                    continue;
                }
                let columns: Vec<String> =
                    fk.child_columns().into_iter().map(str::to_string).collect();
                queue.push_back(Pending {
                    table: child.name.clone(),
                    depth: pending.depth + 1,
                    via: Some(fk.name.clone()),
                    source_keys: select_keys(source, child, &columns, &tuples, batch).await?,
                    destination_keys: select_keys(dest, child, &columns, &tuples, batch).await?,
                });
            }
        }
        Ok(report)
    }
}

/// Keys of `table` rows whose `columns` match any tuple, sorted and deduplicated.
async fn select_keys<S: TableStore + ?Sized>(
    store: &mut S,
    table: &TableDefinition,
    columns: &[String],
    tuples: &[Vec<CellValue>],
    batch: usize,
) -> Result<Vec<RowKey>> {
    let mut keys = Vec::new();
    for chunk in tuples.chunks(batch.max(1)) {
        keys.extend(store.select_keys(table, columns, chunk).await?);
    }
    keys.sort();
    keys.dedup();
    Ok(keys)
}

/// Values of `fk`'s parent columns for the given parent rows, without
/// NULL-containing tuples and duplicates.
///
/// When the referenced columns are all key columns the values come from
/// the keys; otherwise the parent rows are read from the side each key
/// came from.
async fn referenced_tuples<S, D>(
    source: &mut S,
    dest: &mut D,
    parent: &TableDefinition,
    fk: &ForeignKey,
    source_keys: &[RowKey],
    destination_keys: &[RowKey],
    batch: usize,
) -> Result<Vec<Vec<CellValue>>>
where
    S: TableStore + ?Sized,
    D: TableStore + ?Sized,
{
    let key_names: Vec<String> = parent
        .key_columns()
        .map_err(|reason| anyhow!("table '{}' cannot be reconciled: {reason}", parent.name))?
        .into_iter()
        .map(|c| c.name.clone())
        .collect();
    let key_positions: Option<Vec<usize>> = fk
        .parent_columns()
        .iter()
        .map(|c| key_names.iter().position(|k| k == c))
        .collect();

    let mut raw: Vec<Vec<CellValue>> = Vec::new();
    match key_positions {
        Some(positions) => {
            for key in source_keys.iter().chain(destination_keys) {
                let cells = key.to_cells();
                raw.push(positions.iter().filter_map(|&i| cells.get(i).cloned()).collect());
            }
        }
        None => {
            let positions = fk
                .parent_columns()
                .iter()
                .map(|c| {
                    parent.column_index(c).ok_or_else(|| {
                        anyhow!("column '{c}' of foreign key {} not in '{}'", fk.name, parent.name)
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let mut rows = Vec::new();
            for chunk in source_keys.chunks(batch.max(1)) {
                rows.extend(source.fetch_rows(parent, chunk).await?);
            }
            for chunk in destination_keys.chunks(batch.max(1)) {
                rows.extend(dest.fetch_rows(parent, chunk).await?);
            }
            for row in rows {
                raw.push(positions.iter().filter_map(|&i| row.values.get(i).cloned()).collect());
            }
        }
    }

    Ok(distinct_tuples(raw, fk.columns.len()))
}

/// Drop tuples of the wrong width or holding a NULL, keeping the first
/// occurrence of each remaining tuple.
fn distinct_tuples(raw: Vec<Vec<CellValue>>, width: usize) -> Vec<Vec<CellValue>> {
    // CellValue holds floats, so the Debug rendering stands in for a hash key
    let mut seen = HashSet::with_capacity(raw.len());
    raw.into_iter()
        .filter(|tuple| tuple.len() == width && !tuple.iter().any(CellValue::is_null))
        .filter(|tuple| seen.insert(format!("{tuple:?}")))
        .collect()
}

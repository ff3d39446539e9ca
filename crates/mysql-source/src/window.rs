//! Windowed live differ.
//!
//! Pages through the source table by key, and for every page fetches only
//! the destination rows whose key lies in `(previous page max, page max]`.
//! Memory stays proportional to the page size whatever the table size.
//!
//! Destination keys greater than the source's largest key fall in no page's
//! range and are never reported, unless the trailing sweep is enabled: it
//! pages through the destination past the last source key once the source
//! is exhausted and reports every row found there as a delete.

use crate::store::TableStore;
use anyhow::Result;
use rowsync_core::{
    diff_sorted, DiffEntry, DiffSummary, DiffVerdict, KeyRange, RowFingerprint, RowKey,
    TableDefinition,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOptions {
    /// Source rows per page
    pub page_size: usize,
    /// Sweep destination keys beyond the last source key
    pub sweep_trailing: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            page_size: 5000,
            sweep_trailing: false,
        }
    }
}

/// Verdicts for one key window.
#[derive(Debug, Clone)]
pub struct WindowPage {
    pub range: KeyRange,
    pub source_rows: usize,
    pub destination_rows: usize,
    pub entries: Vec<DiffEntry>,
    pub summary: DiffSummary,
    /// Produced by the trailing sweep rather than a source page
    pub trailing: bool,
}

impl WindowPage {
    /// Largest key covered by this window.
    pub fn max_key(&self) -> Option<&RowKey> {
        self.range.up_to.as_ref()
    }

    pub fn count(&self, verdict: DiffVerdict) -> usize {
        self.entries.iter().filter(|e| e.verdict == verdict).count()
    }

    /// Entries that need applying.
    pub fn changes(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| e.verdict != DiffVerdict::Equal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Source,
    Trailing,
    Done,
}

/// Pages a table pair. Stores are borrowed per call so the caller can apply
/// a page's verdicts before asking for the next one.
pub struct WindowedDiffer<'t> {
    table: &'t TableDefinition,
    opts: WindowOptions,
    last: Option<RowKey>,
    phase: Phase,
}

impl<'t> WindowedDiffer<'t> {
    pub fn new(table: &'t TableDefinition, opts: WindowOptions) -> Self {
        Self {
            table,
            opts: WindowOptions {
                page_size: opts.page_size.max(1),
                ..opts
            },
            last: None,
            phase: Phase::Source,
        }
    }

    /// Resume strictly after `key`, e.g. from a checkpoint.
    pub fn resume_after(mut self, key: Option<RowKey>) -> Self {
        self.last = key;
        self
    }

    /// Largest key processed so far.
    pub fn last_key(&self) -> Option<&RowKey> {
        self.last.as_ref()
    }

    pub async fn next_page<S, D>(&mut self, source: &mut S, dest: &mut D) -> Result<Option<WindowPage>>
    where
        S: TableStore + ?Sized,
        D: TableStore + ?Sized,
    {
        loop {
            match self.phase {
                Phase::Source => {
                    let src = source
                        .fingerprints(
                            self.table,
                            &KeyRange::after(self.last.clone()),
                            Some(self.opts.page_size),
                        )
                        .await?;
                    let Some(page_max) = src.last().map(|f| f.key.clone()) else {
                        self.phase = if self.opts.sweep_trailing {
                            Phase::Trailing
                        } else {
                            Phase::Done
                        };
                        continue;
                    };
                    let range = KeyRange::between(self.last.clone(), page_max.clone());
                    let dst = dest.fingerprints(self.table, &range, None).await?;
                    self.last = Some(page_max);
                    return self.page(range, &src, &dst, false).map(Some);
                }
                Phase::Trailing => {
                    let range = KeyRange::after(self.last.clone());
                    let dst = dest
                        .fingerprints(self.table, &range, Some(self.opts.page_size))
                        .await?;
                    let Some(page_max) = dst.last().map(|f| f.key.clone()) else {
                        self.phase = Phase::Done;
                        continue;
                    };
                    let range = KeyRange::between(self.last.clone(), page_max.clone());
                    self.last = Some(page_max);
                    return self.page(range, &[], &dst, true).map(Some);
                }
                Phase::Done => return Ok(None),
            }
        }
    }

    fn page(
        &self,
        range: KeyRange,
        src: &[RowFingerprint],
        dst: &[RowFingerprint],
        trailing: bool,
    ) -> Result<WindowPage> {
        let (entries, summary) = diff_sorted(src, dst)?;
        debug!(
            table = %self.table.name,
            trailing,
            source_rows = src.len(),
            destination_rows = dst.len(),
            insert = summary.only_in_a.count,
            delete = summary.only_in_b.count,
            update = summary.changed,
            "window diffed"
        );
        Ok(WindowPage {
            range,
            source_rows: src.len(),
            destination_rows: dst.len(),
            entries,
            summary,
            trailing,
        })
    }
}

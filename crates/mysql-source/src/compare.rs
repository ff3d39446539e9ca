//! Offline comparator over two audit directories.
//!
//! Tables whose manifest rollup or row count differ are re-diffed from
//! their persisted fingerprint files without touching a database. An
//! optional drill-down then reads a bounded sample of changed rows from
//! both live databases and compares them column by column.

use crate::cascade::SkippedTable;
use crate::store::TableStore;
use anyhow::{Context, Result};
use rowsync_core::audit::{manifest_path, schema_path};
use rowsync_core::{
    CompareResult, DatabaseSchema, DiffSummary, DiffVerdict, Divergence, EquivalenceRule,
    EquivalenceRules, FingerprintReader, KeyRun, Manifest, MergeDiff, RowKey, Side,
    TableDefinition,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

/// Keys per row fetch during drill-down.
const DRILL_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct CompareOptions {
    /// Changed keys kept per table for drill-down
    pub sample_size: usize,
    /// Column differences kept per table
    pub max_examples: usize,
    pub rules: EquivalenceRules,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            sample_size: 1000,
            max_examples: 50,
            rules: EquivalenceRules::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDifference {
    pub key: RowKey,
    pub column: String,
    pub left: String,
    pub right: String,
}

/// Column-level findings for the sampled keys of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrillDown {
    pub examined: usize,
    /// Rows with at least one column still different after the rules
    pub mismatched_rows: usize,
    /// Sampled keys no longer present on one side
    pub missing_rows: usize,
    pub examples: Vec<ColumnDifference>,
    pub differing_columns: BTreeSet<String>,
    pub ignored: BTreeMap<EquivalenceRule, u64>,
    pub ignored_columns: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableComparison {
    pub table: String,
    pub rows_a: u64,
    pub rows_b: u64,
    pub summary: DiffSummary,
    /// Changed keys, at most `sample_size`
    pub sample: Vec<RowKey>,
    pub drill: Option<DrillDown>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompareReport {
    pub tables: Vec<TableComparison>,
    /// Tables in both manifests with equal rollup and count
    pub identical: usize,
    /// Tables audited only in A
    pub only_in_a: Vec<String>,
    /// Tables audited only in B
    pub only_in_b: Vec<String>,
    pub skipped: Vec<SkippedTable>,
}

impl CompareReport {
    pub fn is_clean(&self) -> bool {
        self.tables.iter().all(|t| t.summary.is_clean())
    }

    fn skip(&mut self, table: &str, reason: String) {
        warn!(table, %reason, "Skipping table in comparison");
        self.skipped.push(SkippedTable {
            table: table.to_string(),
            reason,
        });
    }
}

/// Compare two audit directories.
pub fn compare_audits(dir_a: &Path, dir_b: &Path, opts: &CompareOptions) -> Result<CompareReport> {
    let manifest_a = Manifest::read(&manifest_path(dir_a))?;
    let manifest_b = Manifest::read(&manifest_path(dir_b))?;
    let schema_a = DatabaseSchema::from_file(&schema_path(dir_a))
        .with_context(|| format!("Failed to read schema of {}", dir_a.display()))?;
    let schema_b = DatabaseSchema::from_file(&schema_path(dir_b))
        .with_context(|| format!("Failed to read schema of {}", dir_b.display()))?;

    let differing = manifest_a.differing_tables(&manifest_b);
    let common = manifest_a
        .entries()
        .filter(|e| manifest_b.get(&e.table).is_some())
        .count();
    let mut report = CompareReport {
        identical: common - differing.len(),
        only_in_a: manifest_a
            .missing_from(&manifest_b)
            .into_iter()
            .map(str::to_string)
            .collect(),
        only_in_b: manifest_b
            .missing_from(&manifest_a)
            .into_iter()
            .map(str::to_string)
            .collect(),
        ..Default::default()
    };

    for (entry_a, entry_b) in differing {
        let table = entry_a.table.as_str();
        let codecs = schema_a
            .require_table(table)
            .map_err(|e| e.to_string())
            .and_then(|t| t.key_codec().map_err(|r| r.to_string()))
            .and_then(|a| {
                schema_b
                    .require_table(table)
                    .map_err(|e| e.to_string())
                    .and_then(|t| t.key_codec().map_err(|r| r.to_string()))
                    .map(|b| (a, b))
            });
        let (codec_a, codec_b) = match codecs {
            Ok((a, b)) if a == b => (a, b),
            Ok(_) => {
                report.skip(table, "primary key types differ between audits".to_string());
                continue;
            }
            Err(reason) => {
                report.skip(table, reason);
                continue;
            }
        };

        let reader_a = FingerprintReader::open(dir_a, table, codec_a)?;
        let reader_b = FingerprintReader::open(dir_b, table, codec_b)?;
        let mut merge = MergeDiff::new(reader_a, reader_b);
        let mut sample = Vec::new();
        for entry in merge.by_ref() {
            let entry = entry.with_context(|| format!("Failed to diff audits of {table}"))?;
            if entry.verdict == DiffVerdict::Update && sample.len() < opts.sample_size {
                sample.push(entry.key);
            }
        }
        report.tables.push(TableComparison {
            table: table.to_string(),
            rows_a: entry_a.rows,
            rows_b: entry_b.rows,
            summary: merge.into_summary(),
            sample,
            drill: None,
        });
    }
    Ok(report)
}

/// Fetch the sampled rows from both live databases and compare the
/// columns both schemas share.
pub async fn drill_into<A, B>(
    report: &mut CompareReport,
    a: &mut A,
    b: &mut B,
    schema_a: &DatabaseSchema,
    schema_b: &DatabaseSchema,
    opts: &CompareOptions,
) -> Result<()>
where
    A: TableStore + ?Sized,
    B: TableStore + ?Sized,
{
    for comparison in &mut report.tables {
        if comparison.sample.is_empty() {
            continue;
        }
        let (Some(table_a), Some(table_b)) = (
            schema_a.get_table(&comparison.table),
            schema_b.get_table(&comparison.table),
        ) else {
            warn!(table = %comparison.table, "Table missing from a live schema, not drilling in");
            continue;
        };
        let drill = drill_table(a, b, table_a, table_b, &comparison.sample, opts).await?;
        comparison.drill = Some(drill);
    }
    Ok(())
}

async fn drill_table<A, B>(
    a: &mut A,
    b: &mut B,
    table_a: &TableDefinition,
    table_b: &TableDefinition,
    sample: &[RowKey],
    opts: &CompareOptions,
) -> Result<DrillDown>
where
    A: TableStore + ?Sized,
    B: TableStore + ?Sized,
{
    let columns: Vec<(String, usize, usize)> = table_a
        .common_columns(table_b)
        .into_iter()
        .filter_map(|name| {
            let ia = table_a.column_index(&name)?;
            let ib = table_b.column_index(&name)?;
            Some((name, ia, ib))
        })
        .collect();

    let mut drill = DrillDown::default();
    for chunk in sample.chunks(DRILL_BATCH) {
        let rows_a = a.fetch_rows(table_a, chunk).await?;
        let mut rows_b: BTreeMap<RowKey, Vec<_>> = b
            .fetch_rows(table_b, chunk)
            .await?
            .into_iter()
            .map(|r| (r.key, r.values))
            .collect();
        drill.missing_rows += chunk.len() - rows_a.len();

        for row_a in rows_a {
            let Some(values_b) = rows_b.remove(&row_a.key) else {
                drill.missing_rows += 1;
                continue;
            };
            drill.examined += 1;
            let mut row_differs = false;
            for (name, ia, ib) in &columns {
                let (Some(left), Some(right)) = (row_a.values.get(*ia), values_b.get(*ib)) else {
                    continue;
                };
                match opts.rules.compare(left, right) {
                    CompareResult::Equal => {}
                    CompareResult::Equivalent(rule) => {
                        *drill.ignored.entry(rule).or_default() += 1;
                        drill.ignored_columns.insert(name.clone());
                    }
                    CompareResult::Different { left, right } => {
                        row_differs = true;
                        drill.differing_columns.insert(name.clone());
                        if drill.examples.len() < opts.max_examples {
                            drill.examples.push(ColumnDifference {
                                key: row_a.key.clone(),
                                column: name.clone(),
                                left,
                                right,
                            });
                        }
                    }
                }
            }
            if row_differs {
                drill.mismatched_rows += 1;
            }
        }
    }
    Ok(drill)
}

fn run_range(run: &KeyRun) -> String {
    match (&run.min, &run.max) {
        (Some(min), Some(max)) if min == max => format!("key {min}"),
        (Some(min), Some(max)) => format!("keys {min}..{max}"),
        _ => String::new(),
    }
}

fn log_run(table: &str, summary: &DiffSummary, side: Side) {
    let (run, present, absent) = match side {
        Side::A => (&summary.only_in_a, "A", "B"),
        Side::B => (&summary.only_in_b, "B", "A"),
    };
    match summary.divergence(side) {
        Divergence::None => {}
        Divergence::PureGrowth => info!(
            table,
            "  {} new records in {present} but not {absent} ({})",
            run.count,
            run_range(run)
        ),
        Divergence::Interleaved => warn!(
            table,
            "  {} records in {present} but not {absent}, interleaved with {absent}'s keys ({})",
            run.count,
            run_range(run)
        ),
    }
}

/// Emit the comparison as log lines.
pub fn log_report(report: &CompareReport) {
    for table in &report.only_in_a {
        info!(table = %table, "Table audited only in A, not compared");
    }
    for table in &report.only_in_b {
        info!(table = %table, "Table audited only in B, not compared");
    }
    for t in &report.tables {
        let s = &t.summary;
        info!(
            table = %t.table,
            rows_a = t.rows_a,
            rows_b = t.rows_b,
            "{}: {} only in A, {} only in B, {} changed, {} equal",
            t.table,
            s.only_in_a.count,
            s.only_in_b.count,
            s.changed,
            s.equal
        );
        log_run(&t.table, s, Side::A);
        log_run(&t.table, s, Side::B);

        let Some(drill) = &t.drill else { continue };
        info!(
            table = %t.table,
            examined = drill.examined,
            mismatched = drill.mismatched_rows,
            missing = drill.missing_rows,
            "  Drill-down: {} of {} sampled rows still differ",
            drill.mismatched_rows,
            drill.examined
        );
        for example in &drill.examples {
            info!(
                table = %t.table,
                "    {} {}: {} != {}",
                example.key,
                example.column,
                example.left,
                example.right
            );
        }
        if !drill.differing_columns.is_empty() {
            let columns: Vec<&str> = drill.differing_columns.iter().map(String::as_str).collect();
            info!(table = %t.table, "  Differing columns: {}", columns.join(", "));
        }
        for (rule, count) in &drill.ignored {
            info!(table = %t.table, "  Ignored {count} differences by {rule}");
        }
        if !drill.ignored_columns.is_empty() {
            let columns: Vec<&str> = drill.ignored_columns.iter().map(String::as_str).collect();
            info!(table = %t.table, "  Ignored columns: {}", columns.join(", "));
        }
    }
    info!(
        compared = report.tables.len(),
        identical = report.identical,
        skipped = report.skipped.len(),
        "Comparison finished"
    );
}

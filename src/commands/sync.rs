//! `rowsync sync`: make every selected destination table match the source.

use super::{finish, table_codec, Connected};
use crate::checkpoint::{CheckpointWriter, ResumePoint};
use crate::config::ReconcileConfig;
use crate::{ConnectionArgs, TuningArgs};
use anyhow::{Context, Result};
use clap::Args;
use rowsync_core::DatabaseSchema;
use rowsync_mysql::{sync_database, DatabaseSyncReport, NoProgress, StartAt, SyncProgress};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Delete destination rows past the last source key of each table
    #[arg(long)]
    pub sweep_trailing: bool,

    /// Diff and report without writing to the destination
    #[arg(long)]
    pub dry_run: bool,

    /// Directory where the resume checkpoint is written after every page
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Resume from a checkpoint file written by an earlier run
    #[arg(long, conflicts_with = "start_table")]
    pub resume_from: Option<PathBuf>,

    /// Skip tables whose names sort before this one
    #[arg(long)]
    pub start_table: Option<String>,

    /// With --start-table, start strictly after this key
    #[arg(long, requires = "start_table")]
    pub start_key: Option<String>,
}

impl SyncArgs {
    fn start_at(&self, schema: &DatabaseSchema) -> Result<Option<StartAt>> {
        if let Some(path) = &self.resume_from {
            let point = ResumePoint::read(path)?;
            return point.start_at(schema).map(Some);
        }
        let Some(table) = &self.start_table else {
            return Ok(None);
        };
        let after = match &self.start_key {
            Some(text) => Some(
                table_codec(schema, table)?
                    .decode(text)
                    .with_context(|| format!("Invalid --start-key for '{table}'"))?,
            ),
            None => None,
        };
        Ok(Some(StartAt {
            table: table.clone(),
            after,
        }))
    }
}

pub async fn run_sync(args: SyncArgs) -> Result<()> {
    let mut config = ReconcileConfig::resolve(&args.tuning, None)?;
    config.sweep_trailing |= args.sweep_trailing;
    let opts = config.sync_options(args.dry_run);

    let mut source = Connected::open("source", &args.connection.source_url).await?;
    let mut dest = Connected::open("destination", &args.connection.dest_url).await?;

    let start = args.start_at(&source.schema)?;
    if let Some(start) = &start {
        match &start.after {
            Some(key) => info!("Resuming at table '{}' after key {key}", start.table),
            None => info!("Starting at table '{}'", start.table),
        }
    }

    let mut checkpoints = match &args.checkpoint_dir {
        Some(dir) if args.dry_run => {
            warn!("Dry run: no checkpoint is written to {:?}", dir);
            None
        }
        Some(dir) => Some(CheckpointWriter::new(dir)?),
        None => None,
    };
    let mut no_progress = NoProgress;
    let progress: &mut dyn SyncProgress = match checkpoints.as_mut() {
        Some(writer) => writer,
        None => &mut no_progress,
    };

    info!(
        "Syncing with page_size={} batch_size={} max_payload_bytes={} dry_run={}",
        config.page_size, config.batch_size, config.max_payload_bytes, args.dry_run
    );
    let started = Instant::now();
    let outcome = sync_database(
        &mut source.store,
        &mut dest.store,
        &source.schema,
        &dest.schema,
        &config.filter(),
        &opts,
        start,
        progress,
    )
    .await;

    let report = finish(outcome, vec![source, dest]).await?;
    log_summary(&report, started.elapsed().as_secs_f64());

    if let Some(writer) = &checkpoints {
        info!(
            "{} checkpoints written to {:?}",
            writer.written(),
            writer.path()
        );
    }
    if args.dry_run && report.tables.iter().any(|t| !t.is_clean()) {
        info!("Dry run found differences; rerun without --dry-run to apply them");
    }
    Ok(())
}

fn log_summary(report: &DatabaseSyncReport, elapsed: f64) {
    for skipped in &report.skipped {
        warn!("Skipped table '{}': {}", skipped.table, skipped.reason);
    }
    let totals = report.totals();
    let clean = report.tables.iter().filter(|t| t.is_clean()).count();
    info!(
        tables = report.tables.len(),
        clean,
        deleted = totals.deleted,
        inserted = totals.inserted,
        statements = totals.statements,
        discrepancies = totals.discrepancies,
        "Sync finished in {elapsed:.1}s: {} tables, {} already in sync, {} skipped",
        report.tables.len(),
        clean,
        report.skipped.len()
    );
    if totals.discrepancies > 0 {
        warn!(
            "{} statements affected a different number of rows than planned",
            totals.discrepancies
        );
    }
}

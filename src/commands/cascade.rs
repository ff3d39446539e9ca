//! `rowsync cascade`: re-sync rows of one table and every row that
//! references them through foreign keys.

use super::{finish, parse_keys, table_codec, Connected};
use crate::config::ReconcileConfig;
use crate::{ConnectionArgs, TuningArgs};
use anyhow::Result;
use clap::Args;
use rowsync_mysql::{ApplyExecutor, CascadeWalker};
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct CascadeArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Root table of the walk
    #[arg(long)]
    pub table: String,

    /// Root key in audit-file form, e.g. `42` or `7,abc` for composite keys
    #[arg(long = "key", required = true)]
    pub keys: Vec<String>,

    /// Report what would change without writing
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run_cascade(args: CascadeArgs) -> Result<()> {
    let config = ReconcileConfig::resolve(&args.tuning, None)?;
    let mut source = Connected::open("source", &args.connection.source_url).await?;
    let mut dest = Connected::open("destination", &args.connection.dest_url).await?;

    let codec = table_codec(&source.schema, &args.table)?;
    let keys = parse_keys(&codec, &args.table, &args.keys)?;
    info!(
        "Cascading {} key(s) of '{}' (dry_run={})",
        keys.len(),
        args.table,
        args.dry_run
    );

    let executor = ApplyExecutor::new(config.apply_options(args.dry_run));
    let walker = CascadeWalker::new(&source.schema, executor);
    let outcome = walker
        .run(&mut source.store, &mut dest.store, &args.table, keys)
        .await;

    let report = finish(outcome, vec![source, dest]).await?;

    for step in &report.steps {
        info!(
            depth = step.depth,
            via = step.via.as_deref().unwrap_or("-"),
            "{}: {} source / {} destination keys, {} deleted, {} inserted",
            step.table,
            step.source_keys,
            step.destination_keys,
            step.stats.deleted,
            step.stats.inserted
        );
    }
    for skipped in &report.skipped {
        warn!("Skipped table '{}': {}", skipped.table, skipped.reason);
    }
    let totals = report.totals();
    info!(
        "Cascade finished: {} tables, depth {}, {} deleted, {} inserted",
        report.steps.len(),
        report.max_depth(),
        totals.deleted,
        totals.inserted
    );
    if totals.discrepancies > 0 {
        warn!(
            "{} statements affected a different number of rows than planned",
            totals.discrepancies
        );
    }
    Ok(())
}

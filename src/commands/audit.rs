//! `rowsync audit`: fingerprint every table of one database to disk.

use super::Connected;
use crate::config::ReconcileConfig;
use crate::TuningArgs;
use anyhow::Result;
use clap::Args;
use rowsync_mysql::{audit_database, AuditOptions, ConnectionTarget};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct AuditArgs {
    /// MySQL URL of the database to audit
    #[arg(long, env = "ROWSYNC_SOURCE_URL")]
    pub url: String,

    /// Output directory, `{host}.{database}` by default
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Audit at most this many rows per table
    #[arg(long)]
    pub limit: Option<u64>,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

pub async fn run_audit(args: AuditArgs) -> Result<()> {
    let config = ReconcileConfig::resolve(&args.tuning, None)?;
    let dir = match &args.dir {
        Some(dir) => dir.clone(),
        None => PathBuf::from(ConnectionTarget::from_url(&args.url)?.audit_dir_name()),
    };
    let opts = AuditOptions {
        page_size: config.page_size,
        limit: args.limit,
        filter: config.filter(),
    };

    let mut db = Connected::open("audit", &args.url).await?;
    info!("Writing audit to {}", dir.display());
    let outcome = audit_database(&mut db.store, &db.schema, &dir, &opts).await;
    db.close().await?;
    let report = outcome?;

    for skipped in &report.skipped {
        warn!("Skipped table '{}': {}", skipped.table, skipped.reason);
    }
    info!(
        "Audited {} tables, {} rows into {}",
        report.entries.len(),
        report.total_rows(),
        dir.display()
    );
    Ok(())
}

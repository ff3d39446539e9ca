//! `rowsync compare`: compare two audit directories offline, optionally
//! drilling into changed rows over live connections.

use super::{finish, Connected};
use crate::config::ReconcileConfig;
use crate::{EquivalenceArgs, TuningArgs};
use anyhow::Result;
use clap::Args;
use rowsync_mysql::{compare_audits, drill_into, log_report};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Audit directory of database A
    #[arg(long)]
    pub dir_a: PathBuf,

    /// Audit directory of database B
    #[arg(long)]
    pub dir_b: PathBuf,

    /// TOML configuration file
    #[arg(long, env = "ROWSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub equivalence: EquivalenceArgs,

    /// Changed keys kept per table for the drill-down
    #[arg(long)]
    pub sample_size: Option<usize>,

    /// Column differences printed per table
    #[arg(long)]
    pub max_examples: Option<usize>,

    /// Live URL of database A; with --drill-b-url enables the drill-down
    #[arg(long, requires = "drill_b_url")]
    pub drill_a_url: Option<String>,

    /// Live URL of database B
    #[arg(long, requires = "drill_a_url")]
    pub drill_b_url: Option<String>,
}

impl CompareArgs {
    fn config(&self) -> Result<ReconcileConfig> {
        let tuning = TuningArgs {
            config: self.config.clone(),
            ..TuningArgs::default()
        };
        let mut config = ReconcileConfig::resolve(&tuning, Some(&self.equivalence))?;
        if let Some(sample_size) = self.sample_size {
            config.compare.sample_size = sample_size;
        }
        if let Some(max_examples) = self.max_examples {
            config.compare.max_examples = max_examples;
        }
        config.validate()?;
        Ok(config)
    }
}

pub async fn run_compare(args: CompareArgs) -> Result<()> {
    let opts = args.config()?.compare_options();
    info!(
        "Comparing audits {} and {}",
        args.dir_a.display(),
        args.dir_b.display()
    );
    let mut report = compare_audits(&args.dir_a, &args.dir_b, &opts)?;

    if let (Some(url_a), Some(url_b)) = (&args.drill_a_url, &args.drill_b_url) {
        if !report.tables.is_empty() {
            let mut a = Connected::open("A", url_a).await?;
            let mut b = Connected::open("B", url_b).await?;
            let outcome =
                drill_into(&mut report, &mut a.store, &mut b.store, &a.schema, &b.schema, &opts)
                    .await;
            finish(outcome, vec![a, b]).await?;
        }
    }

    log_report(&report);
    for skipped in &report.skipped {
        warn!("Could not compare '{}': {}", skipped.table, skipped.reason);
    }
    if report.is_clean() {
        info!("Audits match");
    } else {
        info!("{} table(s) differ between the audits", report.tables.len());
    }
    Ok(())
}

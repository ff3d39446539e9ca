//! Reconciliation settings.
//!
//! Settings come from an optional TOML file and are then overridden by
//! command-line flags. A file only needs the keys it changes:
//!
//! ```toml
//! page_size = 2000
//! skip_tables = ["sessions"]
//!
//! [equivalence]
//! ignore_null_vs_zero_date = true
//!
//! [compare]
//! sample_size = 200
//! ```

use crate::{EquivalenceArgs, TuningArgs};
use anyhow::{Context, Result};
use rowsync_core::{EquivalenceRules, TableFilter};
use rowsync_mysql::{ApplyOptions, CompareOptions, SyncOptions, WindowOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    pub page_size: usize,
    pub batch_size: usize,
    pub max_payload_bytes: usize,
    pub include_tables: Vec<String>,
    pub skip_tables: Vec<String>,
    pub sweep_trailing: bool,
    pub equivalence: EquivalenceRules,
    pub compare: CompareSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompareSection {
    pub sample_size: usize,
    pub max_examples: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        let window = WindowOptions::default();
        let apply = ApplyOptions::default();
        Self {
            page_size: window.page_size,
            batch_size: apply.batch_size,
            max_payload_bytes: apply.max_payload_bytes,
            include_tables: Vec::new(),
            skip_tables: Vec::new(),
            sweep_trailing: window.sweep_trailing,
            equivalence: EquivalenceRules::default(),
            compare: CompareSection::default(),
        }
    }
}

impl Default for CompareSection {
    fn default() -> Self {
        let opts = CompareOptions::default();
        Self {
            sample_size: opts.sample_size,
            max_examples: opts.max_examples,
        }
    }
}

impl ReconcileConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid rowsync configuration")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        Self::from_toml_str(&content).with_context(|| format!("Failed to parse {path:?}"))
    }

    /// Load `--config` if given, apply flag overrides and validate.
    pub fn resolve(tuning: &TuningArgs, equivalence: Option<&EquivalenceArgs>) -> Result<Self> {
        let mut config = match &tuning.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_tuning(tuning);
        if let Some(args) = equivalence {
            config.apply_equivalence(args);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn apply_tuning(&mut self, args: &TuningArgs) {
        if let Some(page_size) = args.page_size {
            self.page_size = page_size;
        }
        if let Some(batch_size) = args.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(bytes) = args.max_payload_bytes {
            self.max_payload_bytes = bytes;
        }
        if !args.include_tables.is_empty() {
            self.include_tables = args.include_tables.clone();
        }
        if !args.skip_tables.is_empty() {
            self.skip_tables = args.skip_tables.clone();
        }
    }

    /// Flags can only switch rules on; a rule enabled in the file stays on.
    pub fn apply_equivalence(&mut self, args: &EquivalenceArgs) {
        self.equivalence.ignore_null_vs_empty |= args.ignore_null_vs_empty;
        self.equivalence.ignore_null_vs_zero_date |= args.ignore_null_vs_zero_date;
        if args.numeric_tolerance.is_some() {
            self.equivalence.numeric_tolerance = args.numeric_tolerance;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("page_size", self.page_size),
            ("batch_size", self.batch_size),
            ("max_payload_bytes", self.max_payload_bytes),
            ("compare.sample_size", self.compare.sample_size),
        ] {
            if value == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        if let Some(tolerance) = self.equivalence.numeric_tolerance {
            if !(tolerance > 0.0 && tolerance < 1.0) {
                anyhow::bail!("numeric_tolerance must be between 0 and 1, got {tolerance}");
            }
        }
        Ok(())
    }

    pub fn filter(&self) -> TableFilter {
        TableFilter::new(self.include_tables.clone(), self.skip_tables.clone())
    }

    pub fn sync_options(&self, dry_run: bool) -> SyncOptions {
        SyncOptions {
            window: WindowOptions {
                page_size: self.page_size,
                sweep_trailing: self.sweep_trailing,
            },
            apply: self.apply_options(dry_run),
        }
    }

    pub fn apply_options(&self, dry_run: bool) -> ApplyOptions {
        ApplyOptions {
            batch_size: self.batch_size,
            max_payload_bytes: self.max_payload_bytes,
            dry_run,
        }
    }

    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            sample_size: self.compare.sample_size,
            max_examples: self.compare.max_examples,
            rules: self.equivalence.clone(),
        }
    }
}

use rowsync::{EquivalenceArgs, ReconcileConfig, TuningArgs};
use std::io::Write;

#[test]
fn test_resolve_reads_file_then_flags() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        "batch_size = 250\nsweep_trailing = true\n[equivalence]\nnumeric_tolerance = 0.05"
    )?;

    let tuning = TuningArgs {
        config: Some(file.path().to_path_buf()),
        page_size: Some(10),
        ..TuningArgs::default()
    };
    let equivalence = EquivalenceArgs {
        ignore_null_vs_empty: true,
        ..EquivalenceArgs::default()
    };
    let config = ReconcileConfig::resolve(&tuning, Some(&equivalence))?;

    assert_eq!(config.page_size, 10);
    assert_eq!(config.batch_size, 250);
    assert!(config.sweep_trailing);
    let compare = config.compare_options();
    assert!(compare.rules.ignore_null_vs_empty);
    assert_eq!(compare.rules.numeric_tolerance, Some(0.05));
    assert_eq!(compare.sample_size, 1000);
    Ok(())
}

#[test]
fn test_resolve_rejects_invalid_values() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "[equivalence]\nnumeric_tolerance = 2.0")?;
    let tuning = TuningArgs {
        config: Some(file.path().to_path_buf()),
        ..TuningArgs::default()
    };
    assert!(ReconcileConfig::resolve(&tuning, None).is_err());

    let zero_batch = TuningArgs {
        batch_size: Some(0),
        ..TuningArgs::default()
    };
    assert!(ReconcileConfig::resolve(&zero_batch, None).is_err());
    Ok(())
}

#[test]
fn test_missing_file_is_an_error() {
    let tuning = TuningArgs {
        config: Some("/nonexistent/rowsync.toml".into()),
        ..TuningArgs::default()
    };
    let err = ReconcileConfig::resolve(&tuning, None).unwrap_err();
    assert!(format!("{err:#}").contains("rowsync.toml"));
}

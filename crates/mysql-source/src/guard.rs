//! Referential-integrity suspension on the destination.
//!
//! Checks are switched off before a cascading or whole-database sync so
//! rows can be deleted and inserted out of dependency order, and switched
//! back on exactly once afterwards, whether the sync succeeded or not.

use crate::store::TableStore;
use anyhow::Result;
use tracing::{info, warn};

pub async fn suspend_foreign_key_checks<S: TableStore + ?Sized>(store: &mut S) -> Result<()> {
    store.set_foreign_key_checks(false).await?;
    info!(store = store.label(), "Foreign key checks disabled");
    Ok(())
}

/// Re-enable checks and pass `outcome` through.
///
/// If re-enabling fails after a failed sync, the failure is logged and the
/// sync's own error is returned. After a successful sync it is the error.
pub async fn restore_foreign_key_checks<S, T>(store: &mut S, outcome: Result<T>) -> Result<T>
where
    S: TableStore + ?Sized,
{
    match store.set_foreign_key_checks(true).await {
        Ok(()) => {
            info!(store = store.label(), "Foreign key checks re-enabled");
            outcome
        }
        Err(restore_err) => match outcome {
            Ok(_) => Err(restore_err.context("Failed to re-enable foreign key checks")),
            Err(original) => {
                warn!(
                    store = store.label(),
                    "Failed to re-enable foreign key checks after error: {restore_err:#}"
                );
                Err(original)
            }
        },
    }
}

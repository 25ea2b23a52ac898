//! One-shot maintenance pass run by the `skyvault` binary.

use tracing::info;

use crate::auth::{OtpService, SessionManager};
use crate::config::QuotaConfig;
use crate::file::{ObjectStore, UploadCoordinator};
use crate::{Database, Result};

/// Work done by one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Unconfirmed uploads older than the stale threshold that were removed.
    pub discarded_uploads: usize,
    /// Expired session index rows removed.
    pub pruned_index_rows: u64,
    /// Expired verification codes removed.
    pub pruned_codes: u64,
}

/// Discard stale uploads, then prune expired session index rows and
/// verification codes.
///
/// Session cache entries are left alone; the cache expires them itself.
pub async fn run_pass(
    db: &Database,
    store: &dyn ObjectStore,
    sessions: &SessionManager<'_>,
    quota: &QuotaConfig,
) -> Result<MaintenanceReport> {
    let discarded_uploads = UploadCoordinator::new(db, store)
        .discard_stale(quota.stale_upload_after())
        .await?;
    let pruned_index_rows = sessions.prune_index().await?;
    let pruned_codes = OtpService::new(db).prune_expired().await?;

    info!(
        discarded_uploads,
        pruned_index_rows,
        pruned_codes,
        "Maintenance pass complete"
    );
    Ok(MaintenanceReport {
        discarded_uploads,
        pruned_index_rows,
        pruned_codes,
    })
}

use futures::future::join_all;
use tracing::{info, warn};

use super::WorkerContext;
use crate::error::Result;

/// Outcome of stale-generation cleanup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
    /// Stores that could not be deleted; they are retried on the next activation.
    pub failed: Vec<String>,
}

/// Delete every cache generation other than the current one, then claim all
/// open pages.
///
/// Deletions run concurrently and all of them settle before pages are
/// claimed. One failed deletion does not stop the others.
pub async fn activate(ctx: &WorkerContext) -> Result<ActivateReport> {
    let current = ctx.config().cache_name.as_str();
    let stale: Vec<String> = ctx
        .storage()
        .keys()
        .await?
        .into_iter()
        .filter(|name| name != current)
        .collect();

    let deletions = stale.iter().map(|name| async move {
        info!(cache = %name, "Deleting stale cache");
        (name, ctx.storage().delete(name).await)
    });

    let mut report = ActivateReport::default();
    for (name, result) in join_all(deletions).await {
        match result {
            Ok(_) => report.deleted.push(name.clone()),
            Err(e) => {
                warn!(cache = %name, error = %e, "Failed to delete stale cache");
                report.failed.push(name.clone());
            }
        }
    }

    ctx.host().claim_clients().await?;

    info!(
        cache = current,
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "Activated"
    );
    Ok(report)
}

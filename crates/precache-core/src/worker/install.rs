use futures::future::try_join_all;
use tracing::{info, warn};

use super::WorkerContext;
use crate::error::{Error, Result};
use crate::models::Request;

/// Populate the current cache generation with the asset manifest.
///
/// Every asset is fetched before anything is written. A transport failure or
/// a non-2xx status for any one asset fails the whole install and leaves the
/// store without manifest entries. On success the host is asked to skip
/// waiting. Returns the number of assets cached.
pub async fn install(ctx: &WorkerContext) -> Result<usize> {
    let config = ctx.config();
    let cache = config.cache_name.as_str();

    ctx.storage().open(cache).await?;

    let mut requests = Vec::with_capacity(config.assets.len());
    for path in config.unique_assets() {
        requests.push((path, Request::get(config.resolve(path)?)));
    }

    info!(cache, assets = requests.len(), "Caching application assets");

    let fetches = requests.into_iter().map(|(path, request)| async move {
        match ctx.network().fetch(&request).await {
            Ok(response) if response.is_ok() => Ok((request, response)),
            Ok(response) => Err(Error::Install {
                path: path.to_string(),
                reason: format!("status {}", response.status()),
            }),
            Err(e) => Err(Error::Install {
                path: path.to_string(),
                reason: e.summary(),
            }),
        }
    });

    let entries = match try_join_all(fetches).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(cache, error = %e, "Install failed, nothing cached");
            return Err(e);
        }
    };

    let count = entries.len();
    ctx.storage().put_all(cache, entries).await?;
    ctx.host().skip_waiting().await?;

    info!(cache, assets = count, "Install complete");
    Ok(count)
}

use std::sync::Arc;

use reqwest::Method;
use tracing::{debug, info, warn};

use super::WorkerContext;
use crate::error::Result;
use crate::models::{Request, Response};

/// How an intercepted request was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Cross-origin: not intercepted, left to default network handling.
    Passthrough,
    Cache(Response),
    /// Fresh from the network; a copy is being written to the current cache.
    Network(Response),
    /// Offline navigation answered with the cached root document.
    Fallback(Response),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Cache(r) | FetchOutcome::Network(r) | FetchOutcome::Fallback(r) => {
                Some(r)
            }
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Cache(r) | FetchOutcome::Network(r) | FetchOutcome::Fallback(r) => {
                Some(r)
            }
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            FetchOutcome::Passthrough => "passthrough",
            FetchOutcome::Cache(_) => "cache",
            FetchOutcome::Network(_) => "network",
            FetchOutcome::Fallback(_) => "fallback",
        }
    }
}

/// Answer a request from a controlled page.
///
/// Same-origin requests are served cache-first with no revalidation. A miss
/// goes to the network; the response is returned and a copy is stored in the
/// background. If the network is unreachable, navigations get the cached
/// fallback document and everything else fails. An HTTP error status is a
/// response, not a network failure, and never triggers the fallback.
pub async fn handle_fetch(ctx: &WorkerContext, request: Request) -> Result<FetchOutcome> {
    let config = ctx.config();
    if !config.is_same_origin(&request.url)? {
        debug!(url = %request.url, "Cross-origin request, not intercepted");
        return Ok(FetchOutcome::Passthrough);
    }

    let cacheable = request.method == Method::GET;
    if cacheable {
        if let Some(response) = lookup(ctx, &request).await {
            debug!(url = %request.url, "Served from cache");
            return Ok(FetchOutcome::Cache(response));
        }
    }

    match ctx.network().fetch(&request).await {
        Ok(response) => {
            if cacheable {
                persist(ctx, request, response.clone());
            }
            Ok(FetchOutcome::Network(response))
        }
        Err(e) if request.is_navigation() => {
            let fallback = Request::get(config.resolve(&config.fallback_document)?);
            match lookup(ctx, &fallback).await {
                Some(response) => {
                    info!(
                        url = %request.url,
                        error = %e.summary(),
                        "Offline, serving cached fallback document"
                    );
                    Ok(FetchOutcome::Fallback(response))
                }
                None => {
                    warn!(
                        url = %request.url,
                        fallback = %fallback.url,
                        "Offline and no cached fallback document"
                    );
                    Err(e.into())
                }
            }
        }
        Err(e) => {
            debug!(url = %request.url, error = %e.summary(), "Network fetch failed");
            Err(e.into())
        }
    }
}

/// Lookup failures are logged and treated as a miss.
async fn lookup(ctx: &WorkerContext, request: &Request) -> Option<Response> {
    match ctx.storage().match_any(request).await {
        Ok(found) => found,
        Err(e) => {
            warn!(url = %request.url, error = %e, "Cache lookup failed");
            None
        }
    }
}

/// Write a network response to the current cache without holding up the caller.
fn persist(ctx: &WorkerContext, request: Request, response: Response) {
    let storage = Arc::clone(ctx.storage());
    let cache = ctx.config().cache_name.clone();
    ctx.background().spawn(async move {
        let result = match storage.open(&cache).await {
            Ok(()) => storage.put(&cache, &request, response).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(cache = %cache, url = %request.url, "Cached network response"),
            Err(e) => warn!(
                cache = %cache,
                url = %request.url,
                error = %e,
                "Failed to cache network response"
            ),
        }
    });
}

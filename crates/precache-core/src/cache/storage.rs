use async_trait::async_trait;
use reqwest::Method;

use crate::error::{Error, Result};
use crate::models::{Request, RequestKey, Response};

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the named store if it does not exist yet.
    async fn open(&self, name: &str) -> Result<()>;

    /// Store `response` under the identity of `request`, replacing any
    /// existing entry. Fails with [`Error::CacheNotFound`] if the store was
    /// never opened.
    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<()>;

    /// Look up `request` in one store. A missing store is a miss.
    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>>;

    /// Delete a store and every entry in it. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all stores, in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Identities of every entry in a store.
    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>>;

    /// Store several entries at once. Every entry is validated before any is
    /// written. This default then writes them one `put` at a time, so an I/O
    /// error partway leaves the earlier entries in place; backends that can
    /// write a batch in one step override it.
    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
        for (request, response) in &entries {
            ensure_cacheable(request, response)?;
        }
        for (request, response) in entries {
            self.put(name, &request, response).await?;
        }
        Ok(())
    }

    /// Look up `request` in every store, oldest first.
    async fn match_any(&self, request: &Request) -> Result<Option<Response>> {
        for name in self.keys().await? {
            if let Some(response) = self.match_in(&name, request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// Only GET requests are cacheable, and partial content never is.
pub fn ensure_cacheable(request: &Request, response: &Response) -> Result<()> {
    if request.method != Method::GET {
        return Err(Error::UnsupportedMethod(request.method.to_string()));
    }
    if response.status() == 206 {
        return Err(Error::PartialResponse(request.url.to_string()));
    }
    Ok(())
}

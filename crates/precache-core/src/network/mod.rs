//! Network access for cache misses and manifest population.
//!
//! The handlers only see the [`Network`] trait. [`HttpNetwork`] is the
//! reqwest-backed implementation used by real hosts.
//!
//! A request that reaches the server resolves to a [`Response`] whatever its
//! status. Only transport-level failures (offline, DNS, refused connection,
//! timeout) become a [`FetchError`].

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::models::{Request, Response};

pub use client::HttpNetwork;
pub use error::FetchError;

#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

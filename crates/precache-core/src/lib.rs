//! precache core - an offline asset cache for a single web application.
//!
//! The crate is organised around three lifecycle handlers that share one
//! [`WorkerConfig`]:
//!
//! - [`worker::install`]: pre-populates the current cache generation with the
//!   asset manifest and asks the host to activate immediately.
//! - [`worker::activate`]: deletes every cache generation other than the
//!   current one and claims all open pages.
//! - [`worker::handle_fetch`]: serves same-origin requests cache-first,
//!   refreshing the cache from the network and falling back to the root
//!   document for navigations when offline.
//!
//! Storage, network and host signalling are collaborators behind the
//! [`CacheStorage`], [`Network`] and [`Host`] traits.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod worker;

pub use cache::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use config::WorkerConfig;
pub use error::{Error, Result};
pub use models::{Request, RequestKey, RequestMode, Response};
pub use network::{FetchError, HttpNetwork, Network};
pub use worker::{ActivateReport, FetchOutcome, Host, WorkerContext};

pub use reqwest::Url;

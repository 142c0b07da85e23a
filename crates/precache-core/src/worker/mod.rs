//! Lifecycle handlers.
//!
//! Each handler is an independent async function over a shared
//! [`WorkerContext`]. The host (browser shim, CLI, test harness) decides when
//! to call them:
//!
//! - [`install`] once per new worker version
//! - [`activate`] when the installed version takes over
//! - [`handle_fetch`] for every request from a controlled page

pub mod activate;
pub mod fetch;
pub mod install;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::task::TaskTracker;

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::network::Network;

pub use activate::{activate, ActivateReport};
pub use fetch::{handle_fetch, FetchOutcome};
pub use install::install;

/// Page-control signals sent to the host runtime.
#[async_trait]
pub trait Host: Send + Sync {
    /// Promote the installed worker without waiting for open pages to close.
    async fn skip_waiting(&self) -> Result<()>;

    /// Take control of every open page of this origin.
    async fn claim_clients(&self) -> Result<()>;
}

/// Everything a handler needs. Clone is cheap; all collaborators are shared.
#[derive(Clone)]
pub struct WorkerContext {
    config: Arc<WorkerConfig>,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    host: Arc<dyn Host>,
    background: TaskTracker,
}

impl WorkerContext {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            network,
            host,
            background: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Wait until every detached cache write spawned so far has finished.
    pub async fn settle(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    pub(crate) fn background(&self) -> &TaskTracker {
        &self.background
    }
}

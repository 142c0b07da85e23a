//! Minimal lifecycle host.
//!
//! Plays the part of the browser runtime: records page-control signals and
//! walks a worker through install and activation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use precache_core::worker::{activate, install};
use precache_core::{ActivateReport, Host, WorkerContext};
use tracing::{info, warn};

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting for open pages to close, unless skip-waiting was requested.
    Installed,
    Activating,
    Activated,
    /// Install failed; this version will never control pages.
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

#[derive(Debug, Default)]
pub struct LocalHost {
    skip_waiting: AtomicBool,
    claimed: AtomicBool,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn clients_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Host for LocalHost {
    async fn skip_waiting(&self) -> precache_core::Result<()> {
        info!("Worker requested skip waiting");
        self.skip_waiting.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn claim_clients(&self) -> precache_core::Result<()> {
        info!("Worker claimed open pages");
        self.claimed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// What a full registration run did.
#[derive(Debug)]
pub struct RunReport {
    /// Assets written by install.
    pub cached: usize,
    /// Present when the worker skipped waiting and activated straight away.
    pub activation: Option<ActivateReport>,
}

pub struct Registration {
    ctx: WorkerContext,
    host: Arc<LocalHost>,
    state: WorkerState,
}

impl Registration {
    /// `ctx` must have been built with `host` as its [`Host`].
    pub fn new(ctx: WorkerContext, host: Arc<LocalHost>) -> Self {
        Self {
            ctx,
            host,
            state: WorkerState::Parsed,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub async fn install(&mut self) -> Result<usize> {
        if self.state != WorkerState::Parsed {
            bail!("Cannot install a worker that is {}", self.state);
        }
        self.state = WorkerState::Installing;
        match install(&self.ctx).await {
            Ok(count) => {
                self.state = WorkerState::Installed;
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "Install failed");
                self.state = WorkerState::Redundant;
                Err(e.into())
            }
        }
    }

    pub async fn activate(&mut self) -> Result<ActivateReport> {
        if self.state != WorkerState::Installed {
            bail!("Cannot activate a worker that is {}", self.state);
        }
        self.state = WorkerState::Activating;
        match activate(&self.ctx).await {
            Ok(report) => {
                self.state = WorkerState::Activated;
                Ok(report)
            }
            Err(e) => {
                self.state = WorkerState::Installed;
                Err(e.into())
            }
        }
    }

    /// Install, then activate straight away if the worker asked to skip waiting.
    pub async fn run(&mut self) -> Result<RunReport> {
        let cached = self.install().await?;
        let activation = if self.host.skip_waiting_requested() {
            Some(self.activate().await?)
        } else {
            None
        };
        Ok(RunReport { cached, activation })
    }
}

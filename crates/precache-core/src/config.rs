//! Worker configuration.
//!
//! The cache generation tag and asset manifest are deployment constants.
//! They are carried in an explicit [`WorkerConfig`] value that every handler
//! receives, so a host can override them (for example from a config file)
//! without touching global state.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Cache generation tag. Bump to invalidate every previously cached asset on
/// the next activation.
pub const CACHE_NAME: &str = "color-reactor-v1";

/// Paths pre-populated at install time.
pub const ASSET_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/style.css",
    "/game.js",
    "/manifest.json",
    "/icons/icon-72.png",
    "/icons/icon-192.png",
    "/icons/icon-512.png",
];

/// Document served to navigations when the network is unreachable.
pub const FALLBACK_DOCUMENT: &str = "/index.html";

/// Origin used when none is configured.
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin of the application this worker serves, e.g. `https://app.example.com`.
    pub origin: String,
    /// Cache generation tag naming the active store.
    pub cache_name: String,
    /// Asset manifest, as paths relative to the origin.
    pub assets: Vec<String>,
    pub fallback_document: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            cache_name: CACHE_NAME.to_string(),
            assets: ASSET_MANIFEST.iter().map(|p| p.to_string()).collect(),
            fallback_document: FALLBACK_DOCUMENT.to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin).map_err(|e| Error::InvalidUrl {
            url: self.origin.clone(),
            reason: e.to_string(),
        })?;
        if !url.has_host() {
            return Err(Error::InvalidUrl {
                url: self.origin.clone(),
                reason: "origin has no host".to_string(),
            });
        }
        Ok(url)
    }

    /// Resolve a manifest path against the configured origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin_url()?
            .join(path)
            .map_err(|e| Error::InvalidUrl {
                url: path.to_string(),
                reason: e.to_string(),
            })
    }

    /// Scheme, host and port must all match; a shared string prefix is not enough.
    pub fn is_same_origin(&self, url: &Url) -> Result<bool> {
        Ok(self.origin_url()?.origin() == url.origin())
    }

    /// Manifest paths with duplicates removed, first occurrence kept.
    pub fn unique_assets(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.assets
            .iter()
            .map(String::as_str)
            .filter(|path| seen.insert(*path))
            .collect()
    }
}

//! Host configuration management.
//!
//! The host wraps the worker configuration together with where cache stores
//! live on disk. Configuration is stored at `~/.config/precache/config.json`;
//! a missing file means the deployment defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use precache_core::WorkerConfig;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "precache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the configured origin
pub const ORIGIN_ENV: &str = "PRECACHE_ORIGIN";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub worker: WorkerConfig,
    /// Where cache stores are kept. Defaults to the platform cache directory.
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_origin_override(std::env::var(ORIGIN_ENV).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Blank values are ignored.
    pub fn apply_origin_override(&mut self, origin: Option<String>) {
        if let Some(origin) = origin.filter(|o| !o.trim().is_empty()) {
            self.worker.origin = origin.trim().to_string();
        }
    }
}

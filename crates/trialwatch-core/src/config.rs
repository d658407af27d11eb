//! Application configuration management.
//!
//! Configuration lives at `~/.config/trialwatch/config.json`. Every field has
//! a default, so a missing file (or a partial one) is fine. A few values can
//! be overridden from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::{DEFAULT_API_BASE_URL, DEFAULT_RETRY_ATTEMPTS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "trialwatch";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment override for the API base URL
pub const ENV_API_URL: &str = "TRIALWATCH_API_URL";

/// Environment override for the poll interval, in seconds
pub const ENV_POLL_SECS: &str = "TRIALWATCH_POLL_SECS";

/// Environment override for the cache directory
pub const ENV_CACHE_DIR: &str = "TRIALWATCH_CACHE_DIR";

/// What happens to a favorite when its record slides out of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// The favorites store is independent of the window.
    #[default]
    KeepFavorite,
    /// Evicting a favorited record also unpins it.
    RemoveFavorite,
}

/// How long the sampling pool (and its "already served" memory) lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolScope {
    /// Discarded on stop; the next start fetches a fresh pool.
    #[default]
    PerSession,
    /// Kept for the life of the service across stop/start cycles.
    Persistent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Records requested by the initial load.
    pub page_size: usize,
    /// Ids requested when priming the sampling pool.
    pub id_pool_size: usize,
    pub poll_interval_secs: u64,
    /// Total attempts per catalog request.
    pub retry_attempts: u32,
    pub eviction_policy: EvictionPolicy,
    pub pool_scope: PoolScope,
    /// Replaces the platform cache directory for stored state and logs.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: 10,
            id_pool_size: 1000,
            poll_interval_secs: 5,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            eviction_policy: EvictionPolicy::default(),
            pool_scope: PoolScope::default(),
            cache_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Apply overrides from a variable lookup (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup(ENV_POLL_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.poll_interval_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_POLL_SECS),
            }
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|d| !d.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

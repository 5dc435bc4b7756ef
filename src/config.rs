//! Configuration loading for the `astral` CLI and embedders.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag; must exist)
//! 2. `~/.astral/config.toml` (user)
//! 3. `/etc/astral/config.toml` (system)
//!
//! If no file is found, built-in defaults are used.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::disk;
use crate::worker::{AstralBuilder, DEFAULT_CACHE_NAME, WorkerConfig};
use crate::{Astral, AstralError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub network: NetworkSection,
}

/// Cache store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Store name (default: "astral-draft-v1").
    #[serde(default = "default_cache_name")]
    pub name: String,
    /// Delete stores under other names on activation (default: false).
    #[serde(default)]
    pub purge_stale_stores: bool,
    /// URLs to precache on install (default: none).
    #[serde(default)]
    pub precache: Vec<String>,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: default_cache_name(),
            purge_stale_stores: false,
            precache: Vec::new(),
            storage: StorageConfig::default(),
        }
    }
}

fn default_cache_name() -> String {
    DEFAULT_CACHE_NAME.to_string()
}

/// Where stores live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process memory only.
    Memory,
    /// JSON files under `dir` (default: `~/.cache/astral`).
    Disk {
        #[serde(default)]
        dir: Option<PathBuf>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Disk { dir: None }
    }
}

impl StorageConfig {
    /// Resolved storage directory for the disk backend; `None` for memory.
    pub fn dir(&self) -> Option<PathBuf> {
        match self {
            StorageConfig::Memory => None,
            StorageConfig::Disk { dir: Some(dir) } => Some(expand_home(dir)),
            StorageConfig::Disk { dir: None } => Some(disk::default_root()),
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkSection {
    /// Whole-request timeout in seconds (default: none).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// `User-Agent` header (default: "astral/<version>").
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; error if missing)
    /// 2. `~/.astral/config.toml`
    /// 3. `/etc/astral/config.toml`
    /// 4. Defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a specific config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AstralError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content).map_err(|e| match e {
            AstralError::Configuration(msg) => {
                AstralError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AstralError::Configuration(format!("Failed to parse config: {e}")))
    }

    /// Resolve the config file path, if any.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(AstralError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".astral").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/astral/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// The worker part of this configuration.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::new()
            .cache_name(self.cache.name.clone())
            .purge_stale_stores(self.cache.purge_stale_stores)
            .precache(self.cache.precache.iter().cloned())
    }

    /// A builder carrying this configuration's storage, worker and network settings.
    pub fn worker_builder(&self) -> AstralBuilder {
        let mut builder = Astral::builder().config(self.worker_config());

        builder = match self.cache.storage.dir() {
            Some(dir) => builder.disk_storage(dir),
            None => builder.memory_storage(),
        };

        if let Some(secs) = self.network.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(ref user_agent) = self.network.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        builder
    }
}

//! Builder for configuring worker instances

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::ServiceWorker;
use crate::cache::{CacheStorage, DiskStorage, MemoryStorage};
use crate::network::{HttpNetwork, Network, NetworkConfig};
use crate::{AstralError, Result};

/// Default cache store name. Bump the suffix to invalidate every entry.
pub const DEFAULT_CACHE_NAME: &str = "astral-draft-v1";

/// Worker configuration.
///
/// ```rust
/// # use astral_cache::WorkerConfig;
/// let config = WorkerConfig::new()
///     .cache_name("astral-draft-v2")
///     .purge_stale_stores(true);
/// assert_eq!(config.cache_name, "astral-draft-v2");
/// ```
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name of the cache store. Default: [`DEFAULT_CACHE_NAME`].
    pub cache_name: String,
    /// Delete stores under other names on activation. Default: false
    /// (old stores are abandoned, not deleted).
    pub purge_stale_stores: bool,
    /// URLs fetched and stored during install. Default: none.
    pub precache: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            purge_stale_stores: false,
            precache: Vec::new(),
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache store name.
    pub fn cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Enable or disable deleting stale stores on activation.
    pub fn purge_stale_stores(mut self, enabled: bool) -> Self {
        self.purge_stale_stores = enabled;
        self
    }

    /// Set the precache manifest.
    pub fn precache<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache = urls.into_iter().map(Into::into).collect();
        self
    }
}

/// Main entry point for creating workers.
pub struct Astral;

impl Astral {
    /// Create a new builder for configuring a worker.
    pub fn builder() -> AstralBuilder {
        AstralBuilder::new()
    }
}

/// Builder for configuring workers.
///
/// Defaults: in-memory storage, a reqwest network with no timeout.
pub struct AstralBuilder {
    config: WorkerConfig,
    storage: Option<Arc<dyn CacheStorage>>,
    network: Option<Arc<dyn Network>>,
    network_config: NetworkConfig,
}

impl AstralBuilder {
    pub fn new() -> Self {
        Self {
            config: WorkerConfig::default(),
            storage: None,
            network: None,
            network_config: NetworkConfig::default(),
        }
    }

    /// Replace the whole worker configuration.
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the cache store name.
    pub fn cache_name(mut self, name: impl Into<String>) -> Self {
        self.config.cache_name = name.into();
        self
    }

    /// Delete stores under other names on activation.
    pub fn purge_stale_stores(mut self, enabled: bool) -> Self {
        self.config.purge_stale_stores = enabled;
        self
    }

    /// URLs to fetch and store during install.
    pub fn precache<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.precache(urls);
        self
    }

    /// Use a custom storage backend.
    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Keep stores in memory (the default).
    pub fn memory_storage(self) -> Self {
        self.storage(Arc::new(MemoryStorage::new()))
    }

    /// Persist stores as JSON files under `dir`.
    pub fn disk_storage(self, dir: impl Into<PathBuf>) -> Self {
        self.storage(Arc::new(DiskStorage::new(dir)))
    }

    /// Use a custom network.
    pub fn network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    /// Whole-request timeout for the default HTTP network.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.network_config.timeout = Some(timeout);
        self
    }

    /// `User-Agent` for the default HTTP network.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.network_config.user_agent = user_agent.into();
        self
    }

    /// Build the worker. It starts in [`WorkerState::Parsed`](super::WorkerState::Parsed).
    pub fn build(self) -> Result<ServiceWorker> {
        if self.config.cache_name.trim().is_empty() {
            return Err(AstralError::Configuration(
                "cache name must not be empty".to_string(),
            ));
        }

        let storage: Arc<dyn CacheStorage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(MemoryStorage::new()),
        };
        let network: Arc<dyn Network> = match self.network {
            Some(network) => network,
            None => Arc::new(HttpNetwork::with_config(&self.network_config)?),
        };

        Ok(ServiceWorker::new(self.config, storage, network))
    }
}

impl Default for AstralBuilder {
    fn default() -> Self {
        Self::new()
    }
}

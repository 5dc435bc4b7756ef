//! The offline fetch gate: a service worker in miniature.
//!
//! A [`ServiceWorker`] is built once via [`Astral::builder()`](crate::Astral::builder),
//! holds its configuration and its collaborators, and goes through the
//! usual lifecycle:
//!
//! ```text
//! Parsed ──install()──▶ Installing ──▶ Installed ──activate()──▶ Activating ──▶ Activated
//!                            │
//!                            └── (install failed) ──▶ Redundant
//! ```
//!
//! Install opens (creating if absent) the named cache store, optionally
//! precaches a manifest, and skips waiting. Activation optionally deletes
//! stores under other names and then claims every open page.
//!
//! Once activated, [`ServiceWorker::handle_fetch`] intercepts GET requests
//! from controlled pages through the cache-first policy in [`fetch`].

pub mod background;
mod builder;
pub mod clients;
mod fetch;

pub use background::{BackgroundTasks, spawn_best_effort};
pub use builder::{Astral, AstralBuilder, DEFAULT_CACHE_NAME, WorkerConfig};
pub use clients::{ClientId, Clients};

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::try_join_all;
use tracing::{info, warn};

use crate::cache::CacheStorage;
use crate::network::Network;
use crate::telemetry;
use crate::types::{Request, Response};
use crate::{AstralError, Result};

/// Lifecycle state of a [`ServiceWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, not yet installed.
    Parsed,
    Installing,
    Installed,
    Activating,
    /// Controlling pages and intercepting fetches.
    Activated,
    /// Install failed; the worker will never activate.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// A fetch issued by a page.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub client_id: ClientId,
    pub request: Request,
}

impl FetchEvent {
    pub fn new(client_id: ClientId, request: Request) -> Self {
        Self { client_id, request }
    }
}

/// What the worker did with a [`FetchEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Not intercepted; the request goes to the network untouched.
    Passthrough(Request),
    /// The worker answered.
    Respond(Response),
}

/// The fetch gate.
///
/// Holds only its configuration and collaborators; every fetch is a
/// function of the request and the store contents.
pub struct ServiceWorker {
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Clients,
    default_client: ClientId,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    background: BackgroundTasks,
}

impl ServiceWorker {
    pub(crate) fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        let clients = Clients::new();
        let default_client = clients.open();
        Self {
            config,
            storage,
            network,
            clients,
            default_client,
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            background: BackgroundTasks::new(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// The page used by [`fetch()`](Self::fetch).
    pub fn default_client(&self) -> ClientId {
        self.default_client
    }

    pub fn state(&self) -> WorkerState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(WorkerState::Redundant)
    }

    /// Whether install asked to skip the waiting phase.
    ///
    /// Status only: a single worker never waits behind an older one, so
    /// nothing in the gate branches on this. Set once install succeeds.
    pub fn is_waiting_skipped(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    fn set_state(&self, next: WorkerState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Move from `from` to `to`, failing if the worker is elsewhere.
    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AstralError::Lifecycle("worker state lock poisoned".to_string()))?;
        if *state != from {
            return Err(AstralError::Lifecycle(format!(
                "cannot move to {to} from {} (expected {from})",
                *state
            )));
        }
        *state = to;
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Install: open the cache store, precache the manifest, skip waiting.
    ///
    /// On failure the worker becomes [`WorkerState::Redundant`].
    pub async fn install(&self) -> Result<()> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        info!(cache = %self.config.cache_name, "installing");

        if let Err(e) = self.populate().await {
            self.set_state(WorkerState::Redundant);
            warn!(cache = %self.config.cache_name, error = %e, "install failed");
            return Err(e);
        }

        self.set_state(WorkerState::Installed);
        self.skip_waiting();
        info!(cache = %self.config.cache_name, "installed");
        Ok(())
    }

    /// Open the store and write the precache manifest, all or nothing.
    async fn populate(&self) -> Result<()> {
        let store = self.storage.open(&self.config.cache_name).await?;
        if self.config.precache.is_empty() {
            return Ok(());
        }

        let network = self.network.as_ref();
        let fetched = try_join_all(self.config.precache.iter().map(|url| async move {
            let request = Request::get(url.as_str());
            let response = network.fetch(&request).await?;
            if !response.is_ok() {
                return Err(AstralError::Precache {
                    url: url.clone(),
                    status: response.status,
                });
            }
            Ok::<_, AstralError>((request, response))
        }))
        .await?;

        for (request, response) in fetched {
            if let Some(key) = request.key() {
                store.put(key, response).await?;
            }
        }
        info!(count = self.config.precache.len(), "precached");
        Ok(())
    }

    fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    /// Activate: optionally purge stale stores, then claim every open page.
    pub async fn activate(&self) -> Result<()> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;

        if self.config.purge_stale_stores {
            self.purge_stale_stores().await;
        }

        self.set_state(WorkerState::Activated);
        let claimed = self.clients.claim();
        info!(cache = %self.config.cache_name, claimed, "activated");
        Ok(())
    }

    /// Delete every store not named [`WorkerConfig::cache_name`]. Failures are logged.
    async fn purge_stale_stores(&self) {
        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "failed to list cache stores, skipping purge");
                return;
            }
        };
        for name in names.iter().filter(|n| **n != self.config.cache_name) {
            match self.storage.delete(name).await {
                Ok(_) => info!(store = %name, "deleted stale cache store"),
                Err(e) => warn!(store = %name, error = %e, "failed to delete stale cache store"),
            }
        }
    }

    /// Install then activate.
    pub async fn register(&self) -> Result<()> {
        self.install().await?;
        self.activate().await
    }

    // ========================================================================
    // Fetch
    // ========================================================================

    /// Decide how to answer a page's fetch.
    ///
    /// Intercepted GETs always produce a [`Interception::Respond`].
    pub async fn handle_fetch(&self, event: FetchEvent) -> Interception {
        let FetchEvent { client_id, request } = event;

        if self.state() != WorkerState::Activated || !self.clients.is_controlled(client_id) {
            return passthrough(request);
        }
        let Some(key) = request.key() else {
            return passthrough(request);
        };

        let store = match self.storage.open(&self.config.cache_name).await {
            Ok(store) => store,
            Err(e) => {
                warn!(cache = %self.config.cache_name, error = %e, "failed to open cache store");
                return Interception::Respond(
                    fetch::network_or_offline(self.network.as_ref(), &request).await,
                );
            }
        };

        Interception::Respond(
            fetch::cache_first(store, self.network.clone(), &self.background, request, key).await,
        )
    }

    /// Fetch from the default page.
    ///
    /// Passthrough requests go straight to the network and its errors
    /// propagate; intercepted GETs never fail.
    pub async fn fetch(&self, request: Request) -> Result<Response> {
        self.fetch_from(self.default_client, request).await
    }

    /// Fetch from a specific page.
    pub async fn fetch_from(&self, client_id: ClientId, request: Request) -> Result<Response> {
        match self.handle_fetch(FetchEvent::new(client_id, request)).await {
            Interception::Respond(response) => Ok(response),
            Interception::Passthrough(request) => self.network.fetch(&request).await,
        }
    }

    /// Wait for in-flight background refreshes to finish.
    pub async fn settle(&self) {
        self.background.settle().await;
    }

    /// Wait at most `limit` for background refreshes, aborting the rest.
    ///
    /// Returns `true` when every refresh finished in time.
    pub async fn settle_for(&self, limit: Duration) -> bool {
        self.background.settle_for(limit).await
    }
}

fn passthrough(request: Request) -> Interception {
    metrics::counter!(telemetry::FETCH_TOTAL, "source" => "passthrough").increment(1);
    Interception::Passthrough(request)
}

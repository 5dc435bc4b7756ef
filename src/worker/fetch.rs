//! Cache-first resolution for intercepted GET requests.
//!
//! For every intercepted GET the network fetch is launched as a background
//! task and the cache is read at the same time:
//!
//! - **hit**: the cached response goes back to the page immediately; the
//!   network task keeps running and refreshes the entry for next time.
//! - **miss**: the page waits for the network task. Success (any status)
//!   is passed through; failure becomes [`Response::offline()`].
//!
//! Only ok (2xx) network responses are written back, and the write waits
//! until this event's own cache lookup has completed, so the lookup always
//! observes the store as it was when the event was dispatched.
//!
//! Nothing on this path returns an error to the page.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::background::BackgroundTasks;
use crate::cache::CacheStore;
use crate::network::Network;
use crate::telemetry;
use crate::types::{Request, RequestKey, Response};
use crate::{AstralError, Result};

/// Resolve `request` through `store`, refreshing it from `network`.
pub(crate) async fn cache_first(
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    background: &BackgroundTasks,
    request: Request,
    key: RequestKey,
) -> Response {
    let (lookup_done_tx, lookup_done_rx) = oneshot::channel::<()>();
    let (outcome_tx, outcome_rx) = oneshot::channel::<Result<Response>>();

    background.spawn(
        "revalidate",
        revalidate(
            store.clone(),
            network,
            request,
            key.clone(),
            lookup_done_rx,
            outcome_tx,
        ),
    );

    let cached = match store.match_key(&key).await {
        Ok(cached) => cached,
        Err(e) => {
            warn!(%key, error = %e, "cache lookup failed, treating as miss");
            None
        }
    };
    // Release the refresh task's write.
    let _ = lookup_done_tx.send(());

    if let Some(response) = cached {
        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        metrics::counter!(telemetry::FETCH_TOTAL, "source" => "cache").increment(1);
        debug!(%key, "cache hit");
        return response;
    }

    metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
    debug!(%key, "cache miss, waiting on network");

    match outcome_rx.await {
        Ok(Ok(response)) => {
            metrics::counter!(telemetry::FETCH_TOTAL, "source" => "network").increment(1);
            response
        }
        Ok(Err(e)) => {
            debug!(%key, error = %e, "network failed with no cached entry, serving offline response");
            offline()
        }
        Err(_) => {
            warn!(%key, "network task ended without an outcome, serving offline response");
            offline()
        }
    }
}

/// Network-only resolution, used when the store cannot be opened.
pub(crate) async fn network_or_offline(network: &dyn Network, request: &Request) -> Response {
    match network.fetch(request).await {
        Ok(response) => {
            metrics::counter!(telemetry::FETCH_TOTAL, "source" => "network").increment(1);
            response
        }
        Err(e) => {
            metrics::counter!(telemetry::NETWORK_FAILURES_TOTAL).increment(1);
            debug!(url = %request.url, error = %e, "network failed, serving offline response");
            offline()
        }
    }
}

fn offline() -> Response {
    metrics::counter!(telemetry::FETCH_TOTAL, "source" => "offline").increment(1);
    Response::offline()
}

/// Fetch from the network, report the outcome, then write ok responses back.
///
/// Returns an error only when the cache write fails; the caller runs this
/// as a best-effort task, so that error is logged and dropped.
async fn revalidate(
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    request: Request,
    key: RequestKey,
    lookup_done: oneshot::Receiver<()>,
    outcome: oneshot::Sender<Result<Response>>,
) -> Result<()> {
    let response = match network.fetch(&request).await {
        Ok(response) => response,
        Err(e) => {
            metrics::counter!(telemetry::NETWORK_FAILURES_TOTAL).increment(1);
            debug!(%key, error = %e, "background refresh failed, cache left unchanged");
            let _ = outcome.send(Err(e));
            return Ok(());
        }
    };

    let copy = response.is_ok().then(|| response.clone());
    let status = response.status;
    // The page may have been served from cache already; a closed receiver is fine.
    let _ = outcome.send(Ok(response));

    let Some(copy) = copy else {
        debug!(%key, status, "not caching non-ok response");
        return Ok(());
    };

    // Err means the handler went away; its lookup is over either way.
    let _ = lookup_done.await;

    match store.put(key.clone(), copy).await {
        Ok(()) => {
            metrics::counter!(telemetry::CACHE_WRITES_TOTAL, "status" => "ok").increment(1);
            debug!(%key, status, "cache refreshed");
            Ok(())
        }
        Err(e) => {
            metrics::counter!(telemetry::CACHE_WRITES_TOTAL, "status" => "error").increment(1);
            Err(AstralError::Storage(format!(
                "failed to cache {key} in {}: {e}",
                store.name()
            )))
        }
    }
}

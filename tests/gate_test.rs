//! Tests for the fetch gate's failure handling, using scripted collaborators
//! in place of a real network and store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use astral_cache::cache::{CacheStorage, CacheStore, MemoryStorage};
use astral_cache::{
    Astral, AstralError, FetchEvent, Interception, Network, Request, RequestKey, Response, Result,
    ServiceWorker,
};

// ============================================================================
// Scripted networks
// ============================================================================

/// Always answers with the same response, counting calls.
struct FixedNetwork {
    response: Response,
    calls: AtomicUsize,
}

impl FixedNetwork {
    fn new(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Response::new(status, body),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Network for FixedNetwork {
    async fn fetch(&self, _request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Never resolves.
struct HangingNetwork;

#[async_trait]
impl Network for HangingNetwork {
    async fn fetch(&self, _request: &Request) -> Result<Response> {
        std::future::pending().await
    }
}

/// Panics inside the refresh task.
struct PanickingNetwork;

#[async_trait]
impl Network for PanickingNetwork {
    async fn fetch(&self, _request: &Request) -> Result<Response> {
        panic!("network stack exploded")
    }
}

// ============================================================================
// Scripted storage
// ============================================================================

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

/// Memory storage that counts every access and can fail reads or writes.
struct InstrumentedStorage {
    inner: MemoryStorage,
    counters: Arc<Counters>,
    fail_reads: bool,
    fail_writes: bool,
    fail_open: AtomicUsize,
}

impl InstrumentedStorage {
    fn new() -> Self {
        Self {
            inner: MemoryStorage::new(),
            counters: Arc::new(Counters::default()),
            fail_reads: false,
            fail_writes: false,
            fail_open: AtomicUsize::new(0),
        }
    }
}

struct InstrumentedStore {
    inner: Arc<dyn CacheStore>,
    counters: Arc<Counters>,
    fail_reads: bool,
    fail_writes: bool,
}

#[async_trait]
impl CacheStore for InstrumentedStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn match_key(&self, key: &RequestKey) -> Result<Option<Response>> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(AstralError::Storage("read failed".into()));
        }
        self.inner.match_key(key).await
    }

    async fn put(&self, key: RequestKey, response: Response) -> Result<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(AstralError::Storage("quota exceeded".into()));
        }
        self.inner.put(key, response).await
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        self.inner.keys().await
    }
}

#[async_trait]
impl CacheStorage for InstrumentedStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        // Fail the next N opens.
        if self
            .fail_open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AstralError::Storage("storage unavailable".into()));
        }
        Ok(Arc::new(InstrumentedStore {
            inner: self.inner.open(name).await?,
            counters: self.counters.clone(),
            fail_reads: self.fail_reads,
            fail_writes: self.fail_writes,
        }))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}

async fn active_worker(
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
) -> ServiceWorker {
    let worker = Astral::builder()
        .storage(storage)
        .network(network)
        .build()
        .unwrap();
    worker.register().await.unwrap();
    worker
}

async fn seed(storage: &dyn CacheStorage, url: &str, body: &str) {
    let store = storage.open("astral-draft-v1").await.unwrap();
    store
        .put(RequestKey::get(url), Response::new(200, body))
        .await
        .unwrap();
}

const URL: &str = "https://astral.test/api/scores";

// ============================================================================
// Non-GET requests never touch the store
// ============================================================================

#[tokio::test]
async fn non_get_never_reads_or_writes_store() {
    let storage = Arc::new(InstrumentedStorage::new());
    let counters = storage.counters.clone();
    let network = FixedNetwork::new(200, "ok");
    let worker = active_worker(storage, network.clone()).await;
    let opens_after_install = counters.opens.load(Ordering::SeqCst);

    for method in [
        astral_cache::Method::POST,
        astral_cache::Method::PUT,
        astral_cache::Method::DELETE,
        astral_cache::Method::PATCH,
    ] {
        let request = Request::new(method, URL);
        let outcome = worker
            .handle_fetch(FetchEvent::new(worker.default_client(), request.clone()))
            .await;
        assert_eq!(outcome, Interception::Passthrough(request));
    }
    worker.settle().await;

    assert_eq!(counters.opens.load(Ordering::SeqCst), opens_after_install);
    assert_eq!(counters.reads.load(Ordering::SeqCst), 0);
    assert_eq!(counters.writes.load(Ordering::SeqCst), 0);
    // handle_fetch only decides; nothing was sent.
    assert_eq!(network.calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Best-effort cache writes
// ============================================================================

#[tokio::test]
async fn failed_cache_write_does_not_affect_response() {
    let mut storage = InstrumentedStorage::new();
    storage.fail_writes = true;
    let storage = Arc::new(storage);
    let counters = storage.counters.clone();
    let worker = active_worker(storage, FixedNetwork::new(200, "fresh")).await;

    let response = worker.fetch(Request::get(URL)).await.unwrap();
    assert_eq!(response.text(), "fresh");

    worker.settle().await;
    assert_eq!(counters.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_cache_read_is_treated_as_miss() {
    let mut storage = InstrumentedStorage::new();
    storage.fail_reads = true;
    let worker = active_worker(Arc::new(storage), FixedNetwork::new(200, "fresh")).await;

    let response = worker.fetch(Request::get(URL)).await.unwrap();
    assert_eq!(response.text(), "fresh");
}

#[tokio::test]
async fn store_open_failure_falls_back_to_network() {
    let storage = Arc::new(InstrumentedStorage::new());
    let network = FixedNetwork::new(200, "direct");
    let worker = active_worker(storage.clone(), network.clone()).await;

    storage.fail_open.store(1, Ordering::SeqCst);
    let response = worker.fetch(Request::get(URL)).await.unwrap();
    assert_eq!(response.text(), "direct");
    assert_eq!(network.calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Resolution ordering
// ============================================================================

#[tokio::test]
async fn hit_reflects_store_at_dispatch() {
    let storage = Arc::new(MemoryStorage::new());
    seed(storage.as_ref(), URL, "stale").await;
    let worker = active_worker(storage.clone(), FixedNetwork::new(200, "fresh")).await;

    // The instant network cannot overtake this event's own lookup.
    for _ in 0..20 {
        seed(storage.as_ref(), URL, "stale").await;
        let response = worker.fetch(Request::get(URL)).await.unwrap();
        assert_eq!(response.text(), "stale");
        worker.settle().await;
    }

    let store = storage.open("astral-draft-v1").await.unwrap();
    let entry = store.match_key(&RequestKey::get(URL)).await.unwrap().unwrap();
    assert_eq!(entry.text(), "fresh");
}

#[tokio::test]
async fn hit_with_hanging_network_returns_immediately() {
    let storage = Arc::new(MemoryStorage::new());
    seed(storage.as_ref(), URL, "cached").await;
    let worker = active_worker(storage, Arc::new(HangingNetwork)).await;

    let response = tokio::time::timeout(Duration::from_millis(200), worker.fetch(Request::get(URL)))
        .await
        .expect("hit should not wait")
        .unwrap();
    assert_eq!(response.text(), "cached");
}

#[tokio::test]
async fn bounded_settle_abandons_hanging_refresh() {
    let storage = Arc::new(MemoryStorage::new());
    seed(storage.as_ref(), URL, "cached").await;
    let worker = active_worker(storage, Arc::new(HangingNetwork)).await;

    let response = worker.fetch(Request::get(URL)).await.unwrap();
    assert_eq!(response.text(), "cached");

    let settled = tokio::time::timeout(
        Duration::from_secs(2),
        worker.settle_for(Duration::from_millis(100)),
    )
    .await
    .expect("bounded settle should return");
    assert!(!settled);

    // The aborted refresh is gone, so an unbounded settle returns too.
    tokio::time::timeout(Duration::from_secs(2), worker.settle())
        .await
        .expect("nothing left to wait on");
}

#[tokio::test]
async fn miss_with_hanging_network_stays_pending() {
    let worker = active_worker(Arc::new(MemoryStorage::new()), Arc::new(HangingNetwork)).await;

    let result =
        tokio::time::timeout(Duration::from_millis(100), worker.fetch(Request::get(URL))).await;
    assert!(result.is_err(), "no timeout is applied on the network path");
}

#[tokio::test]
async fn panicking_network_yields_offline() {
    let worker = active_worker(Arc::new(MemoryStorage::new()), Arc::new(PanickingNetwork)).await;

    let response = worker.fetch(Request::get(URL)).await.unwrap();
    assert_eq!(response.text(), "Offline");
}

#[tokio::test]
async fn panicking_network_keeps_serving_hits() {
    let storage = Arc::new(MemoryStorage::new());
    seed(storage.as_ref(), URL, "cached").await;
    let worker = active_worker(storage, Arc::new(PanickingNetwork)).await;

    let response = worker.fetch(Request::get(URL)).await.unwrap();
    assert_eq!(response.text(), "cached");
    worker.settle().await;
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_distinct_keys() {
    let worker = Arc::new(
        active_worker(Arc::new(MemoryStorage::new()), FixedNetwork::new(200, "x")).await,
    );

    let mut handles = Vec::new();
    for i in 0..16 {
        let worker = worker.clone();
        handles.push(tokio::spawn(async move {
            worker
                .fetch(Request::get(format!("https://astral.test/icons/{i}.svg")))
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().text(), "x");
    }
    worker.settle().await;

    let store = worker.storage().open("astral-draft-v1").await.unwrap();
    assert_eq!(store.keys().await.unwrap().len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_same_key_leave_one_entry() {
    let worker = Arc::new(
        active_worker(Arc::new(MemoryStorage::new()), FixedNetwork::new(200, "same")).await,
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let worker = worker.clone();
        handles.push(tokio::spawn(async move { worker.fetch(Request::get(URL)).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().text(), "same");
    }
    worker.settle().await;

    let store = worker.storage().open("astral-draft-v1").await.unwrap();
    assert_eq!(store.keys().await.unwrap(), vec![RequestKey::get(URL)]);
}

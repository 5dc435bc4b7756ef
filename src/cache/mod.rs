//! Named cache stores.
//!
//! A [`CacheStorage`] is the set of named stores a worker can open (the
//! browser's `caches`). Each [`CacheStore`] maps a [`RequestKey`] to the
//! last [`Response`] written for it.
//!
//! Two backends:
//!
//! - [`MemoryStorage`]: moka-backed, process lifetime only.
//! - [`DiskStorage`]: one JSON file per store under a root directory,
//!   written atomically on every change.
//!
//! Neither backend evicts or expires entries. Invalidation happens by
//! opening a store under a new name (see
//! [`WorkerConfig::cache_name`](crate::WorkerConfig)) and, optionally,
//! deleting the old one.

pub mod disk;
pub mod memory;

pub use disk::{DiskStorage, DiskStore};
pub use memory::{MemoryStorage, MemoryStore};

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::types::{RequestKey, Response};

/// A single named key → response store.
///
/// At most one entry per key; `put` overwrites.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store name, as passed to [`CacheStorage::open`].
    fn name(&self) -> &str;

    /// Look up the entry for `key`. `Ok(None)` on miss.
    async fn match_key(&self, key: &RequestKey) -> Result<Option<Response>>;

    /// Insert or overwrite the entry for `key`.
    async fn put(&self, key: RequestKey, response: Response) -> Result<()>;

    /// Remove the entry for `key`. Returns whether an entry existed.
    async fn delete(&self, key: &RequestKey) -> Result<bool>;

    /// All keys currently stored.
    async fn keys(&self) -> Result<Vec<RequestKey>>;
}

/// The set of named stores available to a worker.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the store called `name`, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>>;

    /// Whether a store called `name` exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete the store called `name`. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all existing stores, sorted.
    async fn keys(&self) -> Result<Vec<String>>;
}

//! In-memory cache storage.
//!
//! Stores live for the lifetime of the [`MemoryStorage`]. Each store is an
//! unbounded moka cache with no TTL: entries only leave when overwritten,
//! deleted, or when the whole store is deleted.

use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;

use super::{CacheStorage, CacheStore};
use crate::types::{RequestKey, Response};
use crate::{AstralError, Result};

/// A single in-memory store.
pub struct MemoryStore {
    name: String,
    entries: Cache<RequestKey, Response>,
}

impl MemoryStore {
    /// Create an empty store. No capacity bound, no expiry.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Cache::builder().build(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &RequestKey) -> Result<Option<Response>> {
        Ok(self.entries.get(key).await)
    }

    async fn put(&self, key: RequestKey, response: Response) -> Result<()> {
        self.entries.insert(key, response).await;
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        Ok(self.entries.remove(key).await.is_some())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys: Vec<RequestKey> = self
            .entries
            .iter()
            .map(|(key, _)| (*key).clone())
            .collect();
        keys.sort_by(|a, b| a.url().cmp(b.url()));
        Ok(keys)
    }
}

/// In-memory [`CacheStorage`].
///
/// Thread-safe; clones of the returned store handles share state.
pub struct MemoryStorage {
    stores: moka::sync::Cache<String, Arc<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            stores: moka::sync::Cache::builder().build(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        if name.is_empty() {
            return Err(AstralError::InvalidInput(
                "cache store name must not be empty".to_string(),
            ));
        }
        let store = self
            .stores
            .get_with(name.to_string(), || Arc::new(MemoryStore::new(name)));
        Ok(store)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.stores.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.stores.remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .stores
            .iter()
            .map(|(name, _)| (*name).clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_once() {
        let storage = MemoryStorage::new();
        assert!(!storage.has("v1").await.unwrap());

        let a = storage.open("v1").await.unwrap();
        a.put(RequestKey::get("/a"), Response::new(200, "a"))
            .await
            .unwrap();

        // Second open returns the same store.
        let b = storage.open("v1").await.unwrap();
        assert_eq!(
            b.match_key(&RequestKey::get("/a")).await.unwrap(),
            Some(Response::new(200, "a"))
        );
    }

    #[tokio::test]
    async fn empty_name_rejected() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.open("").await,
            Err(AstralError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn put_overwrites() {
        let store = MemoryStore::new("v1");
        let key = RequestKey::get("/api/scores");
        store.put(key.clone(), Response::new(200, "1")).await.unwrap();
        store.put(key.clone(), Response::new(200, "2")).await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec![key.clone()]);
        assert_eq!(
            store.match_key(&key).await.unwrap().unwrap().text(),
            "2"
        );
    }

    #[tokio::test]
    async fn delete_store_and_entry() {
        let storage = MemoryStorage::new();
        let store = storage.open("v1").await.unwrap();
        let key = RequestKey::get("/a");
        store.put(key.clone(), Response::new(200, "a")).await.unwrap();

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());

        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
    }
}

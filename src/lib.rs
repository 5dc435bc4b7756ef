//! Astral - cache-first offline fetch gate
//!
//! This crate provides the offline network cache behind the Astral Draft
//! client: a [`ServiceWorker`] that intercepts GET requests, answers from a
//! named cache store when it can, refreshes that store from the network in
//! the background, and falls back to a synthetic `Offline` response when
//! neither cache nor network can answer.
//!
//! # Example
//!
//! ```rust,no_run
//! use astral_cache::{Astral, Request};
//!
//! #[tokio::main]
//! async fn main() -> astral_cache::Result<()> {
//!     let worker = Astral::builder()
//!         .cache_name("astral-draft-v1")
//!         .disk_storage("/tmp/astral-cache")
//!         .build()?;
//!
//!     worker.register().await?;
//!
//!     // Cache hit: immediate. Miss: waits on the network. Both offline: "Offline".
//!     let response = worker.fetch(Request::get("https://astral.test/api/scores")).await?;
//!     println!("{} {}", response.status, response.text());
//!
//!     // Let the background refresh land before exiting.
//!     worker.settle().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod network;
pub mod telemetry;
pub mod types;
mod version;
pub mod worker;

// Re-export main types at crate root
pub use cache::{CacheStorage, CacheStore, DiskStorage, MemoryStorage};
pub use error::{AstralError, Result};
pub use network::{HttpNetwork, Network, NetworkConfig};
pub use types::{Method, OFFLINE_BODY, Request, RequestKey, Response};
pub use version::{GIT_BRANCH, GIT_SHA, PKG_VERSION, git_dirty, version_string};
pub use worker::{
    Astral, AstralBuilder, ClientId, FetchEvent, Interception, ServiceWorker, WorkerConfig,
    WorkerState,
};

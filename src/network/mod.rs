//! The network side of the fetch gate.
//!
//! [`Network`] is the seam between the worker and whatever actually talks
//! to the upstream. [`HttpNetwork`] is the reqwest-backed implementation;
//! tests substitute their own.
//!
//! # Error contract
//!
//! A response with any HTTP status, including 4xx/5xx, is `Ok`. `Err` means
//! the request never produced a response (offline, DNS failure, connection
//! reset, timeout), which is what the gate treats as a network failure.

mod http;

pub use http::{HttpNetwork, NetworkConfig};

use async_trait::async_trait;

use crate::Result;
use crate::types::{Request, Response};

/// Something that can perform a fetch.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform `request` and capture the full response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

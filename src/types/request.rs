//! Request and cache key types

use std::fmt;

use reqwest::Method;
use serde::{Deserialize, Serialize};

/// An inbound fetch description issued by a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Create a request with the given method and URL.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a POST request with a body.
    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(Method::POST, url).body(body)
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Whether this request is eligible for interception.
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Cache identity for this request, or `None` for non-GET methods.
    pub fn key(&self) -> Option<RequestKey> {
        self.is_get().then(|| RequestKey::get(&self.url))
    }
}

/// Identity of a cacheable request: method plus URL.
///
/// Only GET requests produce a key. The URL fragment is not part of the
/// identity, matching how browsers match cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    /// Key for a GET request to `url`.
    pub fn get(url: &str) -> Self {
        let url = match url.split_once('#') {
            Some((base, _fragment)) => base,
            None => url,
        };
        Self {
            method: Method::GET.as_str().to_string(),
            url: url.to_string(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

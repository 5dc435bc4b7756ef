//! HTTP-like response type shared by the network, the cache and the page

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Body of the synthetic response returned when neither cache nor network can answer.
pub const OFFLINE_BODY: &str = "Offline";

/// A captured response: status, headers and full body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Response {
    /// Create a response with the given status and body and no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// The synthetic response handed to the page on total failure.
    pub fn offline() -> Self {
        Self::new(200, OFFLINE_BODY)
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the status text (reason phrase).
    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    /// Whether the status is in the 2xx range. Only ok responses are cached.
    pub fn is_ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_range() {
        assert!(Response::new(200, "").is_ok());
        assert!(Response::new(204, "").is_ok());
        assert!(Response::new(299, "").is_ok());
        assert!(!Response::new(199, "").is_ok());
        assert!(!Response::new(304, "").is_ok());
        assert!(!Response::new(404, "").is_ok());
        assert!(!Response::new(500, "").is_ok());
    }

    #[test]
    fn offline_body() {
        let response = Response::offline();
        assert_eq!(response.text(), "Offline");
        assert!(response.headers.is_empty());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = Response::new(200, "").with_header("Content-Type", "application/json");
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn serde_defaults_missing_fields() {
        let response: Response = serde_json::from_str(r#"{"status": 200}"#).unwrap();
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
        assert!(response.headers.is_empty());
    }
}

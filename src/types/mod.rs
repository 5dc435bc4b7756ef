//! Public types for the Astral API.

mod request;
mod response;

pub use request::{Request, RequestKey};
pub use response::{OFFLINE_BODY, Response};

/// HTTP method, re-exported from reqwest.
pub use reqwest::Method;

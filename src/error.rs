//! Astral error types

/// Astral error types
#[derive(Debug, thiserror::Error)]
pub enum AstralError {
    // Network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("precache of {url} failed with status {status}")]
    Precache { url: String, status: u16 },

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Worker errors
    /// A lifecycle step was invoked from a state that does not allow it.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for AstralError {
    fn from(err: reqwest::Error) -> Self {
        AstralError::Http(err.to_string())
    }
}

/// Result type alias for Astral operations
pub type Result<T> = std::result::Result<T, AstralError>;

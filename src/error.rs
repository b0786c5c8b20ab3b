use thiserror::Error;

/// Result type alias for scraper operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Main error type for the scraper.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Missing or rejected credential. Fatal, aborts before any download.
    #[error("authentication error: {0}")]
    Auth(String),

    /// An API response was missing a required field or had an unexpected
    /// shape.
    #[error("malformed API response: {context}")]
    MalformedResponse { context: String },

    /// A content request failed after its retry.
    #[error("failed to fetch {url}: HTTP {status}")]
    Fetch {
        status: reqwest::StatusCode,
        url: String,
    },

    /// A search page failed both its initial request and its retry.
    #[error("search page {page} failed after retry")]
    SearchExhausted { page: u32 },

    /// Transport-level HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inline file content that claimed to be base64 but was not.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

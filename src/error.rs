//! Custom error types for litharvest.
//!
//! Library functions return `Result<T, HarvestError>`. Malformed field content is
//! never an error here: the normalizer degrades it to a default instead.

use thiserror::Error;

/// Main error type for litharvest operations.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API, retries exhausted
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// A fetcher failed outside of HTTP (e.g. its task panicked)
    #[error("Source {source_name} failed: {message}")]
    Source {
        /// Fetcher name
        source_name: String,
        /// Failure description
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// A funnel checkpoint was written twice
    #[error("Funnel checkpoint '{0}' already recorded")]
    DuplicateCheckpoint(String),
}

/// Result type alias using `HarvestError`
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| HarvestError::Parse(msg.to_string()))
    }
}

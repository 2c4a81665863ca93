//! Store Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from the remote table store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level failure talking to the store
    #[error("Store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-2xx status
    #[error("Store rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    /// Row data did not match the expected shape
    #[error("Store returned malformed row data: {0}")]
    Decode(#[from] serde_json::Error),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            Self::Http(_) => "Could not reach the database. Check your connection.",
            Self::Api { .. } | Self::Decode(_) => "The database rejected the request.",
            Self::Config(_) => "Service configuration error.",
        }
    }
}

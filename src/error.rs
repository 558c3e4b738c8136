//! Error types for the limiter service.

use thiserror::Error;

/// Main error type for limiter service operations.
///
/// Quota exhaustion is deliberately absent here: it is reported through
/// [`crate::ratelimit::RateLimited`], which callers branch on.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for LimiterError {
    fn from(err: ::config::ConfigError) -> Self {
        LimiterError::Config(err.to_string())
    }
}

/// Result type alias for limiter service operations.
pub type Result<T> = std::result::Result<T, LimiterError>;

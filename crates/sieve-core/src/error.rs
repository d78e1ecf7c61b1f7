//! Error types for the invoice sieve.

use thiserror::Error;

/// Result type alias using the sieve's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for sieve operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input (schema or data violation)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (e.g. tenant mismatch)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Model artifact load or inference failure
    #[error("Model error: {0}")]
    Model(String),

    /// Text index failure (optional capability)
    #[error("Index error: {0}")]
    Index(String),

    /// Request deadline expired
    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

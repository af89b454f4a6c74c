//! # Strata Error Types
//!
//! Centralized error handling for the strata core library.

use thiserror::Error;

/// Result type alias for strata operations
pub type Result<T> = std::result::Result<T, StrataError>;

/// Core error types for strata
#[derive(Error, Debug)]
pub enum StrataError {
    /// Invalid input errors (empty keys, missing fields)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Dispatch to an unregistered `(recipient, request)` pair
    #[error("Handler not found: {0}")]
    HandlerNotFound(String),

    /// Second registration for the same `(recipient, request)` pair
    #[error("Handler already registered: {0}")]
    HandlerAlreadyRegistered(String),

    /// The bus no longer accepts new requests
    #[error("Bus is shutting down")]
    ShuttingDown,

    /// Unknown wire event name
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal/bug errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrataError {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

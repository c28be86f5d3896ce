//! Error types for AskMe
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for AskMe operations
///
/// Covers configuration loading, the session store, and the streaming
/// client. Soft misses (a session that does not exist) are not errors:
/// reads return `None` and updates are no-ops.
#[derive(Error, Debug)]
pub enum AskmeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session store errors (open, transaction abort, corrupt record)
    #[error("Storage error: {0}")]
    Store(String),

    /// A generated key collided with an existing record
    #[error("Key collision: {0}")]
    Conflict(String),

    /// The chat endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Response body, surfaced as error detail
        body: String,
    },

    /// The response stream failed before or while reading
    #[error("Stream transport error: {0}")]
    Transport(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for AskMe operations
///
/// Uses `anyhow::Error` so callers can attach context while the typed
/// `AskmeError` stays reachable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

//! # Error Types
//!
//! Custom error types for Wearable Sync using `thiserror`.

use thiserror::Error;

/// Main error type for Wearable Sync
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network-level failure (connect, timeout, TLS, body read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("Backend returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// No token is stored
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Companion SDK not initialized or its service unavailable
    #[error("Companion SDK error: {0}")]
    Device(String),

    /// Key-value storage errors
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias for Wearable Sync
pub type Result<T> = std::result::Result<T, SyncError>;

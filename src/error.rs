//! Error types for zonesync.

use thiserror::Error;

/// Result type alias for zonesync.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Synchronization error types.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Provider API rejection.
    #[error("Provider error ({context}): {message}")]
    Provider { context: String, message: String },

    /// Public IP detection error.
    #[error("IP detection failed: {0}")]
    IpDetection(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Provider rejection with context (a zone, app, or endpoint name).
    pub fn provider(context: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Provider {
            context: context.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Network(e.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(e: toml::de::Error) -> Self {
        SyncError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(e: toml::ser::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

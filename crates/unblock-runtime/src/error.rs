//! Error types for unblock-runtime.

use thiserror::Error;

/// Result type alias using the runtime error
pub type Result<T> = std::result::Result<T, SyncError>;

/// Runtime synchronization errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// The external state manager could not apply the update right now
    #[error("Target state unavailable: {0}")]
    Unavailable(String),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Must be called from within a Tokio runtime
    #[error("No Tokio runtime available")]
    NoRuntime,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Storage is not configured")]
    NotConfigured,

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }
}

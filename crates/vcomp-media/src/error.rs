//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Source unavailable: {message}")]
    SourceUnavailable { message: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a source failure error.
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for MediaError {
    fn from(e: reqwest::Error) -> Self {
        Self::source_unavailable(e.to_string())
    }
}

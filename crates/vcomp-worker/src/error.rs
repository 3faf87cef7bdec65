//! Render error types.

use thiserror::Error;

use vcomp_media::MediaError;
use vcomp_models::{FailureKind, ModelError};
use vcomp_storage::StorageError;

pub type PipelineResult<T> = Result<T, RenderError>;

/// Failures that end a render. Absorbed failures become warnings instead.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] ModelError),

    #[error("No valid scenes: all {attempted} scenes were dropped")]
    NoValidScenes { attempted: usize },

    #[error("Render timed out after {0} seconds")]
    Timeout(u64),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Bundle export failed: {0}")]
    Bundle(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RenderError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn bundle(msg: impl Into<String>) -> Self {
        Self::Bundle(msg.into())
    }

    /// Stable failure kind reported in the result and metrics.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
            Self::NoValidScenes { .. } => FailureKind::NoValidScenes,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::UploadFailed(_) | Self::Storage(_) => FailureKind::UploadFailed,
            Self::Media(e) if e.is_timeout() => FailureKind::Timeout,
            Self::Media(MediaError::SourceUnavailable { .. }) => FailureKind::SourceUnavailable,
            Self::Media(_)
            | Self::Bundle(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Internal(_) => FailureKind::InternalFailure,
        }
    }
}

impl From<zip::result::ZipError> for RenderError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Bundle(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            RenderError::NoValidScenes { attempted: 2 }.kind(),
            FailureKind::NoValidScenes
        );
        assert_eq!(
            RenderError::from(ModelError::NoScenes).kind(),
            FailureKind::InvalidRequest
        );
        assert_eq!(
            RenderError::from(MediaError::Timeout(600)).kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            RenderError::from(MediaError::source_unavailable("404")).kind(),
            FailureKind::SourceUnavailable
        );
        assert_eq!(
            RenderError::from(MediaError::internal("boom")).kind(),
            FailureKind::InternalFailure
        );
        assert_eq!(
            RenderError::from(StorageError::upload_failed("denied")).kind(),
            FailureKind::UploadFailed
        );
    }
}

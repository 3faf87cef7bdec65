//! Model validation errors.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating or parsing project data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Project must contain at least one scene")]
    NoScenes,

    #[error("Scene {scene_id}: {message}")]
    InvalidScene { scene_id: String, message: String },

    #[error("Caption {index}: {message}")]
    InvalidCaption { index: usize, message: String },

    #[error("Invalid color '{0}'")]
    InvalidColor(String),

    #[error("Invalid timecode '{0}'")]
    InvalidTimecode(String),

    #[error("Malformed transcript block {block}: {message}")]
    MalformedTranscript { block: usize, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ModelError {
    pub fn invalid_scene(scene_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidScene {
            scene_id: scene_id.into(),
            message: message.into(),
        }
    }

    pub fn invalid_caption(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidCaption {
            index,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

//! Shared data models for the film composition backend.
//!
//! This crate provides Serde-serializable types for:
//! - Project requests (scenes, captions, music, voiceovers)
//! - Caption styling and the style merge rules
//! - Transition selection per scene boundary
//! - Timeline arithmetic (overlaps, offsets, fade schedules)
//! - SRT transcripts
//! - Encoding configuration
//! - Render results and warnings

pub mod caption;
pub mod encoding;
pub mod error;
pub mod project;
pub mod result;
pub mod timeline;
pub mod transcript;
pub mod transition;

// Re-export common types
pub use caption::{
    effective_style, Caption, CaptionPosition, CaptionStyle, Color, FontSize, FontSizeClass,
    ResolvedCaptionStyle,
};
pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use project::{
    AudioEnvelope, Music, OutputFormat, ProjectRequest, Resolution, Scene, SceneSource,
    StorageCredentials, Voiceover,
};
pub use result::{FailureKind, RenderResult, RenderStage, RenderStatus, RenderWarning};
pub use timeline::{Boundary, FadeSchedule, ResolvedEnvelope};
pub use transcript::{format_srt_timestamp, generate_srt, parse_srt, SrtEntry};
pub use transition::{TransitionFamily, TransitionKind};

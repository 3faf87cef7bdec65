//! Render result and warning types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Final status of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    Complete,
    Error,
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    Fetching,
    Normalizing,
    Sequencing,
    Captioning,
    Mixing,
    Exporting,
    Done,
    Failed,
}

impl RenderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::Fetching => "fetching",
            RenderStage::Normalizing => "normalizing",
            RenderStage::Sequencing => "sequencing",
            RenderStage::Captioning => "captioning",
            RenderStage::Mixing => "mixing",
            RenderStage::Exporting => "exporting",
            RenderStage::Done => "done",
            RenderStage::Failed => "failed",
        }
    }

    /// Stage that follows on success, `None` for terminal stages.
    pub fn next(&self) -> Option<RenderStage> {
        match self {
            RenderStage::Fetching => Some(RenderStage::Normalizing),
            RenderStage::Normalizing => Some(RenderStage::Sequencing),
            RenderStage::Sequencing => Some(RenderStage::Captioning),
            RenderStage::Captioning => Some(RenderStage::Mixing),
            RenderStage::Mixing => Some(RenderStage::Exporting),
            RenderStage::Exporting => Some(RenderStage::Done),
            RenderStage::Done | RenderStage::Failed => None,
        }
    }
}

impl std::fmt::Display for RenderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure taxonomy shared by fatal errors and absorbed warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum FailureKind {
    /// A source could not be fetched or decoded; the scene or feature is skipped
    SourceUnavailable,
    /// Every scene was dropped
    NoValidScenes,
    /// A transition could not be rendered; the boundary became a cut
    TransitionFailed,
    /// Caption burn-in or music mixing failed; the input passed through
    OverlayFailed,
    /// An artifact could not be uploaded; it was delivered inline
    UploadFailed,
    Timeout,
    InternalFailure,
    InvalidRequest,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SourceUnavailable => "SourceUnavailable",
            FailureKind::NoValidScenes => "NoValidScenes",
            FailureKind::TransitionFailed => "TransitionFailed",
            FailureKind::OverlayFailed => "OverlayFailed",
            FailureKind::UploadFailed => "UploadFailed",
            FailureKind::Timeout => "Timeout",
            FailureKind::InternalFailure => "InternalFailure",
            FailureKind::InvalidRequest => "InvalidRequest",
        }
    }

    /// Whether this kind ends the render instead of degrading it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FailureKind::NoValidScenes
                | FailureKind::Timeout
                | FailureKind::InternalFailure
                | FailureKind::InvalidRequest
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure the pipeline absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderWarning {
    pub stage: RenderStage,
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    pub message: String,
}

impl RenderWarning {
    pub fn new(stage: RenderStage, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            scene_id: None,
            message: message.into(),
        }
    }

    pub fn for_scene(mut self, scene_id: impl Into<String>) -> Self {
        self.scene_id = Some(scene_id.into());
        self
    }
}

/// Response of one render.
///
/// Each artifact is delivered either as a URL or inline as base64, never
/// both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderResult {
    pub status: RenderStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_base64: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_base64: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srt_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srt_url: Option<String>,

    /// Measured duration of the final video in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Measured size of the final video in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,

    #[serde(default)]
    pub warnings: Vec<RenderWarning>,
}

impl RenderResult {
    fn empty(status: RenderStatus) -> Self {
        Self {
            status,
            video_url: None,
            video_base64: None,
            draft_url: None,
            draft_base64: None,
            srt_content: None,
            srt_url: None,
            duration: None,
            file_size: None,
            error: None,
            error_kind: None,
            warnings: Vec::new(),
        }
    }

    pub fn complete() -> Self {
        Self::empty(RenderStatus::Complete)
    }

    /// A failed render. Carries no artifacts.
    pub fn failed(
        kind: FailureKind,
        message: impl Into<String>,
        warnings: Vec<RenderWarning>,
    ) -> Self {
        Self {
            error: Some(message.into()),
            error_kind: Some(kind),
            warnings,
            ..Self::empty(RenderStatus::Error)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == RenderStatus::Complete
    }

    /// Completed, but with at least one absorbed failure.
    pub fn is_degraded(&self) -> bool {
        self.is_complete() && !self.warnings.is_empty()
    }

    pub fn has_artifacts(&self) -> bool {
        self.video_url.is_some()
            || self.video_base64.is_some()
            || self.draft_url.is_some()
            || self.draft_base64.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let mut stage = RenderStage::Fetching;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(stage, RenderStage::Done);
        assert!(RenderStage::Failed.next().is_none());
    }

    #[test]
    fn test_failed_result_shape() {
        let result = RenderResult::failed(FailureKind::NoValidScenes, "no scenes", vec![]);
        assert!(!result.is_complete());
        assert!(!result.has_artifacts());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_kind"], "NoValidScenes");
        assert!(json.get("video_url").is_none());
    }

    #[test]
    fn test_degraded_flag() {
        let mut result = RenderResult::complete();
        assert!(!result.is_degraded());
        result.warnings.push(
            RenderWarning::new(
                RenderStage::Fetching,
                FailureKind::SourceUnavailable,
                "404",
            )
            .for_scene("s1"),
        );
        assert!(result.is_degraded());
        assert_eq!(result.warnings[0].scene_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(FailureKind::Timeout.is_fatal());
        assert!(!FailureKind::UploadFailed.is_fatal());
    }
}

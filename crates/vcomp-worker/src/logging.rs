//! Structured render logging.
//!
//! Every event carries the project id so the lines of one render can be
//! followed through interleaved output.

use tracing::{error, info, warn, Span};

use vcomp_models::{FailureKind, RenderResult, RenderStage, RenderWarning};

/// Logger bound to one render.
#[derive(Debug, Clone)]
pub struct RenderLogger {
    project_id: String,
    scene_count: usize,
}

impl RenderLogger {
    pub fn new(project_id: &str, scene_count: usize) -> Self {
        Self {
            project_id: project_id.to_string(),
            scene_count,
        }
    }

    pub fn log_start(&self, project_name: &str) {
        info!(
            project_id = %self.project_id,
            scenes = self.scene_count,
            "Render started: {}", project_name
        );
    }

    pub fn log_stage(&self, stage: RenderStage) {
        info!(
            project_id = %self.project_id,
            stage = %stage,
            "Render stage: {}", stage
        );
    }

    pub fn log_warning(&self, warning: &RenderWarning) {
        warn!(
            project_id = %self.project_id,
            stage = %warning.stage,
            kind = %warning.kind,
            scene_id = warning.scene_id.as_deref().unwrap_or("-"),
            "Render degraded: {}", warning.message
        );
    }

    pub fn log_error(&self, kind: FailureKind, message: &str) {
        error!(
            project_id = %self.project_id,
            kind = %kind,
            "Render failed: {}", message
        );
    }

    pub fn log_completion(&self, result: &RenderResult, elapsed_secs: f64) {
        info!(
            project_id = %self.project_id,
            duration = result.duration.unwrap_or_default(),
            file_size = result.file_size.unwrap_or_default(),
            warnings = result.warnings.len(),
            elapsed_secs,
            "Render completed"
        );
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Span instrumenting a whole render.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "render",
            project_id = %self.project_id,
            scenes = self.scene_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_creation() {
        let logger = RenderLogger::new("proj-7", 3);
        assert_eq!(logger.project_id(), "proj-7");
        logger.log_stage(RenderStage::Fetching);
        logger.log_warning(
            &RenderWarning::new(RenderStage::Mixing, FailureKind::OverlayFailed, "no music")
                .for_scene("s1"),
        );
    }
}

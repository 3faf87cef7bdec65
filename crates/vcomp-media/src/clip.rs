//! Intermediate clips and stage outcomes.

use std::path::{Path, PathBuf};

use vcomp_models::RenderWarning;

use crate::command::FfmpegInput;

/// Sample rate of every normalized audio track.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;
/// Channel layout of every normalized audio track.
pub const AUDIO_CHANNEL_LAYOUT: &str = "stereo";

/// A rendered file on disk and its timeline length.
///
/// The duration is the planned length, tracked arithmetically through the
/// pipeline rather than re-probed after every step.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub path: PathBuf,
    pub duration: f64,
}

impl Clip {
    pub fn new(path: impl Into<PathBuf>, duration: f64) -> Self {
        Self {
            path: path.into(),
            duration,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Result of a stage that degrades instead of failing: either the
/// transformed clip, or the untransformed input plus the warnings that
/// explain why.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub clip: Clip,
    pub warnings: Vec<RenderWarning>,
}

impl StageOutcome {
    pub fn transformed(clip: Clip) -> Self {
        Self {
            clip,
            warnings: Vec::new(),
        }
    }

    pub fn passed_through(input: Clip, warning: RenderWarning) -> Self {
        Self {
            clip: input,
            warnings: vec![warning],
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A silent stereo track of the given length, as an extra input.
pub fn silent_audio_input(duration: f64) -> FfmpegInput {
    FfmpegInput::lavfi(format!(
        "anullsrc=channel_layout={}:sample_rate={}",
        AUDIO_CHANNEL_LAYOUT, AUDIO_SAMPLE_RATE
    ))
    .duration(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcomp_models::{FailureKind, RenderStage};

    #[test]
    fn test_stage_outcome() {
        let clip = Clip::new("/tmp/a.mp4", 3.0);
        assert!(!StageOutcome::transformed(clip.clone()).is_degraded());

        let outcome = StageOutcome::passed_through(
            clip.clone(),
            RenderWarning::new(RenderStage::Mixing, FailureKind::OverlayFailed, "boom"),
        );
        assert!(outcome.is_degraded());
        assert_eq!(outcome.clip, clip);
    }

    #[test]
    fn test_silent_input() {
        let input = silent_audio_input(2.5);
        assert_eq!(input.source, "anullsrc=channel_layout=stereo:sample_rate=44100");
        assert!(input.args.contains(&"2.500".to_string()));
    }
}

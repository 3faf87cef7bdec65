//! The impure edge of the pipeline.
//!
//! Stages build [`FfmpegCommand`]s and hand them to a [`MediaBackend`].
//! Production uses [`FfmpegBackend`]; tests substitute a recording fake so
//! the composition logic runs without ffmpeg installed.

use async_trait::async_trait;
use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{probe_media, MediaInfo};

#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Run one ffmpeg invocation to completion.
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()>;

    /// Inspect a media file.
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo>;
}

/// Backend that shells out to the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    runner: FfmpegRunner,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any single ffmpeg invocation running longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.runner.run(cmd).await
    }

    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        probe_media(path).await
    }
}

//! In-memory [`MediaBackend`] for tests.
//!
//! Records every command, writes a small placeholder to each output path and
//! remembers the planned duration so later probes and stages see consistent
//! lengths. Individual operations can be told to fail.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::backend::MediaBackend;
use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::probe::MediaInfo;

#[derive(Debug, Default)]
struct FakeState {
    commands: Vec<FfmpegCommand>,
    failing_labels: Vec<String>,
    failing_outputs: Vec<String>,
    media: HashMap<PathBuf, MediaInfo>,
}

/// Recording fake backend.
#[derive(Debug)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    default_info: MediaInfo,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            default_info: MediaInfo {
                duration: 10.0,
                width: 1920,
                height: 1080,
                fps: 30.0,
                has_video: true,
                has_audio: true,
                size: 0,
            },
        }
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe result for files the fake did not write itself.
    pub fn with_default_info(mut self, info: MediaInfo) -> Self {
        self.default_info = info;
        self
    }

    /// Fail every command with this label (`transition`, `burn_captions`, ...).
    pub fn fail_label(self, label: &str) -> Self {
        self.lock().failing_labels.push(label.to_string());
        self
    }

    /// Fail every command whose output path contains `fragment`.
    pub fn fail_output(self, fragment: &str) -> Self {
        self.lock().failing_outputs.push(fragment.to_string());
        self
    }

    /// Commands run so far, in order.
    pub fn commands(&self) -> Vec<FfmpegCommand> {
        self.lock().commands.clone()
    }

    /// Labels of the commands run so far, in order.
    pub fn labels(&self) -> Vec<String> {
        self.lock()
            .commands
            .iter()
            .map(|c| c.label().to_string())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn should_fail(state: &FakeState, cmd: &FfmpegCommand) -> bool {
        let output = cmd.output_path().to_string_lossy();
        state.failing_labels.iter().any(|l| l == cmd.label())
            || state.failing_outputs.iter().any(|f| output.contains(f.as_str()))
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let duration = {
            let mut state = self.lock();
            state.commands.push(cmd.clone());
            if Self::should_fail(&state, cmd) {
                return Err(MediaError::ffmpeg_failed(
                    format!("{} rejected by fake backend", cmd.label()),
                    None,
                    Some(1),
                ));
            }
            cmd.expected_duration()
                .or_else(|| {
                    cmd.inputs()
                        .first()
                        .and_then(|i| state.media.get(Path::new(&i.source)))
                        .map(|info| info.duration)
                })
                .unwrap_or(self.default_info.duration)
        };

        let output = cmd.output_path();
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = format!("fake {} output", cmd.label());
        tokio::fs::write(output, body.as_bytes()).await?;

        self.lock().media.insert(
            output.to_path_buf(),
            MediaInfo {
                duration,
                size: body.len() as u64,
                ..self.default_info.clone()
            },
        );
        Ok(())
    }

    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        if let Some(info) = self.lock().media.get(path) {
            return Ok(info.clone());
        }
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?
            .len();
        Ok(MediaInfo {
            size,
            ..self.default_info.clone()
        })
    }
}

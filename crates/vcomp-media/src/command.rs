//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use vcomp_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, FfmpegProgress};

/// Lines of ffmpeg diagnostics kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// ffmpeg's own log verbosity; progress arrives separately.
const LOG_LEVEL: &str = "error";

/// One `-i` input with the options that precede it.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegInput {
    pub args: Vec<String>,
    pub source: String,
}

impl FfmpegInput {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            args: Vec::new(),
            source: path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// A lavfi source such as `anullsrc=...`.
    pub fn lavfi(spec: impl Into<String>) -> Self {
        Self {
            args: vec!["-f".to_string(), "lavfi".to_string()],
            source: spec.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Seek the input before decoding.
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(format!("{:.3}", seconds))
    }

    /// Limit how much of the input is read.
    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(format!("{:.3}", seconds))
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Operation name used in logs and errors
    label: String,
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    /// Output arguments (after the inputs)
    output_args: Vec<String>,
    overwrite: bool,
    /// Length the output is planned to have, used for progress reporting
    expected_duration: Option<f64>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(label: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            label: label.into(),
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            expected_duration: None,
        }
    }

    /// Add a plain file input.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_spec(FfmpegInput::file(path))
    }

    /// Add a fully specified input.
    pub fn input_spec(mut self, input: FfmpegInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add output arguments (after the inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter pad into the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Stream copy everything.
    pub fn copy_streams(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Full video and audio encoder settings.
    pub fn encoding(self, config: &EncodingConfig) -> Self {
        self.output_args(config.to_ffmpeg_args())
    }

    /// Limit output duration.
    pub fn output_duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Set output frame rate.
    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Move the moov atom to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Record the planned output length.
    pub fn expect_duration(mut self, seconds: f64) -> Self {
        self.expected_duration = Some(seconds);
        self
    }

    pub fn expected_duration(&self) -> Option<f64> {
        self.expected_duration
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn inputs(&self) -> &[FfmpegInput] {
        &self.inputs
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Value following `flag` in the output arguments, if present.
    pub fn output_flag(&self, flag: &str) -> Option<&str> {
        self.output_args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.output_args.get(i + 1))
            .map(String::as_str)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(LOG_LEVEL.to_string());
        args.push("-nostats".to_string());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking and a timeout.
///
/// Children are spawned with `kill_on_drop`, so dropping a run (the render
/// timeout does this) stops the encoder.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(u64),
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command, tracing progress against its planned length.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let label = cmd.label().to_string();
        let total = cmd.expected_duration().unwrap_or(0.0);
        self.run_with_progress(cmd, move |p| {
            trace!(
                operation = %label,
                percent = p.percentage(total),
                speed = p.speed,
                "FFmpeg progress"
            );
        })
        .await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!(operation = cmd.label(), "Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stderr was not captured"))?;
        let mut reader = BufReader::new(stderr).lines();

        // Progress lines feed the callback, everything else is kept for errors
        let stderr_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                if is_progress_line(&line) {
                    if let Some(snapshot) = current.apply_line(&line) {
                        progress_callback(snapshot);
                    }
                } else if !line.trim().is_empty() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let outcome = self.wait_for_completion(&mut child).await;

        let status = match outcome {
            Outcome::Exited(status) => status?,
            Outcome::TimedOut(secs) => {
                warn!(operation = cmd.label(), "FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                stderr_handle.abort();
                return Err(MediaError::Timeout(secs));
            }
        };

        let stderr_tail = stderr_handle.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                format!("{} exited with non-zero status", cmd.label()),
                (!stderr_tail.is_empty()).then_some(stderr_tail),
                status.code(),
            ))
        }
    }

    /// Wait for the child process, bounded by the timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> Outcome {
        match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(status) => Outcome::Exited(status),
                Err(_) => Outcome::TimedOut(secs),
            },
            None => Outcome::Exited(child.wait().await),
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("normalize", "out.mp4")
            .input_spec(FfmpegInput::file("input.mp4").seek(10.0))
            .input_spec(FfmpegInput::lavfi("anullsrc=channel_layout=stereo:sample_rate=44100"))
            .map("[v]")
            .map("1:a")
            .video_codec("libx264");

        let args = cmd.build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-ss 10.000 -i input.mp4"));
        assert!(joined.contains("-f lavfi -i anullsrc=channel_layout=stereo:sample_rate=44100"));
        assert!(joined.contains("-map [v] -map 1:a"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert_eq!(args[0], "-y");
    }

    #[test]
    fn test_inputs_precede_outputs() {
        let cmd = FfmpegCommand::new("mix", "o.mp4")
            .input("a.mp4")
            .input("b.mp3")
            .copy_streams();
        let args = cmd.build_args();
        let last_input = args.iter().rposition(|a| a == "-i").unwrap();
        let copy = args.iter().position(|a| a == "-c").unwrap();
        assert!(last_input < copy);
        assert_eq!(cmd.inputs().len(), 2);
    }

    #[test]
    fn test_output_flag_lookup() {
        let cmd = FfmpegCommand::new("x", "o.mp4").filter_complex("[0:v]null[v]");
        assert_eq!(cmd.output_flag("-filter_complex"), Some("[0:v]null[v]"));
        assert_eq!(cmd.output_flag("-map"), None);
        assert_eq!(cmd.label(), "x");
    }

    #[test]
    fn test_encoding_args() {
        let cmd = FfmpegCommand::new("x", "o.mp4").encoding(&EncodingConfig::default());
        assert_eq!(cmd.output_flag("-preset"), Some("fast"));
        assert_eq!(cmd.output_flag("-crf"), Some("23"));
    }

    #[test]
    fn test_global_flags_lead() {
        let args = FfmpegCommand::new("x", "o.mp4").input("a.mp4").build_args();
        assert_eq!(&args[..6], ["-y", "-v", "error", "-nostats", "-progress", "pipe:2"]);
    }
}

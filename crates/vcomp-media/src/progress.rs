//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Progress percentage for an output of `total_secs`.
    pub fn percentage(&self, total_secs: f64) -> f64 {
        if total_secs <= 0.0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / 1000.0 / total_secs) * 100.0).clamp(0.0, 100.0)
    }

    /// Fold one `key=value` line of `-progress` output into this state.
    ///
    /// Returns a snapshot at the end of every progress block.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }
}

/// Returns true for lines that belong to the `-progress` protocol rather than
/// to ffmpeg's diagnostic output.
pub fn is_progress_line(line: &str) -> bool {
    const KEYS: &[&str] = &[
        "frame",
        "fps",
        "stream_0_0_q",
        "bitrate",
        "total_size",
        "out_time_us",
        "out_time_ms",
        "out_time",
        "dup_frames",
        "drop_frames",
        "speed",
        "progress",
    ];
    line.split_once('=')
        .map(|(k, _)| KEYS.contains(&k.trim()) || k.starts_with("stream_"))
        .unwrap_or(false)
}

//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF
pub const DEFAULT_CRF: u8 = 23;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
/// Pixel format every intermediate clip is normalized to
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Audio sample rate every intermediate clip is normalized to
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Scene count at which renders switch to the cheaper preset.
pub const FAST_PRESET_THRESHOLD: usize = 20;

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "veryfast")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
        }
    }
}

impl EncodingConfig {
    /// Cheaper settings for long projects.
    pub fn fast() -> Self {
        Self {
            preset: "veryfast".to_string(),
            crf: DEFAULT_CRF + 3,
            ..Default::default()
        }
    }

    /// Pick settings by project size: at or above `threshold` scenes the
    /// cheaper preset is used.
    pub fn for_scene_count(scene_count: usize, threshold: usize) -> Self {
        if scene_count >= threshold {
            Self::fast()
        } else {
            Self::default()
        }
    }

    /// Video-only encoder arguments.
    pub fn video_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
        ]
    }

    /// Audio-only encoder arguments.
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-ar".to_string(),
            DEFAULT_SAMPLE_RATE.to_string(),
        ]
    }

    /// Convert to FFmpeg command arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = self.video_args();
        args.extend(self.audio_args());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncodingConfig::default();
        assert_eq!(config.codec, "libx264");
        assert_eq!(config.crf, 23);
        assert_eq!(config.preset, "fast");
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = EncodingConfig::default().to_ffmpeg_args();
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"23".to_string()));
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&"192k".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
    }

    #[test]
    fn test_scene_count_switches_preset() {
        let small = EncodingConfig::for_scene_count(19, FAST_PRESET_THRESHOLD);
        assert_eq!(small.preset, "fast");
        let large = EncodingConfig::for_scene_count(20, FAST_PRESET_THRESHOLD);
        assert_eq!(large.preset, "veryfast");
        assert_eq!(large.crf, 26);
    }
}

//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels, 0 without a video stream
    pub width: u32,
    /// Height in pixels, 0 without a video stream
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    pub has_video: bool,
    pub has_audio: bool,
    /// File size in bytes
    pub size: u64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a media file for information.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Parse ffprobe's JSON output.
pub fn parse_probe_output(json: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    if video_stream.is_none() && !has_audio {
        return Err(MediaError::InvalidMedia(
            "No audio or video stream found".to_string(),
        ));
    }

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .and_then(|v| v.avg_frame_rate.as_ref().or(v.r_frame_rate.as_ref()))
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration,
        width: video_stream.and_then(|v| v.width).unwrap_or(0),
        height: video_stream.and_then(|v| v.height).unwrap_or(0),
        fps,
        has_video: video_stream.is_some(),
        has_audio,
        size,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "30/1"},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "7.000000", "size": "123456"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.width, 1920);
        assert!(info.has_video && info.has_audio);
        assert!((info.duration - 7.0).abs() < 1e-9);
        assert_eq!(info.size, 123456);
    }

    #[test]
    fn test_video_without_audio() {
        let json = br#"{"streams":[{"codec_type":"video","width":640,"height":360}],"format":{"duration":"2.5"}}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(!info.has_audio);
        assert_eq!(info.size, 0);
    }

    #[test]
    fn test_no_streams_is_invalid() {
        let json = br#"{"streams":[],"format":{}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaError::InvalidMedia(_))
        ));
    }
}

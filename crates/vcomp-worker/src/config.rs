//! Renderer configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vcomp_models::encoding::FAST_PRESET_THRESHOLD;

/// Renderer configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Parent of the per-render scratch directories; system temp when unset
    pub work_dir: Option<PathBuf>,
    /// Scenes fetched and normalized concurrently
    pub max_scene_parallel: usize,
    /// Wall-clock budget for one render
    pub render_timeout: Duration,
    /// Budget for one remote source fetch
    pub fetch_timeout: Duration,
    /// Budget for one ffmpeg invocation
    pub ffmpeg_timeout: Duration,
    /// Scene count from which the cheaper encoder preset is used
    pub fast_preset_threshold: usize,
    /// Ken Burns motion on stills unless the request says otherwise
    pub ken_burns: bool,
    /// Font file for burned captions
    pub caption_font: Option<PathBuf>,
    /// Directory final artifacts are moved to after delivery
    pub artifacts_dir: Option<PathBuf>,
    /// Prometheus listener address for the binary
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            max_scene_parallel: 4,
            render_timeout: Duration::from_secs(900),
            fetch_timeout: Duration::from_secs(120),
            ffmpeg_timeout: Duration::from_secs(600),
            fast_preset_threshold: FAST_PRESET_THRESHOLD,
            ken_burns: true,
            caption_font: None,
            artifacts_dir: None,
            metrics_addr: None,
        }
    }
}

impl RenderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let path = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        };
        let secs = |key: &str, default: Duration| {
            parsed::<u64>(&lookup, key)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            work_dir: path("RENDER_WORK_DIR"),
            max_scene_parallel: parsed::<usize>(&lookup, "RENDER_MAX_SCENE_PARALLEL")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_scene_parallel),
            render_timeout: secs("RENDER_TIMEOUT_SECS", defaults.render_timeout),
            fetch_timeout: secs("RENDER_FETCH_TIMEOUT_SECS", defaults.fetch_timeout),
            ffmpeg_timeout: secs("RENDER_FFMPEG_TIMEOUT_SECS", defaults.ffmpeg_timeout),
            fast_preset_threshold: parsed(&lookup, "RENDER_FAST_PRESET_THRESHOLD")
                .unwrap_or(defaults.fast_preset_threshold),
            ken_burns: lookup("RENDER_KEN_BURNS")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.ken_burns),
            caption_font: path("RENDER_CAPTION_FONT"),
            artifacts_dir: path("RENDER_ARTIFACTS_DIR"),
            metrics_addr: parsed(&lookup, "RENDER_METRICS_ADDR"),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

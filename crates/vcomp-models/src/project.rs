//! Project request model.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::caption::{Caption, CaptionStyle};
use crate::error::{ModelError, ModelResult};
use crate::timeline::ResolvedEnvelope;
use crate::transition::TransitionKind;

pub const DEFAULT_PROJECT_NAME: &str = "Untitled Project";
pub const DEFAULT_SCENE_DURATION: f64 = 6.0;
pub const DEFAULT_FPS: u32 = 30;
pub const MAX_FPS: u32 = 120;
pub const DEFAULT_TRANSITION_DURATION: f64 = 1.0;
pub const DEFAULT_MUSIC_VOLUME: f64 = 0.3;
pub const DEFAULT_MUSIC_FADE: f64 = 2.0;

/// Which artifacts a render produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[serde(alias = "mp4")]
    Video,
    #[serde(alias = "draft", alias = "project_bundle")]
    ProjectBundle,
    #[default]
    Both,
}

impl OutputFormat {
    pub fn wants_video(&self) -> bool {
        matches!(self, Self::Video | Self::Both)
    }

    pub fn wants_bundle(&self) -> bool {
        matches!(self, Self::ProjectBundle | Self::Both)
    }
}

/// Output frame size preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Sd,
    #[default]
    Hd,
    #[serde(rename = "4k")]
    FourK,
    Vertical,
}

impl Resolution {
    /// (width, height) in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Sd => (1280, 720),
            Self::Hd => (1920, 1080),
            Self::FourK => (3840, 2160),
            Self::Vertical => (1080, 1920),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sd => "sd",
            Self::Hd => "hd",
            Self::FourK => "4k",
            Self::Vertical => "vertical",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice track placed relative to the start of its scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Voiceover {
    pub audio_url: String,

    /// Seconds from the scene start
    #[serde(default)]
    pub start_offset: f64,

    /// Nominal length; informational, the track plays to its natural end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// 0-1
    #[serde(default = "default_voiceover_volume")]
    pub volume: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

fn default_voiceover_volume() -> f64 {
    1.0
}

/// Visual source chosen for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneSource<'a> {
    Video(&'a str),
    Image(&'a str),
}

impl SceneSource<'_> {
    pub fn reference(&self) -> &str {
        match self {
            Self::Video(r) | Self::Image(r) => r,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }
}

/// One visual segment of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Seconds this scene occupies on the timeline
    #[serde(default = "default_scene_duration")]
    pub duration: f64,

    /// Transition into the following scene; ignored on the last scene
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_to_next: Option<TransitionKind>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voiceovers: Vec<Voiceover>,

    #[serde(default)]
    pub strip_original_audio: bool,
}

fn default_scene_duration() -> f64 {
    DEFAULT_SCENE_DURATION
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Scene {
    pub fn new(id: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            video_url: None,
            image_url: None,
            duration,
            transition_to_next: None,
            voiceovers: Vec::new(),
            strip_original_audio: false,
        }
    }

    pub fn with_video(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_transition(mut self, transition: impl Into<TransitionKind>) -> Self {
        self.transition_to_next = Some(transition.into());
        self
    }

    /// The visual source to render. Video wins when both are present.
    pub fn visual_source(&self) -> Option<SceneSource<'_>> {
        non_empty(&self.video_url)
            .map(SceneSource::Video)
            .or_else(|| non_empty(&self.image_url).map(SceneSource::Image))
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.id.trim().is_empty() {
            return Err(ModelError::invalid_scene("?", "id must not be empty"));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ModelError::invalid_scene(
                &self.id,
                format!("duration must be > 0, got {}", self.duration),
            ));
        }
        for (i, vo) in self.voiceovers.iter().enumerate() {
            if !(0.0..=1.0).contains(&vo.volume) {
                return Err(ModelError::invalid_scene(
                    &self.id,
                    format!("voiceover {i} volume must be between 0 and 1"),
                ));
            }
            if !vo.start_offset.is_finite() || vo.start_offset < 0.0 {
                return Err(ModelError::invalid_scene(
                    &self.id,
                    format!("voiceover {i} start_offset must be >= 0"),
                ));
            }
        }
        Ok(())
    }
}

/// Background music track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Music {
    pub audio_url: String,

    /// 0-1, falls back to the project envelope then 0.3
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,

    /// Seconds trimmed from the start of the track
    #[serde(default)]
    pub start_offset: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out: Option<f64>,
}

impl Music {
    pub fn envelope(&self) -> AudioEnvelope {
        AudioEnvelope {
            volume: self.volume,
            fade_in: self.fade_in,
            fade_out: self.fade_out,
        }
    }
}

/// Project-level audio envelope; each field is a fallback for the music track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out: Option<f64>,
}

impl AudioEnvelope {
    /// Field-wise merge: `self` wins, then `fallback`, then the defaults.
    pub fn resolve(&self, fallback: Option<&AudioEnvelope>) -> ResolvedEnvelope {
        let volume = self.volume.or(fallback.and_then(|f| f.volume));
        let fade_in = self.fade_in.or(fallback.and_then(|f| f.fade_in));
        let fade_out = self.fade_out.or(fallback.and_then(|f| f.fade_out));
        ResolvedEnvelope {
            volume: volume.unwrap_or(DEFAULT_MUSIC_VOLUME),
            fade_in: fade_in.unwrap_or(DEFAULT_MUSIC_FADE),
            fade_out: fade_out.unwrap_or(DEFAULT_MUSIC_FADE),
        }
    }
}

/// Blob store credentials. All absent means inline delivery.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StorageCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_secret_key: Option<String>,
    /// Custom S3-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,
}

impl StorageCredentials {
    /// Bucket, access key and secret are all present.
    pub fn is_complete(&self) -> bool {
        non_empty(&self.s3_bucket).is_some()
            && non_empty(&self.s3_access_key).is_some()
            && non_empty(&self.s3_secret_key).is_some()
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_access_key", &self.s3_access_key)
            .field("s3_secret_key", &self.s3_secret_key.as_ref().map(|_| "***"))
            .field("s3_endpoint", &self.s3_endpoint)
            .finish()
    }
}

/// A declarative composition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectRequest {
    pub project_id: String,

    #[serde(default = "default_project_name")]
    pub project_name: String,

    pub scenes: Vec<Scene>,

    #[serde(default)]
    pub captions: Vec<Caption>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<Music>,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default)]
    pub resolution: Resolution,

    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_true")]
    pub include_srt: bool,

    /// Project caption style, overridable per caption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_style: Option<CaptionStyle>,

    /// Project transition, used when a scene sets none of its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionKind>,

    #[serde(default = "default_transition_duration")]
    pub transition_duration: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioEnvelope>,

    /// Slow zoom on still images; falls back to the worker setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ken_burns: Option<bool>,

    #[serde(flatten)]
    pub storage: StorageCredentials,
}

fn default_project_name() -> String {
    DEFAULT_PROJECT_NAME.to_string()
}
fn default_fps() -> u32 {
    DEFAULT_FPS
}
fn default_true() -> bool {
    true
}
fn default_transition_duration() -> f64 {
    DEFAULT_TRANSITION_DURATION
}

impl ProjectRequest {
    pub fn new(project_id: impl Into<String>, scenes: Vec<Scene>) -> Self {
        Self {
            project_id: project_id.into(),
            project_name: default_project_name(),
            scenes,
            captions: Vec::new(),
            music: None,
            output_format: OutputFormat::default(),
            resolution: Resolution::default(),
            fps: DEFAULT_FPS,
            include_srt: true,
            caption_style: None,
            transition: None,
            transition_duration: DEFAULT_TRANSITION_DURATION,
            audio: None,
            ken_burns: None,
            storage: StorageCredentials::default(),
        }
    }

    /// Music envelope with project and default fallbacks applied.
    pub fn music_envelope(&self) -> Option<ResolvedEnvelope> {
        self.music
            .as_ref()
            .map(|m| m.envelope().resolve(self.audio.as_ref()))
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.project_id.trim().is_empty() {
            return Err(ModelError::invalid_request("project_id must not be empty"));
        }
        if self.scenes.is_empty() {
            return Err(ModelError::NoScenes);
        }
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(ModelError::invalid_request(format!(
                "fps must be between 1 and {MAX_FPS}, got {}",
                self.fps
            )));
        }
        if !self.transition_duration.is_finite() || self.transition_duration < 0.0 {
            return Err(ModelError::invalid_request(
                "transition_duration must be >= 0",
            ));
        }
        for scene in &self.scenes {
            scene.validate()?;
        }
        for (i, caption) in self.captions.iter().enumerate() {
            caption.validate(i)?;
        }
        if let Some(style) = &self.caption_style {
            if let Some(opacity) = style.background_opacity {
                if !(0.0..=1.0).contains(&opacity) {
                    return Err(ModelError::invalid_request(
                        "caption_style.background_opacity must be between 0 and 1",
                    ));
                }
            }
        }
        if let Some(music) = &self.music {
            if music.audio_url.trim().is_empty() {
                return Err(ModelError::invalid_request("music.audio_url must not be empty"));
            }
            if !music.start_offset.is_finite() || music.start_offset < 0.0 {
                return Err(ModelError::invalid_request("music.start_offset must be >= 0"));
            }
            if let Some(volume) = music.volume {
                if !(0.0..=1.0).contains(&volume) {
                    return Err(ModelError::invalid_request(
                        "music.volume must be between 0 and 1",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{"project_id":"p1","scenes":[{"id":"s1","image_url":"data:image/png;base64,AAAA"}]}"#
    }

    #[test]
    fn test_request_defaults() {
        let req: ProjectRequest = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(req.project_name, DEFAULT_PROJECT_NAME);
        assert_eq!(req.output_format, OutputFormat::Both);
        assert_eq!(req.resolution, Resolution::Hd);
        assert_eq!(req.fps, 30);
        assert!(req.include_srt);
        assert_eq!(req.transition_duration, 1.0);
        assert_eq!(req.scenes[0].duration, DEFAULT_SCENE_DURATION);
        assert!(!req.storage.is_complete());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_output_format_aliases() {
        let mp4: OutputFormat = serde_json::from_str("\"mp4\"").unwrap();
        assert_eq!(mp4, OutputFormat::Video);
        let draft: OutputFormat = serde_json::from_str("\"draft\"").unwrap();
        assert_eq!(draft, OutputFormat::ProjectBundle);
        assert!(!draft.wants_video());
        assert!(OutputFormat::Both.wants_video() && OutputFormat::Both.wants_bundle());
    }

    #[test]
    fn test_resolution_presets() {
        let r: Resolution = serde_json::from_str("\"4k\"").unwrap();
        assert_eq!(r.dimensions(), (3840, 2160));
        assert_eq!(Resolution::Vertical.dimensions(), (1080, 1920));
    }

    #[test]
    fn test_video_wins_over_image() {
        let scene = Scene::new("s", 3.0)
            .with_image("https://example.com/a.png")
            .with_video("https://example.com/a.mp4");
        assert_eq!(
            scene.visual_source(),
            Some(SceneSource::Video("https://example.com/a.mp4"))
        );

        let blank = Scene::new("s", 3.0).with_video("  ").with_image("img");
        assert_eq!(blank.visual_source(), Some(SceneSource::Image("img")));
        assert_eq!(Scene::new("s", 3.0).visual_source(), None);
    }

    #[test]
    fn test_validation_rejects_bad_input() {
        let mut req = ProjectRequest::new("p", vec![]);
        assert_eq!(req.validate(), Err(ModelError::NoScenes));

        req.scenes.push(Scene::new("s", 0.0));
        assert!(matches!(
            req.validate(),
            Err(ModelError::InvalidScene { .. })
        ));

        req.scenes[0].duration = 2.0;
        req.fps = 0;
        assert!(req.validate().is_err());

        req.fps = 30;
        req.captions.push(Caption::new("x", 3.0, 1.0));
        assert!(matches!(
            req.validate(),
            Err(ModelError::InvalidCaption { index: 0, .. })
        ));
    }

    #[test]
    fn test_storage_credentials_flattened() {
        let json = r#"{"project_id":"p","scenes":[{"id":"s"}],"s3_bucket":"b","s3_access_key":"k","s3_secret_key":"secret"}"#;
        let req: ProjectRequest = serde_json::from_str(json).unwrap();
        assert!(req.storage.is_complete());
        assert!(!format!("{:?}", req.storage).contains("secret"));
    }

    #[test]
    fn test_music_envelope_fallbacks() {
        let mut req: ProjectRequest = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(req.music_envelope(), None);

        req.music = Some(Music {
            audio_url: "https://example.com/m.mp3".to_string(),
            volume: None,
            start_offset: 0.0,
            fade_in: Some(1.0),
            fade_out: None,
        });
        req.audio = Some(AudioEnvelope {
            volume: Some(0.5),
            ..Default::default()
        });

        let env = req.music_envelope().unwrap();
        assert_eq!(env.volume, 0.5);
        assert_eq!(env.fade_in, 1.0);
        assert_eq!(env.fade_out, DEFAULT_MUSIC_FADE);
    }
}

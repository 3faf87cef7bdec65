//! Caption overlays and their style resolution.

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};

/// Reference frame height the font size classes are defined against.
pub const REFERENCE_HEIGHT: u32 = 1080;

pub const DEFAULT_FONT_COLOR: &str = "#FFFFFF";
pub const DEFAULT_BACKGROUND_COLOR: &str = "#00000080";

/// Named font size classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FontSizeClass {
    Small,
    #[default]
    Medium,
    Large,
    #[serde(alias = "xl")]
    ExtraLarge,
}

impl FontSizeClass {
    /// Pixel size at the reference height.
    pub fn base_pixels(&self) -> u32 {
        match self {
            Self::Small => 28,
            Self::Medium => 36,
            Self::Large => 48,
            Self::ExtraLarge => 64,
        }
    }
}

/// Font size given either as a class or as absolute pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FontSize {
    Class(FontSizeClass),
    Pixels(u32),
}

impl Default for FontSize {
    fn default() -> Self {
        Self::Class(FontSizeClass::default())
    }
}

impl FontSize {
    /// Pixel size for a frame of the given height.
    ///
    /// Classes scale with the frame height; absolute sizes are used as given.
    pub fn pixels_for_height(&self, frame_height: u32) -> u32 {
        match self {
            Self::Class(class) => {
                let scaled =
                    class.base_pixels() as f64 * frame_height as f64 / REFERENCE_HEIGHT as f64;
                (scaled.round() as u32).max(1)
            }
            Self::Pixels(px) => (*px).max(1),
        }
    }
}

/// Vertical caption anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CaptionPosition {
    Top,
    Center,
    #[default]
    Bottom,
}

impl CaptionPosition {
    /// `drawtext` y expression for this anchor.
    pub fn y_expression(&self) -> &'static str {
        match self {
            Self::Top => "h*0.1",
            Self::Center => "(h-text_h)/2",
            Self::Bottom => "h*0.85",
        }
    }
}

/// RGBA color.
///
/// Accepts `#RGB`, `#RRGGBB`, `#RRGGBBAA` and a handful of color names.
/// `none` and `transparent` parse to a fully transparent color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub fn parse(value: &str) -> ModelResult<Self> {
        let trimmed = value.trim();
        let invalid = || ModelError::InvalidColor(value.to_string());

        if let Some(hex) = trimmed.strip_prefix('#') {
            if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let byte = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
            return match hex.len() {
                3 => {
                    let nibble = |i: usize| byte(&hex[i..i + 1].repeat(2));
                    Ok(Self::rgba(nibble(0)?, nibble(1)?, nibble(2)?, 255))
                }
                6 => Ok(Self::rgba(
                    byte(&hex[0..2])?,
                    byte(&hex[2..4])?,
                    byte(&hex[4..6])?,
                    255,
                )),
                8 => Ok(Self::rgba(
                    byte(&hex[0..2])?,
                    byte(&hex[2..4])?,
                    byte(&hex[4..6])?,
                    byte(&hex[6..8])?,
                )),
                _ => Err(invalid()),
            };
        }

        let named = match trimmed.to_ascii_lowercase().as_str() {
            "none" | "transparent" => Self::TRANSPARENT,
            "white" => Self::WHITE,
            "black" => Self::rgba(0, 0, 0, 255),
            "red" => Self::rgba(255, 0, 0, 255),
            "green" => Self::rgba(0, 128, 0, 255),
            "blue" => Self::rgba(0, 0, 255, 255),
            "yellow" => Self::rgba(255, 255, 0, 255),
            "cyan" => Self::rgba(0, 255, 255, 255),
            "magenta" => Self::rgba(255, 0, 255, 255),
            "gray" | "grey" => Self::rgba(128, 128, 128, 255),
            _ => return Err(invalid()),
        };
        Ok(named)
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    /// Alpha as a 0-1 fraction.
    pub fn opacity(&self) -> f64 {
        self.a as f64 / 255.0
    }

    /// Copy of this color with the given 0-1 opacity.
    pub fn with_opacity(self, opacity: f64) -> Self {
        let a = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self { a, ..self }
    }

    /// ffmpeg color syntax (`0xRRGGBB@alpha`).
    pub fn to_ffmpeg(&self) -> String {
        format!(
            "0x{:02X}{:02X}{:02X}@{:.2}",
            self.r,
            self.g,
            self.b,
            self.opacity()
        )
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

impl JsonSchema for Color {
    fn schema_name() -> String {
        "Color".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

/// Caption style as it appears in a request. Every field is optional so a
/// caption can override only part of the project style.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<FontSize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<Color>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Color>,

    /// Overrides the alpha of `background_color` (0-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_opacity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<CaptionPosition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<bool>,
}

/// Fully resolved caption style.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCaptionStyle {
    pub font_size: FontSize,
    pub font_color: Color,
    /// Box color, `None` when the box is fully transparent
    pub background: Option<Color>,
    pub position: CaptionPosition,
    pub shadow: bool,
}

impl Default for ResolvedCaptionStyle {
    fn default() -> Self {
        Self {
            font_size: FontSize::default(),
            font_color: Color::WHITE,
            background: Some(Color::rgba(0, 0, 0, 0x80)),
            position: CaptionPosition::default(),
            shadow: false,
        }
    }
}

/// Resolve the style of one caption: caption override, then the project
/// style, then the defaults. Merged field by field.
pub fn effective_style(
    caption: &CaptionStyle,
    global: Option<&CaptionStyle>,
) -> ResolvedCaptionStyle {
    let defaults = ResolvedCaptionStyle::default();

    let font_size = pick(caption, global, |s| s.font_size);
    let font_color = pick(caption, global, |s| s.font_color);
    let background_color = pick(caption, global, |s| s.background_color);
    let background_opacity = pick(caption, global, |s| s.background_opacity);
    let position = pick(caption, global, |s| s.position);
    let shadow = pick(caption, global, |s| s.shadow);

    let background = match (background_color, background_opacity) {
        (Some(color), Some(opacity)) => Some(color.with_opacity(opacity)),
        (Some(color), None) => Some(color),
        (None, Some(opacity)) => defaults.background.map(|c| c.with_opacity(opacity)),
        (None, None) => defaults.background,
    }
    .filter(|c| !c.is_transparent());

    ResolvedCaptionStyle {
        font_size: font_size.unwrap_or(defaults.font_size),
        font_color: font_color.unwrap_or(defaults.font_color),
        background,
        position: position.unwrap_or(defaults.position),
        shadow: shadow.unwrap_or(defaults.shadow),
    }
}

fn pick<T>(
    caption: &CaptionStyle,
    global: Option<&CaptionStyle>,
    field: impl Fn(&CaptionStyle) -> Option<T>,
) -> Option<T> {
    field(caption).or_else(|| global.and_then(&field))
}

/// A text overlay in global timeline coordinates.
///
/// Visible on the half-open window `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Caption {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(flatten)]
    pub style: CaptionStyle,
}

impl Caption {
    pub fn new(text: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            text: text.into(),
            start_time,
            end_time,
            style: CaptionStyle::default(),
        }
    }

    pub fn is_visible_at(&self, t: f64) -> bool {
        t >= self.start_time && t < self.end_time
    }

    pub fn validate(&self, index: usize) -> ModelResult<()> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(ModelError::invalid_caption(index, "times must be finite"));
        }
        if self.start_time < 0.0 {
            return Err(ModelError::invalid_caption(index, "start_time must be >= 0"));
        }
        if self.end_time <= self.start_time {
            return Err(ModelError::invalid_caption(
                index,
                "end_time must be after start_time",
            ));
        }
        if let Some(opacity) = self.style.background_opacity {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(ModelError::invalid_caption(
                    index,
                    "background_opacity must be between 0 and 1",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parse() {
        assert_eq!(Color::parse("#FFFFFF").unwrap(), Color::WHITE);
        assert_eq!(Color::parse("#fff").unwrap(), Color::WHITE);
        assert_eq!(
            Color::parse("#00000080").unwrap(),
            Color::rgba(0, 0, 0, 0x80)
        );
        assert_eq!(Color::parse("none").unwrap(), Color::TRANSPARENT);
        assert!(Color::parse("#12345").is_err());
        assert!(Color::parse("#GGGGGG").is_err());
        assert!(Color::parse("chartreuse-ish").is_err());
    }

    #[test]
    fn test_color_to_ffmpeg() {
        assert_eq!(Color::WHITE.to_ffmpeg(), "0xFFFFFF@1.00");
        assert_eq!(Color::parse("#00000080").unwrap().to_ffmpeg(), "0x000000@0.50");
    }

    #[test]
    fn test_font_size_scaling() {
        let medium = FontSize::Class(FontSizeClass::Medium);
        assert_eq!(medium.pixels_for_height(1080), 36);
        assert_eq!(medium.pixels_for_height(2160), 72);
        assert_eq!(medium.pixels_for_height(720), 24);
        assert_eq!(FontSize::Pixels(40).pixels_for_height(2160), 40);
    }

    #[test]
    fn test_font_size_deserializes_both_forms() {
        let class: FontSize = serde_json::from_str("\"large\"").unwrap();
        assert_eq!(class, FontSize::Class(FontSizeClass::Large));
        let px: FontSize = serde_json::from_str("36").unwrap();
        assert_eq!(px, FontSize::Pixels(36));
    }

    #[test]
    fn test_effective_style_defaults() {
        let style = effective_style(&CaptionStyle::default(), None);
        assert_eq!(style, ResolvedCaptionStyle::default());
    }

    #[test]
    fn test_effective_style_merges_per_field() {
        let global = CaptionStyle {
            position: Some(CaptionPosition::Top),
            font_color: Some(Color::parse("yellow").unwrap()),
            shadow: Some(true),
            ..Default::default()
        };
        let caption = CaptionStyle {
            position: Some(CaptionPosition::Center),
            ..Default::default()
        };

        let style = effective_style(&caption, Some(&global));
        assert_eq!(style.position, CaptionPosition::Center);
        assert_eq!(style.font_color, Color::rgba(255, 255, 0, 255));
        assert!(style.shadow);
        assert_eq!(style.font_size, FontSize::Class(FontSizeClass::Medium));
    }

    #[test]
    fn test_zero_opacity_drops_box() {
        let caption = CaptionStyle {
            background_opacity: Some(0.0),
            ..Default::default()
        };
        assert_eq!(effective_style(&caption, None).background, None);

        let caption = CaptionStyle {
            background_color: Some(Color::TRANSPARENT),
            ..Default::default()
        };
        assert_eq!(effective_style(&caption, None).background, None);
    }

    #[test]
    fn test_caption_window_is_half_open() {
        let caption = Caption::new("hi", 1.0, 2.0);
        assert!(!caption.is_visible_at(0.999));
        assert!(caption.is_visible_at(1.0));
        assert!(caption.is_visible_at(1.999));
        assert!(!caption.is_visible_at(2.0));
    }

    #[test]
    fn test_caption_flattened_style() {
        let json = r##"{"text":"Hello","start_time":0.5,"end_time":2.0,"font_size":36,"position":"top","background_color":"#00000080"}"##;
        let caption: Caption = serde_json::from_str(json).unwrap();
        assert_eq!(caption.style.font_size, Some(FontSize::Pixels(36)));
        assert_eq!(caption.style.position, Some(CaptionPosition::Top));
        assert!(caption.validate(0).is_ok());
    }

    #[test]
    fn test_caption_validation() {
        assert!(Caption::new("x", 2.0, 2.0).validate(0).is_err());
        assert!(Caption::new("x", -1.0, 2.0).validate(0).is_err());
        assert!(Caption::new("x", 0.0, f64::NAN).validate(0).is_err());
    }
}

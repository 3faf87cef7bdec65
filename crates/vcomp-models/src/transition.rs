//! Transition definitions for scene boundaries.

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Visual family a transition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionFamily {
    /// Hard cut (lossless concatenation)
    Cut,
    /// Symmetric cross-dissolve
    Dissolve,
    /// Directional slide
    Slide,
    /// Directional wipe
    Wipe,
    /// Circular iris
    Iris,
}

/// Transition applied between two adjacent scenes.
///
/// Parsed leniently from the names the frontend sends. Names that are not
/// recognised are kept as [`TransitionKind::Unknown`] so the sequencer can
/// report them and fall back to a cut.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransitionKind {
    None,
    #[default]
    Fade,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
    /// Circle closing onto the next scene ("zoomIn")
    IrisIn,
    /// Circle opening onto the next scene ("zoomOut")
    IrisOut,
    /// Left wipe ("swoosh")
    Wipe,
    Unknown(String),
}

impl TransitionKind {
    /// Parse a transition name, accepting the aliases used by the editor UI.
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "none" | "None" | "cut" => Self::None,
            "fade" | "fadeIn" | "fadeOut" | "crossfade" | "dissolve" => Self::Fade,
            "slideLeft" | "slideleft" | "wipeleft" => Self::SlideLeft,
            "slideRight" | "slideright" | "wiperight" => Self::SlideRight,
            "slideUp" | "slideup" => Self::SlideUp,
            "slideDown" | "slidedown" => Self::SlideDown,
            "zoomIn" | "zoomin" | "zoom" => Self::IrisIn,
            "zoomOut" | "zoomout" => Self::IrisOut,
            "swoosh" | "wipe" => Self::Wipe,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Canonical request name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Fade => "fade",
            Self::SlideLeft => "slideLeft",
            Self::SlideRight => "slideRight",
            Self::SlideUp => "slideUp",
            Self::SlideDown => "slideDown",
            Self::IrisIn => "zoomIn",
            Self::IrisOut => "zoomOut",
            Self::Wipe => "swoosh",
            Self::Unknown(name) => name,
        }
    }

    /// Name of the matching `xfade` transition, if any.
    pub fn xfade_name(&self) -> Option<&'static str> {
        match self {
            Self::Fade => Some("fade"),
            Self::SlideLeft => Some("slideleft"),
            Self::SlideRight => Some("slideright"),
            Self::SlideUp => Some("slideup"),
            Self::SlideDown => Some("slidedown"),
            Self::IrisIn => Some("circlecrop"),
            Self::IrisOut => Some("circleopen"),
            Self::Wipe => Some("wipeleft"),
            Self::None | Self::Unknown(_) => None,
        }
    }

    pub fn family(&self) -> TransitionFamily {
        match self {
            Self::None | Self::Unknown(_) => TransitionFamily::Cut,
            Self::Fade => TransitionFamily::Dissolve,
            Self::SlideLeft | Self::SlideRight | Self::SlideUp | Self::SlideDown => {
                TransitionFamily::Slide
            }
            Self::Wipe => TransitionFamily::Wipe,
            Self::IrisIn | Self::IrisOut => TransitionFamily::Iris,
        }
    }

    /// True when the boundary is a plain cut with no overlap.
    pub fn is_cut(&self) -> bool {
        self.family() == TransitionFamily::Cut
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for TransitionKind {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for TransitionKind {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<TransitionKind> for String {
    fn from(value: TransitionKind) -> Self {
        value.as_str().to_string()
    }
}

impl JsonSchema for TransitionKind {
    fn schema_name() -> String {
        "TransitionKind".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

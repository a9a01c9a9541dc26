//! Configuration enums and small value types consumed by the renderer.

use serde::{Deserialize, Serialize};

// ============================================================================
// Padding / Colorspace / Blending
// ============================================================================

/// How the window padding around the grid is colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PaddingColor {
    /// Padding uses the configured background color
    #[default]
    Background,
    /// Padding extends the nearest cell's background, except where that
    /// would look wrong (see the renderer's "never extend" row check)
    Extend,
    /// Padding always extends the nearest cell's background
    ExtendAlways,
}

/// Colorspace the window surface is interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WindowColorspace {
    #[default]
    Srgb,
    DisplayP3,
}

/// Alpha blending mode used when compositing cell layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AlphaBlending {
    /// Blend in the native (gamma-encoded) space of the surface
    #[default]
    Native,
    /// Blend in linear space
    Linear,
    /// Blend in linear space and correct text weight to match native blending
    LinearCorrected,
}

impl AlphaBlending {
    /// Whether blending happens in linear space.
    pub fn is_linear(self) -> bool {
        matches!(self, AlphaBlending::Linear | AlphaBlending::LinearCorrected)
    }
}

// ============================================================================
// Background image
// ============================================================================

/// Anchor of the background image within the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundImagePosition {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    #[default]
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl BackgroundImagePosition {
    /// Normalized anchor (0.0 = left/top, 0.5 = center, 1.0 = right/bottom).
    pub fn anchor(self) -> [f32; 2] {
        match self {
            BackgroundImagePosition::TopLeft => [0.0, 0.0],
            BackgroundImagePosition::TopCenter => [0.5, 0.0],
            BackgroundImagePosition::TopRight => [1.0, 0.0],
            BackgroundImagePosition::CenterLeft => [0.0, 0.5],
            BackgroundImagePosition::Center => [0.5, 0.5],
            BackgroundImagePosition::CenterRight => [1.0, 0.5],
            BackgroundImagePosition::BottomLeft => [0.0, 1.0],
            BackgroundImagePosition::BottomCenter => [0.5, 1.0],
            BackgroundImagePosition::BottomRight => [1.0, 1.0],
        }
    }
}

/// How the background image is scaled to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundImageFit {
    /// Scale to fit entirely inside the surface, preserving aspect ratio
    #[default]
    Contain,
    /// Scale to cover the surface, preserving aspect ratio (may crop)
    Cover,
    /// Stretch to the surface exactly
    Stretch,
    /// Draw at the image's native size
    None,
}

// ============================================================================
// Cursor / Shaders / Links
// ============================================================================

/// Cursor visual style requested by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CursorStyle {
    #[default]
    Block,
    BlockHollow,
    Bar,
    Underline,
}

/// When custom shaders animate (redraw continuously).
///
/// Accepts `false`, `true` or `always` in YAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(try_from = "AnimationRepr", into = "AnimationRepr")]
pub enum CustomShaderAnimation {
    /// Never animate; shaders only run when content changes
    Off,
    /// Animate while the surface is focused
    #[default]
    Focused,
    /// Animate even when unfocused
    Always,
}

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum AnimationRepr {
    Bool(bool),
    Str(String),
}

impl TryFrom<AnimationRepr> for CustomShaderAnimation {
    type Error = String;

    fn try_from(value: AnimationRepr) -> Result<Self, Self::Error> {
        match value {
            AnimationRepr::Bool(false) => Ok(CustomShaderAnimation::Off),
            AnimationRepr::Bool(true) => Ok(CustomShaderAnimation::Focused),
            AnimationRepr::Str(s) => match s.as_str() {
                "false" => Ok(CustomShaderAnimation::Off),
                "true" => Ok(CustomShaderAnimation::Focused),
                "always" => Ok(CustomShaderAnimation::Always),
                other => Err(format!(
                    "invalid custom_shader_animation '{other}' (expected false, true or always)"
                )),
            },
        }
    }
}

impl From<CustomShaderAnimation> for AnimationRepr {
    fn from(value: CustomShaderAnimation) -> Self {
        match value {
            CustomShaderAnimation::Off => AnimationRepr::Bool(false),
            CustomShaderAnimation::Focused => AnimationRepr::Bool(true),
            CustomShaderAnimation::Always => AnimationRepr::Str("always".to_string()),
        }
    }
}

/// When a link rule's matches are highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LinkHighlight {
    Always,
    #[default]
    Hover,
    Never,
}

/// A regex-driven link rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LinkRule {
    /// Regular expression matched against each row's text
    pub regex: String,
    /// When matches are underlined
    #[serde(default)]
    pub highlight: LinkHighlight,
}

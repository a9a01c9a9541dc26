//! Default value functions for configuration.
//!
//! Each function is used as a `#[serde(default = "crate::defaults::...")]`
//! attribute on a `Config` field.

use crate::types::LinkRule;

// ── Colors ─────────────────────────────────────────────────────────────────

pub fn background() -> [u8; 3] {
    [40, 44, 52]
}

pub fn foreground() -> [u8; 3] {
    [255, 255, 255]
}

// ── Opacity & contrast ─────────────────────────────────────────────────────

pub fn background_opacity() -> f32 {
    1.0 // Fully opaque by default
}

pub fn background_image_opacity() -> f32 {
    1.0
}

pub fn minimum_contrast() -> f32 {
    1.0 // 1.0 disables the contrast adjustment
}

pub fn faint_opacity() -> f32 {
    175.0 / 255.0
}

pub fn cursor_opacity() -> f32 {
    1.0
}

// ── Window ─────────────────────────────────────────────────────────────────

pub fn window_padding() -> u32 {
    2
}

pub fn window_vsync() -> bool {
    true
}

pub fn cursor_blink() -> bool {
    true
}

// ── Links ──────────────────────────────────────────────────────────────────

/// URL matcher enabled by default.
pub const URL_REGEX: &str = r#"(?:https?://|mailto:|ftp://|file:|ssh:|git://|ssh://|tel:|magnet:|ipfs://|ipns://|gemini://|gopher://|news:)[\w\-.~:/?#@!$&*+,;=%]+"#;

pub fn links() -> Vec<LinkRule> {
    vec![LinkRule {
        regex: URL_REGEX.to_string(),
        highlight: Default::default(),
    }]
}

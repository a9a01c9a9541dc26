//! Configuration resolved into what the render thread reads every frame.
//!
//! [`DerivedConfig`] is built off the render thread (regexes compiled,
//! shader files read, colors resolved) and handed to the renderer whole.
//! The renderer compares it with the previous one and records the
//! consequences as [`ConfigDirty`] flags, consumed once by the next frame.

use std::path::PathBuf;

use bitflags::bitflags;
use regex::Regex;
use termframe_config::{
    AlphaBlending, Config, CustomShaderAnimation, LinkHighlight, PaddingColor, WindowColorspace,
};
use termframe_terminal::{Palette, Rgb};

use crate::bg_image::BgImageSettings;
use crate::error::RenderError;

bitflags! {
    /// Work a configuration change leaves for the next frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConfigDirty: u8 {
        /// Recompute the uniform block
        const UNIFORMS = 1 << 0;
        /// Rebuild every row's cells
        const FULL_REBUILD = 1 << 1;
        /// Reload or reposition the background image
        const BACKGROUND_IMAGE = 1 << 2;
        /// Recompile the post-processing chain
        const CUSTOM_SHADERS = 1 << 3;
    }
}

/// A link rule with its regex compiled.
#[derive(Debug, Clone)]
pub struct Link {
    pub regex: Regex,
    pub highlight: LinkHighlight,
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str() && self.highlight == other.highlight
    }
}

/// A post-processing shader read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomShader {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedConfig {
    pub background: Rgb,
    pub foreground: Rgb,
    pub cursor_color: Option<Rgb>,
    pub cursor_text: Option<Rgb>,
    pub cursor_opacity: f32,
    /// `None` follows the program's blink request
    pub cursor_blink: Option<bool>,
    pub selection_background: Option<Rgb>,
    pub selection_foreground: Option<Rgb>,
    pub selection_invert_fg_bg: bool,
    pub bold_color: Option<Rgb>,
    /// Base palette with configured overrides applied
    pub palette: Palette,
    /// Indexes overridden by configuration
    pub palette_overrides: Vec<(u8, Rgb)>,

    pub background_opacity: f32,
    pub background_opacity_cells: bool,
    pub min_contrast: f32,
    /// Alpha applied to faint text
    pub faint_alpha: u8,

    pub padding_color: PaddingColor,
    pub padding_x: u32,
    pub padding_y: u32,
    pub padding_balance: bool,

    pub bg_image: BgImageSettings,
    pub custom_shaders: Vec<CustomShader>,
    pub custom_shader_animation: CustomShaderAnimation,

    pub links: Vec<Link>,

    pub colorspace: WindowColorspace,
    pub blending: AlphaBlending,
    pub vsync: bool,
}

fn rgb(c: [u8; 3]) -> Rgb {
    Rgb::from_array(c)
}

fn read_shader(path: &str) -> Result<CustomShader, RenderError> {
    let resolved = Config::resolve_path(path);
    let source = std::fs::read_to_string(&resolved).map_err(|source| {
        RenderError::ShaderFileRead {
            path: resolved.display().to_string(),
            source,
        }
    })?;
    let name = resolved
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    Ok(CustomShader { name, source })
}

impl DerivedConfig {
    /// Resolve `config`. Unusable link rules and unreadable shaders are
    /// logged and left out.
    pub fn new(config: &Config) -> Self {
        let mut palette = Palette::default();
        let mut palette_overrides: Vec<(u8, Rgb)> = config
            .palette
            .iter()
            .map(|(&i, &c)| (i, rgb(c)))
            .collect();
        palette_overrides.sort_by_key(|(i, _)| *i);
        for &(i, c) in &palette_overrides {
            palette[i] = c;
        }

        let links = config
            .links
            .iter()
            .filter(|rule| rule.highlight != LinkHighlight::Never)
            .filter_map(|rule| match Regex::new(&rule.regex) {
                Ok(regex) => Some(Link {
                    regex,
                    highlight: rule.highlight,
                }),
                Err(e) => {
                    log::warn!("ignoring link rule {:?}: {e}", rule.regex);
                    None
                }
            })
            .collect();

        let custom_shaders = config
            .custom_shaders
            .iter()
            .filter_map(|path| match read_shader(path) {
                Ok(shader) => Some(shader),
                Err(e) => {
                    log::warn!("{e}");
                    None
                }
            })
            .collect();

        Self {
            background: rgb(config.background),
            foreground: rgb(config.foreground),
            cursor_color: config.cursor_color.map(rgb),
            cursor_text: config.cursor_text.map(rgb),
            cursor_opacity: config.cursor_opacity,
            cursor_blink: Some(config.cursor_blink),
            selection_background: config.selection_background.map(rgb),
            selection_foreground: config.selection_foreground.map(rgb),
            selection_invert_fg_bg: config.selection_invert_fg_bg,
            bold_color: config.bold_color.map(rgb),
            palette,
            palette_overrides,
            background_opacity: config.background_opacity,
            background_opacity_cells: config.background_opacity_cells,
            min_contrast: config.minimum_contrast,
            faint_alpha: (config.faint_opacity.clamp(0.0, 1.0) * 255.0).round() as u8,
            padding_color: config.window_padding_color,
            padding_x: config.window_padding_x,
            padding_y: config.window_padding_y,
            padding_balance: config.window_padding_balance,
            bg_image: BgImageSettings {
                path: config
                    .background_image
                    .as_deref()
                    .map(Config::resolve_path),
                opacity: config.background_image_opacity,
                position: config.background_image_position,
                fit: config.background_image_fit,
                repeat: config.background_image_repeat,
            },
            custom_shaders,
            custom_shader_animation: config.custom_shader_animation,
            links,
            colorspace: config.window_colorspace,
            blending: config.alpha_blending,
            vsync: config.window_vsync,
        }
    }

    /// What has to be redone when switching from `old` to `self`.
    pub fn changes_from(&self, old: &DerivedConfig) -> ConfigDirty {
        let mut dirty = ConfigDirty::empty();
        if self == old {
            return dirty;
        }
        // Colors and padding feed both the uniforms and the cell contents
        dirty |= ConfigDirty::UNIFORMS | ConfigDirty::FULL_REBUILD;
        if self.bg_image != old.bg_image {
            dirty |= ConfigDirty::BACKGROUND_IMAGE;
        }
        if self.custom_shaders != old.custom_shaders {
            dirty |= ConfigDirty::CUSTOM_SHADERS;
        }
        dirty
    }

    /// Whether post shaders must be redrawn continuously.
    pub fn animates(&self, focused: bool) -> bool {
        if self.custom_shaders.is_empty() {
            return false;
        }
        match self.custom_shader_animation {
            CustomShaderAnimation::Off => false,
            CustomShaderAnimation::Focused => focused,
            CustomShaderAnimation::Always => true,
        }
    }

    pub fn bg_image_path(&self) -> Option<&PathBuf> {
        self.bg_image.path.as_ref()
    }
}

impl Default for DerivedConfig {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termframe_config::LinkRule;

    #[test]
    fn test_palette_overrides_apply() {
        let mut config = Config::default();
        config.palette.insert(1, [1, 2, 3]);
        let derived = DerivedConfig::new(&config);
        assert_eq!(derived.palette[1], Rgb::new(1, 2, 3));
        assert_eq!(derived.palette[2], Palette::default()[2]);
    }

    #[test]
    fn test_bad_link_regex_is_skipped() {
        let mut config = Config::default();
        config.links = vec![
            LinkRule {
                regex: "(unclosed".to_string(),
                highlight: LinkHighlight::Always,
            },
            LinkRule {
                regex: "foo".to_string(),
                highlight: LinkHighlight::Hover,
            },
            LinkRule {
                regex: "bar".to_string(),
                highlight: LinkHighlight::Never,
            },
        ];
        let derived = DerivedConfig::new(&config);
        assert_eq!(derived.links.len(), 1);
        assert_eq!(derived.links[0].regex.as_str(), "foo");
    }

    #[test]
    fn test_shader_files_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crt.glsl");
        std::fs::write(&path, "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }").unwrap();

        let mut config = Config::default();
        config.custom_shaders = vec![
            path.display().to_string(),
            dir.path().join("missing.glsl").display().to_string(),
        ];
        let derived = DerivedConfig::new(&config);
        assert_eq!(derived.custom_shaders.len(), 1);
        assert_eq!(derived.custom_shaders[0].name, "crt");
    }

    #[test]
    fn test_changes_from() {
        let base = DerivedConfig::default();
        assert_eq!(base.changes_from(&base.clone()), ConfigDirty::empty());

        let mut other = base.clone();
        other.min_contrast = 3.0;
        let dirty = other.changes_from(&base);
        assert!(dirty.contains(ConfigDirty::UNIFORMS | ConfigDirty::FULL_REBUILD));
        assert!(!dirty.contains(ConfigDirty::BACKGROUND_IMAGE));

        other.bg_image.opacity = 0.25;
        assert!(other.changes_from(&base).contains(ConfigDirty::BACKGROUND_IMAGE));
    }

    #[test]
    fn test_animation_policy() {
        let mut config = DerivedConfig::default();
        config.custom_shader_animation = CustomShaderAnimation::Focused;
        assert!(!config.animates(true), "no shaders, nothing to animate");

        config.custom_shaders.push(CustomShader {
            name: "x".into(),
            source: String::new(),
        });
        assert!(config.animates(true));
        assert!(!config.animates(false));
        config.custom_shader_animation = CustomShaderAnimation::Always;
        assert!(config.animates(false));
    }
}

//! The `Config` struct, YAML persistence, and validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{
    AlphaBlending, BackgroundImageFit, BackgroundImagePosition, CursorStyle,
    CustomShaderAnimation, LinkRule, PaddingColor, WindowColorspace,
};

/// Renderer configuration.
///
/// Every field carries a serde default so a partial (or empty) YAML file
/// produces a complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // ========================================================================
    // Colors
    // ========================================================================
    /// Default background color [R, G, B]
    #[serde(default = "crate::defaults::background")]
    pub background: [u8; 3],

    /// Default foreground color [R, G, B]
    #[serde(default = "crate::defaults::foreground")]
    pub foreground: [u8; 3],

    /// Cursor color (None = use the cell's foreground color)
    #[serde(default)]
    pub cursor_color: Option<[u8; 3]>,

    /// Color of text under a block cursor (None = use the cell's background color)
    #[serde(default)]
    pub cursor_text: Option<[u8; 3]>,

    /// Selection background (None = invert the cell's colors)
    #[serde(default)]
    pub selection_background: Option<[u8; 3]>,

    /// Selection foreground (None = invert the cell's colors)
    #[serde(default)]
    pub selection_foreground: Option<[u8; 3]>,

    /// Swap fg/bg for selected cells instead of using selection colors
    #[serde(default)]
    pub selection_invert_fg_bg: bool,

    /// Color for bold text (None = use the cell's own foreground)
    #[serde(default)]
    pub bold_color: Option<[u8; 3]>,

    /// Palette overrides by index (0-255)
    #[serde(default)]
    pub palette: HashMap<u8, [u8; 3]>,

    // ========================================================================
    // Opacity & contrast
    // ========================================================================
    /// Opacity of the default background (0.0-1.0)
    #[serde(default = "crate::defaults::background_opacity")]
    pub background_opacity: f32,

    /// Apply `background_opacity` to explicitly colored cell backgrounds too
    #[serde(default)]
    pub background_opacity_cells: bool,

    /// Minimum contrast ratio between fg and bg (1.0 = disabled, max 21.0)
    #[serde(default = "crate::defaults::minimum_contrast")]
    pub minimum_contrast: f32,

    /// Alpha multiplier for faint text
    #[serde(default = "crate::defaults::faint_opacity")]
    pub faint_opacity: f32,

    // ========================================================================
    // Cursor
    // ========================================================================
    /// Default cursor style when the terminal has not requested one
    #[serde(default)]
    pub cursor_style: CursorStyle,

    /// Cursor opacity (0.0-1.0)
    #[serde(default = "crate::defaults::cursor_opacity")]
    pub cursor_opacity: f32,

    /// Whether the cursor blinks by default
    #[serde(default = "crate::defaults::cursor_blink")]
    pub cursor_blink: bool,

    // ========================================================================
    // Window padding
    // ========================================================================
    /// How the padding area is colored
    #[serde(default)]
    pub window_padding_color: PaddingColor,

    /// Horizontal padding in pixels
    #[serde(default = "crate::defaults::window_padding")]
    pub window_padding_x: u32,

    /// Vertical padding in pixels
    #[serde(default = "crate::defaults::window_padding")]
    pub window_padding_y: u32,

    /// Distribute leftover space evenly around the grid
    #[serde(default)]
    pub window_padding_balance: bool,

    // ========================================================================
    // Background image
    // ========================================================================
    /// Path to a PNG or JPEG background image
    #[serde(default)]
    pub background_image: Option<String>,

    /// Background image opacity (0.0-1.0), multiplied with `background_opacity`
    #[serde(default = "crate::defaults::background_image_opacity")]
    pub background_image_opacity: f32,

    #[serde(default)]
    pub background_image_position: BackgroundImagePosition,

    #[serde(default)]
    pub background_image_fit: BackgroundImageFit,

    /// Tile the image to fill the surface
    #[serde(default)]
    pub background_image_repeat: bool,

    // ========================================================================
    // Custom shaders
    // ========================================================================
    /// GLSL post-processing shaders applied in order
    #[serde(default)]
    pub custom_shaders: Vec<String>,

    #[serde(default)]
    pub custom_shader_animation: CustomShaderAnimation,

    // ========================================================================
    // Links
    // ========================================================================
    #[serde(default = "crate::defaults::links")]
    pub links: Vec<LinkRule>,

    // ========================================================================
    // Output
    // ========================================================================
    #[serde(default)]
    pub window_colorspace: WindowColorspace,

    #[serde(default)]
    pub alpha_blending: AlphaBlending,

    /// Synchronize presentation with the display refresh
    #[serde(default = "crate::defaults::window_vsync")]
    pub window_vsync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            background: crate::defaults::background(),
            foreground: crate::defaults::foreground(),
            cursor_color: None,
            cursor_text: None,
            selection_background: None,
            selection_foreground: None,
            selection_invert_fg_bg: false,
            bold_color: None,
            palette: HashMap::new(),
            background_opacity: crate::defaults::background_opacity(),
            background_opacity_cells: false,
            minimum_contrast: crate::defaults::minimum_contrast(),
            faint_opacity: crate::defaults::faint_opacity(),
            cursor_style: CursorStyle::default(),
            cursor_opacity: crate::defaults::cursor_opacity(),
            cursor_blink: crate::defaults::cursor_blink(),
            window_padding_color: PaddingColor::default(),
            window_padding_x: crate::defaults::window_padding(),
            window_padding_y: crate::defaults::window_padding(),
            window_padding_balance: false,
            background_image: None,
            background_image_opacity: crate::defaults::background_image_opacity(),
            background_image_position: BackgroundImagePosition::default(),
            background_image_fit: BackgroundImageFit::default(),
            background_image_repeat: false,
            custom_shaders: Vec::new(),
            custom_shader_animation: CustomShaderAnimation::default(),
            links: crate::defaults::links(),
            window_colorspace: WindowColorspace::default(),
            alpha_blending: AlphaBlending::default(),
            window_vsync: crate::defaults::window_vsync(),
        }
    }
}

impl Config {
    /// Default location: `<config dir>/termframe/config.yaml`.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("termframe")
            .join("config.yaml")
    }

    /// Parse a configuration from a YAML string and validate it.
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty map
        let config: Config = if source.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml_ng::from_str(source)?
        };
        config.validate()
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&source)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the default config file, falling back to defaults when it is
    /// missing or invalid.
    pub fn load_or_default() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config, using defaults: {e}");
                Self::default()
            }
        }
    }

    /// Clamp ranged values and reject values that cannot be clamped.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.background_opacity = self.background_opacity.clamp(0.0, 1.0);
        self.background_image_opacity = self.background_image_opacity.clamp(0.0, 1.0);
        self.cursor_opacity = self.cursor_opacity.clamp(0.0, 1.0);
        self.faint_opacity = self.faint_opacity.clamp(0.0, 1.0);
        self.minimum_contrast = self.minimum_contrast.clamp(1.0, 21.0);

        for rule in &self.links {
            if let Err(e) = regex::Regex::new(&rule.regex) {
                return Err(ConfigError::Validation(format!(
                    "links: invalid regex '{}': {e}",
                    rule.regex
                )));
            }
        }

        if self.custom_shaders.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "custom_shaders: empty shader path".to_string(),
            ));
        }

        Ok(self)
    }

    /// Resolve a possibly relative, possibly `~`-prefixed path against the
    /// config directory.
    pub fn resolve_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        let p = PathBuf::from(path);
        if p.is_absolute() {
            return p;
        }
        Self::config_path()
            .parent()
            .map(|dir| dir.join(&p))
            .unwrap_or(p)
    }
}

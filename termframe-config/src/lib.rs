//! Configuration system for the termframe renderer.
//!
//! This crate provides configuration loading and default values for the
//! GPU terminal renderer. It includes:
//!
//! - Renderer configuration (colors, opacity, padding policy, vsync)
//! - Background image placement settings
//! - Custom post-processing shader lists
//! - Link highlighting rules

pub mod config;
pub mod defaults;
pub mod error;
mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{
    AlphaBlending, BackgroundImageFit, BackgroundImagePosition, CursorStyle,
    CustomShaderAnimation, LinkHighlight, LinkRule, PaddingColor, WindowColorspace,
};

//! Integration tests for termframe-config.

use std::fs;

use tempfile::TempDir;
use termframe_config::{
    BackgroundImageFit, BackgroundImagePosition, Config, ConfigError, CustomShaderAnimation,
    LinkHighlight, PaddingColor,
};

#[test]
fn test_empty_yaml_yields_defaults() {
    let config = Config::from_yaml("").expect("empty config should parse");
    assert_eq!(config, Config::default());
}

#[test]
fn test_partial_yaml_keeps_other_defaults() {
    let config = Config::from_yaml("background: [1, 2, 3]\nwindow_padding_color: extend\n")
        .expect("config should parse");
    assert_eq!(config.background, [1, 2, 3]);
    assert_eq!(config.window_padding_color, PaddingColor::Extend);
    assert_eq!(config.foreground, Config::default().foreground);
    assert!(config.window_vsync);
}

#[test]
fn test_padding_color_variants() {
    let config = Config::from_yaml("window_padding_color: extend-always").unwrap();
    assert_eq!(config.window_padding_color, PaddingColor::ExtendAlways);
    let config = Config::from_yaml("window_padding_color: background").unwrap();
    assert_eq!(config.window_padding_color, PaddingColor::Background);
}

#[test]
fn test_custom_shader_animation_accepts_bools_and_always() {
    let off = Config::from_yaml("custom_shader_animation: false").unwrap();
    assert_eq!(off.custom_shader_animation, CustomShaderAnimation::Off);
    let on = Config::from_yaml("custom_shader_animation: true").unwrap();
    assert_eq!(on.custom_shader_animation, CustomShaderAnimation::Focused);
    let always = Config::from_yaml("custom_shader_animation: always").unwrap();
    assert_eq!(always.custom_shader_animation, CustomShaderAnimation::Always);
    assert!(Config::from_yaml("custom_shader_animation: sometimes").is_err());
}

#[test]
fn test_background_image_settings() {
    let yaml = "background_image: /tmp/bg.png\n\
                background_image_position: bottom-right\n\
                background_image_fit: cover\n\
                background_image_repeat: true\n";
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.background_image.as_deref(), Some("/tmp/bg.png"));
    assert_eq!(
        config.background_image_position,
        BackgroundImagePosition::BottomRight
    );
    assert_eq!(config.background_image_fit, BackgroundImageFit::Cover);
    assert!(config.background_image_repeat);
    assert_eq!(config.background_image_position.anchor(), [1.0, 1.0]);
}

#[test]
fn test_validation_clamps_ranges() {
    let config = Config::from_yaml("background_opacity: 3.5\nminimum_contrast: 0.2\n").unwrap();
    assert_eq!(config.background_opacity, 1.0);
    assert_eq!(config.minimum_contrast, 1.0);
}

#[test]
fn test_invalid_link_regex_is_rejected() {
    let result = Config::from_yaml("links:\n  - regex: '(unclosed'\n    highlight: always\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_link_rule_default_highlight_is_hover() {
    let config = Config::from_yaml("links:\n  - regex: 'foo'\n").unwrap();
    assert_eq!(config.links.len(), 1);
    assert_eq!(config.links[0].highlight, LinkHighlight::Hover);
}

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("config.yaml");
    fs::write(&path, "custom_shaders:\n  - crt.glsl\n  - bloom.glsl\n").unwrap();

    let config = Config::load(&path).expect("config should load");
    assert_eq!(config.custom_shaders, vec!["crt.glsl", "bloom.glsl"]);
}

#[test]
fn test_load_missing_file_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = Config::load(&temp_dir.path().join("nope.yaml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_palette_overrides() {
    let config = Config::from_yaml("palette:\n  1: [255, 0, 0]\n  200: [1, 2, 3]\n").unwrap();
    assert_eq!(config.palette.get(&1), Some(&[255, 0, 0]));
    assert_eq!(config.palette.get(&200), Some(&[1, 2, 3]));
}

#[test]
fn test_default_config_yaml_reloads() {
    let yaml = Config::default().to_yaml().unwrap();
    assert_eq!(Config::from_yaml(&yaml).unwrap(), Config::default());
}

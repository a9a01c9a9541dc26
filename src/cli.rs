//! Command-line interface for termframe.
//!
//! This module handles CLI argument parsing and the `default-config`
//! subcommand.

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;
use termframe_config::Config;

/// termframe - render terminal frames on the GPU or into a recorder
#[derive(Parser)]
#[command(name = "termframe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (default: <config dir>/termframe/config.yaml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level, overriding RUST_LOG
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Graphics backend
    #[arg(long, value_enum, default_value_t = Backend::Headless)]
    pub backend: Backend,

    /// Surface size in pixels
    #[arg(long, value_name = "WxH", value_parser = parse_size, default_value = "800x600")]
    pub size: (u32, u32),

    /// Number of frames to draw
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub frames: u32,

    /// Save the last frame as a PNG (wgpu backend only)
    #[arg(long, value_name = "PATH")]
    pub screenshot: Option<PathBuf>,

    /// Font family (default: the system monospace face)
    #[arg(long, value_name = "FAMILY")]
    pub font_family: Option<String>,

    /// Font size in pixels
    #[arg(long, value_name = "PX", default_value_t = 16.0)]
    pub font_size: f32,

    /// Append a custom post-processing shader
    #[arg(long, value_name = "PATH")]
    pub shader: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the default configuration as YAML
    DefaultConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Record frames without a GPU
    #[default]
    Headless,
    /// Render offscreen with wgpu
    Wgpu,
}

/// Runtime options passed from CLI to the application
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    pub config: Option<PathBuf>,
    pub log_level: Option<LevelFilter>,
    pub backend: Backend,
    pub size: (u32, u32),
    pub frames: u32,
    pub screenshot: Option<PathBuf>,
    pub font_family: Option<String>,
    pub font_size: f32,
    /// Shaders appended to the configured list
    pub shaders: Vec<String>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            config: None,
            log_level: None,
            backend: Backend::Headless,
            size: (800, 600),
            frames: 1,
            screenshot: None,
            font_family: None,
            font_size: 16.0,
            shaders: Vec::new(),
        }
    }
}

/// Result of CLI processing
pub enum CliResult {
    /// Continue with normal application startup
    Continue(RuntimeOptions),
    /// Exit with the given code (subcommand completed)
    Exit(i32),
}

/// Process CLI arguments and handle subcommands
pub fn process_cli() -> CliResult {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::DefaultConfig) => match Config::default().to_yaml() {
            Ok(yaml) => {
                print!("{yaml}");
                CliResult::Exit(0)
            }
            Err(e) => {
                eprintln!("termframe: error: {e}");
                CliResult::Exit(1)
            }
        },
        None => CliResult::Continue(RuntimeOptions {
            config: cli.config,
            log_level: cli.log_level.map(LevelFilter::from),
            backend: cli.backend,
            size: cli.size,
            frames: cli.frames.max(1),
            screenshot: cli.screenshot,
            font_family: cli.font_family,
            font_size: cli.font_size,
            shaders: cli.shader,
        }),
    }
}

/// Parse `WIDTHxHEIGHT`.
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("invalid dimension '{v}'"))
    };
    Ok((parse(w)?, parse(h)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("800x600"), Ok((800, 600)));
        assert_eq!(parse_size("1920X1080"), Ok((1920, 1080)));
        assert!(parse_size("800").is_err());
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("ax10").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["termframe"]).unwrap();
        assert_eq!(cli.backend, Backend::Headless);
        assert_eq!(cli.size, (800, 600));
        assert_eq!(cli.frames, 1);
        assert!(cli.shader.is_empty());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "termframe",
            "--backend",
            "wgpu",
            "--size",
            "640x480",
            "--log-level",
            "debug",
            "--shader",
            "crt.glsl",
            "--shader",
            "bloom.glsl",
        ])
        .unwrap();
        assert_eq!(cli.backend, Backend::Wgpu);
        assert_eq!(cli.size, (640, 480));
        assert_eq!(cli.log_level.map(LevelFilter::from), Some(LevelFilter::Debug));
        assert_eq!(cli.shader, vec!["crt.glsl", "bloom.glsl"]);
    }

    #[test]
    fn test_default_config_subcommand() {
        let cli = Cli::try_parse_from(["termframe", "default-config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::DefaultConfig)));
    }
}

// Library exports for the frame driver and its tests

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod app;
pub mod cli;
pub mod debug;

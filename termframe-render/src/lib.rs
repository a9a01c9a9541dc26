//! GPU rendering core for the termframe terminal renderer.
//!
//! This crate provides:
//!
//! - A graphics API seam with a wgpu backend and a headless recording backend
//! - Cell contents rebuilt incrementally from terminal snapshots
//! - A multi-buffered swap chain with semaphore backpressure
//! - Kitty graphics placements, background images and custom post shaders
//! - A render thread driving update and draw from timers and wakeups

pub mod api;
pub mod backend;
pub mod bg_image;
pub mod cell_contents;
pub mod config;
pub mod cursor;
pub mod error;
pub mod image;
pub mod links;
pub mod message;
pub mod renderer;
pub mod shader_types;
pub mod state;
pub mod swap_chain;
pub mod thread;

// Re-export main public types
pub use api::{GraphicsApi, Health};
pub use backend::headless::HeadlessApi;
pub use backend::wgpu::{WgpuApi, WgpuOptions};
pub use cell_contents::{Contents, GridSize};
pub use config::{ConfigDirty, DerivedConfig};
pub use error::RenderError;
pub use message::SurfaceMessage;
pub use renderer::{Padding, Renderer, ScreenSize};
pub use state::{Preedit, RenderState, SharedState};
pub use thread::{RenderThreadHandle, RendererMessage};

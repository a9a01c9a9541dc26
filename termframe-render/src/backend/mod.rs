//! Graphics backends implementing [`crate::api::GraphicsApi`].

pub mod headless;
pub mod transpile;
pub mod wgpu;

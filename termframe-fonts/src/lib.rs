//! Font services for the termframe renderer.
//!
//! This crate provides:
//! - Cell metrics derived from face metrics
//! - Grayscale and color glyph atlases with change counters
//! - A rasterizer seam with a swash implementation and a deterministic block face
//! - Procedural decoration and cursor sprites
//! - Run segmentation and a shaping cache
//!
//! # Architecture
//!
//! [`SharedGrid`] is the handle the renderer holds. It wraps a
//! `parking_lot::RwLock<Grid>`; glyph and sprite lookups take the shared
//! lock and only take the exclusive lock to rasterize on a miss.

pub mod atlas;
pub mod error;
pub mod grid;
pub mod metrics;
pub mod rasterizer;
pub mod shaper;
pub mod sprite;
pub mod swash_rasterizer;

pub use atlas::{Atlas, AtlasFormat};
pub use error::FontError;
pub use grid::{AtlasKind, Glyph, Grid, SharedGrid};
pub use metrics::{FaceMetrics, Metrics};
pub use rasterizer::{BlockRasterizer, FontIndex, FontStyle, RasterOptions, Rasterizer};
pub use shaper::{RunIterator, RunOptions, ShapedGlyph, TextRun};
pub use sprite::Sprite;
pub use swash_rasterizer::{FALLBACK_FAMILIES, FontData, SwashRasterizer};

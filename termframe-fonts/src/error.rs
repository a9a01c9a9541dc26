//! Error types for font loading and glyph rendering.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FontError {
    /// No usable font could be found for the requested family
    #[error("Font not found: {0}")]
    NotFound(String),

    /// Font bytes could not be parsed
    #[error("Invalid font data: {0}")]
    InvalidData(String),

    /// The atlas cannot fit a glyph even at its maximum size
    #[error("Atlas full: cannot fit {width}x{height} in {size}x{size}")]
    AtlasFull { width: u32, height: u32, size: u32 },

    /// The rasterizer produced nothing for this glyph
    #[error("Glyph {glyph} in font {font} could not be rasterized")]
    Rasterize { font: usize, glyph: u32 },

    #[error("Font I/O error: {0}")]
    Io(#[from] std::io::Error),
}

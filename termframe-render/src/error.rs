//! Typed error types for termframe-render.
//!
//! Per-frame failures (allocation, GPU resource creation) surface as
//! [`RenderError`] and abort only the frame that hit them. Per-glyph and
//! per-image failures are logged and skipped by the renderer instead.

use thiserror::Error;

use termframe_fonts::FontError;

/// Top-level error type for the rendering core.
#[derive(Debug, Error)]
pub enum RenderError {
    // -----------------------------------------------------------------------
    // Resource exhaustion
    // -----------------------------------------------------------------------
    /// A CPU-side buffer could not be grown.
    #[error("Allocation failed: {0}")]
    Alloc(String),

    /// A GPU texture could not be created or written.
    #[error("Texture error ({width}x{height}): {reason}")]
    Texture {
        width: u32,
        height: u32,
        reason: String,
    },

    /// A GPU buffer could not be created or written.
    #[error("Buffer error: {0}")]
    Buffer(String),

    /// A render pipeline could not be created.
    #[error("Pipeline '{name}' creation failed: {details}")]
    Pipeline { name: String, details: String },

    // -----------------------------------------------------------------------
    // Shader errors
    // -----------------------------------------------------------------------
    /// The shader source file could not be read from disk.
    #[error("Shader file read failed for '{path}': {source}")]
    ShaderFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The GLSL source could not be parsed.
    #[error("GLSL parse error in '{name}':\n{details}")]
    GlslParse { name: String, details: String },

    /// WGSL source could not be parsed.
    #[error("WGSL parse error for '{name}': {details}")]
    WgslParse { name: String, details: String },

    /// The shader module failed naga validation.
    #[error("Shader validation failed for '{name}': {details}")]
    ShaderValidation { name: String, details: String },

    /// WGSL generation from the naga IR failed.
    #[error("WGSL code generation failed for '{name}': {details}")]
    WgslGeneration { name: String, details: String },

    // -----------------------------------------------------------------------
    // Image loading
    // -----------------------------------------------------------------------
    /// An image file could not be opened.
    #[error("Image read failed for '{path}': {source}")]
    ImageRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An image file could not be decoded.
    #[error("Image load failed for '{path}': {source}")]
    ImageLoad {
        path: String,
        #[source]
        source: image::ImageError,
    },

    /// Raw pixel data has an unexpected length for its dimensions.
    #[error("Invalid image data size: expected {expected} bytes, got {actual} bytes")]
    InvalidImageData { expected: usize, actual: usize },

    // -----------------------------------------------------------------------
    // Device / surface
    // -----------------------------------------------------------------------
    /// No adapter is available.
    #[error("GPU adapter not found")]
    AdapterNotFound,

    /// The device could not be created or was lost.
    #[error("GPU device error: {0}")]
    Device(String),

    /// A surface could not be created for the window.
    #[error("GPU surface creation failed: {0}")]
    SurfaceCreation(String),

    /// `Surface::get_current_texture()` failed.
    #[error("GPU surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// A target could not be read back to CPU memory.
    #[error("Target readback failed: {0}")]
    Readback(String),

    // -----------------------------------------------------------------------
    // Fonts
    // -----------------------------------------------------------------------
    /// The font grid failed to produce a glyph or grow an atlas.
    #[error("Atlas error: {0}")]
    Atlas(#[from] FontError),
}

impl RenderError {
    pub fn texture(width: u32, height: u32, reason: impl Into<String>) -> Self {
        RenderError::Texture {
            width,
            height,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions from upstream error types
// ---------------------------------------------------------------------------

impl From<wgpu::CreateSurfaceError> for RenderError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        RenderError::SurfaceCreation(e.to_string())
    }
}

impl From<wgpu::RequestDeviceError> for RenderError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        RenderError::Device(e.to_string())
    }
}

impl From<std::collections::TryReserveError> for RenderError {
    fn from(e: std::collections::TryReserveError) -> Self {
        RenderError::Alloc(e.to_string())
    }
}

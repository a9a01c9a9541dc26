//! The configured background image.
//!
//! Decoding sniffs the file's content first and only falls back to the
//! extension when the content is not recognized. A failed load keeps the
//! previous image on screen.

use std::path::{Path, PathBuf};

use image::ImageReader;
use termframe_config::{BackgroundImageFit, BackgroundImagePosition};

use crate::api::{Filter, GraphicsApi, PixelFormat, TextureOptions};
use crate::error::RenderError;
use crate::shader_types::BgImageVertex;

/// Placement settings for the background image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BgImageSettings {
    pub path: Option<PathBuf>,
    pub opacity: f32,
    pub position: BackgroundImagePosition,
    pub fit: BackgroundImageFit,
    pub repeat: bool,
}

/// Decode the image at `path` to RGBA.
pub fn load(path: &Path) -> Result<image::RgbaImage, RenderError> {
    let display = path.display().to_string();
    let mut reader = ImageReader::open(path)
        .map_err(|source| RenderError::ImageRead {
            path: display.clone(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| RenderError::ImageRead {
            path: display.clone(),
            source,
        })?;
    if reader.format().is_none()
        && let Ok(format) = image::ImageFormat::from_path(path)
    {
        reader.set_format(format);
    }
    let img = reader.decode().map_err(|source| RenderError::ImageLoad {
        path: display,
        source,
    })?;
    Ok(img.to_rgba8())
}

/// Destination rectangle `[x, y, width, height]` of an image on a surface.
pub fn dest_rect(
    image: (u32, u32),
    surface: (u32, u32),
    position: BackgroundImagePosition,
    fit: BackgroundImageFit,
) -> [f32; 4] {
    let (iw, ih) = (image.0.max(1) as f32, image.1.max(1) as f32);
    let (sw, sh) = (surface.0 as f32, surface.1 as f32);
    let (w, h) = match fit {
        BackgroundImageFit::Stretch => (sw, sh),
        BackgroundImageFit::Contain => {
            let scale = (sw / iw).min(sh / ih);
            (iw * scale, ih * scale)
        }
        BackgroundImageFit::Cover => {
            let scale = (sw / iw).max(sh / ih);
            (iw * scale, ih * scale)
        }
        BackgroundImageFit::None => (iw, ih),
    };
    let [ax, ay] = position.anchor();
    [(sw - w) * ax, (sh - h) * ay, w, h]
}

pub struct BackgroundImage<A: GraphicsApi> {
    path: Option<PathBuf>,
    /// Decoded but not yet uploaded
    pending: Option<image::RgbaImage>,
    texture: Option<A::Texture>,
    size: (u32, u32),
    vertex: BgImageVertex,
    /// Bumped whenever the vertex or texture changes
    modified: u64,
}

impl<A: GraphicsApi> Default for BackgroundImage<A> {
    fn default() -> Self {
        Self {
            path: None,
            pending: None,
            texture: None,
            size: (0, 0),
            vertex: BgImageVertex::default(),
            modified: 0,
        }
    }
}

impl<A: GraphicsApi> BackgroundImage<A> {
    /// Load the image at `path` unless it is already the current one.
    pub fn set_path(&mut self, path: Option<&Path>) {
        if self.path.as_deref() == path {
            return;
        }
        let Some(path) = path else {
            log::info!("background image removed");
            *self = Self {
                modified: self.modified + 1,
                ..Self::default()
            };
            return;
        };
        match load(path) {
            Ok(img) => {
                log::info!(
                    "background image loaded: {} ({}x{})",
                    path.display(),
                    img.width(),
                    img.height()
                );
                self.size = img.dimensions();
                self.pending = Some(img);
                self.path = Some(path.to_path_buf());
            }
            Err(e) => log::warn!("keeping previous background image: {e}"),
        }
    }

    /// Upload a freshly decoded image.
    pub fn upload(&mut self, api: &A) {
        let Some(img) = self.pending.take() else {
            return;
        };
        let (w, h) = img.dimensions();
        let opts = TextureOptions::sampled(PixelFormat::Rgba8, Filter::Linear);
        match api.init_texture(opts, w, h, Some(img.as_raw())) {
            Ok(texture) => {
                self.texture = Some(texture);
                self.modified += 1;
            }
            Err(e) => log::warn!("background image upload failed: {e}"),
        }
    }

    /// Recompute the vertex for a surface size.
    pub fn update_vertex(&mut self, surface: (u32, u32), settings: &BgImageSettings) {
        let vertex = BgImageVertex {
            dest: dest_rect(self.size, surface, settings.position, settings.fit),
            opacity: settings.opacity,
            repeat: settings.repeat as u32,
            _padding: [0; 2],
        };
        if vertex != self.vertex {
            self.vertex = vertex;
            self.modified += 1;
        }
    }

    pub fn texture(&self) -> Option<&A::Texture> {
        self.texture.as_ref()
    }

    pub fn vertex(&self) -> &BgImageVertex {
        &self.vertex
    }

    pub fn modified(&self) -> u64 {
        self.modified
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

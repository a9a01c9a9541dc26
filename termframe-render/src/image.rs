//! Image staging: decoded pixels on their way to becoming GPU textures.
//!
//! [`Image`] is the per-image state machine. [`ImageState`] is the table of
//! Kitty graphics images the renderer owns, plus the placements rebuilt
//! from the terminal's image storage, bucketed by z-order into the layers
//! behind cell backgrounds, between backgrounds and text, and above text.

use std::collections::HashMap;

use ::image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};
use termframe_terminal::{
    ImageStorage, KittyFormat, KittyImage, KittyPlacement, Placeholder, PlacementLocation,
    ScreenSnapshot,
};

use crate::api::{Filter, GraphicsApi, PixelFormat, TextureOptions};
use crate::error::RenderError;
use crate::shader_types::ImageVertex;

/// Source pixel layout of staged data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Gray,
    GrayAlpha,
    Rgb,
    Bgr,
    Bgra,
    Rgba,
}

impl ImageFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Gray => 1,
            ImageFormat::GrayAlpha => 2,
            ImageFormat::Rgb | ImageFormat::Bgr => 3,
            ImageFormat::Bgra | ImageFormat::Rgba => 4,
        }
    }
}

impl From<KittyFormat> for ImageFormat {
    fn from(format: KittyFormat) -> Self {
        match format {
            KittyFormat::Gray => ImageFormat::Gray,
            KittyFormat::GrayAlpha => ImageFormat::GrayAlpha,
            KittyFormat::Rgb => ImageFormat::Rgb,
            KittyFormat::Rgba => ImageFormat::Rgba,
        }
    }
}

/// Decoded pixels awaiting upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub data: Vec<u8>,
}

impl Pending {
    pub fn new(
        width: u32,
        height: u32,
        format: ImageFormat,
        data: Vec<u8>,
    ) -> Result<Self, RenderError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(RenderError::InvalidImageData {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            format: ImageFormat::Rgba,
            data: Vec::new(),
        }
    }

    /// Convert to RGBA in place. Leaves `self` untouched on failure.
    pub fn normalize(&mut self) -> Result<(), RenderError> {
        if self.format == ImageFormat::Rgba {
            return Ok(());
        }
        let expected =
            self.width as usize * self.height as usize * self.format.bytes_per_pixel();
        let invalid = || RenderError::InvalidImageData {
            expected,
            actual: self.data.len(),
        };
        if self.data.len() != expected {
            return Err(invalid());
        }

        let mut data = Vec::new();
        data.try_reserve_exact(expected)?;
        data.extend_from_slice(&self.data);
        // BGR orders are not modelled by `DynamicImage`; swap to RGB first
        if matches!(self.format, ImageFormat::Bgr | ImageFormat::Bgra) {
            for px in data.chunks_exact_mut(self.format.bytes_per_pixel()) {
                px.swap(0, 2);
            }
        }

        let (w, h) = (self.width, self.height);
        let image = match self.format {
            ImageFormat::Gray => {
                ImageBuffer::<Luma<u8>, _>::from_raw(w, h, data).map(DynamicImage::ImageLuma8)
            }
            ImageFormat::GrayAlpha => {
                ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, data).map(DynamicImage::ImageLumaA8)
            }
            ImageFormat::Rgb | ImageFormat::Bgr => {
                ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, data).map(DynamicImage::ImageRgb8)
            }
            ImageFormat::Bgra | ImageFormat::Rgba => {
                ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, data).map(DynamicImage::ImageRgba8)
            }
        }
        .ok_or_else(invalid)?;

        self.data = image.into_rgba8().into_raw();
        self.format = ImageFormat::Rgba;
        Ok(())
    }
}

/// Lifecycle of one image.
pub enum Image<A: GraphicsApi> {
    Pending(Pending),
    /// New data for an image that already has a texture; the old texture
    /// stays drawable until the new one is uploaded
    Replace {
        texture: A::Texture,
        pending: Pending,
    },
    Ready(A::Texture),
    UnloadPending(Pending),
    UnloadReplace {
        texture: A::Texture,
        pending: Pending,
    },
    UnloadReady(A::Texture),
}

impl<A: GraphicsApi> std::fmt::Debug for Image<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Image::Pending(_) => "Pending",
            Image::Replace { .. } => "Replace",
            Image::Ready(_) => "Ready",
            Image::UnloadPending(_) => "UnloadPending",
            Image::UnloadReplace { .. } => "UnloadReplace",
            Image::UnloadReady(_) => "UnloadReady",
        };
        f.write_str(name)
    }
}

impl<A: GraphicsApi> Image<A> {
    /// Data waits for upload.
    pub fn is_pending(&self) -> bool {
        matches!(self, Image::Pending(_) | Image::Replace { .. })
    }

    pub fn is_unloading(&self) -> bool {
        matches!(
            self,
            Image::UnloadPending(_) | Image::UnloadReplace { .. } | Image::UnloadReady(_)
        )
    }

    /// The drawable texture, if any.
    pub fn texture(&self) -> Option<&A::Texture> {
        match self {
            Image::Replace { texture, .. }
            | Image::Ready(texture)
            | Image::UnloadReplace { texture, .. }
            | Image::UnloadReady(texture) => Some(texture),
            Image::Pending(_) | Image::UnloadPending(_) => None,
        }
    }

    pub fn pending(&self) -> Option<&Pending> {
        match self {
            Image::Pending(p)
            | Image::UnloadPending(p)
            | Image::Replace { pending: p, .. }
            | Image::UnloadReplace { pending: p, .. } => Some(p),
            Image::Ready(_) | Image::UnloadReady(_) => None,
        }
    }

    fn pending_mut(&mut self) -> Option<&mut Pending> {
        match self {
            Image::Pending(p)
            | Image::UnloadPending(p)
            | Image::Replace { pending: p, .. }
            | Image::UnloadReplace { pending: p, .. } => Some(p),
            Image::Ready(_) | Image::UnloadReady(_) => None,
        }
    }

    /// Mark for teardown. A no-op if already unloading.
    pub fn mark_for_unload(&mut self) {
        if self.is_unloading() {
            return;
        }
        let placeholder = Image::UnloadPending(Pending::empty());
        *self = match std::mem::replace(self, placeholder) {
            Image::Pending(p) => Image::UnloadPending(p),
            Image::Replace { texture, pending } => Image::UnloadReplace { texture, pending },
            Image::Ready(texture) => Image::UnloadReady(texture),
            unloading => unloading,
        };
    }

    /// Replace the data with `new`, keeping any existing texture drawable
    /// until the upload happens.
    ///
    /// # Panics
    ///
    /// If `new` is not a bare [`Image::Pending`].
    pub fn mark_for_replace(&mut self, new: Image<A>) {
        let pending = match new {
            Image::Pending(p) => p,
            other => panic!("mark_for_replace requires a pending image, got {other:?}"),
        };
        let placeholder = Image::UnloadPending(Pending::empty());
        *self = match std::mem::replace(self, placeholder) {
            Image::Replace { texture, .. }
            | Image::Ready(texture)
            | Image::UnloadReplace { texture, .. }
            | Image::UnloadReady(texture) => Image::Replace { texture, pending },
            Image::Pending(_) | Image::UnloadPending(_) => Image::Pending(pending),
        };
    }

    /// Normalize pending pixels to RGBA. Needs no GPU context.
    pub fn prep_for_upload(&mut self) -> Result<(), RenderError> {
        match self.pending_mut() {
            Some(p) => p.normalize(),
            None => Ok(()),
        }
    }

    /// Create the texture and become [`Image::Ready`].
    ///
    /// # Panics
    ///
    /// If the image is not pending.
    pub fn upload(&mut self, api: &A) -> Result<(), RenderError> {
        debug_assert!(self.is_pending(), "upload of non-pending image {self:?}");
        self.prep_for_upload()?;
        let texture = {
            let Some(p) = self.pending() else {
                return Ok(());
            };
            api.init_texture(
                TextureOptions::sampled(PixelFormat::Rgba8, Filter::Linear),
                p.width,
                p.height,
                Some(&p.data),
            )?
        };
        // Drops the pending buffer and any previous texture
        *self = Image::Ready(texture);
        Ok(())
    }
}

// ============================================================================
// Placements
// ============================================================================

/// z-index below which placements draw behind cell backgrounds.
pub const BG_LIMIT: i32 = i32::MIN / 2;

/// Compositing bucket of a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    /// Behind cell backgrounds
    Back,
    /// Between cell backgrounds and text
    Mid,
    /// Above text
    Front,
}

impl Layer {
    pub fn of(z: i32) -> Layer {
        if z < BG_LIMIT {
            Layer::Back
        } else if z < 0 {
            Layer::Mid
        } else {
            Layer::Front
        }
    }
}

/// An image drawn at a grid position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub image_id: u32,
    /// Column and viewport row of the top-left cell
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Destination size in pixels
    pub width: u32,
    pub height: u32,
    pub cell_offset_x: u32,
    pub cell_offset_y: u32,
    pub source_x: u32,
    pub source_y: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl ImagePlacement {
    pub fn vertex(&self) -> ImageVertex {
        ImageVertex {
            grid_pos: [self.x as f32, self.y as f32],
            cell_offset: [self.cell_offset_x as f32, self.cell_offset_y as f32],
            source_rect: [
                self.source_x as f32,
                self.source_y as f32,
                self.source_width as f32,
                self.source_height as f32,
            ],
            dest_size: [self.width as f32, self.height as f32],
            _padding: [0.0; 2],
        }
    }
}

struct ImageEntry<A: GraphicsApi> {
    image: Image<A>,
    /// Storage generation the data came from
    generation: u64,
}

/// The renderer's image table and current placements.
pub struct ImageState<A: GraphicsApi> {
    images: HashMap<u32, ImageEntry<A>>,
    /// Sorted by z
    placements: Vec<ImagePlacement>,
    /// A placement uses Unicode placeholders; rescan every frame
    has_virtual: bool,
}

impl<A: GraphicsApi> Default for ImageState<A> {
    fn default() -> Self {
        Self {
            images: HashMap::new(),
            placements: Vec::new(),
            has_virtual: false,
        }
    }
}

impl<A: GraphicsApi> ImageState<A> {
    pub fn image(&self, id: u32) -> Option<&Image<A>> {
        self.images.get(&id).map(|e| &e.image)
    }

    pub fn placements(&self) -> &[ImagePlacement] {
        &self.placements
    }

    /// Placements of one layer, with their offset into [`Self::placements`].
    pub fn layer(&self, layer: Layer) -> (usize, &[ImagePlacement]) {
        let start = self
            .placements
            .partition_point(|p| Layer::of(p.z) < layer);
        let end = self
            .placements
            .partition_point(|p| Layer::of(p.z) <= layer);
        (start, &self.placements[start..end])
    }

    pub fn has_virtual_placements(&self) -> bool {
        self.has_virtual
    }

    /// Whether placements must be rebuilt this frame.
    pub fn needs_update(&self, storage: &ImageStorage) -> bool {
        storage.dirty || self.has_virtual
    }

    /// Stage new or changed images from `storage` and rebuild placements
    /// from scratch for the visible viewport.
    pub fn update(&mut self, storage: &ImageStorage, snapshot: &ScreenSnapshot, cell: [u32; 2]) {
        self.sync_images(storage);

        self.placements.clear();
        self.has_virtual = storage.has_virtual_placements();
        for (&(image_id, _), placement) in storage.placements() {
            let Some(image) = storage.image(image_id) else {
                log::warn!("placement references missing image id={image_id}");
                continue;
            };
            if let PlacementLocation::Pin { row, col } = placement.location
                && let Some(p) = pinned_placement(image, placement, row, col, snapshot, cell)
            {
                self.placements.push(p);
            }
        }
        if self.has_virtual {
            self.add_virtual_placements(storage, snapshot, cell);
        }
        self.placements
            .sort_by(|a, b| a.z.cmp(&b.z).then(a.image_id.cmp(&b.image_id)));
    }

    fn sync_images(&mut self, storage: &ImageStorage) {
        for kitty in storage.images() {
            let stale = self
                .images
                .get(&kitty.id)
                .is_none_or(|e| e.generation != kitty.generation || e.image.is_unloading());
            if !stale {
                continue;
            }
            let pending = match Pending::new(
                kitty.width,
                kitty.height,
                kitty.format.into(),
                kitty.data.to_vec(),
            ) {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("skipping kitty image id={}: {e}", kitty.id);
                    continue;
                }
            };
            match self.images.get_mut(&kitty.id) {
                Some(entry) => {
                    entry.image.mark_for_replace(Image::Pending(pending));
                    entry.generation = kitty.generation;
                }
                None => {
                    self.images.insert(
                        kitty.id,
                        ImageEntry {
                            image: Image::Pending(pending),
                            generation: kitty.generation,
                        },
                    );
                }
            }
        }

        for (id, entry) in &mut self.images {
            if storage.image(*id).is_none() {
                entry.image.mark_for_unload();
            }
        }
    }

    fn add_virtual_placements(
        &mut self,
        storage: &ImageStorage,
        snapshot: &ScreenSnapshot,
        cell: [u32; 2],
    ) {
        for (y, line) in snapshot.lines.iter().enumerate() {
            let mut x = 0;
            while x < line.cells.len() {
                let Some(ph) = Placeholder::decode(&line.cells[x]) else {
                    x += 1;
                    continue;
                };
                // Extend over following cells continuing the same placement row
                let mut run = 1;
                while let Some(next) = line.cells.get(x + run).and_then(Placeholder::decode) {
                    let continues = next.image_id == ph.image_id
                        && next.placement_id == ph.placement_id
                        && next.row.unwrap_or(ph.row.unwrap_or(0)) == ph.row.unwrap_or(0)
                        && next.col.is_none_or(|c| Some(c) == ph.col.map(|s| s + run as u32));
                    if !continues {
                        break;
                    }
                    run += 1;
                }
                if let Some(p) = virtual_placement(storage, &ph, run as u32, x, y, cell) {
                    self.placements.push(p);
                }
                x += run;
            }
        }
    }

    /// Upload pending images and drop unloading ones. Per-image failures
    /// are logged and leave that image in place.
    pub fn upload(&mut self, api: &A) {
        self.images.retain(|_, e| !e.image.is_unloading());
        for (id, entry) in &mut self.images {
            if entry.image.is_pending()
                && let Err(e) = entry.image.upload(api)
            {
                log::warn!("failed to upload image id={id}: {e}");
            }
        }
    }

    /// Normalize every pending image ahead of [`Self::upload`].
    pub fn prep_for_upload(&mut self) {
        for (id, entry) in &mut self.images {
            if let Err(e) = entry.image.prep_for_upload() {
                log::warn!("failed to convert image id={id}: {e}");
            }
        }
    }

    pub fn clear(&mut self) {
        for entry in self.images.values_mut() {
            entry.image.mark_for_unload();
        }
        self.placements.clear();
        self.has_virtual = false;
    }
}

fn pinned_placement(
    image: &KittyImage,
    placement: &KittyPlacement,
    row: u64,
    col: u16,
    snapshot: &ScreenSnapshot,
    cell: [u32; 2],
) -> Option<ImagePlacement> {
    let source_x = placement.source_x.min(image.width);
    let source_y = placement.source_y.min(image.height);
    let source_width = match placement.source_width {
        0 => image.width - source_x,
        w => w.min(image.width - source_x),
    };
    let source_height = match placement.source_height {
        0 => image.height - source_y,
        h => h.min(image.height - source_y),
    };
    let width = match placement.columns {
        0 => source_width,
        c => c * cell[0],
    };
    let height = match placement.rows {
        0 => source_height,
        r => r * cell[1],
    };

    let y = row as i64 - snapshot.viewport_pin as i64;
    let top_px = y * cell[1] as i64 + placement.y_offset as i64;
    let bottom_px = top_px + height as i64;
    if bottom_px <= 0 || y >= snapshot.rows as i64 || width == 0 || height == 0 {
        return None;
    }

    Some(ImagePlacement {
        image_id: image.id,
        x: col as i32,
        y: y as i32,
        z: placement.z,
        width,
        height,
        cell_offset_x: placement.x_offset,
        cell_offset_y: placement.y_offset,
        source_x,
        source_y,
        source_width,
        source_height,
    })
}

/// Placement covering `run` placeholder cells starting at viewport (`x`, `y`).
fn virtual_placement(
    storage: &ImageStorage,
    ph: &Placeholder,
    run: u32,
    x: usize,
    y: usize,
    cell: [u32; 2],
) -> Option<ImagePlacement> {
    let image = storage.image(ph.image_id)?;
    let placement = storage
        .placements()
        .find(|((id, pid), p)| {
            *id == ph.image_id && p.is_virtual() && (ph.placement_id == 0 || *pid == ph.placement_id)
        })
        .map(|(_, p)| *p)?;

    let columns = placement.columns.max(1);
    let rows = placement.rows.max(1);
    let row = ph.row.unwrap_or(0);
    let col = ph.col.unwrap_or(0);
    if row >= rows || col >= columns {
        return None;
    }

    // The image is stretched over the placement's grid; each cell shows
    // its share of the source.
    let cell_src_w = image.width as f32 / columns as f32;
    let cell_src_h = image.height as f32 / rows as f32;
    let run = run.min(columns - col);
    Some(ImagePlacement {
        image_id: image.id,
        x: x as i32,
        y: y as i32,
        z: placement.z,
        width: run * cell[0],
        height: cell[1],
        cell_offset_x: 0,
        cell_offset_y: 0,
        source_x: (col as f32 * cell_src_w) as u32,
        source_y: (row as f32 * cell_src_h) as u32,
        source_width: (run as f32 * cell_src_w).round() as u32,
        source_height: cell_src_h.round() as u32,
    })
}

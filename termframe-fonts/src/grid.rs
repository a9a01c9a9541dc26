//! The shared font grid: metrics, glyph cache, atlases and shaping cache.
//!
//! The grid is shared between the renderer and whoever changes fonts (for
//! example on a size change). Glyph lookups take the read lock and only
//! upgrade to the write lock on a cache miss. Atlas pixels are read by the
//! renderer under the read lock via [`SharedGrid::with_atlases`].

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use termframe_terminal::Cell;

use crate::atlas::{Atlas, AtlasFormat, Region};
use crate::error::FontError;
use crate::metrics::Metrics;
use crate::rasterizer::{FontIndex, RasterOptions, Rasterizer};
use crate::shaper::{self, ShapedGlyph, TextRun};
use crate::sprite::{self, Sprite};

/// Initial atlas edge length.
const INITIAL_ATLAS_SIZE: u32 = 512;

/// Number of shaped runs kept in the cache.
const SHAPE_CACHE_SIZE: usize = 1024;

/// Which atlas a glyph lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AtlasKind {
    #[default]
    Grayscale,
    Color,
}

/// A glyph placed in an atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Glyph {
    pub atlas: AtlasKind,
    pub atlas_x: u32,
    pub atlas_y: u32,
    pub width: u32,
    pub height: u32,
    /// Pixels from the cell's left edge
    pub offset_x: i32,
    /// Pixels from the cell's bottom edge up to the glyph top
    pub offset_y: i32,
}

impl Glyph {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GlyphKey {
    font: FontIndex,
    glyph: u32,
    opts: RasterOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SpriteKey {
    sprite: Sprite,
    cells: u8,
}

/// Grid contents guarded by the lock.
pub struct Grid {
    pub metrics: Metrics,
    rasterizer: Box<dyn Rasterizer>,
    pub atlas_grayscale: Atlas,
    pub atlas_color: Atlas,
    glyphs: HashMap<GlyphKey, Glyph>,
    sprites: HashMap<SpriteKey, Glyph>,
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("metrics", &self.metrics)
            .field("glyphs", &self.glyphs.len())
            .field("sprites", &self.sprites.len())
            .finish()
    }
}

impl Grid {
    pub fn new(rasterizer: Box<dyn Rasterizer>) -> Self {
        let metrics = Metrics::calc(rasterizer.face_metrics());
        Self {
            metrics,
            rasterizer,
            atlas_grayscale: Atlas::new(INITIAL_ATLAS_SIZE, AtlasFormat::Grayscale),
            atlas_color: Atlas::new(INITIAL_ATLAS_SIZE, AtlasFormat::Bgra),
            glyphs: HashMap::new(),
            sprites: HashMap::new(),
        }
    }

    pub fn rasterizer(&self) -> &dyn Rasterizer {
        self.rasterizer.as_ref()
    }

    fn atlas_mut(&mut self, kind: AtlasKind) -> &mut Atlas {
        match kind {
            AtlasKind::Grayscale => &mut self.atlas_grayscale,
            AtlasKind::Color => &mut self.atlas_color,
        }
    }

    /// Reserve space, doubling the atlas until it fits.
    fn place(
        &mut self,
        kind: AtlasKind,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Region, FontError> {
        let atlas = self.atlas_mut(kind);
        loop {
            match atlas.reserve(width, height) {
                Ok(region) => {
                    if region.width > 0 {
                        atlas.set(region, pixels);
                    }
                    return Ok(region);
                }
                Err(FontError::AtlasFull { .. }) => atlas.grow(atlas.size() * 2)?,
                Err(e) => return Err(e),
            }
        }
    }

    fn render_glyph(
        &mut self,
        font: FontIndex,
        glyph: u32,
        opts: RasterOptions,
    ) -> Result<Glyph, FontError> {
        let key = GlyphKey { font, glyph, opts };
        if let Some(g) = self.glyphs.get(&key) {
            return Ok(*g);
        }

        let raster = self
            .rasterizer
            .rasterize(font, glyph, &self.metrics, opts)?;
        let kind = if raster.color {
            AtlasKind::Color
        } else {
            AtlasKind::Grayscale
        };
        let region = self.place(kind, raster.width, raster.height, &raster.data)?;
        let placed = Glyph {
            atlas: kind,
            atlas_x: region.x,
            atlas_y: region.y,
            width: raster.width,
            height: raster.height,
            offset_x: raster.left,
            offset_y: raster.top + self.metrics.cell_baseline as i32,
        };
        self.glyphs.insert(key, placed);
        Ok(placed)
    }

    fn render_sprite(&mut self, sprite: Sprite, cells: u8) -> Result<Glyph, FontError> {
        let key = SpriteKey { sprite, cells };
        if let Some(g) = self.sprites.get(&key) {
            return Ok(*g);
        }
        let (width, height, data) = sprite::draw(sprite, cells, &self.metrics);
        let region = self.place(AtlasKind::Grayscale, width, height, &data)?;
        let placed = Glyph {
            atlas: AtlasKind::Grayscale,
            atlas_x: region.x,
            atlas_y: region.y,
            width,
            height,
            offset_x: 0,
            offset_y: height as i32,
        };
        self.sprites.insert(key, placed);
        Ok(placed)
    }

    /// Swap the faces, dropping every cached glyph.
    fn set_rasterizer(&mut self, rasterizer: Box<dyn Rasterizer>) {
        self.metrics = Metrics::calc(rasterizer.face_metrics());
        self.rasterizer = rasterizer;
        self.glyphs.clear();
        self.sprites.clear();
        self.atlas_grayscale.clear();
        self.atlas_color.clear();
    }
}

/// Reference-counted handle to a lock-protected [`Grid`].
#[derive(Clone)]
pub struct SharedGrid {
    grid: Arc<RwLock<Grid>>,
    shape_cache: Arc<Mutex<LruCache<u64, Arc<[ShapedGlyph]>>>>,
}

impl std::fmt::Debug for SharedGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedGrid").field("grid", &*self.grid.read()).finish()
    }
}

impl SharedGrid {
    pub fn new(rasterizer: Box<dyn Rasterizer>) -> Self {
        Self {
            grid: Arc::new(RwLock::new(Grid::new(rasterizer))),
            shape_cache: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(SHAPE_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            ))),
        }
    }

    pub fn metrics(&self) -> Metrics {
        self.grid.read().metrics
    }

    /// Replace the faces (e.g. on a font size change).
    pub fn set_rasterizer(&self, rasterizer: Box<dyn Rasterizer>) {
        self.grid.write().set_rasterizer(rasterizer);
        self.shape_cache.lock().clear();
    }

    pub fn render_glyph(
        &self,
        font: FontIndex,
        glyph: u32,
        opts: RasterOptions,
    ) -> Result<Glyph, FontError> {
        let key = GlyphKey { font, glyph, opts };
        if let Some(g) = self.grid.read().glyphs.get(&key) {
            return Ok(*g);
        }
        self.grid.write().render_glyph(font, glyph, opts)
    }

    pub fn render_sprite(&self, sprite: Sprite, cells: u8) -> Result<Glyph, FontError> {
        let key = SpriteKey { sprite, cells };
        if let Some(g) = self.grid.read().sprites.get(&key) {
            return Ok(*g);
        }
        self.grid.write().render_sprite(sprite, cells)
    }

    /// Shape a run, reusing cached results for identical runs.
    pub fn shape(&self, run: &TextRun, cells: &[Cell]) -> Arc<[ShapedGlyph]> {
        if let Some(hit) = self.shape_cache.lock().get(&run.hash) {
            return Arc::clone(hit);
        }
        let shaped: Arc<[ShapedGlyph]> = {
            let grid = self.grid.read();
            shaper::shape(run, cells, grid.rasterizer()).into()
        };
        self.shape_cache.lock().put(run.hash, Arc::clone(&shaped));
        shaped
    }

    pub fn shape_cache_len(&self) -> usize {
        self.shape_cache.lock().len()
    }

    /// Run `f` with the grid held shared, e.g. to split a row into runs.
    pub fn with_grid<R>(&self, f: impl FnOnce(&Grid) -> R) -> R {
        f(&self.grid.read())
    }

    /// Read both atlases under the shared lock.
    pub fn with_atlases<R>(&self, f: impl FnOnce(&Atlas, &Atlas) -> R) -> R {
        let grid = self.grid.read();
        f(&grid.atlas_grayscale, &grid.atlas_color)
    }
}

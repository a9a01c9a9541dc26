//! Square glyph atlases with shelf packing.
//!
//! An atlas owns a CPU-side pixel buffer. The renderer copies it into a GPU
//! texture whenever `modified` advances, and reallocates the texture when
//! `resized` advances.

use crate::error::FontError;

/// Padding between packed glyphs, in pixels.
const PADDING: u32 = 1;

/// Largest size an atlas may grow to.
pub const MAX_ATLAS_SIZE: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtlasFormat {
    /// One byte of coverage per pixel
    Grayscale,
    /// Four bytes per pixel, BGRA premultiplied
    Bgra,
}

impl AtlasFormat {
    pub fn depth(self) -> u32 {
        match self {
            AtlasFormat::Grayscale => 1,
            AtlasFormat::Bgra => 4,
        }
    }
}

/// A reserved rectangle in the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct Atlas {
    data: Vec<u8>,
    size: u32,
    format: AtlasFormat,
    // Shelf packer state
    next_x: u32,
    next_y: u32,
    shelf_height: u32,
    /// Bumped on every pixel change
    pub modified: usize,
    /// Bumped whenever the atlas dimensions change
    pub resized: usize,
}

impl Atlas {
    pub fn new(size: u32, format: AtlasFormat) -> Self {
        let mut atlas = Self {
            data: vec![0; (size * size * format.depth()) as usize],
            size,
            format,
            next_x: PADDING,
            next_y: PADDING,
            shelf_height: 0,
            modified: 0,
            resized: 0,
        };
        atlas.modified = 1;
        atlas
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn format(&self) -> AtlasFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Reserve a `width`x`height` region. Fails with `AtlasFull` when no
    /// space remains; the caller may `grow` and retry.
    pub fn reserve(&mut self, width: u32, height: u32) -> Result<Region, FontError> {
        if width == 0 || height == 0 {
            return Ok(Region::default());
        }

        let full = FontError::AtlasFull {
            width,
            height,
            size: self.size,
        };
        if width + PADDING * 2 > self.size {
            return Err(full);
        }

        if self.next_x + width + PADDING > self.size {
            // Start a new shelf
            self.next_x = PADDING;
            self.next_y += self.shelf_height + PADDING;
            self.shelf_height = 0;
        }
        if self.next_y + height + PADDING > self.size {
            return Err(full);
        }

        let region = Region {
            x: self.next_x,
            y: self.next_y,
            width,
            height,
        };
        self.next_x += width + PADDING;
        self.shelf_height = self.shelf_height.max(height);
        Ok(region)
    }

    /// Copy tightly packed pixels into a reserved region.
    pub fn set(&mut self, region: Region, pixels: &[u8]) {
        let depth = self.format.depth() as usize;
        let row_bytes = region.width as usize * depth;
        debug_assert_eq!(pixels.len(), row_bytes * region.height as usize);
        debug_assert!(region.x + region.width <= self.size);
        debug_assert!(region.y + region.height <= self.size);

        for (row, src) in pixels.chunks_exact(row_bytes).enumerate() {
            let start = ((region.y as usize + row) * self.size as usize + region.x as usize) * depth;
            self.data[start..start + row_bytes].copy_from_slice(src);
        }
        self.modified += 1;
    }

    /// Grow to `new_size`, preserving existing content and packer state.
    pub fn grow(&mut self, new_size: u32) -> Result<(), FontError> {
        if new_size <= self.size || new_size > MAX_ATLAS_SIZE {
            return Err(FontError::AtlasFull {
                width: new_size,
                height: new_size,
                size: self.size,
            });
        }

        let depth = self.format.depth() as usize;
        let old_row = self.size as usize * depth;
        let mut data = vec![0; new_size as usize * new_size as usize * depth];
        for (row, src) in self.data.chunks_exact(old_row).enumerate() {
            let start = row * new_size as usize * depth;
            data[start..start + old_row].copy_from_slice(src);
        }

        log::debug!(
            "growing {:?} atlas {old}x{old} -> {new_size}x{new_size}",
            self.format,
            old = self.size,
        );
        self.data = data;
        self.size = new_size;
        self.modified += 1;
        self.resized += 1;
        Ok(())
    }

    /// Drop every glyph, keeping the current size.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.next_x = PADDING;
        self.next_y = PADDING;
        self.shelf_height = 0;
        self.modified += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_packs_shelves() {
        let mut atlas = Atlas::new(16, AtlasFormat::Grayscale);
        let a = atlas.reserve(6, 4).unwrap();
        let b = atlas.reserve(6, 5).unwrap();
        let c = atlas.reserve(6, 2).unwrap();
        assert_eq!((a.x, a.y), (1, 1));
        assert_eq!((b.x, b.y), (8, 1));
        // Third glyph does not fit on the first shelf
        assert_eq!((c.x, c.y), (1, 7));
    }

    #[test]
    fn test_reserve_reports_full() {
        let mut atlas = Atlas::new(8, AtlasFormat::Grayscale);
        assert!(matches!(
            atlas.reserve(7, 7),
            Err(FontError::AtlasFull { .. })
        ));
    }

    #[test]
    fn test_set_and_grow_preserve_pixels() {
        let mut atlas = Atlas::new(4, AtlasFormat::Bgra);
        let region = atlas.reserve(1, 1).unwrap();
        let before = atlas.modified;
        atlas.set(region, &[1, 2, 3, 4]);
        assert!(atlas.modified > before);

        atlas.grow(8).unwrap();
        assert_eq!(atlas.resized, 1);
        let idx = ((region.y * 8 + region.x) * 4) as usize;
        assert_eq!(&atlas.data()[idx..idx + 4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_grow_rejects_shrink() {
        let mut atlas = Atlas::new(8, AtlasFormat::Grayscale);
        assert!(atlas.grow(4).is_err());
        assert!(atlas.grow(MAX_ATLAS_SIZE * 2).is_err());
    }
}

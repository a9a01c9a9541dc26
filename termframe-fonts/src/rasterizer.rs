//! The rasterizer seam and the deterministic block face.

use crate::error::FontError;
use crate::metrics::{FaceMetrics, Metrics};

/// Index of a face in a rasterizer's font list.
///
/// Layout follows the collection convention: 0 regular, 1 bold, 2 italic,
/// 3 bold italic, 4.. fallbacks.
pub type FontIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => FontStyle::Regular,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (true, true) => FontStyle::BoldItalic,
        }
    }

    pub fn index(self) -> FontIndex {
        match self {
            FontStyle::Regular => 0,
            FontStyle::Bold => 1,
            FontStyle::Italic => 2,
            FontStyle::BoldItalic => 3,
        }
    }
}

/// A rasterized glyph bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterizedGlyph {
    pub width: u32,
    pub height: u32,
    /// Pixels from the pen position to the left edge
    pub left: i32,
    /// Pixels from the baseline up to the top edge
    pub top: i32,
    /// One byte per pixel, or BGRA when `color` is set
    pub data: Vec<u8>,
    pub color: bool,
}

/// Options for a single rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterOptions {
    /// Number of grid columns the glyph may occupy
    pub grid_width: u8,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self { grid_width: 1 }
    }
}

/// Glyph lookup and rasterization for one set of faces.
pub trait Rasterizer: Send + Sync {
    fn face_metrics(&self) -> FaceMetrics;

    /// Find the face and glyph id that renders `c` in `style`.
    fn glyph_index(&self, c: char, style: FontStyle) -> Option<(FontIndex, u32)>;

    /// Whether the glyph is a color (emoji) glyph.
    fn is_color(&self, font: FontIndex, glyph: u32) -> bool;

    fn rasterize(
        &self,
        font: FontIndex,
        glyph: u32,
        metrics: &Metrics,
        opts: RasterOptions,
    ) -> Result<RasterizedGlyph, FontError>;
}

// ============================================================================
// Block face
// ============================================================================

/// Font index used by the block face for color glyphs.
const BLOCK_COLOR_FONT: FontIndex = 4;

/// A synthetic face that draws every printable codepoint as a filled box.
///
/// Output depends only on the codepoint and cell size, which makes it
/// suitable for headless rendering and tests where no system fonts exist.
#[derive(Debug, Clone)]
pub struct BlockRasterizer {
    cell_width: u32,
    cell_height: u32,
}

impl BlockRasterizer {
    pub fn new(cell_width: u32, cell_height: u32) -> Self {
        Self {
            cell_width: cell_width.max(2),
            cell_height: cell_height.max(4),
        }
    }

    fn is_emoji(c: char) -> bool {
        matches!(c as u32, 0x1F300..=0x1FAFF | 0x2600..=0x27BF)
    }
}

impl Rasterizer for BlockRasterizer {
    fn face_metrics(&self) -> FaceMetrics {
        let h = self.cell_height as f32;
        FaceMetrics {
            cell_width: self.cell_width as f32,
            ascent: (h * 0.8).round(),
            descent: h - (h * 0.8).round(),
            line_gap: 0.0,
            underline_position: None,
            underline_thickness: None,
            strikethrough_position: None,
            strikethrough_thickness: None,
        }
    }

    fn glyph_index(&self, c: char, style: FontStyle) -> Option<(FontIndex, u32)> {
        if c.is_control() {
            return None;
        }
        if Self::is_emoji(c) {
            return Some((BLOCK_COLOR_FONT, c as u32));
        }
        Some((style.index(), c as u32))
    }

    fn is_color(&self, font: FontIndex, _glyph: u32) -> bool {
        font == BLOCK_COLOR_FONT
    }

    fn rasterize(
        &self,
        font: FontIndex,
        glyph: u32,
        metrics: &Metrics,
        opts: RasterOptions,
    ) -> Result<RasterizedGlyph, FontError> {
        // Whitespace has no ink
        if char::from_u32(glyph).is_none_or(char::is_whitespace) {
            return Err(FontError::Rasterize { font, glyph });
        }

        let width = (metrics.cell_width * opts.grid_width.max(1) as u32).saturating_sub(2);
        let ascent = metrics.cell_height - metrics.cell_baseline;
        let height = ascent.saturating_sub(1).max(1);
        let color = self.is_color(font, glyph);

        let data = if color {
            // A stable color derived from the codepoint
            let [_, r, g, b] = glyph.to_be_bytes();
            [b, g, r | 0x40, 0xff].repeat((width * height) as usize)
        } else {
            vec![0xff; (width * height) as usize]
        };

        Ok(RasterizedGlyph {
            width,
            height,
            left: 1,
            top: height as i32,
            data,
            color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_face_is_deterministic() {
        let face = BlockRasterizer::new(8, 16);
        let metrics = Metrics::calc(face.face_metrics());
        let (font, glyph) = face.glyph_index('A', FontStyle::Bold).unwrap();
        assert_eq!(font, 1);
        let a = face.rasterize(font, glyph, &metrics, RasterOptions::default()).unwrap();
        let b = face.rasterize(font, glyph, &metrics, RasterOptions::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.width, 6);
        assert!(!a.color);
    }

    #[test]
    fn test_block_face_wide_and_color() {
        let face = BlockRasterizer::new(8, 16);
        let metrics = Metrics::calc(face.face_metrics());
        let (font, glyph) = face.glyph_index('😀', FontStyle::Regular).unwrap();
        assert!(face.is_color(font, glyph));
        let g = face
            .rasterize(font, glyph, &metrics, RasterOptions { grid_width: 2 })
            .unwrap();
        assert!(g.color);
        assert_eq!(g.width, 14);
        assert_eq!(g.data.len(), (g.width * g.height * 4) as usize);
    }

    #[test]
    fn test_block_face_skips_whitespace() {
        let face = BlockRasterizer::new(8, 16);
        let metrics = Metrics::calc(face.face_metrics());
        assert!(face.rasterize(0, ' ' as u32, &metrics, RasterOptions::default()).is_err());
        assert!(face.glyph_index('\u{7}', FontStyle::Regular).is_none());
    }
}

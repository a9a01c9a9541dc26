//! Rasterization of real font files with swash, discovered through fontdb.

use std::path::Path;
use std::sync::Arc;

use fontdb::{Database, Family, Query};
use parking_lot::Mutex;
use swash::FontRef;
use swash::scale::image::Content;
use swash::scale::{Render, ScaleContext, Source, StrikeWith};
use swash::zeno::Format;

use crate::error::FontError;
use crate::metrics::{FaceMetrics, Metrics};
use crate::rasterizer::{FontIndex, FontStyle, RasterOptions, RasterizedGlyph, Rasterizer};

/// Fallback families searched after the configured faces.
pub const FALLBACK_FAMILIES: &[&str] = &[
    "JetBrains Mono",
    "DejaVu Sans Mono",
    "Menlo",
    "Consolas",
    "Noto Sans CJK JP",
    "Noto Sans Symbols 2",
    "Noto Color Emoji",
    "Apple Color Emoji",
    "Segoe UI Emoji",
];

/// Owned font bytes plus the face index within them.
#[derive(Clone)]
pub struct FontData {
    data: Arc<Vec<u8>>,
    index: usize,
}

impl std::fmt::Debug for FontData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontData")
            .field("data_len", &self.data.len())
            .field("index", &self.index)
            .finish()
    }
}

impl FontData {
    /// Validate and wrap font bytes. Returns `None` if swash cannot parse them.
    pub fn new(data: Vec<u8>, index: usize) -> Option<Self> {
        FontRef::from_index(&data, index)?;
        Some(Self {
            data: Arc::new(data),
            index,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, FontError> {
        let bytes = std::fs::read(path)?;
        Self::new(bytes, 0).ok_or_else(|| FontError::InvalidData(path.display().to_string()))
    }

    pub fn font_ref(&self) -> Option<FontRef<'_>> {
        FontRef::from_index(&self.data, self.index)
    }

    fn has_color_tables(&self) -> bool {
        self.font_ref().is_some_and(|font| {
            [b"COLR", b"CBDT", b"sbix"]
                .iter()
                .any(|tag| font.table(swash::tag_from_bytes(tag)).is_some())
        })
    }
}

/// Load a face by family name from the system database.
pub fn load_from_db(
    db: &Database,
    family: &str,
    weight: fontdb::Weight,
    style: fontdb::Style,
) -> Option<FontData> {
    let query = Query {
        families: &[Family::Name(family)],
        weight,
        style,
        ..Query::default()
    };
    let id = db.query(&query)?;
    let (bytes, index) = db.with_face_data(id, |data, index| (data.to_vec(), index as usize))?;
    FontData::new(bytes, index)
}

/// Faces rasterized with swash.
pub struct SwashRasterizer {
    /// Regular, bold, italic and bold-italic; missing styles reuse regular
    styles: [Option<FontData>; 4],
    fallbacks: Vec<FontData>,
    size_px: f32,
    context: Mutex<ScaleContext>,
}

impl std::fmt::Debug for SwashRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwashRasterizer")
            .field("size_px", &self.size_px)
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}

impl SwashRasterizer {
    pub fn new(regular: FontData, size_px: f32) -> Self {
        Self {
            styles: [Some(regular), None, None, None],
            fallbacks: Vec::new(),
            size_px,
            context: Mutex::new(ScaleContext::new()),
        }
    }

    pub fn with_style(mut self, style: FontStyle, font: FontData) -> Self {
        self.styles[style.index()] = Some(font);
        self
    }

    pub fn with_fallback(mut self, font: FontData) -> Self {
        self.fallbacks.push(font);
        self
    }

    /// Discover a family and its style variants plus fallbacks on the system.
    pub fn discover(family: Option<&str>, size_px: f32) -> Result<Self, FontError> {
        let mut db = Database::new();
        db.load_system_fonts();
        log::info!("Loaded {} system fonts", db.len());

        let primary_name = family.unwrap_or("monospace");
        let regular = family
            .and_then(|name| load_from_db(&db, name, fontdb::Weight::NORMAL, fontdb::Style::Normal))
            .or_else(|| {
                let query = Query {
                    families: &[Family::Monospace],
                    ..Query::default()
                };
                let id = db.query(&query)?;
                db.with_face_data(id, |data, index| (data.to_vec(), index as usize))
                    .and_then(|(bytes, index)| FontData::new(bytes, index))
            })
            .ok_or_else(|| FontError::NotFound(primary_name.to_string()))?;

        let mut rasterizer = Self::new(regular, size_px);
        if let Some(name) = family {
            let variants = [
                (FontStyle::Bold, fontdb::Weight::BOLD, fontdb::Style::Normal),
                (FontStyle::Italic, fontdb::Weight::NORMAL, fontdb::Style::Italic),
                (FontStyle::BoldItalic, fontdb::Weight::BOLD, fontdb::Style::Italic),
            ];
            for (style, weight, slant) in variants {
                match load_from_db(&db, name, weight, slant) {
                    Some(font) => rasterizer = rasterizer.with_style(style, font),
                    None => log::warn!("{style:?} variant of '{name}' not found, using regular"),
                }
            }
        }

        for name in FALLBACK_FAMILIES {
            if let Some(font) =
                load_from_db(&db, name, fontdb::Weight::NORMAL, fontdb::Style::Normal)
            {
                log::debug!("Added fallback font: {name}");
                rasterizer = rasterizer.with_fallback(font);
            }
        }
        Ok(rasterizer)
    }

    fn regular(&self) -> Option<&FontData> {
        self.styles[0].as_ref()
    }

    fn font(&self, index: FontIndex) -> Option<&FontData> {
        match index {
            0..=3 => self.styles[index].as_ref().or(self.regular()),
            _ => self.fallbacks.get(index - 4),
        }
    }
}

impl Rasterizer for SwashRasterizer {
    fn face_metrics(&self) -> FaceMetrics {
        let Some(font) = self.regular().and_then(FontData::font_ref) else {
            return FaceMetrics {
                cell_width: self.size_px * 0.6,
                ascent: self.size_px * 0.8,
                descent: self.size_px * 0.2,
                line_gap: 0.0,
                underline_position: None,
                underline_thickness: None,
                strikethrough_position: None,
                strikethrough_thickness: None,
            };
        };

        let m = font.metrics(&[]).scale(self.size_px);
        let glyph_metrics = font.glyph_metrics(&[]).scale(self.size_px);
        let advance = glyph_metrics.advance_width(font.charmap().map('M'));
        FaceMetrics {
            cell_width: if advance > 0.0 { advance } else { m.average_width },
            ascent: m.ascent,
            descent: m.descent,
            line_gap: m.leading,
            underline_position: Some(-m.underline_offset),
            underline_thickness: Some(m.stroke_size),
            strikethrough_position: Some(m.strikeout_offset),
            strikethrough_thickness: Some(m.stroke_size),
        }
    }

    fn glyph_index(&self, c: char, style: FontStyle) -> Option<(FontIndex, u32)> {
        let styled = style.index();
        let candidates = std::iter::once(styled)
            .chain((styled != 0).then_some(0))
            .chain(4..4 + self.fallbacks.len());
        for index in candidates {
            let Some(font) = self.font(index).and_then(FontData::font_ref) else {
                continue;
            };
            let glyph = font.charmap().map(c);
            if glyph != 0 {
                return Some((index, glyph as u32));
            }
        }
        log::debug!("Character '{c}' (U+{:04X}) not found in any font", c as u32);
        None
    }

    fn is_color(&self, font: FontIndex, _glyph: u32) -> bool {
        self.font(font).is_some_and(FontData::has_color_tables)
    }

    fn rasterize(
        &self,
        font: FontIndex,
        glyph: u32,
        _metrics: &Metrics,
        _opts: RasterOptions,
    ) -> Result<RasterizedGlyph, FontError> {
        let err = || FontError::Rasterize { font, glyph };
        let font_ref = self.font(font).and_then(FontData::font_ref).ok_or_else(err)?;
        let glyph_id = u16::try_from(glyph).map_err(|_| err())?;

        let mut context = self.context.lock();
        let mut scaler = context.builder(font_ref).size(self.size_px).hint(true).build();
        let image = Render::new(&[
            Source::ColorBitmap(StrikeWith::BestFit),
            Source::ColorOutline(0),
            Source::Outline,
        ])
        .format(Format::Alpha)
        .render(&mut scaler, glyph_id)
        .ok_or_else(err)?;

        if image.placement.width == 0 || image.placement.height == 0 {
            return Err(err());
        }

        let (data, color) = match image.content {
            Content::Mask => (image.data, false),
            Content::Color => {
                // RGBA -> BGRA
                let mut data = image.data;
                for px in data.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                (data, true)
            }
            Content::SubpixelMask => {
                let data = image
                    .data
                    .chunks_exact(4)
                    .map(|px| ((px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000) as u8)
                    .collect();
                (data, false)
            }
        };

        Ok(RasterizedGlyph {
            width: image.placement.width,
            height: image.placement.height,
            left: image.placement.left,
            top: image.placement.top,
            data,
            color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_data_rejects_garbage() {
        assert!(FontData::new(vec![0u8; 100], 0).is_none());
        assert!(FontData::new(Vec::new(), 0).is_none());
    }

    #[test]
    fn test_font_data_missing_path_is_io_error() {
        let result = FontData::from_path(Path::new("/nonexistent/font.ttf"));
        assert!(matches!(result, Err(FontError::Io(_))));
    }
}

//! Kitty graphics protocol image storage.
//!
//! Holds transmitted images and their placements. The storage carries its
//! own dirty flag which the renderer inspects to decide whether placements
//! need to be rebuilt.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cell::Cell;
use crate::color::Color;

/// Pixel layout of transmitted image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KittyFormat {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl KittyFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            KittyFormat::Gray => 1,
            KittyFormat::GrayAlpha => 2,
            KittyFormat::Rgb => 3,
            KittyFormat::Rgba => 4,
        }
    }
}

/// A decoded, transmitted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KittyImage {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub format: KittyFormat,
    pub data: Arc<[u8]>,
    /// Bumped on every retransmission of the same id
    pub generation: u64,
}

/// Where a placement is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementLocation {
    /// Anchored to an absolute grid row (scrollback-inclusive) and column
    Pin { row: u64, col: u16 },
    /// Drawn wherever Unicode placeholder cells reference it
    Virtual,
}

/// One placement of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KittyPlacement {
    pub location: PlacementLocation,
    /// Sub-cell pixel offset
    pub x_offset: u32,
    pub y_offset: u32,
    /// Source rectangle; a zero width/height means "to the image edge"
    pub source_x: u32,
    pub source_y: u32,
    pub source_width: u32,
    pub source_height: u32,
    /// Grid size of the placement; zero means "derive from image size"
    pub columns: u32,
    pub rows: u32,
    pub z: i32,
}

impl KittyPlacement {
    pub fn pinned(row: u64, col: u16) -> Self {
        Self {
            location: PlacementLocation::Pin { row, col },
            x_offset: 0,
            y_offset: 0,
            source_x: 0,
            source_y: 0,
            source_width: 0,
            source_height: 0,
            columns: 0,
            rows: 0,
            z: 0,
        }
    }

    pub fn virtual_grid(columns: u32, rows: u32) -> Self {
        Self {
            location: PlacementLocation::Virtual,
            columns,
            rows,
            ..Self::pinned(0, 0)
        }
    }

    pub fn with_z(mut self, z: i32) -> Self {
        self.z = z;
        self
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.location, PlacementLocation::Virtual)
    }
}

/// Key of a placement: (image id, placement id).
pub type PlacementKey = (u32, u32);

/// Images and placements for one screen.
#[derive(Debug, Default, Clone)]
pub struct ImageStorage {
    images: HashMap<u32, KittyImage>,
    placements: HashMap<PlacementKey, KittyPlacement>,
    /// Set on any change to images or placements
    pub dirty: bool,
    generation: u64,
}

impl ImageStorage {
    /// Store (or replace) an image.
    pub fn add_image(
        &mut self,
        id: u32,
        width: u32,
        height: u32,
        format: KittyFormat,
        data: impl Into<Arc<[u8]>>,
    ) {
        self.generation += 1;
        let data = data.into();
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * format.bytes_per_pixel()
        );
        self.images.insert(
            id,
            KittyImage {
                id,
                width,
                height,
                format,
                data,
                generation: self.generation,
            },
        );
        self.dirty = true;
    }

    /// Delete an image and all its placements.
    pub fn delete_image(&mut self, id: u32) {
        if self.images.remove(&id).is_some() {
            self.placements.retain(|(image_id, _), _| *image_id != id);
            self.dirty = true;
        }
    }

    /// Add or move a placement. Returns false if the image does not exist.
    pub fn place(&mut self, image_id: u32, placement_id: u32, placement: KittyPlacement) -> bool {
        if !self.images.contains_key(&image_id) {
            log::warn!("kitty placement references unknown image id={image_id}");
            return false;
        }
        self.placements.insert((image_id, placement_id), placement);
        self.dirty = true;
        true
    }

    pub fn delete_placement(&mut self, image_id: u32, placement_id: u32) {
        if self.placements.remove(&(image_id, placement_id)).is_some() {
            self.dirty = true;
        }
    }

    pub fn image(&self, id: u32) -> Option<&KittyImage> {
        self.images.get(&id)
    }

    pub fn images(&self) -> impl Iterator<Item = &KittyImage> {
        self.images.values()
    }

    pub fn placements(&self) -> impl Iterator<Item = (&PlacementKey, &KittyPlacement)> {
        self.placements.iter()
    }

    pub fn placement(&self, image_id: u32, placement_id: u32) -> Option<&KittyPlacement> {
        self.placements.get(&(image_id, placement_id))
    }

    /// Whether any placement uses Unicode placeholder addressing.
    pub fn has_virtual_placements(&self) -> bool {
        self.placements.values().any(KittyPlacement::is_virtual)
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

// ============================================================================
// Unicode placeholders
// ============================================================================

/// Codepoint of a Kitty Unicode placeholder cell.
pub const PLACEHOLDER: char = '\u{10EEEE}';

/// Row/column diacritics, in index order.
const DIACRITICS: &[char] = &[
    '\u{0305}', '\u{030D}', '\u{030E}', '\u{0310}', '\u{0312}', '\u{033D}', '\u{033E}',
    '\u{033F}', '\u{0346}', '\u{034A}', '\u{034B}', '\u{034C}', '\u{0350}', '\u{0351}',
    '\u{0352}', '\u{0357}', '\u{035B}', '\u{0363}', '\u{0364}', '\u{0365}', '\u{0366}',
    '\u{0367}', '\u{0368}', '\u{0369}', '\u{036A}', '\u{036B}', '\u{036C}', '\u{036D}',
    '\u{036E}', '\u{036F}', '\u{0483}', '\u{0484}', '\u{0485}', '\u{0486}', '\u{0487}',
    '\u{0592}', '\u{0593}', '\u{0594}', '\u{0595}', '\u{0597}', '\u{0598}', '\u{0599}',
    '\u{059C}', '\u{059D}', '\u{059E}', '\u{059F}', '\u{05A0}', '\u{05A1}', '\u{05A8}',
    '\u{05A9}', '\u{05AB}', '\u{05AC}', '\u{05AF}', '\u{05C4}', '\u{0610}', '\u{0611}',
    '\u{0612}', '\u{0613}', '\u{0614}', '\u{0615}', '\u{0616}', '\u{0617}', '\u{0657}',
    '\u{0658}', '\u{0659}', '\u{065A}', '\u{065B}', '\u{065D}', '\u{065E}', '\u{06D6}',
    '\u{06D7}', '\u{06D8}', '\u{06D9}', '\u{06DA}', '\u{06DB}', '\u{06DC}', '\u{06DF}',
    '\u{06E0}', '\u{06E1}', '\u{06E2}', '\u{06E4}', '\u{06E7}', '\u{06E8}', '\u{06EB}',
    '\u{06EC}', '\u{0730}', '\u{0732}', '\u{0733}', '\u{0735}', '\u{0736}', '\u{073A}',
    '\u{073D}', '\u{073F}', '\u{0740}', '\u{0741}', '\u{0743}', '\u{0745}', '\u{0747}',
    '\u{0749}', '\u{074A}',
];

fn diacritic_index(c: char) -> Option<u32> {
    DIACRITICS.iter().position(|d| *d == c).map(|i| i as u32)
}

/// Diacritic encoding `index`, if the table covers it.
pub fn diacritic(index: u32) -> Option<char> {
    DIACRITICS.get(index as usize).copied()
}

/// Decoded contents of a placeholder cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub image_id: u32,
    pub placement_id: u32,
    /// Row within the placement grid, if encoded
    pub row: Option<u32>,
    /// Column within the placement grid, if encoded
    pub col: Option<u32>,
}

fn color_id(color: Color) -> u32 {
    match color {
        Color::Default => 0,
        Color::Palette(i) => i as u32,
        Color::Rgb(rgb) => ((rgb.r as u32) << 16) | ((rgb.g as u32) << 8) | rgb.b as u32,
    }
}

impl Placeholder {
    /// Decode a cell, returning `None` if it is not a placeholder.
    ///
    /// The image id's low 24 bits come from the foreground color and its high
    /// byte from the optional third diacritic; the placement id comes from the
    /// underline color.
    pub fn decode(cell: &Cell) -> Option<Self> {
        if cell.codepoint != PLACEHOLDER {
            return None;
        }
        let mut diacritics = cell.extra.iter().filter_map(|c| diacritic_index(*c));
        let row = diacritics.next();
        let col = diacritics.next();
        let high = diacritics.next().unwrap_or(0);
        Some(Self {
            image_id: (high << 24) | color_id(cell.style.fg),
            placement_id: color_id(cell.style.underline_color),
            row,
            col,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Style;
    use crate::color::Rgb;

    #[test]
    fn test_placement_requires_image() {
        let mut storage = ImageStorage::default();
        assert!(!storage.place(1, 0, KittyPlacement::pinned(0, 0)));
        assert!(!storage.dirty);

        storage.add_image(1, 1, 1, KittyFormat::Rgba, vec![0u8; 4]);
        assert!(storage.place(1, 0, KittyPlacement::pinned(0, 0)));
        assert!(storage.dirty);
    }

    #[test]
    fn test_delete_image_drops_placements() {
        let mut storage = ImageStorage::default();
        storage.add_image(7, 1, 1, KittyFormat::Gray, vec![0u8; 1]);
        storage.place(7, 1, KittyPlacement::pinned(0, 0));
        storage.place(7, 2, KittyPlacement::virtual_grid(2, 2));
        assert!(storage.has_virtual_placements());

        storage.delete_image(7);
        assert_eq!(storage.placements().count(), 0);
        assert!(!storage.has_virtual_placements());
    }

    #[test]
    fn test_placeholder_decode() {
        let mut cell = Cell::styled(
            PLACEHOLDER,
            Style {
                fg: Color::Rgb(Rgb::new(0, 1, 2)),
                underline_color: Color::Palette(5),
                ..Default::default()
            },
        );
        cell.extra = vec![diacritic(3).unwrap(), diacritic(4).unwrap()];

        let p = Placeholder::decode(&cell).expect("placeholder");
        assert_eq!(p.image_id, 0x000102);
        assert_eq!(p.placement_id, 5);
        assert_eq!(p.row, Some(3));
        assert_eq!(p.col, Some(4));

        assert!(Placeholder::decode(&Cell::new('a')).is_none());
    }
}

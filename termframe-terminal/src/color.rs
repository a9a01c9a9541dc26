//! Colors, the 256-color palette, and luminance helpers.

/// A 24-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_array(rgb: [u8; 3]) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2])
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// RGBA with the given alpha.
    pub fn with_alpha(self, a: u8) -> [u8; 4] {
        [self.r, self.g, self.b, a]
    }

    /// Relative luminance per WCAG 2.0.
    pub fn luminance(self) -> f64 {
        fn channel(c: u8) -> f64 {
            let c = c as f64 / 255.0;
            if c <= 0.03928 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.2126 * channel(self.r) + 0.7152 * channel(self.g) + 0.0722 * channel(self.b)
    }

    /// Perceived luminance, used for quick "is this dark" decisions.
    pub fn perceived_luminance(self) -> f64 {
        (0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64) / 255.0
    }

    /// WCAG contrast ratio between two colors (1.0-21.0).
    pub fn contrast(self, other: Rgb) -> f64 {
        let l1 = self.luminance();
        let l2 = other.luminance();
        let (hi, lo) = if l1 > l2 { (l1, l2) } else { (l2, l1) };
        (hi + 0.05) / (lo + 0.05)
    }
}

/// A cell color as set by SGR sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    /// The terminal's default foreground or background
    #[default]
    Default,
    /// Index into the 256-color palette
    Palette(u8),
    /// 24-bit direct color
    Rgb(Rgb),
}

impl Color {
    /// Resolve against a palette. `Default` resolves to `None` so callers can
    /// substitute the appropriate default color for the slot.
    pub fn resolve(self, palette: &Palette) -> Option<Rgb> {
        match self {
            Color::Default => None,
            Color::Palette(i) => Some(palette[i]),
            Color::Rgb(rgb) => Some(rgb),
        }
    }
}

/// The 256-color palette.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette([Rgb; 256]);

impl Default for Palette {
    fn default() -> Self {
        let mut colors = [Rgb::default(); 256];
        for (i, slot) in colors.iter_mut().enumerate() {
            *slot = xterm_color(i as u8);
        }
        Self(colors)
    }
}

impl std::ops::Index<u8> for Palette {
    type Output = Rgb;

    fn index(&self, index: u8) -> &Rgb {
        &self.0[index as usize]
    }
}

impl std::ops::IndexMut<u8> for Palette {
    fn index_mut(&mut self, index: u8) -> &mut Rgb {
        &mut self.0[index as usize]
    }
}

impl Palette {
    pub fn iter(&self) -> impl Iterator<Item = &Rgb> {
        self.0.iter()
    }
}

/// Standard xterm color for a palette index.
fn xterm_color(index: u8) -> Rgb {
    const BASE: [Rgb; 16] = [
        Rgb::new(0x1d, 0x1f, 0x21),
        Rgb::new(0xcc, 0x66, 0x66),
        Rgb::new(0xb5, 0xbd, 0x68),
        Rgb::new(0xf0, 0xc6, 0x74),
        Rgb::new(0x81, 0xa2, 0xbe),
        Rgb::new(0xb2, 0x94, 0xbb),
        Rgb::new(0x8a, 0xbe, 0xb7),
        Rgb::new(0xc5, 0xc8, 0xc6),
        Rgb::new(0x66, 0x66, 0x66),
        Rgb::new(0xd5, 0x4e, 0x53),
        Rgb::new(0xb9, 0xca, 0x4a),
        Rgb::new(0xe7, 0xc5, 0x47),
        Rgb::new(0x7a, 0xa6, 0xda),
        Rgb::new(0xc3, 0x97, 0xd8),
        Rgb::new(0x70, 0xc0, 0xb1),
        Rgb::new(0xea, 0xea, 0xea),
    ];

    match index {
        0..=15 => BASE[index as usize],
        16..=231 => {
            let idx = index - 16;
            let level = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
            Rgb::new(level(idx / 36), level((idx % 36) / 6), level(idx % 6))
        }
        232..=255 => {
            let gray = 8 + (index - 232) * 10;
            Rgb::new(gray, gray, gray)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_cube_and_grays() {
        let palette = Palette::default();
        assert_eq!(palette[16], Rgb::new(0, 0, 0));
        assert_eq!(palette[231], Rgb::new(255, 255, 255));
        assert_eq!(palette[232], Rgb::new(8, 8, 8));
        assert_eq!(palette[255], Rgb::new(238, 238, 238));
    }

    #[test]
    fn test_contrast_bounds() {
        let black = Rgb::new(0, 0, 0);
        let white = Rgb::new(255, 255, 255);
        assert!((black.contrast(white) - 21.0).abs() < 0.01);
        assert!((white.contrast(white) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resolve_default_is_none() {
        let palette = Palette::default();
        assert_eq!(Color::Default.resolve(&palette), None);
        assert_eq!(Color::Palette(1).resolve(&palette), Some(palette[1]));
    }
}

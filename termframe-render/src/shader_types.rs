//! Plain-old-data types shared with the shaders.
//!
//! Layouts must match the WGSL structs in `src/shaders/`. Every type is
//! `#[repr(C)]` and `Pod` so it can be uploaded with `bytemuck::cast_slice`.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

/// Background color of one grid cell (RGBA).
pub type CellBg = [u8; 4];

bitflags! {
    /// Boolean uniforms packed into [`Uniforms::flags`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UniformFlags: u32 {
        /// The cursor covers two cells
        const CURSOR_WIDE = 1 << 0;
        /// Colors are specified in Display P3
        const DISPLAY_P3 = 1 << 1;
        /// Blend in linear space
        const LINEAR_BLENDING = 1 << 2;
        /// Correct glyph weight when blending linearly
        const LINEAR_CORRECTION = 1 << 3;
        const PADDING_EXTEND_LEFT = 1 << 4;
        const PADDING_EXTEND_RIGHT = 1 << 5;
        const PADDING_EXTEND_UP = 1 << 6;
        const PADDING_EXTEND_DOWN = 1 << 7;
    }
}

impl UniformFlags {
    pub const PADDING_EXTEND_ALL: UniformFlags = UniformFlags::PADDING_EXTEND_LEFT
        .union(UniformFlags::PADDING_EXTEND_RIGHT)
        .union(UniformFlags::PADDING_EXTEND_UP)
        .union(UniformFlags::PADDING_EXTEND_DOWN);
}

/// Per-frame uniform block (128 bytes, WGSL `Uniforms`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
    /// Orthographic projection from pixels to clip space
    pub projection: [[f32; 4]; 4],
    /// Padding around the grid: top, right, bottom, left
    pub grid_padding: [f32; 4],
    pub screen_size: [f32; 2],
    pub cell_size: [f32; 2],
    /// Columns, rows
    pub grid_size: [u32; 2],
    /// Cursor column and viewport row
    pub cursor_pos: [u32; 2],
    /// Packed RGBA
    pub bg_color: u32,
    /// Packed RGBA, applied to the glyph under a block cursor
    pub cursor_color: u32,
    pub min_contrast: f32,
    pub flags: u32,
}

impl Default for Uniforms {
    fn default() -> Self {
        Self {
            projection: ortho(1.0, 1.0),
            grid_padding: [0.0; 4],
            screen_size: [1.0, 1.0],
            cell_size: [1.0, 1.0],
            grid_size: [0, 0],
            cursor_pos: [u32::MAX, u32::MAX],
            bg_color: 0,
            cursor_color: 0,
            min_contrast: 1.0,
            flags: 0,
        }
    }
}

impl Uniforms {
    pub fn flags(&self) -> UniformFlags {
        UniformFlags::from_bits_truncate(self.flags)
    }

    pub fn set_flag(&mut self, flag: UniformFlags, enabled: bool) {
        let mut flags = self.flags();
        flags.set(flag, enabled);
        self.flags = flags.bits();
    }
}

/// Pack RGBA bytes the way WGSL `unpack4x8unorm` reads them.
pub fn pack_rgba(rgba: [u8; 4]) -> u32 {
    u32::from_le_bytes(rgba)
}

/// Orthographic projection mapping (0,0)-(width,height) with y down to clip space.
pub fn ortho(width: f32, height: f32) -> [[f32; 4]; 4] {
    let w = width.max(1.0);
    let h = height.max(1.0);
    [
        [2.0 / w, 0.0, 0.0, 0.0],
        [0.0, -2.0 / h, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [-1.0, 1.0, 0.0, 1.0],
    ]
}

/// Which atlas a [`CellText`] samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CellAtlas {
    Grayscale = 0,
    Color = 1,
}

bitflags! {
    /// Per-glyph flags in [`CellText::flags`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellTextFlags: u8 {
        /// Skip minimum-contrast adjustment (decorations, cursor)
        const NO_MIN_CONTRAST = 1 << 0;
        /// This record is the cursor itself
        const IS_CURSOR_GLYPH = 1 << 1;
    }
}

/// One foreground instance: a glyph, decoration or cursor sprite (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct CellText {
    /// Top-left in the atlas
    pub glyph_pos: [u32; 2],
    pub glyph_size: [u32; 2],
    /// Offset from the cell's left edge and from its bottom edge up to the glyph top
    pub bearings: [i16; 2],
    /// Column, viewport row
    pub grid_pos: [u16; 2],
    /// RGBA
    pub color: [u8; 4],
    /// [`CellAtlas`] as a byte
    pub atlas: u8,
    /// [`CellTextFlags`] bits
    pub flags: u8,
    /// Record kind tag for CPU-side bookkeeping, ignored by the shaders
    pub kind: u8,
    /// Columns the record covers (2 for wide glyphs)
    pub grid_width: u8,
}

impl CellText {
    pub fn atlas(&self) -> CellAtlas {
        if self.atlas == CellAtlas::Color as u8 {
            CellAtlas::Color
        } else {
            CellAtlas::Grayscale
        }
    }

    pub fn flags(&self) -> CellTextFlags {
        CellTextFlags::from_bits_truncate(self.flags)
    }

    pub fn row(&self) -> u16 {
        self.grid_pos[1]
    }
}

/// Destination of the background image (32 bytes, WGSL `BgImage`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct BgImageVertex {
    /// x, y, width, height in surface pixels
    pub dest: [f32; 4],
    pub opacity: f32,
    /// Nonzero to tile
    pub repeat: u32,
    pub _padding: [u32; 2],
}

/// One image placement instance (48 bytes, WGSL `ImageVertex`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct ImageVertex {
    /// Column, viewport row (may be negative when partly scrolled off)
    pub grid_pos: [f32; 2],
    /// Sub-cell pixel offset
    pub cell_offset: [f32; 2],
    /// Source rectangle in texels: x, y, width, height
    pub source_rect: [f32; 4],
    /// Destination size in pixels
    pub dest_size: [f32; 2],
    pub _padding: [f32; 2],
}

/// Uniforms for custom post shaders (64 bytes, Shadertoy names).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PostUniforms {
    /// width, height, pixel aspect, unused
    pub resolution: [f32; 4],
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    pub _padding: f32,
    /// xy current, zw last click
    pub mouse: [f32; 4],
    /// year, month, day, seconds since midnight
    pub date: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes_match_shaders() {
        assert_eq!(std::mem::size_of::<Uniforms>(), 128);
        assert_eq!(std::mem::size_of::<CellText>(), 32);
        assert_eq!(std::mem::size_of::<BgImageVertex>(), 32);
        assert_eq!(std::mem::size_of::<ImageVertex>(), 48);
        assert_eq!(std::mem::size_of::<PostUniforms>(), 64);
    }

    #[test]
    fn test_uniform_flags_round_trip() {
        let mut u = Uniforms::default();
        u.set_flag(UniformFlags::CURSOR_WIDE, true);
        u.set_flag(UniformFlags::PADDING_EXTEND_UP, true);
        assert!(u.flags().contains(UniformFlags::CURSOR_WIDE));
        u.set_flag(UniformFlags::CURSOR_WIDE, false);
        assert_eq!(u.flags(), UniformFlags::PADDING_EXTEND_UP);
    }

    #[test]
    fn test_ortho_maps_corners() {
        let m = ortho(200.0, 100.0);
        // (200, 100) -> (1, -1)
        let x = m[0][0] * 200.0 + m[3][0];
        let y = m[1][1] * 100.0 + m[3][1];
        assert!((x - 1.0).abs() < 1e-6);
        assert!((y + 1.0).abs() < 1e-6);
    }
}

//! Turning a terminal snapshot into cell contents.

use parking_lot::Mutex;
use termframe_config::PaddingColor;
use termframe_fonts::{
    AtlasKind, FontStyle, Glyph, RasterOptions, RunIterator, RunOptions, ShapedGlyph, Sprite,
    TextRun,
};
use termframe_terminal::{Cell, Modes, Palette, Rgb, ScreenSnapshot, Underline, Wide};

use super::{Inner, Renderer};
use crate::api::GraphicsApi;
use crate::cell_contents::Key;
use crate::config::{ConfigDirty, DerivedConfig};
use crate::cursor::{self, CursorContext, CursorStyle};
use crate::error::RenderError;
use crate::links::{self, MouseCell};
use crate::shader_types::{CellAtlas, CellText, CellTextFlags, UniformFlags, pack_rgba};
use crate::state::{Preedit, RenderState};

/// U+2588 FULL BLOCK
const FULL_BLOCK: char = '\u{2588}';

/// Powerline separators; their glyphs fill the cell edge to edge.
fn is_powerline(c: char) -> bool {
    matches!(
        c as u32,
        0xE0B0..=0xE0C8 | 0xE0CA | 0xE0CC..=0xE0D2 | 0xE0D4
    )
}

fn underline_sprite(underline: Underline) -> Option<Sprite> {
    match underline {
        Underline::None => None,
        Underline::Single => Some(Sprite::Underline),
        Underline::Double => Some(Sprite::UnderlineDouble),
        Underline::Curly => Some(Sprite::UnderlineCurly),
        Underline::Dotted => Some(Sprite::UnderlineDotted),
        Underline::Dashed => Some(Sprite::UnderlineDashed),
    }
}

fn alpha(opacity: f32) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Colors shared by every cell of a frame.
#[derive(Debug, Clone, Copy)]
struct FrameColors {
    background: Rgb,
    foreground: Rgb,
    cursor: Rgb,
    cursor_text: Rgb,
}

impl FrameColors {
    fn new(config: &DerivedConfig, snapshot: &ScreenSnapshot) -> Self {
        let mut background = snapshot.default_bg.unwrap_or(config.background);
        let mut foreground = snapshot.default_fg.unwrap_or(config.foreground);
        if snapshot.modes.contains(Modes::REVERSE_COLORS) {
            std::mem::swap(&mut background, &mut foreground);
        }
        Self {
            background,
            foreground,
            cursor: snapshot
                .cursor_color
                .or(config.cursor_color)
                .unwrap_or(foreground),
            cursor_text: config.cursor_text.unwrap_or(background),
        }
    }
}

/// Resolved colors of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellColors {
    /// `None` leaves the window background showing
    bg: Option<Rgb>,
    fg: Rgb,
    fg_alpha: u8,
}

fn cell_colors(
    cell: &Cell,
    selected: bool,
    colors: &FrameColors,
    palette: &Palette,
    config: &DerivedConfig,
) -> CellColors {
    let style = &cell.style;
    let mut fg = style.fg.resolve(palette).unwrap_or(colors.foreground);
    if style.bold
        && let Some(bold) = config.bold_color
    {
        fg = bold;
    }
    let bg = style.bg.resolve(palette);

    let (bg, fg) = if selected {
        if config.selection_invert_fg_bg {
            (Some(fg), bg.unwrap_or(colors.background))
        } else {
            (
                Some(config.selection_background.unwrap_or(colors.foreground)),
                config.selection_foreground.unwrap_or(colors.background),
            )
        }
    } else if style.inverse {
        (Some(fg), bg.unwrap_or(colors.background))
    } else {
        (bg, fg)
    };

    // A full block paints its whole cell; match the background to it
    let bg = if cell.codepoint == FULL_BLOCK && !style.invisible {
        Some(fg)
    } else {
        bg
    };

    CellColors {
        bg,
        fg,
        fg_alpha: if style.faint { config.faint_alpha } else { 255 },
    }
}

/// Whether a row must not be extended into the padding: some cell shows
/// the default background, or draws a powerline glyph.
fn never_extend(cells: &[Cell], palette: &Palette, default_bg: Rgb) -> bool {
    cells.iter().any(|cell| {
        is_powerline(cell.codepoint)
            || cell
                .style
                .bg
                .resolve(palette)
                .is_none_or(|bg| bg == default_bg)
    })
}

/// Inclusive selected column span of a row.
fn selected_span(snapshot: &ScreenSnapshot, y: u16) -> Option<(u16, u16)> {
    let first = (0..snapshot.cols).find(|&x| snapshot.is_selected(y, x))?;
    let last = (first..snapshot.cols)
        .rev()
        .find(|&x| snapshot.is_selected(y, x))?;
    Some((first, last))
}

fn cell_text(
    glyph: &Glyph,
    pos: [u16; 2],
    color: [u8; 4],
    width: u8,
    flags: CellTextFlags,
) -> CellText {
    let atlas = match glyph.atlas {
        AtlasKind::Grayscale => CellAtlas::Grayscale,
        AtlasKind::Color => CellAtlas::Color,
    };
    CellText {
        glyph_pos: [glyph.atlas_x, glyph.atlas_y],
        glyph_size: [glyph.width, glyph.height],
        bearings: [glyph.offset_x as i16, glyph.offset_y as i16],
        grid_pos: pos,
        color,
        atlas: atlas as u8,
        flags: flags.bits(),
        kind: 0,
        grid_width: width,
    }
}

impl<A: GraphicsApi> Renderer<A> {
    /// Snapshot `state` and rebuild the contents that changed.
    ///
    /// Returns `Ok(false)` without touching the contents when the frame is
    /// skipped: synchronized output is active, or the terminal does not
    /// have the renderer's grid size yet.
    pub fn update_frame(&self, state: &Mutex<RenderState>) -> Result<bool, RenderError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.apply_uniform_changes();

        let (snapshot, preedit, mouse) = {
            let mut state = state.lock();
            let state = &mut *state;
            let terminal = &mut state.terminal;
            if terminal.modes.contains(Modes::SYNCHRONIZED_OUTPUT) {
                log::trace!("synchronized output active, frame skipped");
                return Ok(false);
            }
            let grid = inner.grid_size;
            if terminal.cols() != grid.columns || terminal.rows() != grid.rows {
                log::debug!(
                    "terminal is {}x{} but the grid is {}x{}, frame skipped",
                    terminal.cols(),
                    terminal.rows(),
                    grid.columns,
                    grid.rows
                );
                return Ok(false);
            }

            let snapshot = terminal.clone_visible();
            let storage = &terminal.screen().kitty;
            if inner.needs_full_rebuild(&snapshot) || inner.images.needs_update(storage) {
                let cell = [inner.metrics.cell_width, inner.metrics.cell_height];
                inner.images.update(storage, &snapshot, cell);
            }
            terminal.clear_dirty();
            (snapshot, state.preedit.clone(), state.mouse)
        };

        inner.images.prep_for_upload();
        inner.rebuild(&snapshot, preedit.as_ref(), mouse)?;
        Ok(true)
    }
}

impl<A: GraphicsApi> Inner<A> {
    fn needs_full_rebuild(&self, snapshot: &ScreenSnapshot) -> bool {
        self.dirty.contains(ConfigDirty::FULL_REBUILD)
            || !snapshot.dirty.is_empty()
            || !snapshot.screen_dirty.is_empty()
            || self.contents.size() != self.grid_size
            || self.last_viewport_pin != Some(snapshot.viewport_pin)
    }

    fn cell_bg_alpha(&self) -> u8 {
        if self.config.background_opacity_cells {
            alpha(self.config.background_opacity)
        } else {
            255
        }
    }

    pub(super) fn rebuild(
        &mut self,
        snapshot: &ScreenSnapshot,
        preedit: Option<&Preedit>,
        mouse: Option<MouseCell>,
    ) -> Result<(), RenderError> {
        let full = self.needs_full_rebuild(snapshot);
        let uniforms_before = self.uniforms;
        let cursor_before = {
            let (before, after) = self.contents.cursor_lists();
            (before.to_vec(), after.to_vec())
        };

        if self.contents.size() != self.grid_size {
            self.contents.resize(self.grid_size)?;
        }
        let colors = FrameColors::new(&self.config, snapshot);
        let cursor_row = snapshot.cursor.viewport_y;
        let cursor_cell = cursor_row.map(|y| (snapshot.cursor.x, y));
        // Runs break at the cursor and preedit is drawn on its row, so both
        // rows change when the cursor moves
        let cursor_rows: Vec<u16> = if cursor_cell == self.last_cursor {
            Vec::new()
        } else {
            cursor_row
                .into_iter()
                .chain(self.last_cursor.map(|(_, y)| y))
                .collect()
        };

        let rows: Vec<u16> = if full {
            self.contents.reset();
            (0..self.grid_size.rows).collect()
        } else {
            let mut rows: Vec<u16> = snapshot
                .lines
                .iter()
                .enumerate()
                .filter(|(_, line)| line.dirty)
                .map(|(y, _)| y as u16)
                .chain(cursor_rows)
                .filter(|&y| y < self.grid_size.rows)
                .collect();
            rows.sort_unstable();
            rows.dedup();
            for &y in &rows {
                self.contents.clear(y);
            }
            rows
        };
        log::trace!(
            "rebuilding {} of {} rows{}",
            rows.len(),
            self.grid_size.rows,
            if full { " (full)" } else { "" }
        );

        for &y in &rows {
            self.rebuild_row(snapshot, y, &colors, mouse);
        }
        if let (Some(preedit), Some(y)) = (preedit, cursor_row)
            && rows.contains(&y)
        {
            self.add_preedit(preedit, snapshot.cursor.x, y, &colors);
        }

        self.update_padding_extend(snapshot, &rows, colors.background);
        self.rebuild_cursor(snapshot, &colors, preedit.is_some());
        self.uniforms.bg_color =
            pack_rgba(colors.background.with_alpha(alpha(self.config.background_opacity)));

        let cursor_changed = {
            let (before, after) = self.contents.cursor_lists();
            before != cursor_before.0.as_slice() || after != cursor_before.1.as_slice()
        };
        if !rows.is_empty() || cursor_changed || self.uniforms != uniforms_before {
            self.cells_rebuilt = true;
        }

        self.mouse = mouse;
        self.dirty.remove(ConfigDirty::FULL_REBUILD);
        self.last_viewport_pin = Some(snapshot.viewport_pin);
        self.last_cursor = cursor_cell;
        Ok(())
    }

    /// Shape a row, returning each glyph with its absolute column.
    fn shape_row(&self, cells: &[Cell], opts: RunOptions) -> Vec<(u16, ShapedGlyph)> {
        let runs: Vec<TextRun> = self
            .grid
            .with_grid(|grid| RunIterator::new(cells, grid.rasterizer(), opts).collect());
        let mut glyphs = Vec::with_capacity(cells.len());
        for run in &runs {
            let shaped = self.grid.shape(run, cells);
            glyphs.extend(shaped.iter().map(|g| (run.offset + g.cluster, *g)));
        }
        glyphs
    }

    fn rebuild_row(
        &mut self,
        snapshot: &ScreenSnapshot,
        y: u16,
        colors: &FrameColors,
        mouse: Option<MouseCell>,
    ) {
        let Some(line) = snapshot.lines.get(y as usize) else {
            return;
        };
        let cells = line.cells.as_slice();
        let link_ranges = links::row_links(&self.config.links, snapshot, y, mouse);
        let opts = RunOptions {
            cursor_x: (snapshot.cursor.viewport_y == Some(y)).then_some(snapshot.cursor.x),
            selection: selected_span(snapshot, y),
        };
        let shaped = self.shape_row(cells, opts);
        let bg_alpha = self.cell_bg_alpha();

        let mut next = 0;
        for (x, cell) in cells.iter().enumerate().take(self.grid_size.columns as usize) {
            let x = x as u16;
            let cc = cell_colors(
                cell,
                snapshot.is_selected(y, x),
                colors,
                &snapshot.palette,
                &self.config,
            );
            if let Some(bg) = cc.bg
                && let Some(slot) = self.contents.bg_cell_mut(y, x)
            {
                *slot = bg.with_alpha(bg_alpha);
            }

            let start = next;
            while next < shaped.len() && shaped[next].0 <= x {
                next += 1;
            }
            if matches!(cell.wide, Wide::SpacerTail | Wide::SpacerHead) || cell.style.invisible {
                continue;
            }

            let width = cell.grid_width() as u8;
            let pos = [x, y];
            let fg = cc.fg.with_alpha(cc.fg_alpha);

            let underline = match cell.style.underline {
                Underline::None if links::contains(&link_ranges, x) => Underline::Single,
                underline => underline,
            };
            if let Some(sprite) = underline_sprite(underline) {
                let color = cell
                    .style
                    .underline_color
                    .resolve(&snapshot.palette)
                    .map_or(fg, |c| c.with_alpha(cc.fg_alpha));
                self.add_sprite(Key::Underline, sprite, width, pos, color);
            }
            for (_, glyph) in &shaped[start..next] {
                self.add_glyph(glyph, width, pos, fg);
            }
            if cell.style.overline {
                self.add_sprite(Key::Overline, Sprite::Overline, width, pos, fg);
            }
            if cell.style.strikethrough {
                self.add_sprite(Key::Strikethrough, Sprite::Strikethrough, width, pos, fg);
            }
        }
    }

    fn add_glyph(&mut self, shaped: &ShapedGlyph, width: u8, pos: [u16; 2], color: [u8; 4]) {
        let opts = RasterOptions { grid_width: width };
        let glyph = match self.grid.render_glyph(shaped.font, shaped.glyph, opts) {
            Ok(glyph) => glyph,
            Err(e) => {
                log::warn!("skipping glyph at {},{}: {e}", pos[0], pos[1]);
                return;
            }
        };
        if glyph.is_empty() {
            return;
        }
        let flags = match glyph.atlas {
            AtlasKind::Color => CellTextFlags::NO_MIN_CONTRAST,
            AtlasKind::Grayscale => CellTextFlags::empty(),
        };
        let mut cell = cell_text(&glyph, pos, color, width, flags);
        cell.bearings[0] = cell.bearings[0].saturating_add(shaped.x_offset);
        cell.bearings[1] = cell.bearings[1].saturating_add(shaped.y_offset);
        self.contents.add(Key::Text, cell);
    }

    fn add_sprite(&mut self, key: Key, sprite: Sprite, width: u8, pos: [u16; 2], color: [u8; 4]) {
        match self.grid.render_sprite(sprite, width) {
            Ok(glyph) if !glyph.is_empty() => {
                let cell = cell_text(&glyph, pos, color, width, CellTextFlags::NO_MIN_CONTRAST);
                self.contents.add(key, cell);
            }
            Ok(_) => {}
            Err(e) => log::warn!("skipping {sprite:?} at {},{}: {e}", pos[0], pos[1]),
        }
    }

    /// Draw preedit text from the cursor on, clipped to the row.
    fn add_preedit(&mut self, preedit: &Preedit, x: u16, y: u16, colors: &FrameColors) {
        let columns = self.grid_size.columns;
        let bg = colors.cursor.with_alpha(255);
        let fg = colors.cursor_text.with_alpha(255);
        let mut x = x;
        for cp in &preedit.codepoints {
            let width: u16 = if cp.wide { 2 } else { 1 };
            if x + width > columns {
                break;
            }
            for col in x..x + width {
                if let Some(slot) = self.contents.bg_cell_mut(y, col) {
                    *slot = bg;
                }
            }
            let index = self
                .grid
                .with_grid(|grid| grid.rasterizer().glyph_index(cp.codepoint, FontStyle::Regular));
            if let Some((font, glyph)) = index {
                let shaped = ShapedGlyph {
                    cluster: 0,
                    font,
                    glyph,
                    x_offset: 0,
                    y_offset: 0,
                };
                self.add_glyph(&shaped, width as u8, [x, y], fg);
            }
            self.add_sprite(Key::Underline, Sprite::Underline, width as u8, [x, y], fg);
            x += width;
        }
    }

    /// Recompute which edges the cell backgrounds extend into the padding.
    fn update_padding_extend(&mut self, snapshot: &ScreenSnapshot, rows: &[u16], default_bg: Rgb) {
        match self.config.padding_color {
            PaddingColor::Background => {
                self.uniforms.set_flag(UniformFlags::PADDING_EXTEND_ALL, false);
            }
            PaddingColor::ExtendAlways => {
                self.uniforms.set_flag(UniformFlags::PADDING_EXTEND_ALL, true);
            }
            PaddingColor::Extend => {
                self.uniforms.set_flag(
                    UniformFlags::PADDING_EXTEND_LEFT | UniformFlags::PADDING_EXTEND_RIGHT,
                    true,
                );
                let last = self.grid_size.rows.saturating_sub(1);
                let extend = |y: u16| {
                    snapshot
                        .lines
                        .get(y as usize)
                        .is_some_and(|line| !never_extend(&line.cells, &snapshot.palette, default_bg))
                };
                if rows.contains(&0) {
                    self.uniforms.set_flag(UniformFlags::PADDING_EXTEND_UP, extend(0));
                }
                if rows.contains(&last) {
                    self.uniforms
                        .set_flag(UniformFlags::PADDING_EXTEND_DOWN, extend(last));
                }
            }
        }
    }

    fn rebuild_cursor(&mut self, snapshot: &ScreenSnapshot, colors: &FrameColors, preedit: bool) {
        self.uniforms.cursor_pos = [u32::MAX, u32::MAX];
        self.uniforms.cursor_color = 0;
        self.uniforms.set_flag(UniformFlags::CURSOR_WIDE, false);

        let ctx = CursorContext {
            focused: self.focused,
            blink_visible: self.blink_visible,
            preedit,
            config_blink: self.config.cursor_blink,
        };
        let (Some(style), Some(y)) = (
            cursor::style(&snapshot.cursor, &ctx),
            snapshot.cursor.viewport_y,
        ) else {
            self.contents.set_cursor(None, None);
            return;
        };

        let x = snapshot.cursor.x;
        let wide = snapshot.cursor.wide && style != CursorStyle::Bar;
        let width: u8 = if wide { 2 } else { 1 };
        let color = colors
            .cursor
            .with_alpha(alpha(self.config.cursor_opacity));
        match self.grid.render_sprite(style.sprite(), width) {
            Ok(glyph) => {
                let flags = CellTextFlags::IS_CURSOR_GLYPH | CellTextFlags::NO_MIN_CONTRAST;
                let cell = cell_text(&glyph, [x, y], color, width, flags);
                self.contents.set_cursor(Some(cell), Some(style));
            }
            Err(e) => {
                log::warn!("cursor sprite {style:?} unavailable: {e}");
                self.contents.set_cursor(None, None);
                return;
            }
        }

        if style == CursorStyle::Block {
            self.uniforms.cursor_pos = [x as u32, y as u32];
            self.uniforms.cursor_color = pack_rgba(colors.cursor_text.with_alpha(255));
            self.uniforms.set_flag(UniformFlags::CURSOR_WIDE, wide);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termframe_terminal::{Color, Point, Selection, Style, Terminal};

    fn cell(c: char, style: Style) -> Cell {
        Cell::styled(c, style)
    }

    fn frame_colors() -> FrameColors {
        FrameColors {
            background: Rgb::new(0, 0, 0),
            foreground: Rgb::new(200, 200, 200),
            cursor: Rgb::new(255, 0, 0),
            cursor_text: Rgb::new(0, 0, 0),
        }
    }

    #[test]
    fn test_inverse_and_selection_colors() {
        let config = DerivedConfig::default();
        let palette = Palette::default();
        let colors = frame_colors();
        let red = Rgb::new(255, 0, 0);
        let style = Style {
            fg: Color::Rgb(red),
            inverse: true,
            ..Default::default()
        };
        let cc = cell_colors(&cell('a', style), false, &colors, &palette, &config);
        assert_eq!(cc.bg, Some(red));
        assert_eq!(cc.fg, colors.background);

        let plain = cell('a', Style::default());
        let selected = cell_colors(&plain, true, &colors, &palette, &config);
        assert_eq!(selected.bg, Some(colors.foreground));
        assert_eq!(selected.fg, colors.background);

        let invert = DerivedConfig {
            selection_invert_fg_bg: true,
            ..Default::default()
        };
        let selected = cell_colors(&plain, true, &colors, &palette, &invert);
        assert_eq!(selected.bg, Some(colors.foreground));
        assert_eq!(selected.fg, colors.background);
    }

    #[test]
    fn test_full_block_background_matches_foreground() {
        let config = DerivedConfig::default();
        let green = Rgb::new(0, 255, 0);
        let style = Style {
            fg: Color::Rgb(green),
            ..Default::default()
        };
        let cc = cell_colors(
            &cell(FULL_BLOCK, style),
            false,
            &frame_colors(),
            &Palette::default(),
            &config,
        );
        assert_eq!(cc.bg, Some(green));
    }

    #[test]
    fn test_faint_and_bold_color() {
        let config = DerivedConfig {
            bold_color: Some(Rgb::new(1, 2, 3)),
            ..Default::default()
        };
        let style = Style {
            bold: true,
            faint: true,
            ..Default::default()
        };
        let cc = cell_colors(
            &cell('a', style),
            false,
            &frame_colors(),
            &Palette::default(),
            &config,
        );
        assert_eq!(cc.fg, Rgb::new(1, 2, 3));
        assert_eq!(cc.fg_alpha, config.faint_alpha);
    }

    #[test]
    fn test_never_extend_rows() {
        let palette = Palette::default();
        let default_bg = Rgb::new(0, 0, 0);
        let blue = Style {
            bg: Color::Rgb(Rgb::new(0, 0, 255)),
            ..Default::default()
        };
        let filled = vec![cell(' ', blue); 4];
        assert!(!never_extend(&filled, &palette, default_bg));

        let mut gap = filled.clone();
        gap[2] = Cell::default();
        assert!(never_extend(&gap, &palette, default_bg));

        let mut powerline = filled.clone();
        powerline[1].codepoint = '\u{E0B0}';
        assert!(never_extend(&powerline, &palette, default_bg));

        let same_as_default = Style {
            bg: Color::Rgb(default_bg),
            ..Default::default()
        };
        assert!(never_extend(&[cell(' ', same_as_default)], &palette, default_bg));
    }

    #[test]
    fn test_selected_span() {
        let mut term = Terminal::new(10, 2);
        term.print_str("hello");
        term.select(Selection::new(
            Point { row: 0, col: 1 },
            Point { row: 0, col: 3 },
        ));
        let snap = term.clone_visible();
        assert_eq!(selected_span(&snap, 0), Some((1, 3)));
        assert_eq!(selected_span(&snap, 1), None);
    }

    #[test]
    fn test_reverse_colors_swap_defaults() {
        let mut term = Terminal::new(4, 1);
        term.set_mode(Modes::REVERSE_COLORS, true);
        let config = DerivedConfig::default();
        let colors = FrameColors::new(&config, &term.clone_visible());
        assert_eq!(colors.background, config.foreground);
        assert_eq!(colors.foreground, config.background);
    }
}

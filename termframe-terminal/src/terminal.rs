//! The terminal: primary and alternate screens plus terminal-wide state.
//!
//! This is the state collaborator the renderer snapshots. It implements
//! only what a producer thread needs to drive the grid (printing, cursor
//! movement, scrolling, resize); escape-sequence parsing is out of scope.

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

use crate::cell::{Cell, Style, Wide};
use crate::color::{Palette, Rgb};
use crate::screen::{CursorVisualStyle, Screen, ScreenDirty, Selection};
use crate::snapshot::{CursorSnapshot, RowSnapshot, ScreenSnapshot};

/// Default number of scrollback rows kept on the primary screen.
pub const DEFAULT_SCROLLBACK: usize = 1000;

bitflags! {
    /// Terminal modes the renderer cares about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Modes: u8 {
        /// DEC mode 2026; the renderer skips frames while set
        const SYNCHRONIZED_OUTPUT = 1 << 0;
        /// DECSCNM
        const REVERSE_COLORS = 1 << 1;
        /// DECTCEM
        const CURSOR_VISIBLE = 1 << 2;
        const CURSOR_BLINKING = 1 << 3;
    }
}

impl Default for Modes {
    fn default() -> Self {
        Modes::CURSOR_VISIBLE | Modes::CURSOR_BLINKING
    }
}

bitflags! {
    /// Terminal-wide dirty state. Any of these forces a full rebuild.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TerminalDirty: u8 {
        /// Screen cleared, switched or resized
        const CLEAR = 1 << 0;
        const PALETTE = 1 << 1;
        const REVERSE_COLORS = 1 << 2;
        const PREEDIT = 1 << 3;
    }
}

/// Which screen is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenKind {
    #[default]
    Primary,
    Alternate,
}

#[derive(Debug, Clone)]
pub struct Terminal {
    cols: u16,
    rows: u16,
    primary: Screen,
    alternate: Screen,
    active: ScreenKind,
    pub modes: Modes,
    pub dirty: TerminalDirty,
    palette: Palette,
    /// OSC 10/11/12 overrides of the configured defaults
    pub default_fg: Option<Rgb>,
    pub default_bg: Option<Rgb>,
    pub cursor_color: Option<Rgb>,
    /// The foreground program is reading a password (echo off)
    pub password_input: bool,
    /// OSC 8 hyperlink applied to printed cells
    hyperlink: Option<u32>,
}

impl Terminal {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::with_scrollback(cols, rows, DEFAULT_SCROLLBACK)
    }

    pub fn with_scrollback(cols: u16, rows: u16, scrollback: usize) -> Self {
        Self {
            cols,
            rows,
            primary: Screen::new(cols, rows, scrollback),
            // The alternate screen has no scrollback
            alternate: Screen::new(cols, rows, 0),
            active: ScreenKind::Primary,
            modes: Modes::default(),
            dirty: TerminalDirty::CLEAR,
            palette: Palette::default(),
            default_fg: None,
            default_bg: None,
            cursor_color: None,
            password_input: false,
            hyperlink: None,
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn screen(&self) -> &Screen {
        match self.active {
            ScreenKind::Primary => &self.primary,
            ScreenKind::Alternate => &self.alternate,
        }
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        match self.active {
            ScreenKind::Primary => &mut self.primary,
            ScreenKind::Alternate => &mut self.alternate,
        }
    }

    pub fn active_screen(&self) -> ScreenKind {
        self.active
    }

    pub fn switch_screen(&mut self, kind: ScreenKind) {
        if self.active == kind {
            return;
        }
        self.active = kind;
        self.screen_mut().mark_all_dirty();
        self.dirty.insert(TerminalDirty::CLEAR);
    }

    pub fn set_mode(&mut self, mode: Modes, enabled: bool) {
        if mode.contains(Modes::REVERSE_COLORS) && self.modes.contains(Modes::REVERSE_COLORS) != enabled
        {
            self.dirty.insert(TerminalDirty::REVERSE_COLORS);
        }
        self.modes.set(mode, enabled);
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn set_palette_color(&mut self, index: u8, rgb: Rgb) {
        if self.palette[index] != rgb {
            self.palette[index] = rgb;
            self.dirty.insert(TerminalDirty::PALETTE);
        }
    }

    pub fn set_pen(&mut self, style: Style) {
        self.screen_mut().cursor.pen = style;
    }

    pub fn set_hyperlink(&mut self, id: Option<u32>) {
        self.hyperlink = id;
    }

    pub fn set_cursor_style(&mut self, style: CursorVisualStyle) {
        self.screen_mut().cursor.style = style;
    }

    /// Move the cursor, clamped to the active area.
    pub fn cursor_to(&mut self, x: u16, y: u16) {
        let (cols, rows) = (self.cols, self.rows);
        let cursor = &mut self.screen_mut().cursor;
        cursor.x = x.min(cols.saturating_sub(1));
        cursor.y = y.min(rows.saturating_sub(1));
        cursor.pending_wrap = false;
    }

    pub fn carriage_return(&mut self) {
        let cursor = &mut self.screen_mut().cursor;
        cursor.x = 0;
        cursor.pending_wrap = false;
    }

    /// Move down one row, scrolling the active area at the bottom.
    pub fn linefeed(&mut self) {
        let rows = self.rows;
        let screen = self.screen_mut();
        screen.cursor.pending_wrap = false;
        if screen.cursor.y + 1 >= rows {
            screen.scroll_active_up();
        } else {
            screen.cursor.y += 1;
        }
    }

    pub fn newline(&mut self) {
        self.carriage_return();
        self.linefeed();
    }

    fn wrap(&mut self) {
        let y = self.screen().cursor.y;
        self.screen_mut().active_row_mut(y).wrap = true;
        self.newline();
    }

    /// Print one character at the cursor with the current pen.
    pub fn print(&mut self, c: char) {
        if self.cols == 0 || self.rows == 0 {
            return;
        }

        let width = c.width().unwrap_or(0);
        if width == 0 {
            self.append_to_previous(c);
            return;
        }

        if self.screen().cursor.pending_wrap {
            self.wrap();
        }

        let cols = self.cols;
        if width == 2 && self.screen().cursor.x + 1 >= cols {
            if cols < 2 {
                return;
            }
            // No room for both halves: leave a spacer head and wrap
            let (x, y) = (self.screen().cursor.x, self.screen().cursor.y);
            let pen = self.screen().cursor.pen;
            let row = self.screen_mut().active_row_mut(y);
            row.cells[x as usize] = Cell {
                wide: Wide::SpacerHead,
                ..Cell::blank(pen)
            };
            self.wrap();
        }

        let hyperlink = self.hyperlink;
        let screen = self.screen_mut();
        let (x, y, pen) = (screen.cursor.x, screen.cursor.y, screen.cursor.pen);
        let row = screen.active_row_mut(y);
        row.cells[x as usize] = Cell {
            codepoint: c,
            extra: Vec::new(),
            style: pen,
            wide: if width == 2 { Wide::Wide } else { Wide::Narrow },
            hyperlink,
        };
        if width == 2 {
            row.cells[x as usize + 1] = Cell {
                wide: Wide::SpacerTail,
                hyperlink,
                ..Cell::blank(pen)
            };
        }

        let advance = width as u16;
        if x + advance >= cols {
            screen.cursor.x = cols - 1;
            screen.cursor.pending_wrap = true;
        } else {
            screen.cursor.x = x + advance;
        }
    }

    pub fn print_str(&mut self, s: &str) {
        for c in s.chars() {
            match c {
                '\n' => self.newline(),
                '\r' => self.carriage_return(),
                _ => self.print(c),
            }
        }
    }

    /// Attach a zero-width codepoint to the previously printed cell.
    fn append_to_previous(&mut self, c: char) {
        let screen = self.screen_mut();
        let (x, y) = (screen.cursor.x, screen.cursor.y);
        let target = if screen.cursor.pending_wrap {
            Some(x)
        } else {
            x.checked_sub(1)
        };
        let Some(mut target) = target else {
            return;
        };
        let row = screen.active_row_mut(y);
        if row.cells[target as usize].wide == Wide::SpacerTail && target > 0 {
            target -= 1;
        }
        let cell = &mut row.cells[target as usize];
        if cell.codepoint != '\0' {
            cell.extra.push(c);
        }
    }

    /// Overwrite a single active cell.
    pub fn set_cell(&mut self, x: u16, y: u16, cell: Cell) {
        if x >= self.cols || y >= self.rows {
            log::warn!("set_cell out of bounds: ({x}, {y})");
            return;
        }
        self.screen_mut().active_row_mut(y).cells[x as usize] = cell;
    }

    /// Clear the active area of the current screen.
    pub fn erase_display(&mut self) {
        let (cols, rows) = (self.cols, self.rows);
        let screen = self.screen_mut();
        for y in 0..rows {
            screen.active_row_mut(y).cells = vec![Cell::default(); cols as usize];
        }
        self.dirty.insert(TerminalDirty::CLEAR);
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        if cols == self.cols && rows == self.rows {
            return;
        }
        self.cols = cols;
        self.rows = rows;
        self.primary.resize(cols, rows);
        self.alternate.resize(cols, rows);
        self.dirty.insert(TerminalDirty::CLEAR);
    }

    /// Scroll the viewport (negative = towards history).
    pub fn scroll_viewport(&mut self, delta: isize) {
        self.screen_mut().scroll_viewport(delta);
    }

    pub fn scroll_viewport_bottom(&mut self) {
        self.screen_mut().scroll_viewport_bottom();
    }

    pub fn select(&mut self, selection: Selection) {
        let screen = self.screen_mut();
        screen.selection = Some(selection);
        screen.dirty.insert(ScreenDirty::SELECTION);
    }

    pub fn clear_selection(&mut self) {
        let screen = self.screen_mut();
        if screen.selection.take().is_some() {
            screen.dirty.insert(ScreenDirty::SELECTION);
        }
    }

    /// Flag that the hovered hyperlink changed so link underlines are redrawn.
    pub fn mark_hyperlink_hover(&mut self) {
        self.screen_mut().dirty.insert(ScreenDirty::HYPERLINK_HOVER);
    }

    /// Copy the visible viewport and everything the renderer reads from it.
    pub fn clone_visible(&self) -> ScreenSnapshot {
        let screen = self.screen();
        let viewport_pin = screen.viewport_pin();
        let lines = (0..self.rows)
            .map(|y| {
                let row = screen.viewport_row(y);
                RowSnapshot {
                    cells: row.cells.clone(),
                    dirty: row.dirty,
                    absolute: viewport_pin + y as u64,
                }
            })
            .collect();

        // The cursor lives in the active area; it is only on screen when
        // the viewport overlaps that row.
        let cursor = screen.cursor;
        let cursor_abs = screen.active_top() + cursor.y as u64;
        let viewport_y = cursor_abs
            .checked_sub(viewport_pin)
            .filter(|y| *y < self.rows as u64)
            .map(|y| y as u16);
        let wide = viewport_y.is_some_and(|_| {
            screen
                .active_row(cursor.y)
                .cells
                .get(cursor.x as usize)
                .is_some_and(|c| c.wide == Wide::Wide)
        });

        ScreenSnapshot {
            cols: self.cols,
            rows: self.rows,
            lines,
            cursor: CursorSnapshot {
                x: cursor.x,
                viewport_y,
                style: cursor.style,
                visible: self.modes.contains(Modes::CURSOR_VISIBLE),
                blinking: self.modes.contains(Modes::CURSOR_BLINKING),
                wide,
                password_input: self.password_input,
            },
            viewport_pin,
            selection: screen.selection,
            palette: self.palette.clone(),
            modes: self.modes,
            dirty: self.dirty,
            screen_dirty: screen.dirty,
            default_fg: self.default_fg,
            default_bg: self.default_bg,
            cursor_color: self.cursor_color,
        }
    }

    /// Reset terminal, screen and row dirty state after a snapshot.
    pub fn clear_dirty(&mut self) {
        self.dirty = TerminalDirty::empty();
        self.screen_mut().clear_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_wide_char_writes_spacer_tail() {
        let mut term = Terminal::new(10, 2);
        term.print('中');
        let row = term.screen().active_row(0);
        assert_eq!(row.cells[0].wide, Wide::Wide);
        assert_eq!(row.cells[1].wide, Wide::SpacerTail);
        assert_eq!(term.screen().cursor.x, 2);
    }

    #[test]
    fn test_wide_char_at_edge_wraps_with_spacer_head() {
        let mut term = Terminal::new(3, 2);
        term.print_str("ab");
        term.print('中');
        assert_eq!(term.screen().active_row(0).cells[2].wide, Wide::SpacerHead);
        assert!(term.screen().active_row(0).wrap);
        assert_eq!(term.screen().active_row(1).cells[0].codepoint, '中');
    }

    #[test]
    fn test_combining_mark_joins_previous_cell() {
        let mut term = Terminal::new(10, 2);
        term.print('e');
        term.print('\u{0301}');
        let cell = &term.screen().active_row(0).cells[0];
        assert_eq!(cell.extra, vec!['\u{0301}']);
        assert_eq!(term.screen().cursor.x, 1);
    }

    #[test]
    fn test_reverse_colors_marks_dirty_only_on_change() {
        let mut term = Terminal::new(4, 2);
        term.clear_dirty();
        term.set_mode(Modes::REVERSE_COLORS, false);
        assert!(term.dirty.is_empty());
        term.set_mode(Modes::REVERSE_COLORS, true);
        assert!(term.dirty.contains(TerminalDirty::REVERSE_COLORS));
    }

    #[test]
    fn test_clear_dirty_resets_rows() {
        let mut term = Terminal::new(4, 2);
        term.print('x');
        assert!(term.clone_visible().lines[0].dirty);
        term.clear_dirty();
        let snap = term.clone_visible();
        assert!(snap.lines.iter().all(|r| !r.dirty));
        assert!(snap.dirty.is_empty());
    }
}

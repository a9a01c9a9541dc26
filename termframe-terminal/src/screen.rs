//! Screens: rows of cells with scrollback, cursor, selection and images.

use std::collections::VecDeque;

use bitflags::bitflags;

use crate::cell::{Cell, Style};
use crate::kitty::ImageStorage;

/// A row of cells with its own dirty bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<Cell>,
    /// Set whenever a cell in the row changes
    pub dirty: bool,
    /// The row soft-wraps into the next row
    pub wrap: bool,
}

impl Row {
    pub fn blank(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
            dirty: true,
            wrap: false,
        }
    }

    fn resize(&mut self, cols: u16) {
        self.cells.resize(cols as usize, Cell::default());
        self.dirty = true;
    }
}

/// Cursor shape as requested by the running program (DECSCUSR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CursorVisualStyle {
    #[default]
    Block,
    BlockHollow,
    Bar,
    Underline,
}

/// Cursor position (relative to the active area) and shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub x: u16,
    pub y: u16,
    pub style: CursorVisualStyle,
    /// Style applied to newly printed cells (the "pen")
    pub pen: Style,
    pub pending_wrap: bool,
}

/// A point addressed by absolute row (scrollback-inclusive) and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    pub row: u64,
    pub col: u16,
}

/// A selection between two absolute points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: Point,
    pub end: Point,
    /// Block (rectangle) selection instead of linear
    pub rectangle: bool,
}

impl Selection {
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            start,
            end,
            rectangle: false,
        }
    }

    fn ordered(&self) -> (Point, Point) {
        if self.start <= self.end {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        }
    }

    /// Whether the cell at the absolute row/col is selected.
    pub fn contains(&self, row: u64, col: u16) -> bool {
        let (start, end) = self.ordered();
        if row < start.row || row > end.row {
            return false;
        }
        if self.rectangle {
            let (lo, hi) = if self.start.col <= self.end.col {
                (self.start.col, self.end.col)
            } else {
                (self.end.col, self.start.col)
            };
            return col >= lo && col <= hi;
        }
        match (row == start.row, row == end.row) {
            (true, true) => col >= start.col && col <= end.col,
            (true, false) => col >= start.col,
            (false, true) => col <= end.col,
            (false, false) => true,
        }
    }
}

bitflags! {
    /// Screen-level dirty state that is not tied to a specific row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ScreenDirty: u8 {
        const SELECTION = 1 << 0;
        const HYPERLINK_HOVER = 1 << 1;
    }
}

/// A screen: the active area plus scrollback.
#[derive(Debug, Clone)]
pub struct Screen {
    cols: u16,
    rows: u16,
    /// History rows followed by the `rows` active rows
    lines: VecDeque<Row>,
    /// Rows dropped from the front of history (keeps absolute indexes stable)
    dropped: u64,
    max_scrollback: usize,
    /// Rows the viewport is scrolled up from the bottom
    scroll_offset: usize,
    pub cursor: Cursor,
    pub selection: Option<Selection>,
    pub kitty: ImageStorage,
    pub dirty: ScreenDirty,
}

impl Screen {
    pub fn new(cols: u16, rows: u16, max_scrollback: usize) -> Self {
        Self {
            cols,
            rows,
            lines: (0..rows).map(|_| Row::blank(cols)).collect(),
            dropped: 0,
            max_scrollback,
            scroll_offset: 0,
            cursor: Cursor::default(),
            selection: None,
            kitty: ImageStorage::default(),
            dirty: ScreenDirty::empty(),
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    fn history_len(&self) -> usize {
        self.lines.len() - self.rows as usize
    }

    /// Absolute index of the first active row.
    pub fn active_top(&self) -> u64 {
        self.dropped + self.history_len() as u64
    }

    /// Absolute index of the first row in the viewport.
    ///
    /// Changes whenever the viewport scrolls, including when new output
    /// scrolls the active area while the viewport follows the bottom.
    pub fn viewport_pin(&self) -> u64 {
        self.active_top() - self.scroll_offset as u64
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Mutable access to an active row; marks it dirty.
    pub fn active_row_mut(&mut self, y: u16) -> &mut Row {
        assert!(y < self.rows, "row {y} out of bounds ({} rows)", self.rows);
        let idx = self.history_len() + y as usize;
        let row = &mut self.lines[idx];
        row.dirty = true;
        row
    }

    pub fn active_row(&self, y: u16) -> &Row {
        &self.lines[self.history_len() + y as usize]
    }

    /// Row `y` of the viewport.
    pub fn viewport_row(&self, y: u16) -> &Row {
        let idx = self.history_len() - self.scroll_offset + y as usize;
        &self.lines[idx]
    }

    /// Scroll the active area up by one row, pushing the top row into history.
    pub fn scroll_active_up(&mut self) {
        self.lines.push_back(Row::blank(self.cols));
        if self.scroll_offset > 0 {
            // Keep the viewport pinned on the same content
            self.scroll_offset += 1;
        }
        while self.history_len() > self.max_scrollback {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.scroll_offset = self.scroll_offset.min(self.history_len());
        // Every active row moved up one line on screen
        let start = self.history_len();
        for row in self.lines.iter_mut().skip(start) {
            row.dirty = true;
        }
    }

    /// Scroll the viewport by `delta` rows (negative = up into history).
    pub fn scroll_viewport(&mut self, delta: isize) {
        let max = self.history_len() as isize;
        let offset = (self.scroll_offset as isize - delta).clamp(0, max);
        self.scroll_offset = offset as usize;
    }

    pub fn scroll_viewport_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        if cols != self.cols {
            for row in self.lines.iter_mut() {
                row.resize(cols);
            }
            self.cols = cols;
        }

        if rows > self.rows {
            for _ in self.rows..rows {
                self.lines.push_back(Row::blank(cols));
            }
        } else if rows < self.rows {
            // Rows above the new active area become history; pull the cursor along
            let shift = self.rows - rows;
            self.cursor.y = self.cursor.y.saturating_sub(shift);
        }
        self.rows = rows;
        self.scroll_offset = 0;

        while self.history_len() > self.max_scrollback {
            self.lines.pop_front();
            self.dropped += 1;
        }

        self.cursor.x = self.cursor.x.min(cols.saturating_sub(1));
        self.cursor.y = self.cursor.y.min(rows.saturating_sub(1));
        self.cursor.pending_wrap = false;
        for row in self.lines.iter_mut() {
            row.dirty = true;
        }
    }

    /// Reset dirty bits on every row and on the screen.
    pub fn clear_dirty(&mut self) {
        for row in self.lines.iter_mut() {
            row.dirty = false;
        }
        self.dirty = ScreenDirty::empty();
        self.kitty.dirty = false;
    }

    pub fn mark_all_dirty(&mut self) {
        for row in self.lines.iter_mut() {
            row.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_selection_contains() {
        let sel = Selection::new(Point { row: 1, col: 5 }, Point { row: 3, col: 2 });
        assert!(!sel.contains(1, 4));
        assert!(sel.contains(1, 5));
        assert!(sel.contains(2, 0));
        assert!(sel.contains(3, 2));
        assert!(!sel.contains(3, 3));
        assert!(!sel.contains(4, 0));
    }

    #[test]
    fn test_rectangle_selection_contains() {
        let sel = Selection {
            start: Point { row: 3, col: 6 },
            end: Point { row: 1, col: 2 },
            rectangle: true,
        };
        assert!(sel.contains(2, 2));
        assert!(sel.contains(2, 6));
        assert!(!sel.contains(2, 7));
        assert!(!sel.contains(0, 3));
    }

    #[test]
    fn test_scrollback_keeps_pin_monotonic() {
        let mut screen = Screen::new(4, 2, 1);
        let pin0 = screen.viewport_pin();
        screen.scroll_active_up();
        screen.scroll_active_up();
        // History is capped at one row but the pin keeps counting
        assert_eq!(screen.viewport_pin(), pin0 + 2);
    }

    #[test]
    fn test_scrolled_viewport_stays_pinned() {
        let mut screen = Screen::new(4, 2, 10);
        screen.scroll_active_up();
        screen.scroll_active_up();
        screen.scroll_viewport(-1);
        let pin = screen.viewport_pin();
        screen.scroll_active_up();
        assert_eq!(screen.viewport_pin(), pin);
    }
}

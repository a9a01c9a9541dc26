//! CPU-side cell buffers rebuilt from terminal snapshots.
//!
//! Backgrounds are a flat `rows * columns` array. Foreground records are
//! kept in one list per row so a dirty row can be cleared and rewritten
//! without touching its neighbours. Two extra lists hold the cursor: the
//! first renders before every row, the last after every row.

use crate::cursor::CursorStyle;
use crate::error::RenderError;
use crate::shader_types::{CellBg, CellText};

/// Logical grid dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridSize {
    pub rows: u16,
    pub columns: u16,
}

impl GridSize {
    pub fn new(rows: u16, columns: u16) -> Self {
        Self { rows, columns }
    }

    pub fn cells(&self) -> usize {
        self.rows as usize * self.columns as usize
    }
}

/// Kind of a foreground record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Key {
    Text = 0,
    Underline = 1,
    Strikethrough = 2,
    Overline = 3,
    Cursor = 4,
}

impl Key {
    pub fn of(cell: &CellText) -> Option<Key> {
        Some(match cell.kind {
            0 => Key::Text,
            1 => Key::Underline,
            2 => Key::Strikethrough,
            3 => Key::Overline,
            4 => Key::Cursor,
            _ => return None,
        })
    }
}

/// Extra records reserved per row for decorations and combining marks.
const ROW_CAPACITY_SLACK: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contents {
    size: GridSize,
    bg_cells: Vec<CellBg>,
    /// `rows + 2` lists: cursor-before, each row, cursor-after
    fg_rows: Vec<Vec<CellText>>,
}

impl Contents {
    pub fn new(size: GridSize) -> Result<Self, RenderError> {
        let mut contents = Self::default();
        contents.resize(size)?;
        Ok(contents)
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    /// Reallocate for `size`, discarding all content.
    pub fn resize(&mut self, size: GridSize) -> Result<(), RenderError> {
        let mut bg_cells = Vec::new();
        bg_cells.try_reserve_exact(size.cells())?;
        bg_cells.resize(size.cells(), [0; 4]);

        let lists = size.rows as usize + 2;
        let mut fg_rows = Vec::new();
        fg_rows.try_reserve_exact(lists)?;
        for i in 0..lists {
            let mut row = Vec::new();
            // Cursor lists hold at most a couple of records
            if i != 0 && i != lists - 1 {
                row.try_reserve(size.columns as usize + ROW_CAPACITY_SLACK)?;
            }
            fg_rows.push(row);
        }

        self.size = size;
        self.bg_cells = bg_cells;
        self.fg_rows = fg_rows;
        Ok(())
    }

    /// Clear everything in place for a full rebuild.
    pub fn reset(&mut self) {
        self.bg_cells.fill([0; 4]);
        for row in &mut self.fg_rows {
            row.clear();
        }
    }

    /// Clear the background and foreground of row `y`.
    ///
    /// # Panics
    ///
    /// If `y` is not a row of the grid.
    pub fn clear(&mut self, y: u16) {
        assert!(
            y < self.size.rows,
            "clear row {y} out of range ({} rows)",
            self.size.rows
        );
        let cols = self.size.columns as usize;
        let start = y as usize * cols;
        self.bg_cells[start..start + cols].fill([0; 4]);
        self.fg_rows[y as usize + 1].clear();
    }

    /// Append a foreground record to the row in `cell.grid_pos`.
    pub fn add(&mut self, key: Key, mut cell: CellText) {
        let y = cell.row();
        if y >= self.size.rows {
            log::warn!("dropping {key:?} record for row {y} outside the grid");
            return;
        }
        cell.kind = key as u8;
        self.fg_rows[y as usize + 1].push(cell);
    }

    /// Place the cursor record, or remove it with `None`.
    pub fn set_cursor(&mut self, cell: Option<CellText>, style: Option<CursorStyle>) {
        let Some(last) = self.fg_rows.len().checked_sub(1) else {
            return;
        };
        self.fg_rows[0].clear();
        self.fg_rows[last].clear();

        let (Some(mut cell), Some(style)) = (cell, style) else {
            return;
        };
        cell.kind = Key::Cursor as u8;
        let slot = if style.renders_before_text() { 0 } else { last };
        self.fg_rows[slot].push(cell);
    }

    /// Background of a cell, `None` outside the grid.
    pub fn bg_cell(&self, row: u16, col: u16) -> Option<&CellBg> {
        if row >= self.size.rows || col >= self.size.columns {
            return None;
        }
        self.bg_cells
            .get(row as usize * self.size.columns as usize + col as usize)
    }

    pub fn bg_cell_mut(&mut self, row: u16, col: u16) -> Option<&mut CellBg> {
        if row >= self.size.rows || col >= self.size.columns {
            return None;
        }
        self.bg_cells
            .get_mut(row as usize * self.size.columns as usize + col as usize)
    }

    pub fn bg_cells(&self) -> &[CellBg] {
        &self.bg_cells
    }

    /// All foreground lists in draw order.
    pub fn fg_rows(&self) -> &[Vec<CellText>] {
        &self.fg_rows
    }

    /// Foreground records of grid row `y`.
    pub fn fg_row(&self, y: u16) -> &[CellText] {
        if y >= self.size.rows {
            return &[];
        }
        &self.fg_rows[y as usize + 1]
    }

    /// Records drawn before all rows, and after all rows.
    pub fn cursor_lists(&self) -> (&[CellText], &[CellText]) {
        match self.fg_rows.as_slice() {
            [first, .., last] => (first, last),
            _ => (&[], &[]),
        }
    }

    /// Total number of foreground records.
    pub fn fg_len(&self) -> usize {
        self.fg_rows.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(col: u16, row: u16, color: u8) -> CellText {
        CellText {
            grid_pos: [col, row],
            color: [color, color, color, 255],
            grid_width: 1,
            ..Default::default()
        }
    }

    fn populated() -> Contents {
        let mut c = Contents::new(GridSize::new(4, 3)).unwrap();
        for (row, color) in [(1u16, 10u8), (2, 20)] {
            for col in 0..3 {
                *c.bg_cell_mut(row, col).unwrap() = [color, 0, 0, 255];
                c.add(Key::Text, text(col, row, color));
            }
            c.add(Key::Underline, text(0, row, color));
        }
        c
    }

    #[test]
    fn test_row_isolation() {
        for (cleared, kept) in [(1u16, 2u16), (2, 1)] {
            let mut c = populated();
            let before_bg: Vec<_> = (0..3).map(|col| *c.bg_cell(kept, col).unwrap()).collect();
            let before_fg = c.fg_row(kept).to_vec();

            c.clear(cleared);

            assert!(c.fg_row(cleared).is_empty());
            assert!((0..3).all(|col| *c.bg_cell(cleared, col).unwrap() == [0; 4]));
            let after_bg: Vec<_> = (0..3).map(|col| *c.bg_cell(kept, col).unwrap()).collect();
            assert_eq!(before_bg, after_bg);
            assert_eq!(before_fg, c.fg_row(kept));
        }
    }

    #[test]
    fn test_cursor_slot_isolation() {
        for style in [
            CursorStyle::Block,
            CursorStyle::BlockHollow,
            CursorStyle::Bar,
            CursorStyle::Underline,
            CursorStyle::Lock,
        ] {
            let mut c = populated();
            c.set_cursor(Some(text(1, 1, 99)), Some(style));
            let (before, after) = c.cursor_lists();
            assert_eq!(before.len() + after.len(), 1);
            assert_eq!(before.len() == 1, style == CursorStyle::Block);

            c.set_cursor(None, None);
            let (before, after) = c.cursor_lists();
            assert!(before.is_empty() && after.is_empty());
            // Row contents are untouched
            assert_eq!(c.fg_row(1).len(), 4);
        }
    }

    #[test]
    fn test_resize_clears_everything() {
        for (rows, cols) in [(0u16, 0u16), (0, 5), (5, 0), (2, 2), (24, 80)] {
            let mut c = populated();
            c.set_cursor(Some(text(0, 0, 1)), Some(CursorStyle::Bar));
            c.resize(GridSize::new(rows, cols)).unwrap();

            assert_eq!(c.bg_cells().len(), rows as usize * cols as usize);
            assert!(c.bg_cells().iter().all(|bg| *bg == [0; 4]));
            assert_eq!(c.fg_rows().len(), rows as usize + 2);
            assert!(c.fg_rows().iter().all(Vec::is_empty));
        }
    }

    #[test]
    fn test_reset_keeps_allocation() {
        let mut c = populated();
        c.reset();
        assert_eq!(c.size(), GridSize::new(4, 3));
        assert_eq!(c.fg_len(), 0);
        assert!(c.bg_cells().iter().all(|bg| *bg == [0; 4]));
    }

    #[test]
    fn test_bg_cell_is_bounds_checked() {
        let c = populated();
        assert!(c.bg_cell(4, 0).is_none());
        assert!(c.bg_cell(0, 3).is_none());
        assert!(c.bg_cell(u16::MAX, u16::MAX).is_none());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_clear_out_of_range_panics() {
        let mut c = populated();
        c.clear(4);
    }

    #[test]
    fn test_add_tags_record_kind() {
        let mut c = populated();
        c.clear(0);
        c.add(Key::Strikethrough, text(0, 0, 1));
        assert_eq!(Key::of(&c.fg_row(0)[0]), Some(Key::Strikethrough));
    }
}

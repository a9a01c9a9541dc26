//! Owned copies of the visible screen taken under the state lock.

use crate::cell::Cell;
use crate::color::{Palette, Rgb};
use crate::screen::{CursorVisualStyle, ScreenDirty, Selection};
use crate::terminal::{Modes, TerminalDirty};

/// One viewport row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSnapshot {
    pub cells: Vec<Cell>,
    pub dirty: bool,
    /// Absolute (scrollback-inclusive) row index, for selection and images
    pub absolute: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorSnapshot {
    pub x: u16,
    /// Row within the viewport, `None` when scrolled out of view
    pub viewport_y: Option<u16>,
    pub style: CursorVisualStyle,
    pub visible: bool,
    pub blinking: bool,
    /// The cursor sits on a wide character
    pub wide: bool,
    pub password_input: bool,
}

/// Everything the renderer needs from the terminal for one frame.
#[derive(Debug, Clone)]
pub struct ScreenSnapshot {
    pub cols: u16,
    pub rows: u16,
    pub lines: Vec<RowSnapshot>,
    pub cursor: CursorSnapshot,
    /// Absolute index of the first viewport row
    pub viewport_pin: u64,
    pub selection: Option<Selection>,
    pub palette: Palette,
    pub modes: Modes,
    pub dirty: TerminalDirty,
    pub screen_dirty: ScreenDirty,
    pub default_fg: Option<Rgb>,
    pub default_bg: Option<Rgb>,
    pub cursor_color: Option<Rgb>,
}

impl ScreenSnapshot {
    /// Cell at viewport row/col, if in range.
    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        self.lines.get(row as usize)?.cells.get(col as usize)
    }

    /// Whether the viewport cell is selected.
    pub fn is_selected(&self, row: u16, col: u16) -> bool {
        let Some(sel) = &self.selection else {
            return false;
        };
        self.lines
            .get(row as usize)
            .is_some_and(|line| sel.contains(line.absolute, col))
    }
}

//! State shared between the thread that mutates the terminal and the
//! render thread.
//!
//! The render thread holds the lock only long enough to clone the visible
//! screen and reset dirty flags.

use std::sync::Arc;

use parking_lot::Mutex;
use termframe_terminal::{Terminal, TerminalDirty};
use unicode_width::UnicodeWidthChar;

use crate::config::DerivedConfig;
use crate::links::MouseCell;

/// One codepoint of input-method preedit text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreeditCodepoint {
    pub codepoint: char,
    /// Occupies two cells
    pub wide: bool,
}

/// Provisional input-method text shown at the cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preedit {
    pub codepoints: Vec<PreeditCodepoint>,
}

impl Preedit {
    pub fn new(text: &str) -> Self {
        let codepoints = text
            .chars()
            .filter_map(|c| {
                let width = c.width()?;
                (width > 0).then_some(PreeditCodepoint {
                    codepoint: c,
                    wide: width > 1,
                })
            })
            .collect();
        Self { codepoints }
    }

    pub fn is_empty(&self) -> bool {
        self.codepoints.is_empty()
    }

    /// Cells covered when drawn in full.
    pub fn width(&self) -> usize {
        self.codepoints.iter().map(|c| 1 + c.wide as usize).sum()
    }
}

/// Everything behind the state lock.
#[derive(Debug)]
pub struct RenderState {
    pub terminal: Terminal,
    pub preedit: Option<Preedit>,
    /// Viewport cell under the mouse, if the mouse is over the grid
    pub mouse: Option<MouseCell>,
}

impl RenderState {
    pub fn new(terminal: Terminal) -> Self {
        Self {
            terminal,
            preedit: None,
            mouse: None,
        }
    }

    /// Replace the preedit text. An empty preedit removes it.
    pub fn set_preedit(&mut self, preedit: Option<Preedit>) {
        let preedit = preedit.filter(|p| !p.is_empty());
        if self.preedit != preedit {
            self.preedit = preedit;
            self.terminal.dirty.insert(TerminalDirty::PREEDIT);
        }
    }

    /// Load the configured palette into the terminal. Colors a program has
    /// since changed are overwritten.
    pub fn apply_config(&mut self, config: &DerivedConfig) {
        for (i, &rgb) in config.palette.iter().enumerate() {
            self.terminal.set_palette_color(i as u8, rgb);
        }
    }

    /// Move the mouse. Hover-dependent link underlines are redrawn when the
    /// cell changes.
    pub fn set_mouse(&mut self, mouse: Option<MouseCell>) {
        if self.mouse != mouse {
            self.mouse = mouse;
            self.terminal.mark_hyperlink_hover();
        }
    }
}

pub type SharedState = Arc<Mutex<RenderState>>;

pub fn shared(terminal: Terminal) -> SharedState {
    Arc::new(Mutex::new(RenderState::new(terminal)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use termframe_terminal::ScreenDirty;

    #[test]
    fn test_preedit_widths() {
        let p = Preedit::new("a日b\u{301}");
        // The combining mark has no cell of its own
        assert_eq!(p.codepoints.len(), 3);
        assert!(p.codepoints[1].wide);
        assert_eq!(p.width(), 4);
    }

    #[test]
    fn test_set_preedit_marks_dirty_only_on_change() {
        let mut state = RenderState::new(Terminal::new(10, 2));
        state.terminal.clear_dirty();

        state.set_preedit(Some(Preedit::new("x")));
        assert!(state.terminal.dirty.contains(TerminalDirty::PREEDIT));

        state.terminal.clear_dirty();
        state.set_preedit(Some(Preedit::new("x")));
        assert!(state.terminal.dirty.is_empty());

        state.set_preedit(Some(Preedit::new("")));
        assert_eq!(state.preedit, None);
        assert!(state.terminal.dirty.contains(TerminalDirty::PREEDIT));
    }

    #[test]
    fn test_apply_config_palette() {
        let mut state = RenderState::new(Terminal::new(10, 2));
        state.terminal.clear_dirty();
        let mut config = DerivedConfig::default();
        config.palette[1] = termframe_terminal::Rgb::new(1, 2, 3);

        state.apply_config(&config);
        assert_eq!(state.terminal.palette()[1], termframe_terminal::Rgb::new(1, 2, 3));
        assert!(state.terminal.dirty.contains(TerminalDirty::PALETTE));

        state.terminal.clear_dirty();
        state.apply_config(&config);
        assert!(state.terminal.dirty.is_empty());
    }

    #[test]
    fn test_set_mouse_flags_hover() {
        let mut state = RenderState::new(Terminal::new(10, 2));
        state.terminal.clear_dirty();
        state.set_mouse(Some(MouseCell { row: 1, col: 2 }));
        assert!(
            state
                .terminal
                .screen()
                .dirty
                .contains(ScreenDirty::HYPERLINK_HOVER)
        );
    }
}

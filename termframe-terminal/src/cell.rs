//! Grid cells and their styles.

use crate::color::Color;

/// Underline kind set by SGR 4 / 4:x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Underline {
    #[default]
    None,
    Single,
    Double,
    Curly,
    Dotted,
    Dashed,
}

/// Visual attributes of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    /// Underline color (`Default` = same as foreground)
    pub underline_color: Color,
    pub underline: Underline,
    pub bold: bool,
    pub italic: bool,
    pub faint: bool,
    pub blink: bool,
    pub inverse: bool,
    pub invisible: bool,
    pub strikethrough: bool,
    pub overline: bool,
}

impl Style {
    /// True when nothing would be drawn differently from a default cell.
    pub fn is_default(&self) -> bool {
        *self == Style::default()
    }
}

/// Width class of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Wide {
    /// Single-column cell
    #[default]
    Narrow,
    /// First column of a two-column character
    Wide,
    /// Second column of a two-column character (no content of its own)
    SpacerTail,
    /// Placeholder at the end of a row when a wide char wrapped to the next row
    SpacerHead,
}

/// One grid position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Cell {
    /// Primary codepoint, `'\0'` for an empty cell
    pub codepoint: char,
    /// Additional codepoints of a grapheme cluster (combining marks, ZWJ sequences)
    pub extra: Vec<char>,
    pub style: Style,
    pub wide: Wide,
    /// OSC 8 hyperlink id
    pub hyperlink: Option<u32>,
}

impl Cell {
    pub fn new(codepoint: char) -> Self {
        Self {
            codepoint,
            ..Default::default()
        }
    }

    pub fn styled(codepoint: char, style: Style) -> Self {
        Self {
            codepoint,
            style,
            ..Default::default()
        }
    }

    /// An empty cell carrying only a background style.
    pub fn blank(style: Style) -> Self {
        Self {
            codepoint: '\0',
            style,
            ..Default::default()
        }
    }

    pub fn has_text(&self) -> bool {
        self.codepoint != '\0' && self.codepoint != ' '
    }

    pub fn has_grapheme(&self) -> bool {
        !self.extra.is_empty()
    }

    /// Number of grid columns the cell's content occupies.
    pub fn grid_width(&self) -> u16 {
        match self.wide {
            Wide::Wide => 2,
            _ => 1,
        }
    }

    /// All codepoints of the cell in order.
    pub fn codepoints(&self) -> impl Iterator<Item = char> + '_ {
        std::iter::once(self.codepoint).chain(self.extra.iter().copied())
    }
}

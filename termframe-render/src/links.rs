//! Link highlighting.
//!
//! Link rules are matched against the text of one row at a time. Matches of
//! `always` rules are underlined unconditionally, matches of `hover` rules
//! only while the mouse is over them. OSC 8 hyperlinks are underlined
//! wherever the hovered hyperlink id appears.

use std::ops::Range;

use termframe_config::LinkHighlight;
use termframe_terminal::{Cell, ScreenSnapshot, Wide};

use crate::config::Link;

/// Viewport cell under the mouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseCell {
    pub row: u16,
    pub col: u16,
}

/// Row text plus the column each char came from.
struct RowText {
    text: String,
    /// Byte offset of each char and its column
    starts: Vec<(usize, u16)>,
}

impl RowText {
    fn new(cells: &[Cell]) -> Self {
        let mut text = String::with_capacity(cells.len());
        let mut starts = Vec::with_capacity(cells.len());
        for (col, cell) in cells.iter().enumerate() {
            if cell.wide == Wide::SpacerTail {
                continue;
            }
            let col = col as u16;
            for c in cell.codepoints() {
                starts.push((text.len(), col));
                text.push(if c == '\0' { ' ' } else { c });
            }
        }
        Self { text, starts }
    }

    /// Column of the char starting at or containing `byte`.
    fn column(&self, byte: usize) -> u16 {
        let i = self.starts.partition_point(|&(start, _)| start <= byte);
        self.starts[i.saturating_sub(1)].1
    }

    /// Columns covered by the byte range.
    fn columns(&self, bytes: Range<usize>, cells: &[Cell]) -> Range<u16> {
        let start = self.column(bytes.start);
        let last = self.column(bytes.end.saturating_sub(1).max(bytes.start));
        let width = cells.get(last as usize).map_or(1, Cell::grid_width);
        start..last + width
    }
}

/// Column ranges of `row` to underline as links.
pub fn row_links(
    links: &[Link],
    snapshot: &ScreenSnapshot,
    row: u16,
    mouse: Option<MouseCell>,
) -> Vec<Range<u16>> {
    let Some(line) = snapshot.lines.get(row as usize) else {
        return Vec::new();
    };
    let cells = line.cells.as_slice();
    let mut ranges = Vec::new();

    if !links.is_empty() && !cells.is_empty() {
        let text = RowText::new(cells);
        for link in links {
            for m in link.regex.find_iter(&text.text) {
                if m.is_empty() {
                    continue;
                }
                let cols = text.columns(m.range(), cells);
                let visible = match link.highlight {
                    LinkHighlight::Always => true,
                    LinkHighlight::Hover => {
                        mouse.is_some_and(|p| p.row == row && cols.contains(&p.col))
                    }
                    LinkHighlight::Never => false,
                };
                if visible {
                    ranges.push(cols);
                }
            }
        }
    }

    if let Some(id) = hovered_hyperlink(snapshot, mouse) {
        let mut col = 0;
        while col < cells.len() {
            if cells[col].hyperlink != Some(id) {
                col += 1;
                continue;
            }
            let start = col;
            while col < cells.len() && cells[col].hyperlink == Some(id) {
                col += 1;
            }
            ranges.push(start as u16..col as u16);
        }
    }

    ranges.sort_by_key(|r| r.start);
    ranges
}

/// OSC 8 id of the cell under the mouse.
pub fn hovered_hyperlink(snapshot: &ScreenSnapshot, mouse: Option<MouseCell>) -> Option<u32> {
    let mouse = mouse?;
    snapshot.cell(mouse.row, mouse.col)?.hyperlink
}

/// Whether `col` falls in any of `ranges`.
pub fn contains(ranges: &[Range<u16>], col: u16) -> bool {
    ranges.iter().any(|r| r.contains(&col))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use termframe_terminal::Terminal;

    fn link(pattern: &str, highlight: LinkHighlight) -> Link {
        Link {
            regex: Regex::new(pattern).unwrap(),
            highlight,
        }
    }

    fn snapshot(text: &str) -> ScreenSnapshot {
        let mut term = Terminal::new(40, 2);
        term.print_str(text);
        term.clone_visible()
    }

    #[test]
    fn test_always_rule_underlines_match() {
        let snap = snapshot("see https://x.io now");
        let ranges = row_links(&[link(r"https://\S+", LinkHighlight::Always)], &snap, 0, None);
        assert_eq!(ranges, vec![4..16]);
    }

    #[test]
    fn test_hover_rule_needs_mouse_inside() {
        let snap = snapshot("a foo b");
        let links = [link("foo", LinkHighlight::Hover)];
        assert!(row_links(&links, &snap, 0, None).is_empty());
        let outside = Some(MouseCell { row: 0, col: 0 });
        assert!(row_links(&links, &snap, 0, outside).is_empty());
        let inside = Some(MouseCell { row: 0, col: 3 });
        assert_eq!(row_links(&links, &snap, 0, inside), vec![2..5]);
    }

    #[test]
    fn test_wide_chars_map_to_columns() {
        let snap = snapshot("中x foo");
        let ranges = row_links(&[link("foo", LinkHighlight::Always)], &snap, 0, None);
        // 中 takes columns 0-1, x is 2, space 3, foo 4..7
        assert_eq!(ranges, vec![4..7]);
    }

    #[test]
    fn test_osc8_hover_underlines_every_cell_of_the_link() {
        let mut term = Terminal::new(20, 1);
        term.print_str("ab");
        term.set_hyperlink(Some(7));
        term.print_str("link");
        term.set_hyperlink(None);
        term.print_str(" c");
        let snap = term.clone_visible();

        assert!(row_links(&[], &snap, 0, None).is_empty());
        let mouse = Some(MouseCell { row: 0, col: 3 });
        assert_eq!(hovered_hyperlink(&snap, mouse), Some(7));
        assert_eq!(row_links(&[], &snap, 0, mouse), vec![2..6]);
    }
}

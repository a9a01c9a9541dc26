//! Splitting rows into runs and mapping runs to positioned glyphs.

use std::hash::{DefaultHasher, Hash, Hasher};

use termframe_terminal::{Cell, Wide};

use crate::rasterizer::{FontIndex, FontStyle, Rasterizer};

/// A run of cells sharing a face and style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRun {
    /// First column of the run
    pub offset: u16,
    /// Number of columns covered
    pub cells: u16,
    pub style: FontStyle,
    pub font: FontIndex,
    /// Hash of the run contents, independent of `offset`
    pub hash: u64,
}

/// One glyph produced by shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapedGlyph {
    /// Column relative to the start of the run
    pub cluster: u16,
    pub font: FontIndex,
    pub glyph: u32,
    /// Pixel adjustment from the cell origin
    pub x_offset: i16,
    pub y_offset: i16,
}

/// Where runs must be broken besides face changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Break around the cursor so ligatures never hide it
    pub cursor_x: Option<u16>,
    /// Inclusive selected column range on this row
    pub selection: Option<(u16, u16)>,
}

/// Iterates the runs of one row.
pub struct RunIterator<'a> {
    cells: &'a [Cell],
    rasterizer: &'a dyn Rasterizer,
    opts: RunOptions,
    col: usize,
}

impl<'a> RunIterator<'a> {
    pub fn new(cells: &'a [Cell], rasterizer: &'a dyn Rasterizer, opts: RunOptions) -> Self {
        Self {
            cells,
            rasterizer,
            opts,
            col: 0,
        }
    }

    fn face(&self, cell: &Cell) -> (FontStyle, Option<FontIndex>) {
        let style = FontStyle::from_flags(cell.style.bold, cell.style.italic);
        let font = if cell.has_text() {
            self.rasterizer
                .glyph_index(cell.codepoint, style)
                .map(|(font, _)| font)
        } else {
            None
        };
        (style, font)
    }

    fn is_boundary(&self, col: u16) -> bool {
        if let Some(x) = self.opts.cursor_x
            && (col == x || col == x.saturating_add(1))
        {
            return true;
        }
        if let Some((start, end)) = self.opts.selection
            && (col == start || col == end.saturating_add(1))
        {
            return true;
        }
        false
    }
}

impl Iterator for RunIterator<'_> {
    type Item = TextRun;

    fn next(&mut self) -> Option<TextRun> {
        // Skip leading empty cells; they produce no glyphs
        while self.col < self.cells.len() {
            let cell = &self.cells[self.col];
            if cell.has_text() && !matches!(cell.wide, Wide::SpacerTail | Wide::SpacerHead) {
                break;
            }
            self.col += 1;
        }
        if self.col >= self.cells.len() {
            return None;
        }

        let start = self.col;
        let (style, font) = self.face(&self.cells[start]);
        let mut hasher = DefaultHasher::new();
        style.hash(&mut hasher);
        font.hash(&mut hasher);

        let mut end = start;
        while end < self.cells.len() {
            let cell = &self.cells[end];
            if end > start {
                if self.is_boundary(end as u16) {
                    break;
                }
                match cell.wide {
                    // Spacer tails belong to the preceding wide cell
                    Wide::SpacerTail => {
                        end += 1;
                        continue;
                    }
                    Wide::SpacerHead => break,
                    _ => {}
                }
                if !cell.has_text() || self.face(cell) != (style, font) {
                    break;
                }
            }
            ((end - start) as u16).hash(&mut hasher);
            cell.codepoint.hash(&mut hasher);
            cell.extra.hash(&mut hasher);
            cell.wide.hash(&mut hasher);
            end += 1;
        }

        self.col = end;
        Some(TextRun {
            offset: start as u16,
            cells: (end - start) as u16,
            style,
            font: font.unwrap_or(style.index()),
            hash: hasher.finish(),
        })
    }
}

/// Produce one glyph per codepoint, each positioned at its cell.
///
/// Combining codepoints share the cluster of their base cell. Codepoints
/// without a glyph in any face are dropped.
pub fn shape(run: &TextRun, cells: &[Cell], rasterizer: &dyn Rasterizer) -> Vec<ShapedGlyph> {
    let start = run.offset as usize;
    let end = (start + run.cells as usize).min(cells.len());
    let mut glyphs = Vec::with_capacity(run.cells as usize);

    for (i, cell) in cells[start..end].iter().enumerate() {
        if cell.wide == Wide::SpacerTail || !cell.has_text() {
            continue;
        }
        for c in cell.codepoints() {
            match rasterizer.glyph_index(c, run.style) {
                Some((font, glyph)) => glyphs.push(ShapedGlyph {
                    cluster: i as u16,
                    font,
                    glyph,
                    x_offset: 0,
                    y_offset: 0,
                }),
                None => log::debug!("no glyph for U+{:04X}", c as u32),
            }
        }
    }
    glyphs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rasterizer::BlockRasterizer;
    use termframe_terminal::Style;

    fn row(text: &str) -> Vec<Cell> {
        text.chars()
            .map(|c| if c == '.' { Cell::default() } else { Cell::new(c) })
            .collect()
    }

    #[test]
    fn test_runs_split_on_blank_and_style() {
        let face = BlockRasterizer::new(8, 16);
        let mut cells = row("ab.cd");
        cells[4].style = Style {
            bold: true,
            ..Default::default()
        };
        let runs: Vec<_> = RunIterator::new(&cells, &face, RunOptions::default()).collect();
        let spans: Vec<_> = runs.iter().map(|r| (r.offset, r.cells)).collect();
        assert_eq!(spans, vec![(0, 2), (3, 1), (4, 1)]);
        assert_eq!(runs[2].style, FontStyle::Bold);
    }

    #[test]
    fn test_runs_break_around_cursor() {
        let face = BlockRasterizer::new(8, 16);
        let cells = row("abcde");
        let opts = RunOptions {
            cursor_x: Some(2),
            selection: None,
        };
        let spans: Vec<_> = RunIterator::new(&cells, &face, opts)
            .map(|r| (r.offset, r.cells))
            .collect();
        assert_eq!(spans, vec![(0, 2), (2, 1), (3, 2)]);
    }

    #[test]
    fn test_hash_ignores_offset() {
        let face = BlockRasterizer::new(8, 16);
        let a = row("xy..xy");
        let runs: Vec<_> = RunIterator::new(&a, &face, RunOptions::default()).collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].hash, runs[1].hash);
    }

    #[test]
    fn test_shape_wide_and_combining() {
        let face = BlockRasterizer::new(8, 16);
        let mut cells = vec![
            Cell {
                wide: Wide::Wide,
                ..Cell::new('中')
            },
            Cell {
                wide: Wide::SpacerTail,
                ..Cell::default()
            },
            Cell::new('e'),
        ];
        cells[2].extra.push('\u{0301}');

        let runs: Vec<_> = RunIterator::new(&cells, &face, RunOptions::default()).collect();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].cells, 3);

        let glyphs = shape(&runs[0], &cells, &face);
        let clusters: Vec<_> = glyphs.iter().map(|g| g.cluster).collect();
        assert_eq!(clusters, vec![0, 2, 2]);
    }
}

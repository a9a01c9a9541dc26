//! Integration tests for termframe-fonts.

use std::thread;

use termframe_fonts::{
    AtlasKind, BlockRasterizer, FontStyle, RasterOptions, RunIterator, RunOptions, SharedGrid,
    Sprite,
};
use termframe_terminal::{Cell, Terminal};

fn grid() -> SharedGrid {
    SharedGrid::new(Box::new(BlockRasterizer::new(9, 18)))
}

#[test]
fn test_metrics_match_block_face() {
    let m = grid().metrics();
    assert_eq!(m.cell_width, 9);
    assert_eq!(m.cell_height, 18);
    assert!(m.cell_baseline > 0);
}

#[test]
fn test_shape_terminal_row() {
    let mut term = Terminal::new(20, 2);
    term.print_str("ls -la");
    let snap = term.clone_visible();
    let cells = &snap.lines[0].cells;

    let grid = grid();
    let runs: Vec<_> = grid.with_grid(|g| {
        RunIterator::new(cells, g.rasterizer(), RunOptions::default()).collect()
    });
    // "ls" and "-la" are separated by a space
    assert_eq!(runs.len(), 2);

    let glyphs: usize = runs.iter().map(|r| grid.shape(r, cells).len()).sum();
    assert_eq!(glyphs, 5);
}

#[test]
fn test_glyph_offsets_are_cell_relative() {
    let grid = grid();
    let m = grid.metrics();
    let (font, id) = grid
        .with_grid(|g| g.rasterizer().glyph_index('M', FontStyle::Regular))
        .expect("block face covers M");
    let glyph = grid.render_glyph(font, id, RasterOptions::default()).unwrap();
    assert_eq!(glyph.atlas, AtlasKind::Grayscale);
    assert!(glyph.offset_y <= m.cell_height as i32);
    assert!(glyph.offset_x >= 0);
}

#[test]
fn test_concurrent_lookups_share_cache() {
    let grid = grid();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let grid = grid.clone();
            thread::spawn(move || {
                for c in 'a'..='z' {
                    grid.render_glyph(0, c as u32, RasterOptions::default())
                        .unwrap();
                }
                grid.render_sprite(Sprite::CursorLock, 1).unwrap()
            })
        })
        .collect();

    let sprites: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(sprites.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_set_rasterizer_resets_caches() {
    let grid = grid();
    let cells: Vec<Cell> = "abc".chars().map(Cell::new).collect();
    let runs: Vec<_> = grid.with_grid(|g| {
        RunIterator::new(&cells, g.rasterizer(), RunOptions::default()).collect()
    });
    grid.shape(&runs[0], &cells);
    assert_eq!(grid.shape_cache_len(), 1);

    grid.set_rasterizer(Box::new(BlockRasterizer::new(12, 24)));
    assert_eq!(grid.shape_cache_len(), 0);
    assert_eq!(grid.metrics().cell_width, 12);
}

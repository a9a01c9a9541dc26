//! The demo scene drawn by the frame driver.
//!
//! Exercises most of what the renderer draws: palette and direct colors,
//! text attributes, underline styles, wide characters, a hyperlink, a
//! selection, a Kitty image and preedit text. Each frame appends a status
//! line so consecutive frames carry partial row updates.

use termframe_render::state::{Preedit, RenderState};
use termframe_terminal::{
    Color, KittyFormat, KittyPlacement, Point, Rgb, Selection, Style, Terminal, Underline,
};

/// Kitty image id of the demo swatch.
pub const SWATCH_IMAGE_ID: u32 = 1;
const SWATCH_SIZE: u32 = 16;

fn styled(term: &mut Terminal, style: Style, text: &str) {
    term.set_pen(style);
    term.print_str(text);
    term.set_pen(Style::default());
}

/// Checkerboard in two colors.
fn swatch_pixels() -> Vec<u8> {
    let mut data = Vec::with_capacity((SWATCH_SIZE * SWATCH_SIZE * 4) as usize);
    for y in 0..SWATCH_SIZE {
        for x in 0..SWATCH_SIZE {
            let on = (x / 4 + y / 4) % 2 == 0;
            let px = if on {
                [0xe0, 0x6c, 0x75, 0xff]
            } else {
                [0x61, 0xaf, 0xef, 0xff]
            };
            data.extend_from_slice(&px);
        }
    }
    data
}

/// Write the static part of the scene.
pub fn draw_scene(term: &mut Terminal) {
    term.erase_display();
    term.cursor_to(0, 0);

    styled(
        term,
        Style {
            bold: true,
            ..Style::default()
        },
        "termframe",
    );
    term.print_str(" demo");
    term.newline();

    for i in 0..16u8 {
        styled(
            term,
            Style {
                bg: Color::Palette(i),
                ..Style::default()
            },
            "  ",
        );
    }
    term.newline();

    let attributes = [
        ("italic", Style { italic: true, ..Style::default() }),
        ("faint", Style { faint: true, ..Style::default() }),
        ("inverse", Style { inverse: true, ..Style::default() }),
        ("strike", Style { strikethrough: true, ..Style::default() }),
        ("over", Style { overline: true, ..Style::default() }),
    ];
    for (label, style) in attributes {
        styled(term, style, label);
        term.print(' ');
    }
    term.newline();

    let underlines = [
        Underline::Single,
        Underline::Double,
        Underline::Curly,
        Underline::Dotted,
        Underline::Dashed,
    ];
    for underline in underlines {
        styled(
            term,
            Style {
                underline,
                underline_color: Color::Rgb(Rgb::new(0xe5, 0xc0, 0x7b)),
                ..Style::default()
            },
            "under",
        );
        term.print(' ');
    }
    term.newline();

    styled(
        term,
        Style {
            fg: Color::Rgb(Rgb::new(0x98, 0xc3, 0x79)),
            ..Style::default()
        },
        "wide: 日本語 ",
    );
    term.print_str("powerline: \u{e0b0} block: \u{2588}");
    term.newline();

    term.print_str("link: ");
    term.set_hyperlink(Some(1));
    term.print_str("https://example.com");
    term.set_hyperlink(None);
    term.newline();

    let top = term.screen().active_top();
    let row = top + u64::from(term.screen().cursor.y);
    term.print_str("selected text here");
    term.select(Selection::new(Point { row, col: 0 }, Point { row, col: 7 }));
    term.newline();

    let image_row = top + u64::from(term.screen().cursor.y);
    let storage = &mut term.screen_mut().kitty;
    storage.add_image(
        SWATCH_IMAGE_ID,
        SWATCH_SIZE,
        SWATCH_SIZE,
        KittyFormat::Rgba,
        swatch_pixels(),
    );
    storage.place(SWATCH_IMAGE_ID, 1, KittyPlacement::pinned(image_row, 0));
    term.newline();
    term.newline();
}

/// Per-frame changes: a status line and, on the last frame, preedit text.
pub fn advance(state: &mut RenderState, frame: u32, frames: u32) {
    let term = &mut state.terminal;
    term.carriage_return();
    term.print_str(&format!("frame {}/{frames}", frame + 1));
    if frame + 1 == frames {
        state.set_preedit(Some(Preedit::new("にほん")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_places_swatch() {
        let mut term = Terminal::new(80, 24);
        draw_scene(&mut term);
        let storage = &term.screen().kitty;
        assert!(storage.image(SWATCH_IMAGE_ID).is_some());
        assert_eq!(storage.placements().count(), 1);
        assert!(term.screen().selection.is_some());
    }

    #[test]
    fn test_advance_sets_preedit_on_last_frame() {
        let mut state = RenderState::new(Terminal::new(80, 24));
        draw_scene(&mut state.terminal);
        advance(&mut state, 0, 2);
        assert!(state.preedit.is_none());
        advance(&mut state, 1, 2);
        assert!(state.preedit.is_some());
    }
}

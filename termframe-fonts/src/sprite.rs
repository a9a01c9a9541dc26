//! Procedurally drawn decorations and cursors.
//!
//! Sprites are drawn as grayscale coverage covering whole cells so the
//! shader can position them without bearings.

use crate::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sprite {
    Underline,
    UnderlineDouble,
    UnderlineCurly,
    UnderlineDotted,
    UnderlineDashed,
    Strikethrough,
    Overline,
    CursorRect,
    CursorHollowRect,
    CursorBar,
    CursorUnderline,
    /// Padlock shown in place of the cursor during password input
    CursorLock,
}

/// A coverage canvas the size of `cells` grid cells.
struct Canvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height) as usize],
        }
    }

    fn rect(&mut self, x: u32, y: u32, w: u32, h: u32) {
        let x_end = (x + w).min(self.width);
        let y_end = (y + h).min(self.height);
        for row in y.min(self.height)..y_end {
            let start = (row * self.width) as usize;
            self.data[start + x.min(x_end) as usize..start + x_end as usize].fill(0xff);
        }
    }
}

/// Draw a sprite covering `cells` columns. Returns (width, height, coverage).
pub fn draw(sprite: Sprite, cells: u8, m: &Metrics) -> (u32, u32, Vec<u8>) {
    let width = m.cell_width * cells.max(1) as u32;
    let height = m.cell_height;
    let mut canvas = Canvas::new(width, height);
    let thick = m.underline_thickness.max(1);

    match sprite {
        Sprite::Underline => canvas.rect(0, m.underline_position, width, thick),
        Sprite::UnderlineDouble => {
            let y = m.underline_position.min(height.saturating_sub(thick * 3));
            canvas.rect(0, y, width, thick);
            canvas.rect(0, y + thick * 2, width, thick);
        }
        Sprite::UnderlineCurly => {
            // One sine period per cell
            let amplitude = (thick * 2).max(2) as f32;
            let top = m
                .underline_position
                .min(height.saturating_sub(amplitude as u32 + thick));
            let period = m.cell_width.max(1) as f32;
            for x in 0..width {
                let phase = (x as f32 / period) * std::f32::consts::TAU;
                let dy = ((phase.sin() + 1.0) / 2.0 * amplitude).round() as u32;
                canvas.rect(x, top + dy, 1, thick);
            }
        }
        Sprite::UnderlineDotted => {
            let step = (thick * 2).max(2);
            for x in (0..width).step_by(step as usize) {
                canvas.rect(x, m.underline_position, thick, thick);
            }
        }
        Sprite::UnderlineDashed => {
            let dash = (m.cell_width / 3).max(1);
            for x in (0..width).step_by((dash * 2) as usize) {
                canvas.rect(x, m.underline_position, dash, thick);
            }
        }
        Sprite::Strikethrough => canvas.rect(
            0,
            m.strikethrough_position,
            width,
            m.strikethrough_thickness.max(1),
        ),
        Sprite::Overline => canvas.rect(0, m.overline_position, width, m.overline_thickness.max(1)),
        Sprite::CursorRect => canvas.rect(0, 0, width, height),
        Sprite::CursorHollowRect => {
            let t = m.cursor_thickness;
            canvas.rect(0, 0, width, t);
            canvas.rect(0, height.saturating_sub(t), width, t);
            canvas.rect(0, 0, t, height);
            canvas.rect(width.saturating_sub(t), 0, t, height);
        }
        Sprite::CursorBar => canvas.rect(0, 0, m.cursor_thickness, height),
        Sprite::CursorUnderline => canvas.rect(
            0,
            height.saturating_sub(m.cursor_thickness),
            width,
            m.cursor_thickness,
        ),
        Sprite::CursorLock => draw_lock(&mut canvas, m),
    }

    (canvas.width, canvas.height, canvas.data)
}

fn draw_lock(canvas: &mut Canvas, m: &Metrics) {
    let w = m.cell_width;
    let h = m.cell_height;
    let t = m.cursor_thickness.max(1);

    // Body in the lower half
    let body_x = w / 6;
    let body_w = w - body_x * 2;
    let body_y = h / 2;
    let body_h = h / 3;
    canvas.rect(body_x, body_y, body_w.max(1), body_h.max(1));

    // Shackle above it
    let sh_x = w / 4;
    let sh_w = w - sh_x * 2;
    let sh_y = h / 4;
    canvas.rect(sh_x, sh_y, sh_w.max(1), t);
    canvas.rect(sh_x, sh_y, t, body_y - sh_y);
    canvas.rect((sh_x + sh_w).saturating_sub(t), sh_y, t, body_y - sh_y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::FaceMetrics;

    fn metrics() -> Metrics {
        Metrics::calc(FaceMetrics {
            cell_width: 10.0,
            ascent: 16.0,
            descent: 4.0,
            line_gap: 0.0,
            underline_position: None,
            underline_thickness: None,
            strikethrough_position: None,
            strikethrough_thickness: None,
        })
    }

    fn row_has_ink(data: &[u8], width: u32, y: u32) -> bool {
        let start = (y * width) as usize;
        data[start..start + width as usize].iter().any(|&p| p > 0)
    }

    #[test]
    fn test_underline_sits_at_metric_position() {
        let m = metrics();
        let (w, h, data) = draw(Sprite::Underline, 1, &m);
        assert_eq!((w, h), (m.cell_width, m.cell_height));
        assert!(row_has_ink(&data, w, m.underline_position));
        assert!(!row_has_ink(&data, w, 0));
    }

    #[test]
    fn test_wide_sprite_spans_cells() {
        let m = metrics();
        let (w, _, data) = draw(Sprite::Strikethrough, 2, &m);
        assert_eq!(w, m.cell_width * 2);
        let start = (m.strikethrough_position * w) as usize;
        assert!(data[start..start + w as usize].iter().all(|&p| p == 0xff));
    }

    #[test]
    fn test_every_sprite_draws_something() {
        let m = metrics();
        for sprite in [
            Sprite::Underline,
            Sprite::UnderlineDouble,
            Sprite::UnderlineCurly,
            Sprite::UnderlineDotted,
            Sprite::UnderlineDashed,
            Sprite::Strikethrough,
            Sprite::Overline,
            Sprite::CursorRect,
            Sprite::CursorHollowRect,
            Sprite::CursorBar,
            Sprite::CursorUnderline,
            Sprite::CursorLock,
        ] {
            let (_, _, data) = draw(sprite, 1, &m);
            assert!(data.iter().any(|&p| p > 0), "{sprite:?} drew nothing");
        }
    }
}

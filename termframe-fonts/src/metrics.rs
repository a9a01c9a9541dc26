//! Cell metrics derived from face metrics.

/// Raw metrics reported by a face, in pixels at the target size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMetrics {
    /// Advance of a typical monospace character
    pub cell_width: f32,
    pub ascent: f32,
    /// Positive distance below the baseline
    pub descent: f32,
    pub line_gap: f32,
    /// Distance below the baseline to the top of the underline
    pub underline_position: Option<f32>,
    pub underline_thickness: Option<f32>,
    /// Distance above the baseline to the top of the strikethrough
    pub strikethrough_position: Option<f32>,
    pub strikethrough_thickness: Option<f32>,
}

/// Integer grid metrics used for layout and decoration sprites.
///
/// Vertical positions are measured in pixels from the top of the cell,
/// except `cell_baseline` which is measured from the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Metrics {
    pub cell_width: u32,
    pub cell_height: u32,
    pub cell_baseline: u32,
    pub underline_position: u32,
    pub underline_thickness: u32,
    pub strikethrough_position: u32,
    pub strikethrough_thickness: u32,
    pub overline_position: u32,
    pub overline_thickness: u32,
    pub cursor_thickness: u32,
}

impl Metrics {
    pub fn calc(face: FaceMetrics) -> Self {
        let cell_width = face.cell_width.round().max(1.0) as u32;
        let cell_height = (face.ascent + face.descent + face.line_gap).round().max(1.0) as u32;

        // Split the line gap evenly above and below the text
        let half_gap = face.line_gap / 2.0;
        let baseline_from_top = (face.ascent + half_gap).round();
        let cell_baseline = (cell_height as f32 - baseline_from_top).max(0.0) as u32;

        let thickness_fallback = (cell_height as f32 * 0.07).round().max(1.0);
        let underline_thickness = face
            .underline_thickness
            .map_or(thickness_fallback, |t| t.round().max(1.0));
        let underline_position = face
            .underline_position
            .map_or(baseline_from_top + underline_thickness, |p| {
                baseline_from_top + p.round()
            });

        let strikethrough_thickness = face
            .strikethrough_thickness
            .map_or(underline_thickness, |t| t.round().max(1.0));
        let strikethrough_position = face.strikethrough_position.map_or(
            baseline_from_top - face.ascent * 0.3 - strikethrough_thickness / 2.0,
            |p| baseline_from_top - p.round(),
        );

        let max_y = cell_height.saturating_sub(1) as f32;
        Self {
            cell_width,
            cell_height,
            cell_baseline,
            underline_position: underline_position.clamp(0.0, max_y) as u32,
            underline_thickness: underline_thickness as u32,
            strikethrough_position: strikethrough_position.clamp(0.0, max_y) as u32,
            strikethrough_thickness: strikethrough_thickness as u32,
            overline_position: 0,
            overline_thickness: underline_thickness as u32,
            cursor_thickness: 1u32.max(cell_width / 8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face() -> FaceMetrics {
        FaceMetrics {
            cell_width: 8.4,
            ascent: 13.0,
            descent: 3.0,
            line_gap: 2.0,
            underline_position: None,
            underline_thickness: None,
            strikethrough_position: None,
            strikethrough_thickness: None,
        }
    }

    #[test]
    fn test_cell_size_rounds() {
        let m = Metrics::calc(face());
        assert_eq!(m.cell_width, 8);
        assert_eq!(m.cell_height, 18);
        assert_eq!(m.cell_baseline, 4);
    }

    #[test]
    fn test_decorations_inside_cell() {
        let m = Metrics::calc(face());
        assert!(m.underline_position + m.underline_thickness <= m.cell_height);
        assert!(m.strikethrough_position < m.underline_position);
        assert!(m.cursor_thickness >= 1);
    }
}

//! Grid geometry: how many cells fit a surface and where they sit.

use termframe_config::{AlphaBlending, WindowColorspace};
use termframe_fonts::Metrics;

use crate::cell_contents::GridSize;
use crate::config::DerivedConfig;
use crate::shader_types::{UniformFlags, Uniforms, ortho};

/// Surface size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Pixels between each surface edge and the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

fn cells_in(available: u32, cell: u32) -> u16 {
    (available / cell.max(1)).clamp(1, u16::MAX as u32) as u16
}

/// The grid that fits `screen` and its padding. The grid is never smaller
/// than one cell.
pub fn grid_for(screen: ScreenSize, metrics: &Metrics, config: &DerivedConfig) -> (GridSize, Padding) {
    let (cw, ch) = (metrics.cell_width.max(1), metrics.cell_height.max(1));
    let columns = cells_in(screen.width.saturating_sub(config.padding_x * 2), cw);
    let rows = cells_in(screen.height.saturating_sub(config.padding_y * 2), ch);

    let used_w = columns as u32 * cw;
    let used_h = rows as u32 * ch;
    let (left, top) = if config.padding_balance {
        (
            screen.width.saturating_sub(used_w) / 2,
            screen.height.saturating_sub(used_h) / 2,
        )
    } else {
        (config.padding_x, config.padding_y)
    };
    let padding = Padding {
        top,
        left,
        right: screen.width.saturating_sub(left + used_w),
        bottom: screen.height.saturating_sub(top + used_h),
    };
    (GridSize::new(rows, columns), padding)
}

/// Fill the parts of the uniform block that follow from geometry and
/// configuration. Cursor and padding-extension fields are left alone.
pub fn base_uniforms(
    uniforms: &mut Uniforms,
    screen: ScreenSize,
    padding: Padding,
    grid: GridSize,
    metrics: &Metrics,
    config: &DerivedConfig,
) {
    let (w, h) = (screen.width as f32, screen.height as f32);
    uniforms.projection = ortho(w, h);
    uniforms.screen_size = [w.max(1.0), h.max(1.0)];
    uniforms.grid_padding = [
        padding.top as f32,
        padding.right as f32,
        padding.bottom as f32,
        padding.left as f32,
    ];
    uniforms.cell_size = [metrics.cell_width as f32, metrics.cell_height as f32];
    uniforms.grid_size = [grid.columns as u32, grid.rows as u32];
    uniforms.min_contrast = config.min_contrast;
    uniforms.set_flag(
        UniformFlags::DISPLAY_P3,
        config.colorspace == WindowColorspace::DisplayP3,
    );
    uniforms.set_flag(
        UniformFlags::LINEAR_BLENDING,
        config.blending != AlphaBlending::Native,
    );
    uniforms.set_flag(
        UniformFlags::LINEAR_CORRECTION,
        config.blending == AlphaBlending::LinearCorrected,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use termframe_fonts::{BlockRasterizer, SharedGrid};

    fn metrics() -> Metrics {
        SharedGrid::new(Box::new(BlockRasterizer::new(10, 20))).metrics()
    }

    #[test]
    fn test_grid_fits_inside_padding() {
        let m = metrics();
        let config = DerivedConfig {
            padding_x: 5,
            padding_y: 5,
            padding_balance: false,
            ..Default::default()
        };
        let (grid, padding) = grid_for(ScreenSize::new(105, 70), &m, &config);
        assert_eq!(grid, GridSize::new(3, 9));
        assert_eq!(padding.left, 5);
        assert_eq!(padding.top, 5);
        assert_eq!(padding.right, 10);
        assert_eq!(padding.bottom, 5);
    }

    #[test]
    fn test_balanced_padding_centers_grid() {
        let m = metrics();
        let config = DerivedConfig {
            padding_x: 0,
            padding_y: 0,
            padding_balance: true,
            ..Default::default()
        };
        let (grid, padding) = grid_for(ScreenSize::new(105, 70), &m, &config);
        assert_eq!(grid, GridSize::new(3, 10));
        assert_eq!((padding.left, padding.right), (2, 3));
        assert_eq!((padding.top, padding.bottom), (5, 5));
    }

    #[test]
    fn test_tiny_surface_keeps_one_cell() {
        let m = metrics();
        let (grid, _) = grid_for(ScreenSize::new(3, 3), &m, &DerivedConfig::default());
        assert_eq!(grid, GridSize::new(1, 1));
    }

    #[test]
    fn test_base_uniforms_follow_config() {
        let m = metrics();
        let config = DerivedConfig {
            blending: AlphaBlending::LinearCorrected,
            colorspace: WindowColorspace::DisplayP3,
            ..Default::default()
        };
        let screen = ScreenSize::new(200, 100);
        let (grid, padding) = grid_for(screen, &m, &config);
        let mut u = Uniforms::default();
        base_uniforms(&mut u, screen, padding, grid, &m, &config);
        assert_eq!(u.cell_size, [10.0, 20.0]);
        assert_eq!(u.grid_size, [grid.columns as u32, grid.rows as u32]);
        assert!(u.flags().contains(
            UniformFlags::DISPLAY_P3 | UniformFlags::LINEAR_BLENDING | UniformFlags::LINEAR_CORRECTION
        ));
    }
}

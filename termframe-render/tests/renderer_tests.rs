//! Integration tests for the update and draw pipeline on the headless backend.

use std::sync::Arc;

use termframe_fonts::{BlockRasterizer, SharedGrid};
use termframe_render::api::PipelineKind;
use termframe_render::backend::headless::{Attachment, FrameRecord, PipelineLabel};
use termframe_render::cell_contents::Key;
use termframe_render::config::CustomShader;
use termframe_render::{
    DerivedConfig, HeadlessApi, Health, Renderer, ScreenSize, SharedState, SurfaceMessage, state,
};
use termframe_terminal::{
    Color, KittyFormat, KittyPlacement, Modes, Rgb, Style, Terminal, Underline,
};
use tokio::sync::mpsc;

const CELL_W: u32 = 10;
const CELL_H: u32 = 20;
/// Default padding on each side
const PAD: u32 = 2;

fn screen_for(columns: u32, rows: u32) -> ScreenSize {
    ScreenSize::new(columns * CELL_W + 2 * PAD, rows * CELL_H + 2 * PAD)
}

fn renderer(config: DerivedConfig, columns: u32, rows: u32) -> Renderer<HeadlessApi> {
    let screen = screen_for(columns, rows);
    let grid = SharedGrid::new(Box::new(BlockRasterizer::new(CELL_W, CELL_H)));
    Renderer::new(
        HeadlessApi::new(screen.width, screen.height),
        grid,
        config,
        screen,
    )
    .expect("renderer")
}

fn shared_for(renderer: &Renderer<HeadlessApi>) -> SharedState {
    let size = renderer.grid_size();
    state::shared(Terminal::new(size.columns, size.rows))
}

fn last_frame(renderer: &Renderer<HeadlessApi>) -> FrameRecord {
    renderer
        .api()
        .frames()
        .pop()
        .expect("a frame was recorded")
}

fn labels(frame: &FrameRecord) -> Vec<PipelineLabel> {
    frame.steps().map(|s| s.pipeline.clone()).collect()
}

fn passthrough(name: &str) -> CustomShader {
    CustomShader {
        name: name.to_string(),
        source: r#"
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    fragColor = texture(iChannel0, fragCoord / iResolution.xy);
}
"#
        .to_string(),
    }
}

#[test]
fn test_compositing_order() {
    let r = renderer(DerivedConfig::default(), 20, 5);
    let shared = shared_for(&r);
    {
        let mut state = shared.lock();
        state.terminal.print_str("hi");
        let storage = &mut state.terminal.screen_mut().kitty;
        storage.add_image(7, 2, 2, KittyFormat::Rgba, vec![255u8; 16]);
        storage.place(7, 1, KittyPlacement::pinned(0, 0).with_z(0));
        storage.place(7, 2, KittyPlacement::pinned(0, 4).with_z(-1));
        storage.place(7, 3, KittyPlacement::pinned(0, 8).with_z(i32::MIN));
    }

    assert!(r.update_frame(&shared).unwrap());
    r.draw_frame(false).unwrap();

    let kind = |k| PipelineLabel::Kind(k);
    assert_eq!(
        labels(&last_frame(&r)),
        vec![
            kind(PipelineKind::BgColor),
            kind(PipelineKind::Image),
            kind(PipelineKind::CellBg),
            kind(PipelineKind::Image),
            kind(PipelineKind::CellText),
            kind(PipelineKind::Image),
        ]
    );
}

#[test]
fn test_partial_rebuild_matches_full_rebuild() {
    let r = renderer(DerivedConfig::default(), 20, 6);
    let shared = shared_for(&r);
    shared.lock().terminal.print_str("hello");
    r.update_frame(&shared).unwrap();

    {
        let mut state = shared.lock();
        state.terminal.cursor_to(3, 2);
        state.terminal.set_pen(Style {
            bg: Color::Palette(4),
            underline: Underline::Curly,
            ..Style::default()
        });
        state.terminal.print_str("world");
    }
    r.update_frame(&shared).unwrap();
    let partial = r.with_contents(Clone::clone);

    r.mark_dirty();
    r.update_frame(&shared).unwrap();
    let full = r.with_contents(Clone::clone);

    assert_eq!(partial, full);
}

#[test]
fn test_wide_underlined_cell() {
    let r = renderer(DerivedConfig::default(), 80, 24);
    assert_eq!(r.grid_size().columns, 80);
    assert_eq!(r.grid_size().rows, 24);
    let shared = shared_for(&r);
    let red = Rgb::new(200, 0, 0);
    {
        let mut state = shared.lock();
        state.terminal.cursor_to(0, 5);
        state.terminal.set_pen(Style {
            bg: Color::Rgb(red),
            underline: Underline::Single,
            ..Style::default()
        });
        state.terminal.print('日');
        state.terminal.set_pen(Style::default());
        state.terminal.cursor_to(0, 10);
    }
    r.update_frame(&shared).unwrap();

    r.with_contents(|c| {
        let row = c.fg_row(5);
        let underlines: Vec<_> = row
            .iter()
            .filter(|t| Key::of(t) == Some(Key::Underline))
            .collect();
        assert_eq!(underlines.len(), 1);
        assert_eq!(underlines[0].grid_width, 2);
        let text: Vec<_> = row
            .iter()
            .filter(|t| Key::of(t) == Some(Key::Text))
            .collect();
        assert_eq!(text.len(), 1);
        assert_eq!(text[0].grid_pos, [0, 5]);

        assert_eq!(c.bg_cell(5, 0), Some(&red.with_alpha(255)));
        assert_eq!(c.bg_cell(5, 1), Some(&red.with_alpha(255)));
        assert_eq!(c.bg_cell(5, 2), Some(&[0, 0, 0, 0]));
    });
}

#[test]
fn test_health_reported_only_on_change() {
    let r = renderer(DerivedConfig::default(), 10, 3);
    let shared = shared_for(&r);
    let (tx, mut rx) = mpsc::unbounded_channel();
    r.set_mailbox(tx);
    r.api().set_deferred(true);

    let frame = |health| {
        r.api().set_health(health);
        r.mark_dirty();
        r.update_frame(&shared).unwrap();
        r.draw_frame(false).unwrap();
        assert_eq!(r.api().drain_completions(), 1);
    };
    frame(Health::Healthy);
    frame(Health::Unhealthy);
    frame(Health::Unhealthy);
    frame(Health::Healthy);

    assert_eq!(
        rx.try_recv().ok(),
        Some(SurfaceMessage::RendererHealth(Health::Unhealthy))
    );
    assert_eq!(
        rx.try_recv().ok(),
        Some(SurfaceMessage::RendererHealth(Health::Healthy))
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(r.health(), Health::Healthy);
}

#[test]
fn test_synchronized_output_skips_update() {
    let r = renderer(DerivedConfig::default(), 10, 3);
    let shared = shared_for(&r);
    {
        let mut state = shared.lock();
        state.terminal.set_mode(Modes::SYNCHRONIZED_OUTPUT, true);
        state.terminal.print_str("abc");
    }
    assert!(!r.update_frame(&shared).unwrap());
    assert_eq!(r.with_contents(|c| c.fg_row(0).len()), 0);

    shared
        .lock()
        .terminal
        .set_mode(Modes::SYNCHRONIZED_OUTPUT, false);
    assert!(r.update_frame(&shared).unwrap());
    assert!(r.with_contents(|c| c.fg_row(0).len()) >= 3);
}

#[test]
fn test_mismatched_terminal_size_is_skipped() {
    let r = renderer(DerivedConfig::default(), 10, 3);
    let shared = state::shared(Terminal::new(12, 3));
    shared.lock().terminal.print_str("abc");
    assert!(!r.update_frame(&shared).unwrap());

    shared.lock().terminal.resize(10, 3);
    assert!(r.update_frame(&shared).unwrap());
}

#[test]
fn test_background_color_without_image() {
    let r = renderer(DerivedConfig::default(), 10, 3);
    let shared = shared_for(&r);
    r.update_frame(&shared).unwrap();
    r.draw_frame(false).unwrap();
    assert_eq!(
        labels(&last_frame(&r))[0],
        PipelineLabel::Kind(PipelineKind::BgColor)
    );
}

#[test]
fn test_background_image_replaces_color_step() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("bg.png");
    image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]))
        .save(&path)
        .unwrap();

    let mut config = DerivedConfig::default();
    config.bg_image.path = Some(path);
    let r = renderer(config, 10, 3);
    let shared = shared_for(&r);
    r.update_frame(&shared).unwrap();
    r.draw_frame(false).unwrap();

    let labels = labels(&last_frame(&r));
    assert_eq!(labels[0], PipelineLabel::Kind(PipelineKind::BgImage));
    assert!(!labels.contains(&PipelineLabel::Kind(PipelineKind::BgColor)));
}

#[test]
fn test_missing_background_image_falls_back_to_color() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = DerivedConfig::default();
    config.bg_image.path = Some(dir.path().join("missing.png"));
    let r = renderer(config, 10, 3);
    let shared = shared_for(&r);
    r.update_frame(&shared).unwrap();
    r.draw_frame(false).unwrap();
    assert_eq!(
        labels(&last_frame(&r))[0],
        PipelineLabel::Kind(PipelineKind::BgColor)
    );
}

#[test]
fn test_post_chain_ping_pongs_into_target() {
    let mut config = DerivedConfig::default();
    config.custom_shaders = vec![passthrough("first"), passthrough("second")];
    let r = renderer(config, 10, 3);
    let shared = shared_for(&r);
    r.update_frame(&shared).unwrap();
    r.draw_frame(false).unwrap();

    let frame = last_frame(&r);
    assert_eq!(frame.passes.len(), 3);
    let main = frame.passes[0].attachment;
    let middle = frame.passes[1].attachment;
    assert!(matches!(main, Attachment::Texture(_)));
    assert!(matches!(middle, Attachment::Texture(_)));
    assert_ne!(main, middle);
    assert_eq!(frame.passes[2].attachment, Attachment::Target(frame.target));

    let source = |i: usize| frame.passes[i].steps[0].textures[0];
    assert_eq!(Attachment::Texture(source(1)), main);
    assert_eq!(Attachment::Texture(source(2)), middle);
    assert_eq!(
        frame.passes[1].steps[0].pipeline,
        PipelineLabel::Post("first".to_string())
    );
    assert_eq!(
        frame.passes[2].steps[0].pipeline,
        PipelineLabel::Post("second".to_string())
    );
}

#[test]
fn test_invalid_post_shader_is_skipped() {
    let mut config = DerivedConfig::default();
    config.custom_shaders = vec![
        CustomShader {
            name: "broken".to_string(),
            source: "this is not glsl".to_string(),
        },
        passthrough("ok"),
    ];
    let r = renderer(config, 10, 3);
    let shared = shared_for(&r);
    r.update_frame(&shared).unwrap();
    r.draw_frame(false).unwrap();

    let frame = last_frame(&r);
    assert_eq!(frame.passes.len(), 2);
    assert_eq!(
        frame.passes[1].steps[0].pipeline,
        PipelineLabel::Post("ok".to_string())
    );
}

#[test]
fn test_failed_frame_releases_its_slot() {
    let mut config = DerivedConfig::default();
    config.custom_shaders = vec![passthrough("post")];
    let r = renderer(config, 10, 3);
    let shared = shared_for(&r);
    r.update_frame(&shared).unwrap();

    // Post textures are created on first use
    r.api().fail_textures(true);
    assert!(r.draw_frame(false).is_err());
    assert!(r.api().frames().is_empty());

    // With a single slot this would block if the failed frame kept it
    r.api().fail_textures(false);
    r.draw_frame(false).unwrap();
    assert_eq!(r.api().frames().len(), 1);
}

#[test]
fn test_unchanged_frame_presents_last_target() {
    use termframe_render::backend::headless::Presented;

    let r = renderer(DerivedConfig::default(), 10, 3);
    let shared = shared_for(&r);
    r.update_frame(&shared).unwrap();
    r.draw_frame(false).unwrap();
    // Nothing rebuilt since the last draw
    r.draw_frame(false).unwrap();

    assert_eq!(r.api().frames().len(), 1);
    let presents = r.api().presents();
    assert!(matches!(presents[0], Presented::Target(_)));
    assert_eq!(presents[1], Presented::Last);
}

#[test]
fn test_render_thread_shares_renderer() {
    let r = Arc::new(renderer(DerivedConfig::default(), 10, 3));
    let shared = shared_for(&r);
    let handle = termframe_render::thread::spawn(Arc::clone(&r), Arc::clone(&shared)).unwrap();
    shared.lock().terminal.print_str("ok");
    handle.wakeup();
    handle.join();
    assert!(!r.api().frames().is_empty());
}

#[test]
fn test_idle_update_presents_last_target() {
    use termframe_render::backend::headless::Presented;

    let r = renderer(DerivedConfig::default(), 10, 3);
    let shared = shared_for(&r);
    shared.lock().terminal.print_str("abc");
    assert!(r.update_frame(&shared).unwrap());
    r.draw_frame(false).unwrap();
    // A wakeup with nothing new in the terminal
    assert!(r.update_frame(&shared).unwrap());
    r.draw_frame(false).unwrap();

    assert_eq!(r.api().frames().len(), 1);
    let presents = r.api().presents();
    assert_eq!(presents.len(), 2);
    assert!(matches!(presents[0], Presented::Target(_)));
    assert_eq!(presents[1], Presented::Last);
}

#[test]
fn test_cursor_move_draws_new_frame() {
    let r = renderer(DerivedConfig::default(), 10, 3);
    let shared = shared_for(&r);
    shared.lock().terminal.print_str("abc");
    r.update_frame(&shared).unwrap();
    r.draw_frame(false).unwrap();

    shared.lock().terminal.cursor_to(0, 2);
    r.update_frame(&shared).unwrap();
    r.draw_frame(false).unwrap();
    assert_eq!(r.api().frames().len(), 2);
    assert_eq!(r.with_uniforms(|u| u.cursor_pos), [0, 2]);
}

#[test]
fn test_font_grid_swap_relayouts_and_reuploads() {
    let r = renderer(DerivedConfig::default(), 10, 3);
    let shared = shared_for(&r);
    shared.lock().terminal.print_str("abc");
    r.update_frame(&shared).unwrap();
    r.draw_frame(false).unwrap();
    let writes = r.api().texture_writes();

    r.set_font_grid(SharedGrid::new(Box::new(BlockRasterizer::new(5, 10))));
    let size = r.grid_size();
    assert_eq!((size.columns, size.rows), (20, 6));
    assert_eq!(r.metrics().cell_width, 5);
    // The terminal has not caught up with the new grid yet
    assert!(!r.update_frame(&shared).unwrap());

    shared.lock().terminal.resize(20, 6);
    assert!(r.update_frame(&shared).unwrap());
    r.with_contents(|c| assert_eq!(c.size(), size));
    r.draw_frame(false).unwrap();
    assert_eq!(r.api().frames().len(), 2);
    assert!(r.api().texture_writes() >= writes + 2);
}

#[test]
fn test_hidden_surface_draws_only_when_synced() {
    let r = renderer(DerivedConfig::default(), 10, 3);
    let shared = shared_for(&r);
    r.set_visible(false);
    shared.lock().terminal.print_str("abc");
    assert!(r.update_frame(&shared).unwrap());

    r.draw_frame(false).unwrap();
    assert!(r.api().frames().is_empty());
    assert!(r.api().presents().is_empty());

    r.draw_frame(true).unwrap();
    let frames = r.api().frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].sync);
    assert_eq!(r.api().presents().len(), 1);
}

#[test]
fn test_three_frames_in_flight_cycle_targets() {
    use termframe_render::backend::headless::Presented;

    let screen = screen_for(10, 3);
    let grid = SharedGrid::new(Box::new(BlockRasterizer::new(CELL_W, CELL_H)));
    let api = HeadlessApi::new(screen.width, screen.height).with_swap_chain_count(3);
    let r = Renderer::new(api, grid, DerivedConfig::default(), screen).unwrap();
    assert_eq!(r.frames_in_flight_limit(), 3);
    let shared = shared_for(&r);
    for _ in 0..4 {
        r.mark_dirty();
        r.update_frame(&shared).unwrap();
        r.draw_frame(false).unwrap();
    }
    let targets: Vec<u64> = r.api().frames().iter().map(|f| f.target).collect();
    assert_eq!(targets.len(), 4);
    assert_ne!(targets[0], targets[1]);
    assert_ne!(targets[1], targets[2]);
    assert_ne!(targets[0], targets[2]);
    assert_eq!(targets[3], targets[0]);
    let presents = r.api().presents();
    assert_eq!(presents[3], Presented::Target(targets[0]));
}

#[test]
fn test_render_thread_configures_attached_surface() {
    use termframe_render::backend::headless::SurfaceStage;

    let r = Arc::new(renderer(DerivedConfig::default(), 10, 3));
    r.surface_init().unwrap();
    assert_eq!(r.api().surface_stage(), SurfaceStage::Attached);
    let shared = shared_for(&r);
    let handle = termframe_render::thread::spawn(Arc::clone(&r), Arc::clone(&shared)).unwrap();
    handle.wakeup();
    handle.join();
    assert_eq!(r.api().surface_stage(), SurfaceStage::Configured);
}

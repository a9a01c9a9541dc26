//! The generic renderer.
//!
//! [`Renderer`] is written once against [`GraphicsApi`] and does two jobs:
//!
//! - [`Renderer::update_frame`] snapshots the terminal under its lock and
//!   rebuilds the CPU-side [`Contents`] for whatever changed.
//! - [`Renderer::draw_frame`] copies the contents into the next free
//!   [`FrameState`](crate::swap_chain::FrameState), encodes the passes and
//!   hands the frame to the backend.
//!
//! Both take the draw mutex. `update_frame` additionally takes the state
//! lock, always after the draw mutex and only for as long as the snapshot
//! takes.

mod draw;
mod layout;
mod post;
mod rebuild;

pub use layout::{Padding, ScreenSize};

use std::sync::Arc;

use parking_lot::Mutex;
use termframe_fonts::{Metrics, SharedGrid};
use tokio::sync::mpsc::UnboundedSender;

use crate::api::{GraphicsApi, Health, PipelineKind};
use crate::bg_image::BackgroundImage;
use crate::cell_contents::{Contents, GridSize};
use crate::config::{ConfigDirty, CustomShader, DerivedConfig};
use crate::error::RenderError;
use crate::image::ImageState;
use crate::links::MouseCell;
use crate::message::SurfaceMessage;
use crate::shader_types::Uniforms;
use crate::swap_chain::SwapChain;

use post::PostClock;

/// Reports GPU health to the surface, once per change.
#[derive(Debug, Default)]
struct HealthTracker {
    last: Mutex<Health>,
    mailbox: Mutex<Option<UnboundedSender<SurfaceMessage>>>,
}

impl HealthTracker {
    fn report(&self, health: Health) {
        {
            let mut last = self.last.lock();
            if *last == health {
                return;
            }
            *last = health;
        }
        match health {
            Health::Healthy => log::info!("renderer recovered"),
            Health::Unhealthy => log::warn!("renderer unhealthy: GPU reported a failed frame"),
        }
        if let Some(tx) = self.mailbox.lock().as_ref()
            && tx.send(SurfaceMessage::RendererHealth(health)).is_err()
        {
            log::debug!("surface mailbox closed, dropping health report");
        }
    }
}

struct Pipelines<A: GraphicsApi> {
    bg_color: A::Pipeline,
    bg_image: A::Pipeline,
    cell_bg: A::Pipeline,
    cell_text: A::Pipeline,
    image: A::Pipeline,
    /// Custom shaders in chain order
    post: Vec<A::Pipeline>,
}

impl<A: GraphicsApi> Pipelines<A> {
    fn new(api: &A, shaders: &[CustomShader]) -> Result<Self, RenderError> {
        Ok(Self {
            bg_color: api.init_pipeline(PipelineKind::BgColor)?,
            bg_image: api.init_pipeline(PipelineKind::BgImage)?,
            cell_bg: api.init_pipeline(PipelineKind::CellBg)?,
            cell_text: api.init_pipeline(PipelineKind::CellText)?,
            image: api.init_pipeline(PipelineKind::Image)?,
            post: post_pipelines(api, shaders),
        })
    }
}

/// Compile the custom shader chain. Shaders that fail are logged and left
/// out of the chain.
fn post_pipelines<A: GraphicsApi>(api: &A, shaders: &[CustomShader]) -> Vec<A::Pipeline> {
    shaders
        .iter()
        .filter_map(|shader| match api.init_post_pipeline(&shader.name, &shader.source) {
            Ok(pipeline) => {
                log::info!("custom shader loaded: {}", shader.name);
                Some(pipeline)
            }
            Err(e) => {
                log::warn!("custom shader {} disabled: {e}", shader.name);
                None
            }
        })
        .collect()
}

/// Everything behind the draw mutex.
struct Inner<A: GraphicsApi> {
    grid: SharedGrid,
    metrics: Metrics,
    config: DerivedConfig,
    dirty: ConfigDirty,

    screen: ScreenSize,
    padding: Padding,
    grid_size: GridSize,

    contents: Contents,
    uniforms: Uniforms,
    images: ImageState<A>,
    bg_image: BackgroundImage<A>,
    /// `None` while the display is unrealized
    swap_chain: Option<SwapChain<A>>,
    pipelines: Pipelines<A>,

    focused: bool,
    visible: bool,
    blink_visible: bool,
    /// Contents changed since the last submitted frame
    cells_rebuilt: bool,
    /// Something besides the contents needs a new frame
    redraw: bool,

    last_viewport_pin: Option<u64>,
    /// Viewport cell of the cursor at the last rebuild, `None` when it was
    /// out of view
    last_cursor: Option<(u16, u16)>,
    mouse: Option<MouseCell>,
    post_clock: PostClock,
}

impl<A: GraphicsApi> Inner<A> {
    /// Recompute geometry after the surface or the font changed.
    fn relayout(&mut self) {
        let (grid_size, padding) = layout::grid_for(self.screen, &self.metrics, &self.config);
        if grid_size != self.grid_size {
            log::debug!(
                "grid resized {}x{} -> {}x{}",
                self.grid_size.columns,
                self.grid_size.rows,
                grid_size.columns,
                grid_size.rows
            );
        }
        self.grid_size = grid_size;
        self.padding = padding;
        self.dirty |= ConfigDirty::UNIFORMS;
        self.redraw = true;
    }

    /// Consume a pending uniform recomputation.
    fn apply_uniform_changes(&mut self) {
        if !self.dirty.contains(ConfigDirty::UNIFORMS) {
            return;
        }
        layout::base_uniforms(
            &mut self.uniforms,
            self.screen,
            self.padding,
            self.grid_size,
            &self.metrics,
            &self.config,
        );
        self.dirty.remove(ConfigDirty::UNIFORMS);
        self.redraw = true;
    }

    /// Consume pending background image and custom shader changes.
    fn apply_resource_changes(&mut self, api: &A) {
        if self.dirty.contains(ConfigDirty::BACKGROUND_IMAGE) {
            self.bg_image.set_path(self.config.bg_image.path.as_deref());
            self.dirty.remove(ConfigDirty::BACKGROUND_IMAGE);
            self.redraw = true;
        }
        if self.dirty.contains(ConfigDirty::CUSTOM_SHADERS) {
            self.pipelines.post = post_pipelines(api, &self.config.custom_shaders);
            self.post_clock = PostClock::new();
            self.dirty.remove(ConfigDirty::CUSTOM_SHADERS);
            self.redraw = true;
        }
    }
}

/// The renderer for one surface.
pub struct Renderer<A: GraphicsApi> {
    api: A,
    inner: Mutex<Inner<A>>,
    health: Arc<HealthTracker>,
}

impl<A: GraphicsApi> Renderer<A> {
    /// Create the pipelines, the swap chain and empty contents for a
    /// surface of `screen` pixels.
    pub fn new(
        api: A,
        grid: SharedGrid,
        config: DerivedConfig,
        screen: ScreenSize,
    ) -> Result<Self, RenderError> {
        let metrics = grid.metrics();
        let (grid_size, padding) = layout::grid_for(screen, &metrics, &config);
        let contents = Contents::new(grid_size)?;
        let pipelines = Pipelines::new(&api, &config.custom_shaders)?;
        let swap_chain = SwapChain::new(&api, screen.width, screen.height)?;
        log::info!(
            "renderer initialized: {}x{} px, {}x{} cells, {} frame(s) in flight, {} custom shader(s)",
            screen.width,
            screen.height,
            grid_size.columns,
            grid_size.rows,
            swap_chain.buf_count(),
            pipelines.post.len()
        );

        let inner = Inner {
            grid,
            metrics,
            config,
            dirty: ConfigDirty::UNIFORMS
                | ConfigDirty::FULL_REBUILD
                | ConfigDirty::BACKGROUND_IMAGE,
            screen,
            padding,
            grid_size,
            contents,
            uniforms: Uniforms::default(),
            images: ImageState::default(),
            bg_image: BackgroundImage::default(),
            swap_chain: Some(swap_chain),
            pipelines,
            focused: true,
            visible: true,
            blink_visible: true,
            cells_rebuilt: false,
            redraw: true,
            last_viewport_pin: None,
            last_cursor: None,
            mouse: None,
            post_clock: PostClock::new(),
        };
        Ok(Self {
            api,
            inner: Mutex::new(inner),
            health: Arc::new(HealthTracker::default()),
        })
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Attach the backend's presentation surface and apply the configured
    /// vsync. Call from the thread that owns the window.
    pub fn surface_init(&self) -> Result<(), RenderError> {
        self.api.surface_init()?;
        self.api.set_vsync(self.inner.lock().config.vsync);
        Ok(())
    }

    /// Make the attached surface ready to present. Call from the render
    /// thread.
    pub fn finalize_surface_init(&self) -> Result<(), RenderError> {
        self.api.finalize_surface_init()
    }

    /// Called on the render thread before its loop starts.
    pub fn thread_enter(&self) -> Result<(), RenderError> {
        self.api.thread_enter()
    }

    pub fn thread_exit(&self) {
        self.api.thread_exit();
    }

    pub fn loop_enter(&self) {
        let mut inner = self.inner.lock();
        inner.post_clock = PostClock::new();
        inner.redraw = true;
    }

    /// Wait for in-flight frames before the loop goes away.
    pub fn loop_exit(&self) {
        let inner = self.inner.lock();
        if let Some(swap_chain) = &inner.swap_chain {
            swap_chain.drain();
        }
    }

    /// The display is back; recreate the swap chain.
    pub fn display_realized(&self) -> Result<(), RenderError> {
        self.api.display_realized();
        let mut inner = self.inner.lock();
        if inner.swap_chain.is_none() {
            let (w, h) = (inner.screen.width, inner.screen.height);
            inner.swap_chain = Some(SwapChain::new(&self.api, w, h)?);
            inner.redraw = true;
            log::debug!("display realized, swap chain recreated");
        }
        Ok(())
    }

    /// The display is going away; release every frame's GPU resources once
    /// the GPU is done with them.
    pub fn display_unrealized(&self) {
        let mut inner = self.inner.lock();
        if let Some(swap_chain) = inner.swap_chain.take() {
            swap_chain.drain();
            log::debug!("display unrealized, swap chain released");
        }
        drop(inner);
        self.api.display_unrealized();
    }

    // ========================================================================
    // Setters
    // ========================================================================

    pub fn set_focus(&self, focused: bool) {
        let mut inner = self.inner.lock();
        if inner.focused != focused {
            inner.focused = focused;
            inner.redraw = true;
        }
    }

    /// Invisible surfaces are not drawn unless a draw is synchronous.
    pub fn set_visible(&self, visible: bool) {
        let mut inner = self.inner.lock();
        if inner.visible != visible {
            inner.visible = visible;
            inner.redraw = true;
        }
    }

    /// Blink phase of the cursor, driven by the render thread's timer.
    pub fn set_cursor_blink_visible(&self, visible: bool) {
        self.inner.lock().blink_visible = visible;
    }

    pub fn cursor_blink_visible(&self) -> bool {
        self.inner.lock().blink_visible
    }

    pub fn set_screen_size(&self, screen: ScreenSize) {
        let mut inner = self.inner.lock();
        if inner.screen == screen {
            return;
        }
        log::debug!("screen size {}x{}", screen.width, screen.height);
        inner.screen = screen;
        inner.relayout();
    }

    /// Switch to another font grid. Every slot re-uploads its atlases and
    /// every row is rebuilt.
    pub fn set_font_grid(&self, grid: SharedGrid) {
        let mut inner = self.inner.lock();
        inner.metrics = grid.metrics();
        inner.grid = grid;
        if let Some(swap_chain) = inner.swap_chain.as_mut() {
            for frame in swap_chain.frames_mut() {
                frame.grayscale_modified = 0;
                frame.color_modified = 0;
            }
        }
        inner.dirty |= ConfigDirty::FULL_REBUILD;
        inner.relayout();
    }

    /// Adopt a new configuration; the work it implies happens on the next
    /// update and draw.
    pub fn change_config(&self, config: DerivedConfig) {
        let mut inner = self.inner.lock();
        let dirty = config.changes_from(&inner.config);
        if dirty.is_empty() {
            return;
        }
        log::debug!("config changed: {dirty:?}");
        let relayout = config.padding_x != inner.config.padding_x
            || config.padding_y != inner.config.padding_y
            || config.padding_balance != inner.config.padding_balance;
        if config.vsync != inner.config.vsync {
            log::info!("vsync {}", if config.vsync { "on" } else { "off" });
            self.api.set_vsync(config.vsync);
        }
        inner.config = config;
        inner.dirty |= dirty;
        if relayout {
            inner.relayout();
        }
    }

    /// Force the next update to rebuild every row.
    pub fn mark_dirty(&self) {
        self.inner.lock().dirty |= ConfigDirty::FULL_REBUILD;
    }

    /// Where health changes are reported.
    pub fn set_mailbox(&self, mailbox: UnboundedSender<SurfaceMessage>) {
        *self.health.mailbox.lock() = Some(mailbox);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The grid the terminal must have for its frames to be drawn.
    pub fn grid_size(&self) -> GridSize {
        self.inner.lock().grid_size
    }

    pub fn screen_size(&self) -> ScreenSize {
        self.inner.lock().screen
    }

    pub fn padding(&self) -> Padding {
        self.inner.lock().padding
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.lock().metrics
    }

    /// Health as last reported by a completed frame.
    pub fn health(&self) -> Health {
        *self.health.last.lock()
    }

    /// Whether the frame loop should keep drawing without new input.
    pub fn animating(&self) -> bool {
        let inner = self.inner.lock();
        !inner.pipelines.post.is_empty() && inner.config.animates(inner.focused)
    }

    /// Frames the backend may hold at once, 0 while unrealized.
    pub fn frames_in_flight_limit(&self) -> usize {
        self.inner
            .lock()
            .swap_chain
            .as_ref()
            .map_or(0, SwapChain::buf_count)
    }

    pub fn with_contents<R>(&self, f: impl FnOnce(&Contents) -> R) -> R {
        f(&self.inner.lock().contents)
    }

    pub fn with_uniforms<R>(&self, f: impl FnOnce(&Uniforms) -> R) -> R {
        f(&self.inner.lock().uniforms)
    }

    /// Run `f` on the target of the frame submitted last.
    pub fn with_last_target<R>(&self, f: impl FnOnce(&A, &A::Target) -> R) -> Option<R> {
        let inner = self.inner.lock();
        let swap_chain = inner.swap_chain.as_ref()?;
        Some(f(&self.api, &swap_chain.current().target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessApi;
    use crate::state::{self, SharedState};
    use termframe_fonts::BlockRasterizer;
    use termframe_terminal::Terminal;

    fn renderer() -> Renderer<HeadlessApi> {
        let grid = SharedGrid::new(Box::new(BlockRasterizer::new(10, 20)));
        Renderer::new(
            HeadlessApi::new(200, 100),
            grid,
            DerivedConfig::default(),
            ScreenSize::new(200, 100),
        )
        .unwrap()
    }

    fn three_slot_renderer(config: DerivedConfig, grid: SharedGrid) -> Renderer<HeadlessApi> {
        Renderer::new(
            HeadlessApi::new(200, 100).with_swap_chain_count(3),
            grid,
            config,
            ScreenSize::new(200, 100),
        )
        .unwrap()
    }

    fn shared_for(r: &Renderer<HeadlessApi>) -> SharedState {
        let size = r.grid_size();
        state::shared(Terminal::new(size.columns, size.rows))
    }

    /// `(grayscale_modified, bg_image_buffer_modified)` of every slot.
    fn slot_marks(r: &Renderer<HeadlessApi>) -> Vec<(usize, u64)> {
        let mut inner = r.inner.lock();
        inner
            .swap_chain
            .as_mut()
            .unwrap()
            .frames_mut()
            .map(|f| (f.grayscale_modified, f.bg_image_buffer_modified))
            .collect()
    }

    fn redraw(r: &Renderer<HeadlessApi>, shared: &SharedState) {
        r.mark_dirty();
        assert!(r.update_frame(shared).unwrap());
        r.draw_frame(false).unwrap();
    }

    #[test]
    fn test_lagging_slots_catch_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bg.png");
        ::image::RgbaImage::from_pixel(4, 4, ::image::Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();
        let mut config = DerivedConfig::default();
        config.bg_image.path = Some(path);
        let grid = SharedGrid::new(Box::new(BlockRasterizer::new(10, 20)));
        let r = three_slot_renderer(config, grid.clone());
        r.api().set_deferred(true);
        let shared = shared_for(&r);
        shared.lock().terminal.print_str("a");

        redraw(&r, &shared);
        let gray = grid.with_atlases(|g, _| g.modified);
        let bg = r.inner.lock().bg_image.modified();
        assert!(bg > 0);
        assert_eq!(slot_marks(&r), vec![(gray, bg), (0, 0), (0, 0)]);

        // Nothing new to upload, but the other slots have never seen it
        redraw(&r, &shared);
        redraw(&r, &shared);
        assert_eq!(slot_marks(&r), vec![(gray, bg); 3]);
        assert_eq!(r.api().drain_completions(), 3);

        shared.lock().terminal.print_str("xyz");
        redraw(&r, &shared);
        let newer = grid.with_atlases(|g, _| g.modified);
        assert!(newer > gray);
        assert_eq!(
            slot_marks(&r),
            vec![(newer, bg), (gray, bg), (gray, bg)]
        );
        redraw(&r, &shared);
        assert_eq!(slot_marks(&r)[1], (newer, bg));
    }

    #[test]
    fn test_font_grid_swap_resets_every_slot() {
        let grid = SharedGrid::new(Box::new(BlockRasterizer::new(10, 20)));
        let r = three_slot_renderer(DerivedConfig::default(), grid);
        let shared = shared_for(&r);
        for _ in 0..3 {
            redraw(&r, &shared);
        }
        assert!(slot_marks(&r).iter().all(|&(gray, _)| gray > 0));
        r.inner.lock().dirty = ConfigDirty::empty();

        r.set_font_grid(SharedGrid::new(Box::new(BlockRasterizer::new(20, 40))));
        assert!(slot_marks(&r).iter().all(|&(gray, _)| gray == 0));
        {
            let mut inner = r.inner.lock();
            assert!(inner.dirty.contains(ConfigDirty::FULL_REBUILD));
            for frame in inner.swap_chain.as_mut().unwrap().frames_mut() {
                assert_eq!(frame.color_modified, 0);
            }
        }
        assert_eq!(r.metrics().cell_width, 20);
        assert_eq!(
            r.grid_size(),
            GridSize {
                columns: 9,
                rows: 2
            }
        );
    }

    #[test]
    fn test_health_reports_only_changes() {
        let tracker = HealthTracker::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        *tracker.mailbox.lock() = Some(tx);

        tracker.report(Health::Healthy);
        assert!(rx.try_recv().is_err(), "healthy is the starting state");
        tracker.report(Health::Unhealthy);
        tracker.report(Health::Unhealthy);
        tracker.report(Health::Healthy);
        assert_eq!(
            rx.try_recv().unwrap(),
            SurfaceMessage::RendererHealth(Health::Unhealthy)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SurfaceMessage::RendererHealth(Health::Healthy)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_screen_size_changes_grid() {
        let r = renderer();
        let before = r.grid_size();
        r.set_screen_size(ScreenSize::new(404, 204));
        let after = r.grid_size();
        assert_eq!(after.columns, 40);
        assert_eq!(after.rows, 10);
        assert_ne!(before, after);
    }

    #[test]
    fn test_surface_init_then_finalize() {
        use crate::backend::headless::SurfaceStage;

        let r = renderer();
        assert_eq!(r.api().surface_stage(), SurfaceStage::Detached);
        r.finalize_surface_init().unwrap();
        assert_eq!(r.api().surface_stage(), SurfaceStage::Detached);

        r.surface_init().unwrap();
        assert_eq!(r.api().surface_stage(), SurfaceStage::Attached);
        assert_eq!(r.api().vsync_changes(), vec![true]);
        r.finalize_surface_init().unwrap();
        assert_eq!(r.api().surface_stage(), SurfaceStage::Configured);
    }

    #[test]
    fn test_vsync_change_reaches_backend() {
        let r = renderer();
        let mut config = DerivedConfig::default();
        config.vsync = false;
        r.change_config(config.clone());
        // Unrelated changes leave the present mode alone
        config.min_contrast = 2.0;
        r.change_config(config);
        assert_eq!(r.api().vsync_changes(), vec![false]);
    }

    #[test]
    fn test_display_unrealize_and_realize() {
        let r = renderer();
        assert_eq!(r.frames_in_flight_limit(), 1);
        r.display_unrealized();
        assert_eq!(r.frames_in_flight_limit(), 0);
        assert!(r.with_last_target(|_, _| ()).is_none());
        r.display_realized().unwrap();
        assert_eq!(r.frames_in_flight_limit(), 1);
    }

    #[test]
    fn test_config_change_is_recorded_once() {
        let r = renderer();
        r.inner.lock().dirty = ConfigDirty::empty();
        r.change_config(DerivedConfig::default());
        assert!(r.inner.lock().dirty.is_empty());

        let config = DerivedConfig {
            min_contrast: 2.0,
            ..Default::default()
        };
        r.change_config(config);
        assert!(r.inner.lock().dirty.contains(ConfigDirty::FULL_REBUILD));
    }
}

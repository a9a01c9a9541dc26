//! Application module for termframe
//!
//! `App` loads configuration and fonts, builds a renderer on the chosen
//! backend, then drives its render thread through the demo scene.

use crate::cli::{Backend, RuntimeOptions};
use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use termframe_config::{Config, CursorStyle};
use termframe_fonts::{BlockRasterizer, Rasterizer, SharedGrid, SwashRasterizer};
use termframe_render::thread::{self, RendererMessage};
use termframe_render::{
    DerivedConfig, GraphicsApi, GridSize, HeadlessApi, Health, Padding, Renderer, ScreenSize,
    SurfaceMessage, WgpuApi, WgpuOptions, state,
};
use termframe_terminal::{CursorVisualStyle, Terminal};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

pub mod demo;

/// Pause between demo frames so each wakeup gets its own draw.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// What a run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub backend: Backend,
    pub screen: ScreenSize,
    pub grid: GridSize,
    pub padding: Padding,
    pub text_cells: usize,
    pub health: Health,
    /// Frames the headless recorder captured
    pub recorded_frames: Option<usize>,
    pub screenshot: Option<PathBuf>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "backend: {:?}, surface {}x{}, grid {}x{}",
            self.backend, self.screen.width, self.screen.height, self.grid.columns, self.grid.rows
        )?;
        writeln!(
            f,
            "padding: top {} right {} bottom {} left {}",
            self.padding.top, self.padding.right, self.padding.bottom, self.padding.left
        )?;
        write!(f, "text cells: {}, health: {:?}", self.text_cells, self.health)?;
        if let Some(frames) = self.recorded_frames {
            write!(f, "\nrecorded frames: {frames}")?;
        }
        if let Some(path) = &self.screenshot {
            write!(f, "\nscreenshot: {}", path.display())?;
        }
        Ok(())
    }
}

/// Main application entry point
pub struct App {
    config: Config,
    runtime: Arc<Runtime>,
    runtime_options: RuntimeOptions,
}

impl App {
    /// Create a new application
    pub fn new(runtime: Arc<Runtime>, runtime_options: RuntimeOptions) -> Result<Self> {
        let mut config = match &runtime_options.config {
            Some(path) => Config::load(path)?,
            None => Config::load_or_default(),
        };

        if !runtime_options.shaders.is_empty() {
            for shader in &runtime_options.shaders {
                log::info!("CLI override: adding shader '{shader}'");
            }
            config
                .custom_shaders
                .extend(runtime_options.shaders.iter().cloned());
            config = config.validate()?;
        }

        Ok(Self {
            config,
            runtime,
            runtime_options,
        })
    }

    /// Run the demo frames on the configured backend
    pub fn run(self) -> Result<RunSummary> {
        let derived = DerivedConfig::new(&self.config);
        let grid = SharedGrid::new(load_rasterizer(
            self.runtime_options.font_family.as_deref(),
            self.runtime_options.font_size,
        ));
        let (width, height) = self.runtime_options.size;

        match self.runtime_options.backend {
            Backend::Headless => {
                if self.runtime_options.screenshot.is_some() {
                    log::warn!("Screenshots need the wgpu backend, skipping");
                }
                let renderer = self.drive(HeadlessApi::new(width, height), grid, derived)?;
                let mut summary = self.summarize(&renderer);
                summary.recorded_frames = Some(renderer.api().frames().len());
                Ok(summary)
            }
            Backend::Wgpu => {
                let options = WgpuOptions {
                    vsync: derived.vsync,
                    ..WgpuOptions::default()
                };
                let api = self
                    .runtime
                    .block_on(WgpuApi::new(width, height, options))
                    .context("Failed to initialize wgpu")?;
                let renderer = self.drive(api, grid, derived)?;
                let mut summary = self.summarize(&renderer);
                if let Some(path) = &self.runtime_options.screenshot {
                    let image: image::RgbaImage = renderer
                        .with_last_target(|api, target| api.read_target(target))
                        .ok_or_else(|| anyhow!("no frame was drawn"))??;
                    image
                        .save(path)
                        .with_context(|| format!("Failed to save {}", path.display()))?;
                    log::info!("Screenshot saved to {}", path.display());
                    summary.screenshot = Some(path.clone());
                }
                Ok(summary)
            }
        }
    }

    /// Spawn the render thread and feed it the demo scene.
    fn drive<A: GraphicsApi>(
        &self,
        api: A,
        grid: SharedGrid,
        config: DerivedConfig,
    ) -> Result<Arc<Renderer<A>>> {
        let (width, height) = self.runtime_options.size;
        let renderer = Arc::new(Renderer::new(
            api,
            grid,
            config.clone(),
            ScreenSize::new(width, height),
        )?);
        renderer
            .surface_init()
            .context("Failed to attach the render surface")?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        renderer.set_mailbox(tx);

        let size = renderer.grid_size();
        let mut terminal = Terminal::new(size.columns, size.rows);
        terminal.set_cursor_style(cursor_style(self.config.cursor_style));
        let shared = state::shared(terminal);
        {
            let mut state = shared.lock();
            state.apply_config(&config);
            demo::draw_scene(&mut state.terminal);
        }

        let handle = thread::spawn(Arc::clone(&renderer), Arc::clone(&shared))
            .context("Failed to spawn render thread")?;
        let frames = self.runtime_options.frames;
        for frame in 0..frames {
            demo::advance(&mut shared.lock(), frame, frames);
            handle.wakeup();
            std::thread::sleep(FRAME_INTERVAL);
        }
        // Mailbox messages are handled in order, so the final state is drawn
        // before the loop sees Quit
        handle.send(RendererMessage::Visible(true));
        handle.join();

        while let Ok(SurfaceMessage::RendererHealth(health)) = rx.try_recv() {
            log::info!("Renderer health: {health:?}");
        }
        Ok(renderer)
    }

    fn summarize<A: GraphicsApi>(&self, renderer: &Renderer<A>) -> RunSummary {
        RunSummary {
            backend: self.runtime_options.backend,
            screen: renderer.screen_size(),
            grid: renderer.grid_size(),
            padding: renderer.padding(),
            text_cells: renderer.with_contents(|c| c.fg_rows().iter().map(Vec::len).sum()),
            health: renderer.health(),
            recorded_frames: None,
            screenshot: None,
        }
    }
}

fn cursor_style(style: CursorStyle) -> CursorVisualStyle {
    match style {
        CursorStyle::Block => CursorVisualStyle::Block,
        CursorStyle::BlockHollow => CursorVisualStyle::BlockHollow,
        CursorStyle::Bar => CursorVisualStyle::Bar,
        CursorStyle::Underline => CursorVisualStyle::Underline,
    }
}

/// System fonts when available, otherwise solid block glyphs.
fn load_rasterizer(family: Option<&str>, size_px: f32) -> Box<dyn Rasterizer> {
    match SwashRasterizer::discover(family, size_px) {
        Ok(rasterizer) => Box::new(rasterizer),
        Err(e) => {
            log::warn!("Font discovery failed, using block glyphs: {e}");
            let height = (size_px.ceil() as u32).max(2);
            Box::new(BlockRasterizer::new(height / 2, height))
        }
    }
}

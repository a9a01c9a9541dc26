//! The render thread.
//!
//! One OS thread per surface runs a current-thread tokio runtime. The loop
//! wakes on mailbox messages, on [`RenderThreadHandle::wakeup`] from the
//! thread that mutates the terminal, on the cursor blink timer, and on the
//! draw timer while custom shaders animate.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use termframe_fonts::SharedGrid;
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::GraphicsApi;
use crate::config::DerivedConfig;
use crate::renderer::{Renderer, ScreenSize};
use crate::state::SharedState;

/// Cursor blink half-period.
pub const CURSOR_BLINK_INTERVAL: Duration = Duration::from_millis(600);

/// Frame interval while custom shaders animate.
pub const DRAW_INTERVAL: Duration = Duration::from_millis(8);

/// Messages to the render thread.
#[derive(Debug)]
pub enum RendererMessage {
    Focus(bool),
    Visible(bool),
    ScreenSize(ScreenSize),
    ChangeConfig(Box<DerivedConfig>),
    FontGrid(SharedGrid),
    /// Typing restarts the blink cycle with the cursor shown
    ResetCursorBlink,
    Quit,
}

/// Owner's side of a running render thread.
pub struct RenderThreadHandle {
    mailbox: UnboundedSender<RendererMessage>,
    wakeup: Arc<Notify>,
    thread: Option<JoinHandle<()>>,
}

impl RenderThreadHandle {
    /// Queue a message and wake the loop. Returns false once the thread
    /// has exited.
    pub fn send(&self, msg: RendererMessage) -> bool {
        self.mailbox.send(msg).is_ok()
    }

    /// Ask for an update and draw; coalesces with pending wakeups.
    pub fn wakeup(&self) {
        self.wakeup.notify_one();
    }

    /// Stop the loop and wait for the thread.
    pub fn join(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.mailbox.send(RendererMessage::Quit);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("render thread panicked");
        }
    }
}

impl Drop for RenderThreadHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the render thread for `renderer`, drawing from `state`.
pub fn spawn<A: GraphicsApi>(
    renderer: Arc<Renderer<A>>,
    state: SharedState,
) -> std::io::Result<RenderThreadHandle> {
    let (tx, rx) = mpsc::unbounded_channel();
    let wakeup = Arc::new(Notify::new());
    let notified = Arc::clone(&wakeup);
    let thread = std::thread::Builder::new()
        .name("renderer".into())
        .spawn(move || run(renderer, state, rx, notified))?;
    Ok(RenderThreadHandle {
        mailbox: tx,
        wakeup,
        thread: Some(thread),
    })
}

fn run<A: GraphicsApi>(
    renderer: Arc<Renderer<A>>,
    state: SharedState,
    mailbox: UnboundedReceiver<RendererMessage>,
    wakeup: Arc<Notify>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("render thread runtime failed to start: {e}");
            return;
        }
    };
    if let Err(e) = renderer
        .thread_enter()
        .and_then(|()| renderer.finalize_surface_init())
    {
        log::error!("render thread setup failed: {e}");
        return;
    }
    log::debug!("render thread started");
    runtime.block_on(frame_loop(&renderer, &state, mailbox, &wakeup));
    renderer.thread_exit();
    log::debug!("render thread stopped");
}

fn redraw<A: GraphicsApi>(renderer: &Renderer<A>, state: &SharedState) {
    if let Err(e) = renderer.update_frame(state) {
        log::warn!("frame update failed: {e}");
    }
    if let Err(e) = renderer.draw_frame(false) {
        log::warn!("frame draw failed: {e}");
    }
}

async fn frame_loop<A: GraphicsApi>(
    renderer: &Renderer<A>,
    state: &SharedState,
    mut mailbox: UnboundedReceiver<RendererMessage>,
    wakeup: &Notify,
) {
    renderer.loop_enter();
    let mut focused = true;

    let mut blink = tokio::time::interval_at(
        Instant::now() + CURSOR_BLINK_INTERVAL,
        CURSOR_BLINK_INTERVAL,
    );
    blink.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut draw = tokio::time::interval(DRAW_INTERVAL);
    draw.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // First frame
    redraw(renderer, state);

    loop {
        let animating = renderer.animating();
        tokio::select! {
            msg = mailbox.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    RendererMessage::Quit => break,
                    RendererMessage::Focus(f) => {
                        focused = f;
                        renderer.set_focus(f);
                        renderer.set_cursor_blink_visible(true);
                        blink.reset();
                    }
                    RendererMessage::Visible(v) => renderer.set_visible(v),
                    RendererMessage::ScreenSize(size) => renderer.set_screen_size(size),
                    RendererMessage::ChangeConfig(config) => renderer.change_config(*config),
                    RendererMessage::FontGrid(grid) => renderer.set_font_grid(grid),
                    RendererMessage::ResetCursorBlink => {
                        renderer.set_cursor_blink_visible(true);
                        blink.reset();
                    }
                }
                redraw(renderer, state);
            }
            () = wakeup.notified() => redraw(renderer, state),
            _ = blink.tick() => {
                if focused {
                    renderer.set_cursor_blink_visible(!renderer.cursor_blink_visible());
                    redraw(renderer, state);
                }
            }
            _ = draw.tick(), if animating => {
                if let Err(e) = renderer.draw_frame(false) {
                    log::warn!("frame draw failed: {e}");
                }
            }
        }
    }
    renderer.loop_exit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessApi;
    use crate::state;
    use termframe_fonts::BlockRasterizer;
    use termframe_terminal::Terminal;

    #[test]
    fn test_thread_draws_on_wakeup_and_quits() {
        let grid = SharedGrid::new(Box::new(BlockRasterizer::new(10, 20)));
        let screen = ScreenSize::new(104, 44);
        let renderer = Arc::new(
            Renderer::new(
                HeadlessApi::new(104, 44),
                grid,
                DerivedConfig::default(),
                screen,
            )
            .unwrap(),
        );
        let size = renderer.grid_size();
        let shared = state::shared(Terminal::new(size.columns, size.rows));

        let handle = spawn(Arc::clone(&renderer), Arc::clone(&shared)).unwrap();
        shared.lock().terminal.print_str("hi");
        handle.wakeup();
        assert!(handle.send(RendererMessage::Visible(true)));
        handle.join();

        assert!(!renderer.api().frames().is_empty());
        assert!(renderer.with_contents(|c| c.fg_row(0).len()) >= 2);
    }
}

//! Multi-buffered GPU frame resources.
//!
//! A [`SwapChain`] owns one [`FrameState`] per frame the backend allows in
//! flight ([`GraphicsApi::swap_chain_count`]) and a counting
//! [`Semaphore`] with that many permits. Taking a frame takes a permit; the
//! backend's completion callback gives it back. This is where GPU
//! backpressure turns into CPU backpressure.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use termframe_fonts::{Atlas, AtlasFormat};

use crate::api::{
    Buffer, BufferUsage, Filter, GraphicsApi, PixelFormat, TextureOptions, TextureRegion,
};
use crate::error::RenderError;
use crate::shader_types::{BgImageVertex, CellBg, CellText, ImageVertex, PostUniforms, Uniforms};

/// A counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    cond: Condvar,
    max: usize,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cond: Condvar::new(),
            max: permits,
        }
    }

    /// Block until a permit is available and take it.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.cond.wait(&mut permits);
        }
        *permits -= 1;
    }

    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Like [`Self::acquire`] but gives up after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.cond.wait_for(&mut permits, timeout).timed_out() {
                return false;
            }
        }
        *permits -= 1;
        true
    }

    pub fn release(&self) {
        let mut permits = self.permits.lock();
        if *permits >= self.max {
            log::warn!("semaphore released more times than acquired");
            return;
        }
        *permits += 1;
        self.cond.notify_one();
    }

    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}

fn atlas_options(format: AtlasFormat) -> TextureOptions {
    let pixel = match format {
        AtlasFormat::Grayscale => PixelFormat::R8,
        AtlasFormat::Bgra => PixelFormat::Bgra8,
    };
    TextureOptions::sampled(pixel, Filter::Nearest)
}

/// Ping-pong textures for custom post shaders.
pub struct PostTextures<A: GraphicsApi> {
    pub front: A::Texture,
    pub back: A::Texture,
    pub uniforms: Buffer<A, PostUniforms>,
}

impl<A: GraphicsApi> PostTextures<A> {
    fn new(api: &A, width: u32, height: u32) -> Result<Self, RenderError> {
        let opts = TextureOptions {
            format: PixelFormat::Target,
            filter: Filter::Linear,
            render_target: true,
        };
        Ok(Self {
            front: api.init_texture(opts, width, height, None)?,
            back: api.init_texture(opts, width, height, None)?,
            uniforms: Buffer::new(api, BufferUsage::Uniform, 1)?,
        })
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }
}

/// GPU resources for one in-flight frame.
pub struct FrameState<A: GraphicsApi> {
    pub uniforms: Buffer<A, Uniforms>,
    pub cells_bg: Buffer<A, CellBg>,
    pub cells: Buffer<A, CellText>,
    pub images: Buffer<A, ImageVertex>,

    pub grayscale: A::Texture,
    pub grayscale_modified: usize,
    pub color: A::Texture,
    pub color_modified: usize,

    pub bg_image_buffer: Buffer<A, BgImageVertex>,
    pub bg_image_buffer_modified: u64,

    pub target: A::Target,
    pub post: Option<PostTextures<A>>,
}

impl<A: GraphicsApi> FrameState<A> {
    pub fn new(api: &A, width: u32, height: u32) -> Result<Self, RenderError> {
        let grayscale_opts = atlas_options(AtlasFormat::Grayscale);
        let color_opts = atlas_options(AtlasFormat::Bgra);
        Ok(Self {
            uniforms: Buffer::new(api, BufferUsage::Uniform, 1)?,
            cells_bg: Buffer::new(api, BufferUsage::Storage, 1)?,
            cells: Buffer::new(api, BufferUsage::Vertex, 1)?,
            images: Buffer::new(api, BufferUsage::Vertex, 1)?,
            grayscale: api.init_texture(grayscale_opts, 1, 1, None)?,
            grayscale_modified: 0,
            color: api.init_texture(color_opts, 1, 1, None)?,
            color_modified: 0,
            bg_image_buffer: Buffer::new(api, BufferUsage::Vertex, 1)?,
            bg_image_buffer_modified: 0,
            target: api.init_target(width.max(1), height.max(1))?,
            post: None,
        })
    }

    /// Recreate size-dependent resources if the size changed.
    pub fn resize(&mut self, api: &A, width: u32, height: u32) -> Result<(), RenderError> {
        let (width, height) = (width.max(1), height.max(1));
        if api.target_size(&self.target) != (width, height) {
            self.target = api.init_target(width, height)?;
            if self.post.is_some() {
                self.post = Some(PostTextures::new(api, width, height)?);
            }
        }
        Ok(())
    }

    /// Create or drop the post-processing textures.
    pub fn set_post_enabled(&mut self, api: &A, enabled: bool) -> Result<(), RenderError> {
        match (enabled, self.post.is_some()) {
            (true, false) => {
                let (w, h) = api.target_size(&self.target);
                self.post = Some(PostTextures::new(api, w, h)?);
            }
            (false, true) => self.post = None,
            _ => {}
        }
        Ok(())
    }

    /// Upload both atlases if they changed since this slot last saw them.
    /// Callers hold the font grid's shared lock for the duration.
    pub fn sync_atlases(
        &mut self,
        api: &A,
        grayscale: &Atlas,
        color: &Atlas,
    ) -> Result<(), RenderError> {
        sync_atlas(api, &mut self.grayscale, &mut self.grayscale_modified, grayscale)?;
        sync_atlas(api, &mut self.color, &mut self.color_modified, color)?;
        Ok(())
    }
}

/// Returns whether anything was uploaded.
fn sync_atlas<A: GraphicsApi>(
    api: &A,
    texture: &mut A::Texture,
    last_modified: &mut usize,
    atlas: &Atlas,
) -> Result<bool, RenderError> {
    if atlas.modified <= *last_modified {
        return Ok(false);
    }
    let size = atlas.size();
    if api.texture_size(texture) != (size, size) {
        log::debug!("recreating {:?} atlas texture at {size}x{size}", atlas.format());
        *texture = api.init_texture(atlas_options(atlas.format()), size, size, Some(atlas.data()))?;
    } else {
        api.write_texture(texture, TextureRegion::full(size, size), atlas.data())?;
    }
    *last_modified = atlas.modified;
    Ok(true)
}

/// A fixed ring of [`FrameState`]s gated by a semaphore.
pub struct SwapChain<A: GraphicsApi> {
    frames: Vec<FrameState<A>>,
    /// Index of the frame handed out last
    frame_index: usize,
    semaphore: Arc<Semaphore>,
}

impl<A: GraphicsApi> SwapChain<A> {
    pub fn new(api: &A, width: u32, height: u32) -> Result<Self, RenderError> {
        Self::with_count(api, api.swap_chain_count(), width, height)
    }

    /// A chain of `count` frames, at least one.
    pub fn with_count(api: &A, count: usize, width: u32, height: u32) -> Result<Self, RenderError> {
        let count = count.max(1);
        let frames = (0..count)
            .map(|_| FrameState::new(api, width, height))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            frames,
            frame_index: count - 1,
            semaphore: Arc::new(Semaphore::new(count)),
        })
    }

    pub fn buf_count(&self) -> usize {
        self.frames.len()
    }

    /// Wait for a free slot and return it.
    pub fn next_frame(&mut self) -> &mut FrameState<A> {
        self.semaphore.acquire();
        self.advance()
    }

    /// Return a free slot without waiting, if there is one.
    pub fn try_next_frame(&mut self) -> Option<&mut FrameState<A>> {
        if !self.semaphore.try_acquire() {
            return None;
        }
        Some(self.advance())
    }

    fn advance(&mut self) -> &mut FrameState<A> {
        self.frame_index = (self.frame_index + 1) % self.frames.len();
        &mut self.frames[self.frame_index]
    }

    /// The frame handed out last.
    pub fn current(&self) -> &FrameState<A> {
        &self.frames[self.frame_index]
    }

    /// Give back a slot taken with [`Self::next_frame`].
    pub fn release_frame(&self) {
        self.semaphore.release();
    }

    /// Handle for completion callbacks to release slots from any thread.
    pub fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.semaphore)
    }

    /// Block until no frame is in flight.
    pub fn drain(&self) {
        for _ in 0..self.frames.len() {
            self.semaphore.acquire();
        }
        for _ in 0..self.frames.len() {
            self.semaphore.release();
        }
    }

    pub fn frames_mut(&mut self) -> impl Iterator<Item = &mut FrameState<A>> {
        self.frames.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::backend::headless::HeadlessApi;

    #[test]
    fn test_semaphore_bounds_and_release() {
        let sem = Semaphore::new(2);
        assert!(sem.try_acquire());
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        assert!(!sem.acquire_timeout(Duration::from_millis(10)));
        sem.release();
        assert!(sem.try_acquire());
    }

    #[test]
    fn test_release_beyond_max_is_ignored() {
        let sem = Semaphore::new(1);
        sem.release();
        assert_eq!(sem.available(), 1);
    }

    #[test]
    fn test_next_frame_blocks_until_release() {
        let api = HeadlessApi::new(64, 32);
        let mut chain = SwapChain::new(&api, 64, 32).unwrap();
        let n = chain.buf_count();
        for _ in 0..n {
            assert!(chain.try_next_frame().is_some());
        }
        assert!(chain.try_next_frame().is_none());

        let released = Arc::new(AtomicBool::new(false));
        let sem = chain.semaphore();
        let flag = Arc::clone(&released);
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
            sem.release();
        });

        let start = Instant::now();
        chain.next_frame();
        assert!(released.load(Ordering::SeqCst));
        assert!(start.elapsed() >= Duration::from_millis(40));
        releaser.join().unwrap();
    }

    #[test]
    fn test_three_slots_then_block() {
        let api = HeadlessApi::new(64, 32).with_swap_chain_count(3);
        let mut chain = SwapChain::new(&api, 64, 32).unwrap();
        assert_eq!(chain.buf_count(), 3);

        let mut targets = Vec::new();
        for _ in 0..3 {
            let frame = chain.try_next_frame().expect("a free slot");
            targets.push(frame.target.id());
        }
        assert!(chain.try_next_frame().is_none());
        targets.dedup();
        assert_eq!(targets.len(), 3, "each slot has its own target");

        let sem = chain.semaphore();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            sem.release();
        });
        let start = Instant::now();
        let fourth = chain.next_frame().target.id();
        assert!(start.elapsed() >= Duration::from_millis(40));
        releaser.join().unwrap();

        // Round robin: the fourth frame reuses the first slot
        assert_eq!(fourth, targets[0]);
        assert_eq!(chain.current().target.id(), targets[0]);
    }

    #[test]
    fn test_with_count_overrides_backend_depth() {
        let api = HeadlessApi::new(8, 8);
        let chain = SwapChain::with_count(&api, 2, 8, 8).unwrap();
        assert_eq!(chain.buf_count(), 2);
        let chain = SwapChain::with_count(&api, 0, 8, 8).unwrap();
        assert_eq!(chain.buf_count(), 1);
    }

    #[test]
    fn test_atlas_sync_tracks_each_slot() {
        let api = HeadlessApi::new(64, 32);
        let mut a = FrameState::new(&api, 64, 32).unwrap();
        let mut b = FrameState::new(&api, 64, 32).unwrap();
        let mut gray = Atlas::new(16, AtlasFormat::Grayscale);
        let color = Atlas::new(16, AtlasFormat::Bgra);

        a.sync_atlases(&api, &gray, &color).unwrap();
        let writes = api.texture_writes();
        // Unchanged atlas: nothing re-uploaded for the same slot
        a.sync_atlases(&api, &gray, &color).unwrap();
        assert_eq!(api.texture_writes(), writes);

        // A lagging slot still catches up
        b.sync_atlases(&api, &gray, &color).unwrap();
        assert_eq!(b.grayscale_modified, gray.modified);

        gray.modified += 1;
        a.sync_atlases(&api, &gray, &color).unwrap();
        assert_eq!(a.grayscale_modified, gray.modified);
        assert_eq!(api.texture_size(&a.grayscale), (16, 16));
    }
}

//! A CPU-only backend that records what would have been drawn.
//!
//! Textures and buffers keep their bytes in memory. Every frame is logged as
//! a [`FrameRecord`] listing its render passes and steps in submission order,
//! so tests can assert on compositing order without a GPU.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::api::{
    BufferUsage, CompletionCallback, Draw, Frame, GraphicsApi, Health, PassTarget, PipelineKind,
    RenderPass, RenderPassDesc, Step, TextureOptions, TextureRegion,
};
use crate::backend::transpile;
use crate::error::RenderError;

pub struct HeadlessTarget {
    id: u64,
    width: u32,
    height: u32,
}

impl HeadlessTarget {
    pub fn id(&self) -> u64 {
        self.id
    }
}

pub struct HeadlessTexture {
    id: u64,
    opts: TextureOptions,
    width: u32,
    height: u32,
    data: Mutex<Vec<u8>>,
}

impl HeadlessTexture {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn options(&self) -> TextureOptions {
        self.opts
    }

    /// Copy of the texture's bytes.
    pub fn pixels(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

pub struct HeadlessBuffer {
    id: u64,
    usage: BufferUsage,
    data: Mutex<Vec<u8>>,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Copy of the buffer's bytes.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

/// What a pipeline draws.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineLabel {
    Kind(PipelineKind),
    /// A custom post shader, by name
    Post(String),
}

pub struct HeadlessPipeline {
    label: PipelineLabel,
}

impl HeadlessPipeline {
    pub fn label(&self) -> &PipelineLabel {
        &self.label
    }
}

/// Where a recorded pass drew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Target(u64),
    Texture(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub pipeline: PipelineLabel,
    pub uniforms: Option<u64>,
    pub buffers: Vec<u64>,
    pub textures: Vec<u64>,
    pub draw: Draw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassRecord {
    pub attachment: Attachment,
    pub clear: Option<[f32; 4]>,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    /// Target the frame was begun on
    pub target: u64,
    pub passes: Vec<PassRecord>,
    pub sync: bool,
}

impl FrameRecord {
    /// Every step of the frame in submission order.
    pub fn steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.passes.iter().flat_map(|p| p.steps.iter())
    }
}

/// Something handed to [`GraphicsApi::present`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Target(u64),
    Last,
}

#[derive(Default)]
struct Log {
    frames: Vec<FrameRecord>,
    presents: Vec<Presented>,
}

/// How far the surface has been brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceStage {
    #[default]
    Detached,
    Attached,
    Configured,
}

pub struct HeadlessApi {
    next_id: AtomicU64,
    surface: Mutex<(u32, u32)>,
    stage: Mutex<SurfaceStage>,
    /// Every vsync setting applied, in order
    vsync: Mutex<Vec<bool>>,
    log: Arc<Mutex<Log>>,
    health: Mutex<Health>,
    deferred: AtomicBool,
    pending: Mutex<Vec<(CompletionCallback, Health)>>,
    fail_textures: AtomicBool,
    texture_writes: AtomicUsize,
    swap_chain_count: usize,
}

impl HeadlessApi {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            surface: Mutex::new((width, height)),
            stage: Mutex::default(),
            vsync: Mutex::default(),
            log: Arc::default(),
            health: Mutex::new(Health::Healthy),
            deferred: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            fail_textures: AtomicBool::new(false),
            texture_writes: AtomicUsize::new(0),
            swap_chain_count: Self::SWAP_CHAIN_COUNT,
        }
    }

    /// Allow `count` frames in flight instead of one.
    pub fn with_swap_chain_count(mut self, count: usize) -> Self {
        self.swap_chain_count = count.max(1);
        self
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Change the size reported by [`GraphicsApi::surface_size`].
    pub fn resize_surface(&self, width: u32, height: u32) {
        *self.surface.lock() = (width, height);
    }

    /// Health reported for frames completed from now on.
    pub fn set_health(&self, health: Health) {
        *self.health.lock() = health;
    }

    /// Hold completion callbacks until [`Self::drain_completions`].
    pub fn set_deferred(&self, deferred: bool) {
        self.deferred.store(deferred, Ordering::SeqCst);
    }

    /// Run held completion callbacks in submission order. Returns how many ran.
    pub fn drain_completions(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        let n = pending.len();
        for (callback, health) in pending {
            callback(health);
        }
        n
    }

    /// Make texture creation fail, as a lost device would.
    pub fn fail_textures(&self, fail: bool) {
        self.fail_textures.store(fail, Ordering::SeqCst);
    }

    /// Number of texture uploads so far, counting creations with initial data.
    pub fn texture_writes(&self) -> usize {
        self.texture_writes.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<FrameRecord> {
        self.log.lock().frames.clone()
    }

    pub fn take_frames(&self) -> Vec<FrameRecord> {
        std::mem::take(&mut self.log.lock().frames)
    }

    pub fn presents(&self) -> Vec<Presented> {
        self.log.lock().presents.clone()
    }

    pub fn surface_stage(&self) -> SurfaceStage {
        *self.stage.lock()
    }

    pub fn vsync_changes(&self) -> Vec<bool> {
        self.vsync.lock().clone()
    }
}

fn check_len(
    expected: usize,
    actual: usize,
    width: u32,
    height: u32,
) -> Result<(), RenderError> {
    if expected != actual {
        return Err(RenderError::texture(
            width,
            height,
            format!("expected {expected} bytes, got {actual}"),
        ));
    }
    Ok(())
}

impl GraphicsApi for HeadlessApi {
    type Target = HeadlessTarget;
    type Texture = HeadlessTexture;
    type Buffer = HeadlessBuffer;
    type Pipeline = HeadlessPipeline;
    type Frame<'a> = HeadlessFrame<'a>;

    const SWAP_CHAIN_COUNT: usize = 1;
    const CUSTOM_SHADER_Y_IS_DOWN: bool = false;

    fn init_target(&self, width: u32, height: u32) -> Result<HeadlessTarget, RenderError> {
        Ok(HeadlessTarget {
            id: self.next_id(),
            width,
            height,
        })
    }

    fn target_size(&self, target: &HeadlessTarget) -> (u32, u32) {
        (target.width, target.height)
    }

    fn init_texture(
        &self,
        opts: TextureOptions,
        width: u32,
        height: u32,
        data: Option<&[u8]>,
    ) -> Result<HeadlessTexture, RenderError> {
        if self.fail_textures.load(Ordering::SeqCst) {
            return Err(RenderError::texture(width, height, "texture creation disabled"));
        }
        let depth = opts.format.depth().unwrap_or(4);
        let len = width as usize * height as usize * depth;
        let bytes = match data {
            Some(data) => {
                check_len(len, data.len(), width, height)?;
                self.texture_writes.fetch_add(1, Ordering::SeqCst);
                data.to_vec()
            }
            None => vec![0; len],
        };
        Ok(HeadlessTexture {
            id: self.next_id(),
            opts,
            width,
            height,
            data: Mutex::new(bytes),
        })
    }

    fn write_texture(
        &self,
        texture: &HeadlessTexture,
        region: TextureRegion,
        data: &[u8],
    ) -> Result<(), RenderError> {
        if region.x + region.width > texture.width || region.y + region.height > texture.height {
            return Err(RenderError::texture(
                texture.width,
                texture.height,
                format!("region {region:?} out of bounds"),
            ));
        }
        let depth = texture.opts.format.depth().unwrap_or(4);
        let row_len = region.width as usize * depth;
        check_len(
            row_len * region.height as usize,
            data.len(),
            region.width,
            region.height,
        )?;

        let stride = texture.width as usize * depth;
        let mut pixels = texture.data.lock();
        for (row, src) in data.chunks_exact(row_len.max(1)).enumerate() {
            let start = (region.y as usize + row) * stride + region.x as usize * depth;
            pixels[start..start + row_len].copy_from_slice(src);
        }
        self.texture_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn texture_size(&self, texture: &HeadlessTexture) -> (u32, u32) {
        (texture.width, texture.height)
    }

    fn init_buffer(&self, usage: BufferUsage, size: u64) -> Result<HeadlessBuffer, RenderError> {
        let mut data = Vec::new();
        data.try_reserve_exact(size as usize)?;
        data.resize(size as usize, 0);
        Ok(HeadlessBuffer {
            id: self.next_id(),
            usage,
            data: Mutex::new(data),
        })
    }

    fn write_buffer(
        &self,
        buffer: &HeadlessBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), RenderError> {
        let mut bytes = buffer.data.lock();
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(RenderError::Buffer(format!(
                "write of {} bytes at {offset} overflows {} byte buffer",
                data.len(),
                bytes.len()
            )));
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn init_pipeline(&self, kind: PipelineKind) -> Result<HeadlessPipeline, RenderError> {
        Ok(HeadlessPipeline {
            label: PipelineLabel::Kind(kind),
        })
    }

    fn init_post_pipeline(&self, name: &str, source: &str) -> Result<HeadlessPipeline, RenderError> {
        // Compile anyway so broken shaders fail here like they would on a GPU
        transpile::glsl_to_wgsl(name, source)?;
        Ok(HeadlessPipeline {
            label: PipelineLabel::Post(name.to_string()),
        })
    }

    fn begin_frame<'a>(&'a self, target: &'a HeadlessTarget) -> Result<HeadlessFrame<'a>, RenderError> {
        Ok(HeadlessFrame {
            api: self,
            target: target.id,
            passes: Vec::new(),
        })
    }

    fn present(&self, target: &HeadlessTarget) -> Result<(), RenderError> {
        self.log.lock().presents.push(Presented::Target(target.id));
        Ok(())
    }

    fn present_last_target(&self) -> Result<(), RenderError> {
        self.log.lock().presents.push(Presented::Last);
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        *self.surface.lock()
    }

    fn swap_chain_count(&self) -> usize {
        self.swap_chain_count
    }

    fn surface_init(&self) -> Result<(), RenderError> {
        let mut stage = self.stage.lock();
        if *stage == SurfaceStage::Detached {
            *stage = SurfaceStage::Attached;
        }
        Ok(())
    }

    fn finalize_surface_init(&self) -> Result<(), RenderError> {
        // Offscreen until attached
        let mut stage = self.stage.lock();
        if *stage == SurfaceStage::Attached {
            *stage = SurfaceStage::Configured;
        }
        Ok(())
    }

    fn set_vsync(&self, vsync: bool) {
        self.vsync.lock().push(vsync);
    }
}

pub struct HeadlessFrame<'a> {
    api: &'a HeadlessApi,
    target: u64,
    passes: Vec<PassRecord>,
}

impl Frame<HeadlessApi> for HeadlessFrame<'_> {
    type Pass<'p>
        = HeadlessPass<'p>
    where
        Self: 'p;

    fn render_pass<'p>(&'p mut self, desc: RenderPassDesc<'_, HeadlessApi>) -> HeadlessPass<'p> {
        let attachment = match desc.target {
            PassTarget::Target(t) => Attachment::Target(t.id),
            PassTarget::Texture(t) => Attachment::Texture(t.id),
        };
        HeadlessPass {
            passes: &mut self.passes,
            record: Some(PassRecord {
                attachment,
                clear: desc.clear,
                steps: Vec::new(),
            }),
        }
    }

    fn complete(self, sync: bool, on_complete: CompletionCallback) {
        self.api.log.lock().frames.push(FrameRecord {
            target: self.target,
            passes: self.passes,
            sync,
        });
        let health = *self.api.health.lock();
        if self.api.deferred.load(Ordering::SeqCst) && !sync {
            self.api.pending.lock().push((on_complete, health));
        } else {
            on_complete(health);
        }
    }
}

/// Pushes its record to the frame when completed or dropped.
pub struct HeadlessPass<'p> {
    passes: &'p mut Vec<PassRecord>,
    record: Option<PassRecord>,
}

impl RenderPass<HeadlessApi> for HeadlessPass<'_> {
    fn step(&mut self, step: Step<'_, HeadlessApi>) {
        let Some(record) = self.record.as_mut() else {
            return;
        };
        record.steps.push(StepRecord {
            pipeline: step.pipeline.label.clone(),
            uniforms: step.uniforms.map(|b| b.id),
            buffers: step.buffers.iter().map(|b| b.id).collect(),
            textures: step.textures.iter().map(|t| t.id).collect(),
            draw: step.draw,
        });
    }

    fn complete(self) {}
}

impl Drop for HeadlessPass<'_> {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            self.passes.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Filter, PixelFormat};

    #[test]
    fn test_write_texture_sub_region() {
        let api = HeadlessApi::new(8, 8);
        let tex = api
            .init_texture(TextureOptions::sampled(PixelFormat::R8, Filter::Nearest), 4, 4, None)
            .unwrap();
        api.write_texture(
            &tex,
            TextureRegion {
                x: 1,
                y: 2,
                width: 2,
                height: 2,
            },
            &[1, 2, 3, 4],
        )
        .unwrap();
        let px = tex.pixels();
        assert_eq!(&px[9..11], &[1, 2]);
        assert_eq!(&px[13..15], &[3, 4]);
        assert_eq!(px.iter().filter(|&&b| b != 0).count(), 4);
    }

    #[test]
    fn test_out_of_bounds_writes_fail() {
        let api = HeadlessApi::new(8, 8);
        let buf = api.init_buffer(BufferUsage::Vertex, 4).unwrap();
        assert!(api.write_buffer(&buf, 2, &[0; 4]).is_err());

        let tex = api
            .init_texture(TextureOptions::sampled(PixelFormat::Rgba8, Filter::Linear), 2, 2, None)
            .unwrap();
        let region = TextureRegion::full(3, 1);
        assert!(api.write_texture(&tex, region, &[0; 12]).is_err());
    }

    #[test]
    fn test_passes_are_recorded_in_order() {
        let api = HeadlessApi::new(8, 8);
        let target = api.init_target(8, 8).unwrap();
        let bg = api.init_pipeline(PipelineKind::BgColor).unwrap();
        let text = api.init_pipeline(PipelineKind::CellText).unwrap();

        let mut frame = api.begin_frame(&target).unwrap();
        {
            let mut pass = frame.render_pass(RenderPassDesc {
                target: PassTarget::Target(&target),
                clear: Some([0.0; 4]),
            });
            for pipeline in [&bg, &text] {
                pass.step(Step {
                    pipeline,
                    uniforms: None,
                    buffers: &[],
                    textures: &[],
                    draw: Draw::FULL_SCREEN,
                });
            }
            pass.complete();
        }
        frame.complete(false, Box::new(|_| {}));

        let frames = api.frames();
        let labels: Vec<_> = frames[0].steps().map(|s| s.pipeline.clone()).collect();
        assert_eq!(
            labels,
            vec![
                PipelineLabel::Kind(PipelineKind::BgColor),
                PipelineLabel::Kind(PipelineKind::CellText)
            ]
        );
        assert_eq!(frames[0].passes[0].attachment, Attachment::Target(target.id()));
    }

    #[test]
    fn test_deferred_completion_waits_for_drain() {
        let api = HeadlessApi::new(8, 8);
        api.set_deferred(true);
        api.set_health(Health::Unhealthy);
        let target = api.init_target(8, 8).unwrap();

        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let frame = api.begin_frame(&target).unwrap();
        frame.complete(false, Box::new(move |h| *slot.lock() = Some(h)));
        assert!(seen.lock().is_none());

        assert_eq!(api.drain_completions(), 1);
        assert_eq!(*seen.lock(), Some(Health::Unhealthy));
    }

    #[test]
    fn test_post_pipeline_rejects_bad_glsl() {
        let api = HeadlessApi::new(8, 8);
        assert!(api.init_post_pipeline("bad", "not glsl at all").is_err());
    }
}

//! The wgpu backend.
//!
//! Frames render into offscreen `Bgra8Unorm` targets. When a surface is
//! attached and configured, presenting blits the target onto the surface
//! texture; otherwise the target is kept as the last presented frame and
//! can be read back with [`WgpuApi::read_target`].
//!
//! A surface passed to [`WgpuApi::with_surface`] stays pending until
//! [`GraphicsApi::surface_init`] attaches it and
//! [`GraphicsApi::finalize_surface_init`] configures it.

mod pipelines;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::api::{
    BufferUsage, CompletionCallback, Filter, Frame, GraphicsApi, Health, PassTarget, PipelineKind,
    PixelFormat, RenderPass, RenderPassDesc, Step, TextureOptions, TextureRegion,
};
use crate::backend::transpile;
use crate::error::RenderError;

pub use pipelines::WgpuPipeline;
use pipelines::BlitPipeline;

/// Format of offscreen targets and post-processing textures.
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

#[derive(Debug, Clone, Copy)]
pub struct WgpuOptions {
    pub power_preference: wgpu::PowerPreference,
    pub vsync: bool,
}

impl Default for WgpuOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::default(),
            vsync: true,
        }
    }
}

pub struct WgpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    depth: u32,
}

pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
}

/// A surface created for adapter selection but not yet attached.
struct PendingSurface {
    surface: wgpu::Surface<'static>,
    caps: wgpu::SurfaceCapabilities,
}

struct SurfaceState {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    present_modes: Vec<wgpu::PresentMode>,
    blit: BlitPipeline,
    configured: bool,
}

impl SurfaceState {
    fn configure(&mut self, device: &wgpu::Device) {
        self.surface.configure(device, &self.config);
        self.configured = true;
    }
}

fn present_mode(vsync: bool, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::Fifo
    } else if available.contains(&wgpu::PresentMode::Mailbox) {
        wgpu::PresentMode::Mailbox
    } else if available.contains(&wgpu::PresentMode::Immediate) {
        wgpu::PresentMode::Immediate
    } else {
        wgpu::PresentMode::Fifo
    }
}

pub struct WgpuApi {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pending_surface: Mutex<Option<PendingSurface>>,
    surface: Mutex<Option<SurfaceState>>,
    vsync: AtomicBool,
    size: Mutex<(u32, u32)>,
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
    last_presented: Mutex<Option<wgpu::TextureView>>,
    /// Set by the device's error and loss callbacks
    faulted: Arc<AtomicBool>,
    /// Wakes the poller thread after each submission
    poll_tx: Mutex<Option<mpsc::UnboundedSender<()>>>,
}

impl WgpuApi {
    /// Create a backend without a surface.
    pub async fn new(width: u32, height: u32, options: WgpuOptions) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterNotFound)?;
        Self::from_adapter(&adapter, None, width, height, options).await
    }

    /// Create a backend presenting to `target` (usually a window).
    pub async fn with_surface(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        options: WgpuOptions,
    ) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(target)?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterNotFound)?;
        Self::from_adapter(&adapter, Some(surface), width, height, options).await
    }

    async fn from_adapter(
        adapter: &wgpu::Adapter,
        surface: Option<wgpu::Surface<'static>>,
        width: u32,
        height: u32,
        options: WgpuOptions,
    ) -> Result<Self, RenderError> {
        log::info!("using adapter {:?}", adapter.get_info());
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("termframe device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                ..Default::default()
            })
            .await?;

        let faulted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&faulted);
        device.on_uncaptured_error(Arc::new(move |e: wgpu::Error| {
            log::error!("wgpu error: {e}");
            flag.store(true, Ordering::SeqCst);
        }));
        let flag = Arc::clone(&faulted);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("device lost ({reason:?}): {message}");
            flag.store(true, Ordering::SeqCst);
        });

        let pending_surface = surface.map(|surface| PendingSurface {
            caps: surface.get_capabilities(adapter),
            surface,
        });

        let sampler = |name: &str, filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(name),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                ..Default::default()
            })
        };
        let nearest = sampler("nearest sampler", wgpu::FilterMode::Nearest);
        let linear = sampler("linear sampler", wgpu::FilterMode::Linear);

        Ok(Self {
            device,
            queue,
            pending_surface: Mutex::new(pending_surface),
            surface: Mutex::new(None),
            vsync: AtomicBool::new(options.vsync),
            size: Mutex::new((width, height)),
            nearest,
            linear,
            last_presented: Mutex::new(None),
            faulted,
            poll_tx: Mutex::new(None),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Follow a window resize.
    pub fn resize_surface(&self, width: u32, height: u32) {
        *self.size.lock() = (width, height);
        if let Some(state) = self.surface.lock().as_mut() {
            state.config.width = width.max(1);
            state.config.height = height.max(1);
            if state.configured {
                state.configure(&self.device);
            }
        }
    }

    fn sampler(&self, filter: Filter) -> &wgpu::Sampler {
        match filter {
            Filter::Nearest => &self.nearest,
            Filter::Linear => &self.linear,
        }
    }

    fn health(&self) -> Health {
        if self.faulted.load(Ordering::SeqCst) {
            Health::Unhealthy
        } else {
            Health::Healthy
        }
    }

    /// Ask the poller thread to drive completion callbacks.
    fn wake_poller(&self) {
        let mut tx = self.poll_tx.lock();
        if tx.is_none() {
            let (sender, mut receiver) = mpsc::unbounded_channel::<()>();
            let device = self.device.clone();
            let spawned = std::thread::Builder::new()
                .name("wgpu-poll".into())
                .spawn(move || {
                    while receiver.blocking_recv().is_some() {
                        if let Err(e) = device.poll(wgpu::PollType::wait_indefinitely()) {
                            log::warn!("device poll failed: {e}");
                        }
                    }
                });
            match spawned {
                Ok(_) => *tx = Some(sender),
                Err(e) => log::error!("failed to spawn wgpu poll thread: {e}"),
            }
        }
        if let Some(sender) = tx.as_ref()
            && sender.send(()).is_err()
        {
            *tx = None;
        }
    }

    fn blit_to_surface(&self, view: &wgpu::TextureView) -> Result<(), RenderError> {
        let mut guard = self.surface.lock();
        let Some(state) = guard.as_mut().filter(|state| state.configured) else {
            return Ok(());
        };
        let frame = match state.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(e @ (wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost)) => {
                state.configure(&self.device);
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit bind group"),
            layout: &state.blit.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.nearest),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blit encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("blit pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&state.blit.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..4, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    /// Copy a target back to CPU memory as RGBA.
    pub fn read_target(&self, target: &WgpuTarget) -> Result<image::RgbaImage, RenderError> {
        let size = target.texture.size();
        let (width, height) = (size.width, size.height);

        let bytes_per_pixel = 4u32;
        let unpadded_bytes_per_row = width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;
        let buffer_size = (padded_bytes_per_row * height) as u64;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            size,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, mut rx) = oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RenderError::Readback(format!("device poll failed: {e}")))?;
        rx.try_recv()
            .map_err(|e| RenderError::Readback(format!("failed to receive map result: {e}")))?
            .map_err(|e| RenderError::Readback(format!("failed to map buffer: {e:?}")))?;

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            let row_start = (y * padded_bytes_per_row) as usize;
            let row_end = row_start + unpadded_bytes_per_row as usize;
            // Targets are BGRA
            for px in data[row_start..row_end].chunks_exact(4) {
                pixels.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
            }
        }
        drop(data);
        output_buffer.unmap();

        image::RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::Readback("pixel buffer size mismatch".to_string()))
    }
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::R8 => wgpu::TextureFormat::R8Unorm,
        PixelFormat::Bgra8 | PixelFormat::Target => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

impl GraphicsApi for WgpuApi {
    type Target = WgpuTarget;
    type Texture = WgpuTexture;
    type Buffer = WgpuBuffer;
    type Pipeline = WgpuPipeline;
    type Frame<'a> = WgpuFrame<'a>;

    const SWAP_CHAIN_COUNT: usize = 3;
    const CUSTOM_SHADER_Y_IS_DOWN: bool = true;

    fn init_target(&self, width: u32, height: u32) -> Result<WgpuTarget, RenderError> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frame target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTarget { texture, view })
    }

    fn target_size(&self, target: &WgpuTarget) -> (u32, u32) {
        (target.texture.width(), target.texture.height())
    }

    fn init_texture(
        &self,
        opts: TextureOptions,
        width: u32,
        height: u32,
        data: Option<&[u8]>,
    ) -> Result<WgpuTexture, RenderError> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > limit || height > limit {
            return Err(RenderError::texture(
                width,
                height,
                format!("dimensions must be within 1..={limit}"),
            ));
        }
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if opts.render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(opts.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let texture = WgpuTexture {
            texture,
            view,
            depth: opts.format.depth().unwrap_or(4) as u32,
        };
        if let Some(data) = data {
            self.write_texture(&texture, TextureRegion::full(width, height), data)?;
        }
        Ok(texture)
    }

    fn write_texture(
        &self,
        texture: &WgpuTexture,
        region: TextureRegion,
        data: &[u8],
    ) -> Result<(), RenderError> {
        let expected = (region.width * region.height * texture.depth) as usize;
        if data.len() != expected {
            return Err(RenderError::texture(
                region.width,
                region.height,
                format!("expected {expected} bytes, got {}", data.len()),
            ));
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.width * texture.depth),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn texture_size(&self, texture: &WgpuTexture) -> (u32, u32) {
        (texture.texture.width(), texture.texture.height())
    }

    fn init_buffer(&self, usage: BufferUsage, size: u64) -> Result<WgpuBuffer, RenderError> {
        let usage = match usage {
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Storage => wgpu::BufferUsages::STORAGE,
        } | wgpu::BufferUsages::COPY_DST;
        // Buffer sizes must be multiples of 4
        let size = size.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if size > self.device.limits().max_buffer_size {
            return Err(RenderError::Buffer(format!("{size} bytes exceeds device limit")));
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("buffer"),
            size,
            usage,
            mapped_at_creation: false,
        });
        Ok(WgpuBuffer { buffer })
    }

    fn write_buffer(&self, buffer: &WgpuBuffer, offset: u64, data: &[u8]) -> Result<(), RenderError> {
        if offset + data.len() as u64 > buffer.buffer.size() {
            return Err(RenderError::Buffer(format!(
                "write of {} bytes at {offset} overflows {} byte buffer",
                data.len(),
                buffer.buffer.size()
            )));
        }
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(&buffer.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(data.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
            self.queue.write_buffer(&buffer.buffer, offset, &padded);
        }
        Ok(())
    }

    fn init_pipeline(&self, kind: PipelineKind) -> Result<WgpuPipeline, RenderError> {
        Ok(pipelines::create_pipeline(&self.device, kind, TARGET_FORMAT))
    }

    fn init_post_pipeline(&self, name: &str, source: &str) -> Result<WgpuPipeline, RenderError> {
        let wgsl = transpile::glsl_to_wgsl(name, source)?;
        log::debug!("transpiled post shader {name} ({} bytes of WGSL)", wgsl.len());
        Ok(pipelines::create_post_pipeline(
            &self.device,
            name,
            wgsl,
            TARGET_FORMAT,
        ))
    }

    fn begin_frame<'a>(&'a self, _target: &'a WgpuTarget) -> Result<WgpuFrame<'a>, RenderError> {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        Ok(WgpuFrame { api: self, encoder })
    }

    fn present(&self, target: &WgpuTarget) -> Result<(), RenderError> {
        *self.last_presented.lock() = Some(target.view.clone());
        self.blit_to_surface(&target.view)
    }

    fn present_last_target(&self) -> Result<(), RenderError> {
        let last = self.last_presented.lock().clone();
        match last {
            Some(view) => self.blit_to_surface(&view),
            None => Ok(()),
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        *self.size.lock()
    }

    fn surface_init(&self) -> Result<(), RenderError> {
        let Some(PendingSurface { surface, caps }) = self.pending_surface.lock().take() else {
            log::debug!("no surface to attach, rendering offscreen");
            return Ok(());
        };
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(TARGET_FORMAT);
        let alpha_mode = if caps
            .alpha_modes
            .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            caps.alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto)
        };
        let (width, height) = *self.size.lock();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: present_mode(self.vsync.load(Ordering::SeqCst), &caps.present_modes),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        log::info!(
            "surface attached: {format:?}, {:?}, {alpha_mode:?}",
            config.present_mode
        );
        *self.surface.lock() = Some(SurfaceState {
            surface,
            blit: BlitPipeline::new(&self.device, format),
            config,
            present_modes: caps.present_modes,
            configured: false,
        });
        Ok(())
    }

    fn finalize_surface_init(&self) -> Result<(), RenderError> {
        if let Some(state) = self.surface.lock().as_mut()
            && !state.configured
        {
            state.configure(&self.device);
            log::debug!(
                "surface configured at {}x{}",
                state.config.width,
                state.config.height
            );
        }
        Ok(())
    }

    fn set_vsync(&self, vsync: bool) {
        self.vsync.store(vsync, Ordering::SeqCst);
        let mut guard = self.surface.lock();
        let Some(state) = guard.as_mut() else {
            return;
        };
        let mode = present_mode(vsync, &state.present_modes);
        if mode == state.config.present_mode {
            return;
        }
        log::debug!("present mode {:?} -> {mode:?}", state.config.present_mode);
        state.config.present_mode = mode;
        if state.configured {
            state.configure(&self.device);
        }
    }

    fn display_unrealized(&self) {
        self.last_presented.lock().take();
    }
}

pub struct WgpuFrame<'a> {
    api: &'a WgpuApi,
    encoder: wgpu::CommandEncoder,
}

impl Frame<WgpuApi> for WgpuFrame<'_> {
    type Pass<'p>
        = WgpuPass<'p>
    where
        Self: 'p;

    fn render_pass<'p>(&'p mut self, desc: RenderPassDesc<'_, WgpuApi>) -> WgpuPass<'p> {
        let view = match desc.target {
            PassTarget::Target(t) => &t.view,
            PassTarget::Texture(t) => &t.view,
        };
        let load = match desc.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("frame pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        WgpuPass {
            api: self.api,
            pass,
        }
    }

    fn complete(self, sync: bool, on_complete: CompletionCallback) {
        let api = self.api;
        api.queue.submit(std::iter::once(self.encoder.finish()));
        let faulted = Arc::clone(&api.faulted);
        api.queue.on_submitted_work_done(move || {
            let health = if faulted.load(Ordering::SeqCst) {
                Health::Unhealthy
            } else {
                Health::Healthy
            };
            on_complete(health);
        });
        if sync {
            if let Err(e) = api.device.poll(wgpu::PollType::wait_indefinitely()) {
                log::warn!("device poll failed: {e}");
            }
        } else {
            api.wake_poller();
        }
        log::trace!("frame submitted, health {:?}", api.health());
    }
}

pub struct WgpuPass<'p> {
    api: &'p WgpuApi,
    pass: wgpu::RenderPass<'p>,
}

impl RenderPass<WgpuApi> for WgpuPass<'_> {
    fn step(&mut self, step: Step<'_, WgpuApi>) {
        let pipeline = step.pipeline;
        let bindings = pipeline.bindings;
        let Some(uniforms) = step.uniforms else {
            log::warn!("{} step without uniforms skipped", pipeline.name);
            return;
        };
        if step.buffers.len() != bindings.storage_buffers + bindings.vertex_buffers
            || step.textures.len() != bindings.textures
        {
            log::warn!(
                "{} step has {} buffers and {} textures, expected {:?}; skipped",
                pipeline.name,
                step.buffers.len(),
                step.textures.len(),
                bindings
            );
            return;
        }

        let (storage, vertex) = step.buffers.split_at(bindings.storage_buffers);
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniforms.buffer.as_entire_binding(),
        }];
        for buffer in storage {
            entries.push(wgpu::BindGroupEntry {
                binding: entries.len() as u32,
                resource: buffer.buffer.as_entire_binding(),
            });
        }
        for texture in step.textures {
            entries.push(wgpu::BindGroupEntry {
                binding: entries.len() as u32,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
        }
        if let Some(filter) = bindings.sampler {
            entries.push(wgpu::BindGroupEntry {
                binding: entries.len() as u32,
                resource: wgpu::BindingResource::Sampler(self.api.sampler(filter)),
            });
        }
        let bind_group = self.api.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} bind group", pipeline.name)),
            layout: &pipeline.layout,
            entries: &entries,
        });

        self.pass.set_pipeline(&pipeline.pipeline);
        self.pass.set_bind_group(0, &bind_group, &[]);
        for (slot, buffer) in vertex.iter().enumerate() {
            self.pass.set_vertex_buffer(slot as u32, buffer.buffer.slice(..));
        }
        let draw = step.draw;
        self.pass.draw(
            0..draw.vertex_count,
            draw.first_instance..draw.first_instance + draw.instance_count,
        );
    }

    fn complete(self) {
        drop(self.pass);
    }
}

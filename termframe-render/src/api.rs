//! The graphics API seam the generic renderer is written against.
//!
//! A backend provides targets, textures, untyped buffers, pipelines and a
//! per-frame context that opens render passes. The renderer never touches a
//! backend type directly; it only sequences [`Step`]s through this trait.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::error::RenderError;

/// Result of a frame as seen by the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Health {
    #[default]
    Healthy,
    Unhealthy,
}

/// Called once when a submitted frame finishes, possibly on another thread.
pub type CompletionCallback = Box<dyn FnOnce(Health) + Send + 'static>;

/// The fixed pipelines the renderer draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Flat background color over the whole target
    BgColor,
    /// Background image, positioned by a single `BgImageVertex`
    BgImage,
    /// Cell backgrounds read from a storage buffer, with padding extension
    CellBg,
    /// Instanced glyphs, decorations and cursor sprites
    CellText,
    /// Instanced image placements
    Image,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 5] = [
        PipelineKind::BgColor,
        PipelineKind::BgImage,
        PipelineKind::CellBg,
        PipelineKind::CellText,
        PipelineKind::Image,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PipelineKind::BgColor => "bg_color",
            PipelineKind::BgImage => "bg_image",
            PipelineKind::CellBg => "cell_bg",
            PipelineKind::CellText => "cell_text",
            PipelineKind::Image => "image",
        }
    }
}

/// Pixel layout of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// One byte of coverage per pixel
    R8,
    Bgra8,
    Rgba8,
    /// Whatever the backend renders targets in (custom shader ping-pong)
    Target,
}

impl PixelFormat {
    /// Bytes per pixel, `None` when backend defined.
    pub fn depth(self) -> Option<usize> {
        match self {
            PixelFormat::R8 => Some(1),
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => Some(4),
            PixelFormat::Target => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureOptions {
    pub format: PixelFormat,
    pub filter: Filter,
    /// The texture may be used as a render pass attachment
    pub render_target: bool,
}

impl TextureOptions {
    pub const fn sampled(format: PixelFormat, filter: Filter) -> Self {
        Self {
            format,
            filter,
            render_target: false,
        }
    }
}

/// Sub-rectangle of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TextureRegion {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Uniform,
    Vertex,
    Storage,
}

/// Where a render pass draws.
pub enum PassTarget<'a, A: GraphicsApi> {
    Target(&'a A::Target),
    Texture(&'a A::Texture),
}

pub struct RenderPassDesc<'a, A: GraphicsApi> {
    pub target: PassTarget<'a, A>,
    /// Clear to this color before drawing, or load existing contents
    pub clear: Option<[f32; 4]>,
}

/// Vertex and instance counts of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Draw {
    pub vertex_count: u32,
    pub instance_count: u32,
    /// Index of the first instance read from the instance buffer
    pub first_instance: u32,
}

impl Draw {
    /// A full-screen triangle strip.
    pub const FULL_SCREEN: Draw = Draw {
        vertex_count: 4,
        instance_count: 1,
        first_instance: 0,
    };

    /// One quad per instance.
    pub fn instanced(instance_count: u32) -> Self {
        Self {
            vertex_count: 4,
            instance_count,
            first_instance: 0,
        }
    }

    /// `count` quads starting at instance `first`.
    pub fn instance_range(first: u32, count: u32) -> Self {
        Self {
            vertex_count: 4,
            instance_count: count,
            first_instance: first,
        }
    }
}

/// One draw inside a render pass.
pub struct Step<'a, A: GraphicsApi> {
    pub pipeline: &'a A::Pipeline,
    pub uniforms: Option<&'a A::Buffer>,
    /// Storage buffers first, then vertex/instance buffers, in binding order
    pub buffers: &'a [&'a A::Buffer],
    pub textures: &'a [&'a A::Texture],
    pub draw: Draw,
}

/// An open render pass.
pub trait RenderPass<A: GraphicsApi> {
    fn step(&mut self, step: Step<'_, A>);

    /// Finish the pass. Dropping the pass without calling this is allowed.
    fn complete(self);
}

/// The per-frame context returned by [`GraphicsApi::begin_frame`].
pub trait Frame<A: GraphicsApi> {
    type Pass<'p>: RenderPass<A>
    where
        Self: 'p;

    fn render_pass<'p>(&'p mut self, desc: RenderPassDesc<'_, A>) -> Self::Pass<'p>;

    /// Submit the frame. `on_complete` runs once the GPU is done with it;
    /// `sync` asks the backend to wait for that before returning.
    fn complete(self, sync: bool, on_complete: CompletionCallback);
}

/// Capability contract a graphics backend provides.
pub trait GraphicsApi: Sized + Send + Sync + 'static {
    type Target: Send + Sync + 'static;
    type Texture: Send + Sync + 'static;
    /// Untyped GPU buffer; see [`Buffer`] for the typed wrapper
    type Buffer: Send + Sync + 'static;
    type Pipeline: Send + Sync + 'static;
    type Frame<'a>: Frame<Self>
    where
        Self: 'a;

    /// Number of frames that may be in flight at once.
    const SWAP_CHAIN_COUNT: usize;

    /// Whether custom shaders see y growing downwards in `fragCoord`.
    const CUSTOM_SHADER_Y_IS_DOWN: bool;

    fn init_target(&self, width: u32, height: u32) -> Result<Self::Target, RenderError>;

    fn target_size(&self, target: &Self::Target) -> (u32, u32);

    fn init_texture(
        &self,
        opts: TextureOptions,
        width: u32,
        height: u32,
        data: Option<&[u8]>,
    ) -> Result<Self::Texture, RenderError>;

    fn write_texture(
        &self,
        texture: &Self::Texture,
        region: TextureRegion,
        data: &[u8],
    ) -> Result<(), RenderError>;

    fn texture_size(&self, texture: &Self::Texture) -> (u32, u32);

    fn init_buffer(&self, usage: BufferUsage, size: u64) -> Result<Self::Buffer, RenderError>;

    fn write_buffer(
        &self,
        buffer: &Self::Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), RenderError>;

    fn init_pipeline(&self, kind: PipelineKind) -> Result<Self::Pipeline, RenderError>;

    /// Compile a Shadertoy-style GLSL post-processing shader.
    fn init_post_pipeline(&self, name: &str, source: &str)
    -> Result<Self::Pipeline, RenderError>;

    fn begin_frame<'a>(&'a self, target: &'a Self::Target)
    -> Result<Self::Frame<'a>, RenderError>;

    fn present(&self, target: &Self::Target) -> Result<(), RenderError>;

    /// Present whatever was presented last again.
    fn present_last_target(&self) -> Result<(), RenderError>;

    /// Size in pixels of the surface targets should match.
    fn surface_size(&self) -> (u32, u32);

    /// Frames in flight for this instance, [`Self::SWAP_CHAIN_COUNT`] unless
    /// the backend was configured otherwise.
    fn swap_chain_count(&self) -> usize {
        Self::SWAP_CHAIN_COUNT
    }

    /// Attach the presentation surface. Runs on the thread that owns the
    /// window, before the render thread starts.
    fn surface_init(&self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Configure the attached surface for presenting. Runs on the render
    /// thread once it is entered.
    fn finalize_surface_init(&self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Switch between vsynced and unsynced presentation.
    fn set_vsync(&self, _vsync: bool) {}

    fn thread_enter(&self) -> Result<(), RenderError> {
        Ok(())
    }

    fn thread_exit(&self) {}

    fn display_realized(&self) {}

    fn display_unrealized(&self) {}
}

// ============================================================================
// Typed buffers
// ============================================================================

/// A GPU buffer of `T` that grows on demand.
pub struct Buffer<A: GraphicsApi, T: Pod> {
    raw: A::Buffer,
    usage: BufferUsage,
    capacity: usize,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

fn byte_len<T>(count: usize) -> u64 {
    (count * std::mem::size_of::<T>()) as u64
}

impl<A: GraphicsApi, T: Pod> Buffer<A, T> {
    pub fn new(api: &A, usage: BufferUsage, capacity: usize) -> Result<Self, RenderError> {
        let capacity = capacity.max(1);
        Ok(Self {
            raw: api.init_buffer(usage, byte_len::<T>(capacity))?,
            usage,
            capacity,
            len: 0,
            _marker: PhantomData,
        })
    }

    /// Make room for at least `len` elements, discarding contents on growth.
    fn reserve(&mut self, api: &A, len: usize) -> Result<(), RenderError> {
        if len <= self.capacity {
            return Ok(());
        }
        let capacity = len.next_power_of_two().max(self.capacity * 2);
        log::debug!(
            "growing {:?} buffer {} -> {} elements",
            self.usage,
            self.capacity,
            capacity
        );
        self.raw = api.init_buffer(self.usage, byte_len::<T>(capacity))?;
        self.capacity = capacity;
        Ok(())
    }

    /// Replace the contents with `data`.
    pub fn sync(&mut self, api: &A, data: &[T]) -> Result<(), RenderError> {
        self.reserve(api, data.len())?;
        if !data.is_empty() {
            api.write_buffer(&self.raw, 0, bytemuck::cast_slice(data))?;
        }
        self.len = data.len();
        Ok(())
    }

    /// Replace the contents with the concatenation of `slices`.
    pub fn sync_from_slices(&mut self, api: &A, slices: &[&[T]]) -> Result<(), RenderError> {
        let total: usize = slices.iter().map(|s| s.len()).sum();
        self.reserve(api, total)?;
        let mut offset = 0usize;
        for slice in slices.iter().filter(|s| !s.is_empty()) {
            api.write_buffer(&self.raw, byte_len::<T>(offset), bytemuck::cast_slice(slice))?;
            offset += slice.len();
        }
        self.len = total;
        Ok(())
    }

    pub fn raw(&self) -> &A::Buffer {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! Render pipeline creation for the wgpu backend.
//!
//! Every pipeline uses one bind group laid out as: uniforms at binding 0,
//! then storage buffers, then textures, then an optional sampler. Any
//! buffers of a step past the storage ones are bound as vertex buffers.

use wgpu::*;

use crate::api::{Filter, PipelineKind};
use crate::shader_types::{BgImageVertex, CellText, ImageVertex};

/// How a pipeline's bind group and vertex buffers are populated from a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bindings {
    pub storage_buffers: usize,
    pub textures: usize,
    pub vertex_buffers: usize,
    pub sampler: Option<Filter>,
}

pub struct WgpuPipeline {
    pub(super) name: String,
    pub(super) pipeline: RenderPipeline,
    pub(super) layout: BindGroupLayout,
    pub(super) bindings: Bindings,
}

fn uniform_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::VERTEX_FRAGMENT,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::VERTEX_FRAGMENT,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, filterable: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::VERTEX_FRAGMENT,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable },
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Sampler(SamplerBindingType::Filtering),
        count: None,
    }
}

/// Layout entries for `bindings`, with or without the leading uniform block.
fn layout_entries(bindings: Bindings, uniforms: bool) -> Vec<BindGroupLayoutEntry> {
    let mut entries = Vec::new();
    let mut next = 0u32;
    if uniforms {
        entries.push(uniform_entry(next));
        next += 1;
    }
    for _ in 0..bindings.storage_buffers {
        entries.push(storage_entry(next));
        next += 1;
    }
    // Atlases are read with textureLoad, everything else is sampled
    let filterable = bindings.sampler.is_some();
    for _ in 0..bindings.textures {
        entries.push(texture_entry(next, filterable));
        next += 1;
    }
    if bindings.sampler.is_some() {
        entries.push(sampler_entry(next));
    }
    entries
}

fn bindings_for(kind: PipelineKind) -> Bindings {
    match kind {
        PipelineKind::BgColor => Bindings {
            storage_buffers: 0,
            textures: 0,
            vertex_buffers: 0,
            sampler: None,
        },
        PipelineKind::BgImage => Bindings {
            storage_buffers: 0,
            textures: 1,
            vertex_buffers: 1,
            sampler: Some(Filter::Linear),
        },
        PipelineKind::CellBg => Bindings {
            storage_buffers: 1,
            textures: 0,
            vertex_buffers: 0,
            sampler: None,
        },
        PipelineKind::CellText => Bindings {
            storage_buffers: 1,
            textures: 2,
            vertex_buffers: 1,
            sampler: None,
        },
        PipelineKind::Image => Bindings {
            storage_buffers: 0,
            textures: 1,
            vertex_buffers: 1,
            sampler: Some(Filter::Linear),
        },
    }
}

fn vertex_layouts(kind: PipelineKind) -> Vec<VertexBufferLayout<'static>> {
    const BG_IMAGE_ATTRS: [VertexAttribute; 3] =
        vertex_attr_array![0 => Float32x4, 1 => Float32, 2 => Uint32];
    const CELL_TEXT_ATTRS: [VertexAttribute; 6] = vertex_attr_array![
        0 => Uint32x2,
        1 => Uint32x2,
        2 => Sint16x2,
        3 => Uint16x2,
        4 => Unorm8x4,
        5 => Uint8x4
    ];
    const IMAGE_ATTRS: [VertexAttribute; 4] =
        vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32x4, 3 => Float32x2];

    let instance = |stride: usize, attributes: &'static [VertexAttribute]| VertexBufferLayout {
        array_stride: stride as BufferAddress,
        step_mode: VertexStepMode::Instance,
        attributes,
    };

    match kind {
        PipelineKind::BgColor | PipelineKind::CellBg => Vec::new(),
        PipelineKind::BgImage => vec![instance(std::mem::size_of::<BgImageVertex>(), &BG_IMAGE_ATTRS)],
        PipelineKind::CellText => vec![instance(std::mem::size_of::<CellText>(), &CELL_TEXT_ATTRS)],
        PipelineKind::Image => vec![instance(std::mem::size_of::<ImageVertex>(), &IMAGE_ATTRS)],
    }
}

fn shader_source(kind: PipelineKind) -> ShaderModuleDescriptor<'static> {
    match kind {
        PipelineKind::BgColor => include_wgsl!("../../shaders/bg_color.wgsl"),
        PipelineKind::BgImage => include_wgsl!("../../shaders/bg_image.wgsl"),
        PipelineKind::CellBg => include_wgsl!("../../shaders/cell_bg.wgsl"),
        PipelineKind::CellText => include_wgsl!("../../shaders/cell_text.wgsl"),
        PipelineKind::Image => include_wgsl!("../../shaders/image.wgsl"),
    }
}

fn build(
    device: &Device,
    name: &str,
    shader: &ShaderModule,
    layout: &BindGroupLayout,
    buffers: &[VertexBufferLayout<'_>],
    format: TextureFormat,
    blend: Option<BlendState>,
) -> RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some(&format!("{name} pipeline layout")),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(&format!("{name} pipeline")),
        layout: Some(&pipeline_layout),
        vertex: VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers,
        },
        fragment: Some(FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(ColorTargetState {
                format,
                blend,
                write_mask: ColorWrites::ALL,
            })],
        }),
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Create one of the fixed pipelines rendering into `format`.
pub fn create_pipeline(device: &Device, kind: PipelineKind, format: TextureFormat) -> WgpuPipeline {
    let name = kind.label();
    let bindings = bindings_for(kind);
    let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some(&format!("{name} bind group layout")),
        entries: &layout_entries(bindings, true),
    });
    let shader = device.create_shader_module(shader_source(kind));
    // Backgrounds replace whatever was there; everything else blends over them
    let blend = match kind {
        PipelineKind::BgColor | PipelineKind::BgImage => None,
        _ => Some(BlendState::ALPHA_BLENDING),
    };
    let pipeline = build(
        device,
        name,
        &shader,
        &layout,
        &vertex_layouts(kind),
        format,
        blend,
    );
    WgpuPipeline {
        name: name.to_string(),
        pipeline,
        layout,
        bindings,
    }
}

/// Create a post-processing pipeline from already transpiled WGSL.
pub fn create_post_pipeline(
    device: &Device,
    name: &str,
    wgsl: String,
    format: TextureFormat,
) -> WgpuPipeline {
    let bindings = Bindings {
        storage_buffers: 0,
        textures: 1,
        vertex_buffers: 0,
        sampler: Some(Filter::Linear),
    };
    let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some(&format!("{name} bind group layout")),
        entries: &layout_entries(bindings, true),
    });
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some(name),
        source: ShaderSource::Wgsl(wgsl.into()),
    });
    let pipeline = build(device, name, &shader, &layout, &[], format, None);
    WgpuPipeline {
        name: name.to_string(),
        pipeline,
        layout,
        bindings,
    }
}

/// Pipeline copying a finished target onto the presentation surface.
pub struct BlitPipeline {
    pub pipeline: RenderPipeline,
    pub layout: BindGroupLayout,
}

impl BlitPipeline {
    pub fn new(device: &Device, format: TextureFormat) -> Self {
        let bindings = Bindings {
            storage_buffers: 0,
            textures: 1,
            vertex_buffers: 0,
            sampler: Some(Filter::Nearest),
        };
        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("blit bind group layout"),
            entries: &layout_entries(bindings, false),
        });
        let shader = device.create_shader_module(include_wgsl!("../../shaders/blit.wgsl"));
        let pipeline = build(device, "blit", &shader, &layout, &[], format, None);
        Self { pipeline, layout }
    }
}

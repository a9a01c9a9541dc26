//! Submitting frames.
//!
//! Compositing order inside the main pass, back to front:
//!
//! 1. background image over the background color (or the color alone)
//! 2. images below cell backgrounds
//! 3. cell backgrounds
//! 4. images between backgrounds and text
//! 5. glyphs, decorations and the cursor
//! 6. images above text
//!
//! With custom shaders the main pass renders into a texture and each shader
//! reads the previous output; the last one writes the frame's target.

use std::sync::Arc;

use super::{Inner, Pipelines, Renderer, post};
use crate::api::{
    CompletionCallback, Draw, Frame, GraphicsApi, PassTarget, RenderPass, RenderPassDesc, Step,
};
use crate::bg_image::BackgroundImage;
use crate::cell_contents::Contents;
use crate::error::RenderError;
use crate::image::{ImageState, Layer};
use crate::shader_types::{CellText, ImageVertex, PostUniforms, Uniforms};
use crate::swap_chain::FrameState;

const TRANSPARENT: [f32; 4] = [0.0; 4];

impl<A: GraphicsApi> Inner<A> {
    /// Center of the hovered cell in surface pixels, y down.
    fn mouse_px(&self) -> Option<[f32; 2]> {
        let mouse = self.mouse?;
        let (cw, ch) = (
            self.metrics.cell_width as f32,
            self.metrics.cell_height as f32,
        );
        Some([
            self.padding.left as f32 + (mouse.col as f32 + 0.5) * cw,
            self.padding.top as f32 + (mouse.row as f32 + 0.5) * ch,
        ])
    }
}

/// Copy everything a frame reads into its slot.
#[allow(clippy::too_many_arguments)]
fn sync_frame<A: GraphicsApi>(
    api: &A,
    frame: &mut FrameState<A>,
    surface: (u32, u32),
    uniforms: &Uniforms,
    contents: &Contents,
    images: &ImageState<A>,
    bg_image: &BackgroundImage<A>,
    grid: &termframe_fonts::SharedGrid,
    post: Option<PostUniforms>,
) -> Result<(), RenderError> {
    frame.resize(api, surface.0, surface.1)?;
    frame.set_post_enabled(api, post.is_some())?;

    frame.uniforms.sync(api, std::slice::from_ref(uniforms))?;
    frame.cells_bg.sync(api, contents.bg_cells())?;
    let lists: Vec<&[CellText]> = contents.fg_rows().iter().map(Vec::as_slice).collect();
    frame.cells.sync_from_slices(api, &lists)?;

    let vertices: Vec<ImageVertex> = images.placements().iter().map(|p| p.vertex()).collect();
    frame.images.sync(api, &vertices)?;

    grid.with_atlases(|gray, color| frame.sync_atlases(api, gray, color))?;

    if frame.bg_image_buffer_modified != bg_image.modified() {
        frame
            .bg_image_buffer
            .sync(api, std::slice::from_ref(bg_image.vertex()))?;
        frame.bg_image_buffer_modified = bg_image.modified();
    }

    if let (Some(textures), Some(u)) = (frame.post.as_mut(), post) {
        textures.uniforms.sync(api, &[u])?;
    }
    Ok(())
}

/// One step per placement of `layer` whose texture is ready.
fn image_steps<A: GraphicsApi, P: RenderPass<A>>(
    pass: &mut P,
    layer: Layer,
    frame: &FrameState<A>,
    images: &ImageState<A>,
    pipeline: &A::Pipeline,
) {
    let (offset, placements) = images.layer(layer);
    for (i, placement) in placements.iter().enumerate() {
        let Some(texture) = images.image(placement.image_id).and_then(|img| img.texture()) else {
            log::trace!("image {} not uploaded yet", placement.image_id);
            continue;
        };
        pass.step(Step {
            pipeline,
            uniforms: Some(frame.uniforms.raw()),
            buffers: &[frame.images.raw()],
            textures: &[texture],
            draw: Draw::instance_range((offset + i) as u32, 1),
        });
    }
}

/// Record every pass of a frame.
fn encode<A: GraphicsApi>(
    gpu: &mut A::Frame<'_>,
    frame: &FrameState<A>,
    pipelines: &Pipelines<A>,
    images: &ImageState<A>,
    bg_texture: Option<&A::Texture>,
) {
    let uniforms = Some(frame.uniforms.raw());
    let main = match &frame.post {
        Some(post) => PassTarget::Texture(&post.front),
        None => PassTarget::Target(&frame.target),
    };

    let mut pass = gpu.render_pass(RenderPassDesc {
        target: main,
        clear: Some(TRANSPARENT),
    });
    match bg_texture {
        Some(texture) if !frame.bg_image_buffer.is_empty() => pass.step(Step {
            pipeline: &pipelines.bg_image,
            uniforms,
            buffers: &[frame.bg_image_buffer.raw()],
            textures: &[texture],
            draw: Draw::FULL_SCREEN,
        }),
        _ => pass.step(Step {
            pipeline: &pipelines.bg_color,
            uniforms,
            buffers: &[],
            textures: &[],
            draw: Draw::FULL_SCREEN,
        }),
    }
    image_steps(&mut pass, Layer::Back, frame, images, &pipelines.image);
    pass.step(Step {
        pipeline: &pipelines.cell_bg,
        uniforms,
        buffers: &[frame.cells_bg.raw()],
        textures: &[],
        draw: Draw::FULL_SCREEN,
    });
    image_steps(&mut pass, Layer::Mid, frame, images, &pipelines.image);
    if !frame.cells.is_empty() {
        pass.step(Step {
            pipeline: &pipelines.cell_text,
            uniforms,
            buffers: &[frame.cells_bg.raw(), frame.cells.raw()],
            textures: &[&frame.grayscale, &frame.color],
            draw: Draw::instanced(frame.cells.len() as u32),
        });
    }
    image_steps(&mut pass, Layer::Front, frame, images, &pipelines.image);
    pass.complete();

    let Some(post) = &frame.post else {
        return;
    };
    let (mut source, mut dest) = (&post.front, &post.back);
    let count = pipelines.post.len();
    for (i, pipeline) in pipelines.post.iter().enumerate() {
        let target = if i + 1 == count {
            PassTarget::Target(&frame.target)
        } else {
            PassTarget::Texture(dest)
        };
        let mut pass = gpu.render_pass(RenderPassDesc {
            target,
            clear: Some(TRANSPARENT),
        });
        pass.step(Step {
            pipeline,
            uniforms: Some(post.uniforms.raw()),
            buffers: &[],
            textures: &[source],
            draw: Draw::FULL_SCREEN,
        });
        pass.complete();
        std::mem::swap(&mut source, &mut dest);
    }
}

impl<A: GraphicsApi> Renderer<A> {
    /// Draw the current contents into the next free frame and present it.
    ///
    /// Blocks while every frame is in flight. With `sync` the backend waits
    /// for the GPU before returning, and a frame is drawn even when nothing
    /// changed.
    pub fn draw_frame(&self, sync: bool) -> Result<(), RenderError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.apply_uniform_changes();
        inner.apply_resource_changes(&self.api);
        inner.bg_image.upload(&self.api);
        inner.images.upload(&self.api);
        let surface = (inner.screen.width, inner.screen.height);
        inner
            .bg_image
            .update_vertex(surface, &inner.config.bg_image);

        if inner.swap_chain.is_none() {
            log::trace!("display unrealized, frame skipped");
            return Ok(());
        }
        if !inner.visible && !sync {
            return Ok(());
        }
        let animating = !inner.pipelines.post.is_empty() && inner.config.animates(inner.focused);
        if !(inner.cells_rebuilt || inner.redraw || animating || sync) {
            return self.api.present_last_target();
        }

        let post_uniforms = if inner.pipelines.post.is_empty() {
            None
        } else {
            let mouse = inner.mouse_px();
            Some(post::uniforms(
                &mut inner.post_clock,
                surface,
                mouse,
                A::CUSTOM_SHADER_Y_IS_DOWN,
            ))
        };

        let Inner {
            grid,
            contents,
            uniforms,
            images,
            bg_image,
            swap_chain,
            pipelines,
            cells_rebuilt,
            redraw,
            ..
        } = &mut *inner;
        let Some(swap_chain) = swap_chain.as_mut() else {
            return Ok(());
        };
        let semaphore = swap_chain.semaphore();
        let frame = swap_chain.next_frame();

        let prepared = sync_frame(
            &self.api,
            frame,
            surface,
            uniforms,
            contents,
            images,
            bg_image,
            grid,
            post_uniforms,
        )
        .and_then(|()| self.api.begin_frame(&frame.target));
        let mut gpu = match prepared {
            Ok(gpu) => gpu,
            Err(e) => {
                // The frame never reached the backend
                semaphore.release();
                return Err(e);
            }
        };
        encode(&mut gpu, frame, pipelines, images, bg_image.texture());

        let health = Arc::clone(&self.health);
        let on_complete: CompletionCallback = Box::new(move |h| {
            semaphore.release();
            health.report(h);
        });
        gpu.complete(sync, on_complete);

        *cells_rebuilt = false;
        *redraw = false;
        self.api.present(&frame.target)
    }
}

//! The render device: what the scene traversal and the platform layer call.

use glam::{Vec2, Vec3, Vec4};

use crate::batch::{
    compute_pipeline_index, BatchState, DrawBatcher, FlushEnv, PolyFlags, SceneUniforms, SceneVertex,
};
use crate::config::{PostprocessConfig, RendererConfig};
use crate::descriptor::{DescriptorKey, SamplerMode, TextureBindings, TEXTURE_SLOTS};
use crate::device::{DeviceContext, DeviceInit};
use crate::error::{RenderError, Result};
use crate::frame::{bgra_to_rgba, gamma_encode, read_texture, FrameScheduler, FrameState, Swapchain};
use crate::postprocess::{PostprocessPipeline, SceneTargets, HDR_FORMAT};
use crate::staging::StagingBuffer;
use crate::stats::FrameStats;
use crate::texture::{GpuTexture, GpuTextureAllocator, TextureCache, TextureId, TextureSource, UploaderTable};

use super::node::SceneNode;
use super::primitives::{
    fan_indices, flat_screen_vertices, line_quad, point_quad, textured_vertex, tile_vertices, Facet, GouraudVertex,
    LayerMapping, ScenePoint, SurfaceMapping, SurfaceTextures, TileRect,
};

const CLEAR_COLOR: wgpu::Color = wgpu::Color::BLACK;

/// Format presented into when there is no surface.
pub const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Device objects the batcher flushes against.
struct GpuState<'w> {
    ctx: DeviceContext,
    swapchain: Option<Swapchain<'w>>,
    scheduler: FrameScheduler,
    staging: StagingBuffer,
    textures: TextureCache<GpuTexture>,
    bindings: TextureBindings,
    targets: SceneTargets,
}

impl GpuState<'_> {
    fn flush_env(&mut self) -> FlushEnv<'_> {
        FlushEnv {
            ctx: &self.ctx,
            scheduler: &mut self.scheduler,
            bindings: &mut self.bindings,
            textures: &self.textures,
            targets: &self.targets,
        }
    }

    /// Looks up (or uploads) one texture; returns its id and dummy mip count.
    fn texture(&mut self, source: Option<&mut TextureSource>, masked: bool) -> Result<(TextureId, u32)> {
        let mut alloc = GpuTextureAllocator {
            ctx: &self.ctx,
            staging: &mut self.staging,
            scheduler: &mut self.scheduler,
        };
        let entry = self.textures.get_texture(source, masked, &mut alloc)?;
        Ok((entry.id(), entry.dummy_mips()))
    }

    /// Resolves the batch state for a draw: pipeline from the flags, bindings
    /// from the texture layers. Only the diffuse layer has a masked variant.
    fn bind(
        &mut self,
        layers: [Option<&mut TextureSource>; TEXTURE_SLOTS],
        flags: PolyFlags,
        clamp: bool,
    ) -> Result<BatchState> {
        let pipeline = compute_pipeline_index(flags);
        let mut textures = [TextureId::NULL; TEXTURE_SLOTS];
        let mut dummy_mips = 0;

        for (slot, source) in layers.into_iter().enumerate() {
            let Some(source) = source else {
                continue;
            };
            let masked = slot == 0 && pipeline.alpha_test();
            let (id, dummy) = self.texture(Some(source), masked)?;
            textures[slot] = id;
            if slot == 0 {
                dummy_mips = dummy;
            }
        }

        Ok(BatchState {
            pipeline,
            descriptor: DescriptorKey {
                textures,
                sampler: SamplerMode::from_poly_flags(flags, clamp, dummy_mips),
            },
        })
    }

    /// Drops every cached texture and descriptor set. Resources are retired,
    /// the null texture is created again right away.
    fn clear_caches(&mut self) -> Result<()> {
        for texture in self.textures.clear() {
            self.scheduler.retire(texture.texture);
        }
        for set in self.bindings.clear() {
            self.scheduler.retire(set);
        }
        self.texture(None, false)?;
        Ok(())
    }
}

/// Frame-rendering backend behind the scene traversal.
///
/// Draw calls are recorded into the batcher between [`begin_frame`](Self::begin_frame)
/// and [`present`](Self::present). A draw that fails for a reason other than its
/// own size disables rendering for the rest of the frame; `present` then
/// reports the error and drops the frame.
pub struct RenderDevice<'w> {
    gpu: GpuState<'w>,
    batcher: DrawBatcher,
    postprocess: PostprocessPipeline,

    config: RendererConfig,
    node: SceneNode,
    output_format: wgpu::TextureFormat,

    frame_error: Option<RenderError>,
    stats: FrameStats,
    upload_mark: u64,
    set_mark: u64,

    warned_outside_frame: bool,
}

impl<'w> RenderDevice<'w> {
    /// Creates a device presenting to `surface`.
    pub fn new(
        ctx: DeviceContext,
        surface: wgpu::Surface<'w>,
        init: &DeviceInit,
        config: RendererConfig,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(&ctx, surface, init, width, height)?;
        let format = swapchain.format();
        Self::build(ctx, Some(swapchain), format, config, width, height)
    }

    /// Creates a device without a surface. Frames are only visible through
    /// [`read_framebuffer`](Self::read_framebuffer).
    pub fn headless(ctx: DeviceContext, config: RendererConfig, width: u32, height: u32) -> Result<Self> {
        Self::build(ctx, None, HEADLESS_FORMAT, config, width, height)
    }

    fn build(
        ctx: DeviceContext,
        swapchain: Option<Swapchain<'w>>,
        output_format: wgpu::TextureFormat,
        config: RendererConfig,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let config = config.validated();
        let samples = ctx.caps().clamp_sample_count(config.multisample);
        if samples != config.multisample {
            log::info!("{}x MSAA unsupported, using {samples}x", config.multisample);
        }
        let (width, height) = (width.max(1), height.max(1));

        let scheduler = FrameScheduler::new(config.frames_in_flight);
        let textures = TextureCache::new(UploaderTable::new(ctx.caps().texture_compression_bc));
        let (staging, bindings, targets) = ctx.create_resource(|device| {
            (
                StagingBuffer::new(device, config.staging_capacity),
                TextureBindings::new(device, config.descriptor_pool_size),
                SceneTargets::new(device, width, height, samples),
            )
        })?;

        let batcher = DrawBatcher::new(
            &ctx,
            bindings.layout(),
            HDR_FORMAT,
            samples,
            config.vertex_ring_capacity,
            config.index_ring_capacity,
        )?;
        let postprocess = PostprocessPipeline::new(&ctx, config.postprocess.clone())?;

        let mut gpu = GpuState {
            ctx,
            swapchain,
            scheduler,
            staging,
            textures,
            bindings,
            targets,
        };
        gpu.texture(None, false)?;
        let upload_mark = gpu.textures.upload_count();

        let mut renderer = Self {
            gpu,
            batcher,
            postprocess,
            config,
            node: SceneNode::new(width, height, SceneNode::default().fov),
            output_format,
            frame_error: None,
            stats: FrameStats::default(),
            upload_mark,
            set_mark: 0,
            warned_outside_frame: false,
        };
        renderer.push_uniforms()?;
        log::info!("render device ready: {width}x{height}, {samples}x MSAA, output {output_format:?}");
        Ok(renderer)
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn ctx(&self) -> &DeviceContext {
        &self.gpu.ctx
    }

    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[inline]
    pub fn scene_node(&self) -> &SceneNode {
        &self.node
    }

    /// Format of the presented image.
    #[inline]
    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.output_format
    }

    /// Size of the scene targets, which is also the size of a framebuffer read.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        self.gpu.targets.size()
    }

    #[inline]
    pub fn sample_count(&self) -> u32 {
        self.gpu.targets.sample_count()
    }

    /// Counters of the last presented frame.
    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    #[inline]
    pub fn texture_cache(&self) -> &TextureCache<GpuTexture> {
        &self.gpu.textures
    }

    #[inline]
    pub fn postprocess(&self) -> &PostprocessPipeline {
        &self.postprocess
    }

    pub fn set_postprocess(&mut self, config: PostprocessConfig) {
        self.config.postprocess = config.validated();
        self.postprocess.set_config(self.config.postprocess.clone());
    }

    // ── platform interface ────────────────────────────────────────────────

    /// Resizes the output and scene targets and changes the MSAA level.
    ///
    /// Batches recorded so far are drawn into the old targets first.
    pub fn resize(&mut self, width: u32, height: u32, multisample: u32) -> Result<()> {
        let g = &mut self.gpu;
        if let Some(swapchain) = g.swapchain.as_mut() {
            swapchain.resize(&g.ctx, width, height);
        }

        let samples = g.ctx.caps().clamp_sample_count(multisample);
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == g.targets.size() && samples == g.targets.sample_count() {
            return Ok(());
        }

        self.batcher.flush(&mut g.flush_env())?;
        // Pipelines first: a failed rebuild leaves the old targets usable.
        self.batcher
            .set_sample_count(&g.ctx, g.bindings.layout(), HDR_FORMAT, samples)?;
        let (ctx, targets) = (&g.ctx, &mut g.targets);
        for texture in ctx.create_resource(|device| targets.resize(device, width, height, samples))? {
            g.scheduler.retire(texture);
        }
        // Fresh targets hold garbage; the next pass clears them.
        self.batcher.begin_frame(CLEAR_COLOR);

        self.config.multisample = samples;
        self.node.width = width;
        self.node.height = height;
        self.push_uniforms()
    }

    /// Starts a frame. Returns whether a swapchain image is available; without
    /// one the frame is still recorded but not presented.
    pub fn begin_frame(&mut self) -> Result<bool> {
        self.frame_error = None;
        let g = &mut self.gpu;
        let available = match g
            .scheduler
            .begin_frame(&g.ctx, g.swapchain.as_mut(), self.config.acquire_retries)
        {
            Ok(available) => available,
            Err(e) => {
                g.scheduler.abandon_frame(&g.ctx);
                return Err(e);
            }
        };
        if !available && g.swapchain.is_some() {
            log::debug!("no swapchain image, frame {} will not be presented", g.scheduler.frame_index());
        }
        self.batcher.begin_frame(CLEAR_COLOR);
        Ok(available)
    }

    /// Finishes the frame: last flush, postprocess, submit, present, then waits
    /// for the GPU before anything retired this frame is destroyed.
    pub fn present(&mut self, vsync: bool) -> Result<()> {
        if let Some(swapchain) = self.gpu.swapchain.as_mut() {
            swapchain.set_vsync(vsync);
        }

        let result = match self.frame_error.take() {
            Some(err) => Err(err),
            None => self.finish_frame(),
        };
        if let Err(e) = &result {
            log::warn!("frame {} dropped: {e}", self.gpu.scheduler.frame_index());
            self.gpu.scheduler.abandon_frame(&self.gpu.ctx);
            self.batcher.rewind();
        }
        result
    }

    fn finish_frame(&mut self) -> Result<()> {
        let g = &mut self.gpu;
        self.batcher.finish_frame(&mut g.flush_env())?;

        match g.scheduler.image().map(|image| image.view.clone()) {
            Some(view) => self
                .postprocess
                .record(&g.ctx, &mut g.scheduler, &g.targets, &view, self.output_format)?,
            None => self.postprocess.record_effects(&g.ctx, &mut g.scheduler, &g.targets)?,
        }

        g.scheduler.finish(&g.ctx)?;
        g.scheduler.present()?;
        g.scheduler.end_frame(&g.ctx)?;
        g.staging.rewind();
        self.batcher.rewind();

        self.collect_stats();
        Ok(())
    }

    fn collect_stats(&mut self) {
        let (counters, draw_calls) = self.batcher.take_counters();
        let uploads = self.gpu.textures.upload_count();
        let sets = self.gpu.bindings.cache().created();

        let mut stats = FrameStats {
            texture_uploads: uploads.saturating_sub(self.upload_mark),
            descriptor_sets_created: sets.saturating_sub(self.set_mark),
            ..FrameStats::default()
        };
        stats.add_recorder(counters, draw_calls);
        self.upload_mark = uploads;
        self.set_mark = sets;
        self.stats = stats;

        let frame = self.gpu.scheduler.frame_index();
        if frame % FrameStats::LOG_INTERVAL == 0 {
            log::debug!("frame {frame}: {stats}");
        }
    }

    /// Presents the last frame into a CPU buffer: tightly packed RGBA rows,
    /// top-down, [`size`](Self::size) texels.
    ///
    /// With `gamma_correct` the tonemap gamma is applied so the result matches
    /// what was shown on screen.
    pub fn read_framebuffer(&mut self, gamma_correct: bool) -> Result<Vec<u8>> {
        let g = &mut self.gpu;
        if g.scheduler.state() != FrameState::Idle {
            return Err(RenderError::Readback("framebuffer read while a frame is being recorded".into()));
        }

        let texture = self
            .postprocess
            .present_offscreen(&g.ctx, &mut g.scheduler, &g.targets, self.output_format)?
            .clone();
        let mut pixels = read_texture(&g.ctx, &mut g.scheduler, &texture)?;

        if matches!(texture.format(), wgpu::TextureFormat::Bgra8Unorm) {
            bgra_to_rgba(&mut pixels);
        }
        if gamma_correct {
            gamma_encode(&mut pixels, self.config.postprocess.tonemap.gamma);
        }
        Ok(pixels)
    }

    /// Invalidates both caches and waits for the GPU, so everything they held
    /// is destroyed before this returns.
    pub fn flush(&mut self) -> Result<()> {
        self.clear_texture_cache()?;
        self.gpu.scheduler.wait_idle(&self.gpu.ctx)
    }

    /// Invalidates every cached texture and descriptor set.
    ///
    /// Both caches always go together: descriptor keys hold texture ids that
    /// are meaningless after the texture cache is cleared. Pending batches are
    /// drawn first.
    pub fn clear_texture_cache(&mut self) -> Result<()> {
        let g = &mut self.gpu;
        self.batcher.flush(&mut g.flush_env())?;
        g.clear_caches()?;
        log::info!("texture and descriptor caches cleared");
        Ok(())
    }

    // ── scene interface ───────────────────────────────────────────────────

    /// Sets viewport and field of view for the following primitives.
    pub fn set_scene_node(&mut self, node: SceneNode) {
        self.node = node;
        let result = self.push_uniforms();
        self.absorb(result);
    }

    fn push_uniforms(&mut self) -> Result<()> {
        let uniforms = SceneUniforms {
            projection: self.node.projection().to_cols_array_2d(),
            screen: self.node.screen().to_cols_array_2d(),
            params: self.batcher.uniforms().params,
        };
        self.batcher.set_uniforms(uniforms, &mut self.gpu.flush_env())
    }

    /// Uploads a texture ahead of its first draw.
    pub fn precache_texture(&mut self, texture: &mut TextureSource, flags: PolyFlags) {
        let masked = compute_pipeline_index(flags).alpha_test();
        if let Err(e) = self.gpu.texture(Some(&mut *texture), masked) {
            log::warn!("precache of texture {:#x} failed: {e}", texture.cache_id);
        }
    }

    /// Re-uploads part of mip 0 of an already cached texture.
    ///
    /// Returns `false` when nothing was uploaded.
    pub fn update_texture_rect(&mut self, texture: &TextureSource, x: u32, y: u32, width: u32, height: u32) -> Result<bool> {
        let g = &mut self.gpu;
        let mut alloc = GpuTextureAllocator {
            ctx: &g.ctx,
            staging: &mut g.staging,
            scheduler: &mut g.scheduler,
        };
        g.textures.update_rect(texture, x, y, width, height, &mut alloc)
    }

    /// Draws every polygon of a surface with up to four texture layers.
    pub fn draw_surface(&mut self, facet: &Facet, textures: SurfaceTextures<'_>, flags: PolyFlags) {
        if !self.accepting_draws() {
            return;
        }
        let result = self.try_draw_surface(facet, textures, flags);
        self.absorb(result);
    }

    fn try_draw_surface(&mut self, facet: &Facet, textures: SurfaceTextures<'_>, flags: PolyFlags) -> Result<()> {
        let mapping = SurfaceMapping::new(&textures);
        let SurfaceTextures {
            diffuse,
            lightmap,
            detail,
            fog,
        } = textures;
        let state = self.gpu.bind([diffuse, lightmap, detail, fog], flags, false)?;
        self.batcher.set_state(state);

        for poly in facet.polys.iter().filter(|p| p.len() >= 3) {
            self.emit(poly.len(), |dst| {
                for (v, &p) in dst.iter_mut().zip(poly) {
                    *v = mapping.vertex(&facet.map, p);
                }
            })?;
        }
        Ok(())
    }

    /// Draws a convex polygon with one texture and no lighting.
    pub fn draw_polygon(&mut self, points: &[ScenePoint], texture: Option<&mut TextureSource>, flags: PolyFlags) {
        if !self.accepting_draws() || points.len() < 3 {
            return;
        }
        let result = self.try_draw_textured(points.len(), texture, flags, |mapping, dst| {
            for (v, p) in dst.iter_mut().zip(points) {
                *v = textured_vertex(p.pos, p.uv, mapping, Vec4::ONE);
            }
        });
        self.absorb(result);
    }

    /// Draws a convex polygon lit per vertex.
    pub fn draw_gouraud_polygon(&mut self, points: &[GouraudVertex], texture: Option<&mut TextureSource>, flags: PolyFlags) {
        if !self.accepting_draws() || points.len() < 3 {
            return;
        }
        let result = self.try_draw_textured(points.len(), texture, flags, |mapping, dst| {
            for (v, p) in dst.iter_mut().zip(points) {
                *v = textured_vertex(p.pos, p.uv, mapping, p.light);
            }
        });
        self.absorb(result);
    }

    fn try_draw_textured(
        &mut self,
        vertex_count: usize,
        texture: Option<&mut TextureSource>,
        flags: PolyFlags,
        write: impl FnOnce(LayerMapping, &mut [SceneVertex]),
    ) -> Result<()> {
        let mapping = texture.as_deref().map_or(LayerMapping::IDENTITY, LayerMapping::texels);
        let state = self.gpu.bind([texture, None, None, None], flags, false)?;
        self.batcher.set_state(state);
        self.emit(vertex_count, |dst| write(mapping, dst))
    }

    /// Draws a screen-aligned textured rectangle tested against depth `rect.z`.
    pub fn draw_tile(&mut self, rect: &TileRect, color: Vec4, texture: Option<&mut TextureSource>, flags: PolyFlags) {
        if !self.accepting_draws() {
            return;
        }
        let result = self.try_draw_tile(rect, color, texture, flags);
        self.absorb(result);
    }

    fn try_draw_tile(&mut self, rect: &TileRect, color: Vec4, texture: Option<&mut TextureSource>, flags: PolyFlags) -> Result<()> {
        let mapping = texture.as_deref().map_or(LayerMapping::IDENTITY, LayerMapping::texels);
        let state = self.gpu.bind([texture, None, None, None], flags, true)?;
        self.batcher.set_state(state);
        let vertices = tile_vertices(rect, self.node.screen_depth(rect.z), mapping, color);
        self.emit(4, |dst| dst.copy_from_slice(&vertices))
    }

    /// Draws a one-pixel line between two screen points; `z` is view depth.
    pub fn draw_2d_line(&mut self, color: Vec4, flags: PolyFlags, a: Vec3, b: Vec3) {
        let depth = self.node.screen_depth(a.z.min(b.z));
        self.draw_flat_quad(line_quad(a.truncate(), b.truncate()), depth, color, flags);
    }

    /// Draws a filled screen rectangle between two corners at view depth `z`.
    pub fn draw_2d_point(&mut self, color: Vec4, flags: PolyFlags, min: Vec2, max: Vec2, z: f32) {
        let depth = self.node.screen_depth(z);
        self.draw_flat_quad(point_quad(min, max), depth, color, flags);
    }

    fn draw_flat_quad(&mut self, corners: [Vec2; 4], depth: f32, color: Vec4, flags: PolyFlags) {
        if !self.accepting_draws() {
            return;
        }
        let result = self.try_draw_flat_quad(corners, depth, color, flags);
        self.absorb(result);
    }

    fn try_draw_flat_quad(&mut self, corners: [Vec2; 4], depth: f32, color: Vec4, flags: PolyFlags) -> Result<()> {
        let state = self.gpu.bind([None, None, None, None], flags, true)?;
        self.batcher.set_state(state);
        let vertices = flat_screen_vertices(corners, depth, color);
        self.emit(4, |dst| dst.copy_from_slice(&vertices))
    }

    /// Makes later geometry ignore the depth written so far.
    pub fn clear_z(&mut self) {
        if !self.accepting_draws() {
            return;
        }
        let result = self.batcher.clear_depth(&mut self.gpu.flush_env());
        self.absorb(result);
    }

    /// Screen flash: scales the frame by `2 * flash_scale` and adds `flash_fog`.
    ///
    /// Nothing is drawn for the neutral values (scale 0.5, no fog).
    pub fn end_flash(&mut self, flash_scale: Vec3, flash_fog: Vec3) {
        if flash_scale == Vec3::splat(0.5) && flash_fog == Vec3::ZERO {
            return;
        }
        let (width, height) = (self.node.width as f32, self.node.height as f32);
        let alpha = 1.0 - (flash_scale.x * 2.0).min(1.0);
        self.draw_flat_quad(
            point_quad(Vec2::ZERO, Vec2::new(width, height)),
            0.0,
            flash_fog.extend(alpha),
            PolyFlags::HIGHLIGHTED,
        );
        // The flash wrote depth over the whole screen.
        self.clear_z();
    }

    // ── internals ─────────────────────────────────────────────────────────

    /// Reserves a fan primitive and lets `write` fill its vertices. Primitives
    /// too large for the rings are skipped; the recorder already counted them.
    fn emit(&mut self, vertex_count: usize, write: impl FnOnce(&mut [SceneVertex])) -> Result<()> {
        let reserved = self
            .batcher
            .reserve(vertex_count, fan_indices(vertex_count), &mut self.gpu.flush_env());
        let mut reservation = match reserved {
            Ok(r) => r,
            Err(RenderError::PrimitiveTooLarge { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };
        write(&mut *reservation.vertices);
        reservation.write_fan();
        Ok(())
    }

    fn accepting_draws(&mut self) -> bool {
        if !self.gpu.scheduler.state().is_recording() {
            if !self.warned_outside_frame {
                log::warn!("draw call outside begin_frame/present ignored");
                self.warned_outside_frame = true;
            }
            return false;
        }
        self.frame_error.is_none()
    }

    fn absorb(&mut self, result: Result<()>) {
        if let Err(e) = result {
            log::error!("rendering disabled for this frame: {e}");
            self.frame_error.get_or_insert(e);
        }
    }
}

impl Drop for RenderDevice<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.scheduler.wait_idle(&self.gpu.ctx) {
            log::warn!("GPU did not go idle on shutdown: {e}");
        }
    }
}

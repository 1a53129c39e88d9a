use crate::descriptor::{DescriptorKey, TextureBindings, TEXTURE_SLOTS};
use crate::device::DeviceContext;
use crate::error::{RenderError, Result};
use crate::frame::FrameScheduler;
use crate::postprocess::SceneTargets;
use crate::texture::{CachedTexture, GpuTexture, TextureCache, TextureId};

use super::pipeline::ScenePipelines;
use super::recorder::{BatchRecorder, BatchSink, BatchState, PendingDraws, RecorderCounters, Reservation};
use super::vertex::{SceneUniforms, SceneVertex};

/// Everything a flush needs besides the batcher itself.
///
/// Built on the stack by the caller for the duration of one batcher call.
pub struct FlushEnv<'a> {
    pub ctx: &'a DeviceContext,
    pub scheduler: &'a mut FrameScheduler,
    pub bindings: &'a mut TextureBindings,
    pub textures: &'a TextureCache<GpuTexture>,
    pub targets: &'a SceneTargets,
}

/// GPU side of the batcher: ring buffers, uniforms and pipelines.
struct SceneGeometry {
    shader: wgpu::ShaderModule,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_bind_group: wgpu::BindGroup,
    pipelines: ScenePipelines,
}

/// Load behavior of the next scene pass.
#[derive(Debug)]
struct PassState {
    clear_color: Option<wgpu::Color>,
    clear_depth: bool,
    draw_calls: u32,
}

impl PassState {
    fn color_load(&self) -> wgpu::LoadOp<wgpu::Color> {
        self.clear_color.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear)
    }

    fn depth_load(&self) -> wgpu::LoadOp<f32> {
        if self.clear_depth {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        }
    }

    fn loaded(&mut self) {
        self.clear_color = None;
        self.clear_depth = false;
    }
}

/// Accumulates scene primitives and turns them into as few draw calls as the
/// state changes allow.
///
/// Recording only touches CPU memory. Vertices and indices reach the GPU on
/// flush through `Queue::write_buffer`, which lands before the next submission,
/// so the draw encoder always sees the uploads of the batches it draws.
pub struct DrawBatcher {
    recorder: BatchRecorder,
    geometry: SceneGeometry,
    pass: PassState,
    uniforms: SceneUniforms,
}

impl DrawBatcher {
    pub fn new(
        ctx: &DeviceContext,
        texture_layout: &wgpu::BindGroupLayout,
        color_format: wgpu::TextureFormat,
        sample_count: u32,
        vertex_capacity: usize,
        index_capacity: usize,
    ) -> Result<Self> {
        let shader = ctx.create_shader("nabu scene shader", include_str!("../shaders/scene.wgsl"))?;

        let (vertex_buffer, index_buffer, uniform_buffer, uniform_layout, uniform_bind_group) =
            ctx.create_resource(|device| {
                let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("nabu vertex ring"),
                    size: (vertex_capacity * std::mem::size_of::<SceneVertex>()) as u64,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("nabu index ring"),
                    size: (index_capacity * std::mem::size_of::<u32>()) as u64,
                    usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("nabu scene uniforms"),
                    size: std::mem::size_of::<SceneUniforms>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });

                let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("nabu scene uniforms layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });
                let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("nabu scene uniforms"),
                    layout: &uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    }],
                });
                (vertex_buffer, index_buffer, uniform_buffer, uniform_layout, uniform_bind_group)
            })?;

        let uniforms = SceneUniforms::default();
        ctx.queue().write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let pipelines = ScenePipelines::new(
            ctx,
            &shader,
            &[&uniform_layout, texture_layout],
            color_format,
            sample_count,
        )?;

        log::debug!("scene rings: {vertex_capacity} vertices, {index_capacity} indices");
        Ok(Self {
            recorder: BatchRecorder::new(vertex_capacity, index_capacity),
            geometry: SceneGeometry {
                shader,
                vertex_buffer,
                index_buffer,
                uniform_buffer,
                uniform_layout,
                uniform_bind_group,
                pipelines,
            },
            pass: PassState {
                clear_color: Some(wgpu::Color::BLACK),
                clear_depth: true,
                draw_calls: 0,
            },
            uniforms,
        })
    }

    #[inline]
    pub fn uniforms(&self) -> &SceneUniforms {
        &self.uniforms
    }

    #[inline]
    pub fn sample_count(&self) -> u32 {
        self.geometry.pipelines.sample_count()
    }

    /// Counters since the last call, draw calls included.
    pub fn take_counters(&mut self) -> (RecorderCounters, u32) {
        let draws = std::mem::take(&mut self.pass.draw_calls);
        (self.recorder.take_counters(), draws)
    }

    /// Rebuilds the pipeline variants for a new MSAA sample count.
    ///
    /// Pending batches must have been flushed with the old targets first. On
    /// error the old variants stay in place.
    pub fn set_sample_count(
        &mut self,
        ctx: &DeviceContext,
        texture_layout: &wgpu::BindGroupLayout,
        color_format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> Result<()> {
        debug_assert!(!self.recorder.has_pending(), "sample count changed with pending batches");
        if sample_count == self.geometry.pipelines.sample_count() {
            return Ok(());
        }
        self.geometry.pipelines = ScenePipelines::new(
            ctx,
            &self.geometry.shader,
            &[&self.geometry.uniform_layout, texture_layout],
            color_format,
            sample_count,
        )?;
        Ok(())
    }

    /// Starts a new frame: the first pass clears color and depth.
    pub fn begin_frame(&mut self, clear_color: wgpu::Color) {
        self.recorder.discard();
        self.pass.clear_color = Some(clear_color);
        self.pass.clear_depth = true;
    }

    /// Selects pipeline and bindings for the following primitives.
    #[inline]
    pub fn set_state(&mut self, state: BatchState) {
        self.recorder.set_state(state);
    }

    /// Reserves ring space for one primitive, flushing and wrapping when full.
    pub fn reserve(&mut self, vertex_count: usize, index_count: usize, env: &mut FlushEnv<'_>) -> Result<Reservation<'_>> {
        let mut sink = GpuBatchSink::new(env, &self.geometry, &mut self.pass);
        self.recorder.reserve(vertex_count, index_count, &mut sink)
    }

    /// Records every pending batch into the draw encoder.
    pub fn flush(&mut self, env: &mut FlushEnv<'_>) -> Result<()> {
        let mut sink = GpuBatchSink::new(env, &self.geometry, &mut self.pass);
        self.recorder.flush(&mut sink)
    }

    /// Replaces the scene uniforms.
    ///
    /// Batches drawn with the old values are flushed and submitted first, since
    /// the uniform write lands before the next submission.
    pub fn set_uniforms(&mut self, uniforms: SceneUniforms, env: &mut FlushEnv<'_>) -> Result<()> {
        if uniforms == self.uniforms {
            return Ok(());
        }
        self.flush(env)?;
        env.scheduler.submit(env.ctx);
        env.ctx
            .queue()
            .write_buffer(&self.geometry.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        self.uniforms = uniforms;
        Ok(())
    }

    /// Makes later geometry ignore the depth written so far.
    pub fn clear_depth(&mut self, env: &mut FlushEnv<'_>) -> Result<()> {
        self.flush(env)?;
        self.pass.clear_depth = true;
        Ok(())
    }

    /// Flushes the last batches and makes sure the frame's clears happened even
    /// when nothing was drawn.
    pub fn finish_frame(&mut self, env: &mut FlushEnv<'_>) -> Result<()> {
        self.flush(env)?;
        if self.pass.clear_color.is_some() || self.pass.clear_depth {
            let encoder = env.scheduler.draw_encoder(env.ctx.device());
            let (view, resolve_target) = env.targets.color_attachment();
            drop(begin_scene_pass(encoder, view, resolve_target, env.targets.depth_view(), &self.pass));
            self.pass.loaded();
        }
        Ok(())
    }

    /// Forgets ring contents after the GPU went idle.
    pub fn rewind(&mut self) {
        self.recorder.discard();
        self.recorder.rewind();
    }
}

fn begin_scene_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    resolve_target: Option<&wgpu::TextureView>,
    depth_view: &wgpu::TextureView,
    pass: &PassState,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("nabu scene pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target,
            ops: wgpu::Operations {
                load: pass.color_load(),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth_view,
            depth_ops: Some(wgpu::Operations {
                load: pass.depth_load(),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    })
}

// ── sink ──────────────────────────────────────────────────────────────────

/// Resolves the textures bound for `key`; ids unknown to the cache bind the null texture.
fn bound_textures<'t, T>(
    textures: &'t TextureCache<T>,
    key: &DescriptorKey,
) -> Result<[&'t CachedTexture<T>; TEXTURE_SLOTS]> {
    let null = textures
        .by_id(TextureId::NULL)
        .ok_or_else(|| RenderError::Gpu("null texture was not created".into()))?;
    Ok(key.textures.map(|id| textures.by_id(id).unwrap_or(null)))
}

fn texture_views<'t>(
    textures: &'t TextureCache<GpuTexture>,
    key: &DescriptorKey,
) -> Result<[&'t wgpu::TextureView; TEXTURE_SLOTS]> {
    Ok(bound_textures(textures, key)?.map(|t| &t.resource().view))
}

struct GpuBatchSink<'a> {
    ctx: &'a DeviceContext,
    scheduler: &'a mut FrameScheduler,
    bindings: &'a mut TextureBindings,
    textures: &'a TextureCache<GpuTexture>,
    targets: &'a SceneTargets,
    geometry: &'a SceneGeometry,
    pass: &'a mut PassState,
}

impl<'a> GpuBatchSink<'a> {
    fn new(env: &'a mut FlushEnv<'_>, geometry: &'a SceneGeometry, pass: &'a mut PassState) -> Self {
        Self {
            ctx: env.ctx,
            scheduler: &mut *env.scheduler,
            bindings: &mut *env.bindings,
            textures: env.textures,
            targets: env.targets,
            geometry,
            pass,
        }
    }
}

impl BatchSink for GpuBatchSink<'_> {
    fn submit(&mut self, draws: &PendingDraws<'_>) -> Result<()> {
        let device = self.ctx.device();
        let queue = self.ctx.queue();

        if !draws.vertices.is_empty() {
            let offset = draws.first_vertex as u64 * std::mem::size_of::<SceneVertex>() as u64;
            queue.write_buffer(&self.geometry.vertex_buffer, offset, bytemuck::cast_slice(draws.vertices));
        }
        if !draws.indices.is_empty() {
            let offset = draws.first_index as u64 * std::mem::size_of::<u32>() as u64;
            queue.write_buffer(&self.geometry.index_buffer, offset, bytemuck::cast_slice(draws.indices));
        }

        // Bind groups first; the pass below only reads the cache.
        for batch in draws.batches {
            let key = batch.state.descriptor;
            if self.bindings.cache().get(&key).is_none() {
                let views = texture_views(self.textures, &key)?;
                self.bindings.get_texture_descriptor_set(device, key, views)?;
            }
        }

        let (view, resolve_target) = self.targets.color_attachment();
        let encoder = self.scheduler.draw_encoder(device);
        let mut pass = begin_scene_pass(encoder, view, resolve_target, self.targets.depth_view(), self.pass);

        pass.set_bind_group(0, &self.geometry.uniform_bind_group, &[]);
        pass.set_vertex_buffer(0, self.geometry.vertex_buffer.slice(..));
        pass.set_index_buffer(self.geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);

        let mut bound: Option<BatchState> = None;
        for batch in draws.batches {
            let state = batch.state;
            if bound.map(|b| b.pipeline) != Some(state.pipeline) {
                pass.set_pipeline(self.geometry.pipelines.get(state.pipeline));
            }
            if bound.map(|b| b.descriptor) != Some(state.descriptor) {
                let group = self
                    .bindings
                    .cache()
                    .get(&state.descriptor)
                    .ok_or_else(|| RenderError::Gpu("descriptor set missing at draw time".into()))?;
                pass.set_bind_group(1, group, &[]);
            }
            bound = Some(state);

            pass.draw_indexed(batch.indices.clone(), 0, 0..1);
            self.pass.draw_calls += 1;
        }
        drop(pass);

        self.pass.loaded();
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.scheduler.submit_and_wait(self.ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{TextureAllocator, TextureDesc, TextureSource, UploadJob, UploaderTable};

    struct NoGpu;

    impl TextureAllocator for NoGpu {
        type Texture = ();

        fn max_dimension(&self) -> u32 {
            256
        }

        fn allocate(&mut self, _desc: &TextureDesc) -> Result<()> {
            Ok(())
        }

        fn upload(&mut self, _texture: &(), _desc: &TextureDesc, _job: &UploadJob<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unknown_ids_bind_the_null_texture() {
        let mut cache = TextureCache::new(UploaderTable::new(false));
        let mut alloc = NoGpu;
        cache.null_texture(&mut alloc).unwrap();
        let mut white = TextureSource::solid_white(7);
        let known = cache.get_texture(Some(&mut white), false, &mut alloc).unwrap().id();

        let key = DescriptorKey {
            textures: [known, TextureId::from_raw(9999), TextureId::NULL, TextureId::from_raw(12)],
            ..DescriptorKey::default()
        };
        let ids = bound_textures(&cache, &key).unwrap().map(|t| t.id());
        assert_eq!(ids, [known, TextureId::NULL, TextureId::NULL, TextureId::NULL]);
    }

    #[test]
    fn binding_before_the_null_texture_exists_is_an_error() {
        let cache: TextureCache<()> = TextureCache::new(UploaderTable::new(false));
        let err = bound_textures(&cache, &DescriptorKey::default()).unwrap_err();
        assert!(matches!(err, RenderError::Gpu(_)));
    }
}

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::config::PostprocessConfig;
use crate::device::DeviceContext;
use crate::error::Result;
use crate::frame::FrameScheduler;
use crate::texture::GpuTexture;

use super::bloom::{bloom_level_sizes, BloomImages};
use super::exposure::{exposure_blend, reduction_sizes};
use super::gaussian::gaussian_weights;
use super::targets::{create_image, Pyramid, SceneTargets};
use super::tonemap::output_levels;
use super::HDR_FORMAT;

// ── uniforms ──────────────────────────────────────────────────────────────

/// Chain-wide parameters, rewritten every frame.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct PostParams {
    weights: [[f32; 4]; 2],
    bloom: [f32; 4],
    exposure: [f32; 4],
    grade: [f32; 4],
    output: [f32; 4],
}

impl PostParams {
    fn new(config: &PostprocessConfig) -> Self {
        let w = gaussian_weights(config.bloom.blur_amount);
        let e = &config.exposure;
        let t = &config.tonemap;
        Self {
            weights: [[w[0], w[1], w[2], w[3]], [w[4], w[5], w[6], 0.0]],
            bloom: [config.bloom.threshold, config.bloom.amount, 0.0, 0.0],
            exposure: [e.base, e.scale, e.min, if e.enabled { 1.0 } else { 0.0 }],
            grade: [t.contrast, t.saturation, t.brightness, t.gamma],
            output: [
                output_levels(t.output_bits),
                if t.dither { 1.0 } else { 0.0 },
                t.gray_formula.index() as f32,
                0.0,
            ],
        }
    }
}

/// Per-pass parameters, fixed for the lifetime of the pass bindings.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct PassParams {
    texel: [f32; 2],
    direction: [f32; 2],
}

const HORIZONTAL: [f32; 2] = [1.0, 0.0];
const VERTICAL: [f32; 2] = [0.0, 1.0];

// ── pipelines ─────────────────────────────────────────────────────────────

/// Present pipeline variant: output format and whether gamma is applied.
type PresentKey = (wgpu::TextureFormat, bool);

struct ChainPipelines {
    bloom_extract: wgpu::RenderPipeline,
    blur: wgpu::RenderPipeline,
    downsample: wgpu::RenderPipeline,
    upscale: wgpu::RenderPipeline,
    composite: wgpu::RenderPipeline,
    luminance: wgpu::RenderPipeline,
    reduce: wgpu::RenderPipeline,
    combine: wgpu::RenderPipeline,
}

fn additive() -> wgpu::BlendState {
    let add = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState { color: add, alpha: add }
}

fn constant_mix() -> wgpu::BlendState {
    let mix = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Constant,
        dst_factor: wgpu::BlendFactor::OneMinusConstant,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState { color: mix, alpha: mix }
}

struct PipelineFactory<'a> {
    ctx: &'a DeviceContext,
    shader: &'a wgpu::ShaderModule,
    layout: &'a wgpu::PipelineLayout,
}

impl PipelineFactory<'_> {
    fn build(
        &self,
        entry: &str,
        format: wgpu::TextureFormat,
        blend: wgpu::BlendState,
        constants: &[(&str, f64)],
    ) -> Result<wgpu::RenderPipeline> {
        let label = format!("nabu postprocess {entry}");
        self.ctx.create_pipeline("nabu postprocess pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&label),
                layout: Some(self.layout),
                vertex: wgpu::VertexState {
                    module: self.shader,
                    entry_point: Some("vs_fullscreen"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: self.shader,
                    entry_point: Some(entry),
                    compilation_options: wgpu::PipelineCompilationOptions {
                        constants,
                        ..Default::default()
                    },
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })
    }

    fn chain(&self) -> Result<ChainPipelines> {
        let replace = wgpu::BlendState::REPLACE;
        Ok(ChainPipelines {
            bloom_extract: self.build("fs_bloom_extract", HDR_FORMAT, replace, &[])?,
            blur: self.build("fs_blur", HDR_FORMAT, replace, &[])?,
            downsample: self.build("fs_copy", HDR_FORMAT, replace, &[])?,
            upscale: self.build("fs_copy", HDR_FORMAT, additive(), &[])?,
            composite: self.build("fs_composite", HDR_FORMAT, additive(), &[])?,
            luminance: self.build("fs_luminance", HDR_FORMAT, replace, &[])?,
            reduce: self.build("fs_reduce", HDR_FORMAT, replace, &[])?,
            combine: self.build("fs_combine", HDR_FORMAT, constant_mix(), &[])?,
        })
    }

    fn present(&self, (format, apply_gamma): PresentKey) -> Result<wgpu::RenderPipeline> {
        let srgb = if format.is_srgb() { 1.0 } else { 0.0 };
        let gamma = if apply_gamma { 1.0 } else { 0.0 };
        self.build(
            "fs_present",
            format,
            wgpu::BlendState::REPLACE,
            &[("SRGB_OUTPUT", srgb), ("APPLY_GAMMA", gamma)],
        )
    }
}

// ── size-dependent bindings ───────────────────────────────────────────────

struct PassFactory<'a> {
    device: &'a wgpu::Device,
    layout: &'a wgpu::BindGroupLayout,
}

impl PassFactory<'_> {
    fn bind(
        &self,
        label: &str,
        source: &GpuTexture,
        aux: &wgpu::TextureView,
        direction: [f32; 2],
    ) -> wgpu::BindGroup {
        let params = PassParams {
            texel: [1.0 / source.texture.width() as f32, 1.0 / source.texture.height() as f32],
            direction,
        };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(aux),
                },
            ],
        })
    }

    /// Single-source pass; the aux slot repeats the source.
    fn single(&self, label: &str, source: &GpuTexture, direction: [f32; 2]) -> wgpu::BindGroup {
        self.bind(label, source, &source.view, direction)
    }
}

#[derive(Default)]
struct BloomPasses {
    extract: Option<wgpu::BindGroup>,
    blur_h: Vec<wgpu::BindGroup>,
    blur_v: Vec<wgpu::BindGroup>,
    /// Reads level `i`: downsample into `i + 1`, upscale into `i - 1`, composite from 0.
    from_level: Vec<wgpu::BindGroup>,
}

struct ChainPasses {
    bloom: BloomPasses,
    luminance: wgpu::BindGroup,
    reduce: Vec<wgpu::BindGroup>,
    combine: wgpu::BindGroup,
    present: wgpu::BindGroup,
}

impl ChainPasses {
    fn into_bind_groups(self) -> impl Iterator<Item = wgpu::BindGroup> {
        let BloomPasses {
            extract,
            blur_h,
            blur_v,
            from_level,
        } = self.bloom;
        extract
            .into_iter()
            .chain(blur_h)
            .chain(blur_v)
            .chain(from_level)
            .chain(std::iter::once(self.luminance))
            .chain(self.reduce)
            .chain([self.combine, self.present])
    }
}

// ── pipeline ──────────────────────────────────────────────────────────────

fn fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::RenderPipeline,
    globals: &wgpu::BindGroup,
    pass: &wgpu::BindGroup,
    target: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
    blend_constant: Option<f64>,
) {
    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        ..Default::default()
    });
    rpass.set_pipeline(pipeline);
    rpass.set_bind_group(0, globals, &[]);
    rpass.set_bind_group(1, pass, &[]);
    if let Some(a) = blend_constant {
        rpass.set_blend_constant(wgpu::Color { r: a, g: a, b: a, a });
    }
    rpass.draw(0..3, 0..1);
}

const CLEAR: wgpu::LoadOp<wgpu::Color> = wgpu::LoadOp::Clear(wgpu::Color::BLACK);
const LOAD: wgpu::LoadOp<wgpu::Color> = wgpu::LoadOp::Load;

/// Bloom, auto-exposure and the tonemapped present, run once per frame on the
/// resolved scene color.
///
/// Pyramid images and pass bindings follow the scene size and are rebuilt
/// (old ones retired) whenever the scene targets are recreated. The stored
/// exposure value survives resizes.
pub struct PostprocessPipeline {
    config: PostprocessConfig,

    shader: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    pass_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    globals: wgpu::BindGroup,
    pipelines: ChainPipelines,
    present_pipelines: Vec<(PresentKey, wgpu::RenderPipeline)>,

    bloom: Pyramid<BloomImages>,
    luminance: Option<GpuTexture>,
    reduction: Pyramid<GpuTexture>,
    passes: Option<ChainPasses>,
    targets_generation: Option<u64>,

    exposure: GpuTexture,
    first_exposure: bool,

    capture: Option<GpuTexture>,
}

impl PostprocessPipeline {
    pub fn new(ctx: &DeviceContext, config: PostprocessConfig) -> Result<Self> {
        let config = config.validated();
        let shader = ctx.create_shader("nabu postprocess shader", include_str!("../shaders/postprocess.wgsl"))?;

        let (global_layout, pass_layout, layout) = ctx.create_pipeline("nabu postprocess layouts", |device| {
            let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("nabu postprocess globals layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

            let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            };
            let pass_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("nabu postprocess pass layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    texture_entry(1),
                    texture_entry(2),
                ],
            });

            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("nabu postprocess pipeline layout"),
                bind_group_layouts: &[&global_layout, &pass_layout],
                immediate_size: 0,
            });
            (global_layout, pass_layout, layout)
        })?;

        let (params_buffer, globals) = ctx.create_resource(|device| {
            let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("nabu postprocess params"),
                contents: bytemuck::bytes_of(&PostParams::new(&config)),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("nabu postprocess sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            });
            let globals = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("nabu postprocess globals"),
                layout: &global_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            });
            (params_buffer, globals)
        })?;

        let pipelines = PipelineFactory {
            ctx,
            shader: &shader,
            layout: &layout,
        }
        .chain()?;

        let exposure = ctx.create_resource(|device| {
            create_image(
                device,
                "nabu exposure",
                1,
                1,
                HDR_FORMAT,
                1,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            )
        })?;

        Ok(Self {
            config,
            shader,
            layout,
            pass_layout,
            params_buffer,
            globals,
            pipelines,
            present_pipelines: Vec::new(),
            bloom: Pyramid::default(),
            luminance: None,
            reduction: Pyramid::default(),
            passes: None,
            targets_generation: None,
            exposure,
            first_exposure: true,
            capture: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &PostprocessConfig {
        &self.config
    }

    /// Replaces the settings; a changed bloom depth rebuilds the pyramid on the next run.
    pub fn set_config(&mut self, config: PostprocessConfig) {
        let config = config.validated();
        if config.bloom.levels != self.config.bloom.levels {
            self.targets_generation = None;
        }
        self.config = config;
    }

    /// Current bloom level sizes, level 0 first.
    pub fn bloom_levels(&self) -> Vec<(u32, u32)> {
        self.bloom.levels().iter().map(|l| (l.width, l.height)).collect()
    }

    /// Current exposure reduction sizes, ending at 1×1.
    pub fn exposure_levels(&self) -> Vec<(u32, u32)> {
        self.reduction.levels().iter().map(|l| (l.width, l.height)).collect()
    }

    /// Rebuilds pyramids and pass bindings when the scene targets changed.
    ///
    /// A failed rebuild is retried on the next call.
    pub fn ensure(&mut self, ctx: &DeviceContext, scheduler: &mut FrameScheduler, targets: &SceneTargets) -> Result<()> {
        if self.targets_generation == Some(targets.generation()) && self.passes.is_some() {
            return Ok(());
        }
        let rebuilt = ctx.create_resource(|device| self.rebuild(device, scheduler, targets));
        if rebuilt.is_err() {
            self.targets_generation = None;
        }
        rebuilt
    }

    fn rebuild(&mut self, device: &wgpu::Device, scheduler: &mut FrameScheduler, targets: &SceneTargets) {
        let (width, height) = targets.size();
        let hdr = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;

        let bloom_sizes = bloom_level_sizes(width, height, self.config.bloom.levels);
        for images in self.bloom.ensure((width, height), &bloom_sizes, |i, w, h| BloomImages {
            main: create_image(device, &format!("nabu bloom {i}"), w, h, HDR_FORMAT, 1, hdr),
            scratch: create_image(device, &format!("nabu bloom {i} scratch"), w, h, HDR_FORMAT, 1, hdr),
        }) {
            images.destroy().into_iter().for_each(|t| scheduler.retire(t));
        }

        let reduction = reduction_sizes(width, height);
        for image in self.reduction.ensure((width, height), &reduction, |i, w, h| {
            create_image(device, &format!("nabu exposure {i}"), w, h, HDR_FORMAT, 1, hdr)
        }) {
            scheduler.retire(image.texture);
        }

        let luminance = create_image(device, "nabu luminance", width, height, HDR_FORMAT, 1, hdr);
        if let Some(old) = self.luminance.replace(luminance) {
            scheduler.retire(old.texture);
        }

        let passes = self.build_passes(device, targets);
        if let Some(old) = self.passes.replace(passes) {
            old.into_bind_groups().for_each(|g| scheduler.retire(g));
        }
        if let Some(old) = self.capture.take() {
            scheduler.retire(old.texture);
        }

        self.targets_generation = Some(targets.generation());
        log::debug!(
            "postprocess chain rebuilt for {width}x{height}: {} bloom levels, {} exposure steps",
            bloom_sizes.len(),
            reduction.len()
        );
    }

    fn build_passes(&self, device: &wgpu::Device, targets: &SceneTargets) -> ChainPasses {
        let f = PassFactory {
            device,
            layout: &self.pass_layout,
        };
        let scene = targets.color();

        let mut bloom = BloomPasses::default();
        if !self.bloom.is_empty() {
            bloom.extract = Some(f.single("nabu bloom extract", scene, HORIZONTAL));
            for level in self.bloom.levels() {
                let images = &level.images;
                bloom.blur_h.push(f.single("nabu bloom blur h", &images.main, HORIZONTAL));
                bloom.blur_v.push(f.single("nabu bloom blur v", &images.scratch, VERTICAL));
                bloom.from_level.push(f.single("nabu bloom level", &images.main, HORIZONTAL));
            }
        }

        let mut reduce = Vec::with_capacity(self.reduction.levels().len());
        let mut source = self.luminance.as_ref().unwrap_or(scene);
        for level in self.reduction.levels() {
            reduce.push(f.single("nabu exposure reduce", source, HORIZONTAL));
            source = &level.images;
        }

        ChainPasses {
            bloom,
            luminance: f.single("nabu luminance", scene, HORIZONTAL),
            reduce,
            combine: f.single("nabu exposure combine", source, HORIZONTAL),
            present: f.bind("nabu present", scene, &self.exposure.view, HORIZONTAL),
        }
    }

    fn present_pipeline(&mut self, ctx: &DeviceContext, key: PresentKey) -> Result<&wgpu::RenderPipeline> {
        let index = match self.present_pipelines.iter().position(|(k, _)| *k == key) {
            Some(i) => i,
            None => {
                let pipeline = PipelineFactory {
                    ctx,
                    shader: &self.shader,
                    layout: &self.layout,
                }
                .present(key)?;
                log::debug!("built present pipeline for {:?} (gamma: {})", key.0, key.1);
                self.present_pipelines.push((key, pipeline));
                self.present_pipelines.len() - 1
            }
        };
        Ok(&self.present_pipelines[index].1)
    }

    /// Records the whole chain into the frame's draw encoder, presenting into `output`.
    ///
    /// `output` must match the scene size.
    pub fn record(
        &mut self,
        ctx: &DeviceContext,
        scheduler: &mut FrameScheduler,
        targets: &SceneTargets,
        output: &wgpu::TextureView,
        output_format: wgpu::TextureFormat,
    ) -> Result<()> {
        self.record_effects(ctx, scheduler, targets)?;
        let present = self.present_pipeline(ctx, (output_format, true))?.clone();
        let Some(passes) = self.passes.as_ref() else {
            return Ok(());
        };
        let encoder = scheduler.draw_encoder(ctx.device());
        fullscreen_pass(encoder, "nabu present", &present, &self.globals, &passes.present, output, CLEAR, None);
        Ok(())
    }

    /// Bloom and exposure only, for frames without an output image.
    ///
    /// Bloom lands in the scene color and exposure in its persistent texture,
    /// so a later [`present_offscreen`](Self::present_offscreen) sees both.
    pub fn record_effects(
        &mut self,
        ctx: &DeviceContext,
        scheduler: &mut FrameScheduler,
        targets: &SceneTargets,
    ) -> Result<()> {
        self.ensure(ctx, scheduler, targets)?;
        ctx.queue()
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&PostParams::new(&self.config)));

        let Some(passes) = self.passes.as_ref() else {
            return Ok(());
        };
        let encoder = scheduler.draw_encoder(ctx.device());

        if self.config.bloom.enabled {
            self.record_bloom(encoder, passes, &targets.color().view);
        }
        let exposure = self.config.exposure.enabled && self.record_exposure(encoder, passes);
        if exposure {
            self.first_exposure = false;
        }
        Ok(())
    }

    fn record_bloom(&self, encoder: &mut wgpu::CommandEncoder, passes: &ChainPasses, scene: &wgpu::TextureView) {
        let p = &self.pipelines;
        let g = &self.globals;
        let levels = self.bloom.levels();
        let (Some(first), Some(extract)) = (levels.first(), passes.bloom.extract.as_ref()) else {
            return;
        };
        let b = &passes.bloom;

        fullscreen_pass(encoder, "nabu bloom extract", &p.bloom_extract, g, extract, &first.images.main.view, CLEAR, None);

        let blur = |encoder: &mut wgpu::CommandEncoder, i: usize| {
            let images = &levels[i].images;
            fullscreen_pass(encoder, "nabu bloom blur h", &p.blur, g, &b.blur_h[i], &images.scratch.view, CLEAR, None);
            fullscreen_pass(encoder, "nabu bloom blur v", &p.blur, g, &b.blur_v[i], &images.main.view, CLEAR, None);
        };

        for i in 0..levels.len() - 1 {
            blur(encoder, i);
            let next = &levels[i + 1].images.main.view;
            fullscreen_pass(encoder, "nabu bloom downsample", &p.downsample, g, &b.from_level[i], next, CLEAR, None);
        }
        for i in (1..levels.len()).rev() {
            blur(encoder, i);
            let previous = &levels[i - 1].images.main.view;
            fullscreen_pass(encoder, "nabu bloom upscale", &p.upscale, g, &b.from_level[i], previous, LOAD, None);
        }

        fullscreen_pass(encoder, "nabu bloom composite", &p.composite, g, &b.from_level[0], scene, LOAD, None);
    }

    /// Returns whether the stored exposure was written.
    fn record_exposure(&self, encoder: &mut wgpu::CommandEncoder, passes: &ChainPasses) -> bool {
        let p = &self.pipelines;
        let g = &self.globals;
        let Some(luminance) = self.luminance.as_ref() else {
            return false;
        };

        fullscreen_pass(encoder, "nabu luminance", &p.luminance, g, &passes.luminance, &luminance.view, CLEAR, None);
        for (level, pass) in self.reduction.levels().iter().zip(&passes.reduce) {
            fullscreen_pass(encoder, "nabu exposure reduce", &p.reduce, g, pass, &level.images.view, CLEAR, None);
        }

        let alpha = exposure_blend(self.first_exposure, self.config.exposure.speed);
        let load = if self.first_exposure { CLEAR } else { LOAD };
        fullscreen_pass(
            encoder,
            "nabu exposure combine",
            &p.combine,
            g,
            &passes.combine,
            &self.exposure.view,
            load,
            Some(alpha as f64),
        );
        true
    }

    /// Presents the current scene color into an offscreen texture for readback.
    ///
    /// Gamma is left out; callers re-apply it on the CPU when they want it.
    pub fn present_offscreen(
        &mut self,
        ctx: &DeviceContext,
        scheduler: &mut FrameScheduler,
        targets: &SceneTargets,
        format: wgpu::TextureFormat,
    ) -> Result<&wgpu::Texture> {
        self.ensure(ctx, scheduler, targets)?;
        let format = format.remove_srgb_suffix();
        let (width, height) = targets.size();

        let capture = match self.capture.take() {
            Some(c) if c.texture.format() == format && (c.texture.width(), c.texture.height()) == (width, height) => c,
            stale => {
                if let Some(old) = stale {
                    scheduler.retire(old.texture);
                }
                ctx.create_resource(|device| {
                    create_image(
                        device,
                        "nabu capture",
                        width,
                        height,
                        format,
                        1,
                        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    )
                })?
            }
        };

        ctx.queue()
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&PostParams::new(&self.config)));
        let present = self.present_pipeline(ctx, (format, false))?.clone();

        if let Some(passes) = self.passes.as_ref() {
            let encoder = scheduler.draw_encoder(ctx.device());
            fullscreen_pass(encoder, "nabu capture", &present, &self.globals, &passes.present, &capture.view, CLEAR, None);
        }
        Ok(&self.capture.insert(capture).texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::GrayFormula;

    #[test]
    fn params_pack_settings() {
        let mut config = PostprocessConfig::default();
        config.tonemap.output_bits = 5;
        config.tonemap.gray_formula = GrayFormula::Perceptual;
        config.exposure.enabled = false;
        let p = PostParams::new(&config);

        assert_eq!(p.output[0], 31.0);
        assert_eq!(p.output[2], 2.0);
        assert_eq!(p.exposure[3], 0.0);
        let sum: f32 = p.weights.iter().flatten().sum();
        assert!((sum - 1.0).abs() <= 1e-5);
        assert_eq!(p.weights[1][3], 0.0);
        assert_eq!(std::mem::size_of::<PostParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<PassParams>(), 16);
    }

    #[test]
    fn out_of_range_output_depth_is_clamped() {
        let mut config = PostprocessConfig::default();
        config.tonemap.output_bits = 64;
        assert_eq!(PostParams::new(&config).output[0], 65535.0);

        config.tonemap.output_bits = 0;
        assert_eq!(PostParams::new(&config).output[0], 1.0);
    }
}

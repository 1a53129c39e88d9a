//! Pipeline selection from polygon flags, and the 32 precompiled scene pipelines.

use crate::device::DeviceContext;
use crate::error::Result;

use super::flags::PolyFlags;
use super::vertex::SceneVertex;

/// Number of precompiled scene pipeline variants.
pub const PIPELINE_VARIANTS: usize = 32;

/// Color blend equation of a pipeline variant.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlendMode {
    Translucent,
    Modulated,
    Highlighted,
    Opaque,
}

impl BlendMode {
    pub fn state(self) -> Option<wgpu::BlendState> {
        let component = |src, dst| wgpu::BlendComponent {
            src_factor: src,
            dst_factor: dst,
            operation: wgpu::BlendOperation::Add,
        };
        let both = |src, dst| wgpu::BlendState {
            color: component(src, dst),
            alpha: component(src, dst),
        };

        use wgpu::BlendFactor as F;
        match self {
            BlendMode::Translucent => Some(both(F::One, F::OneMinusSrc)),
            BlendMode::Modulated => Some(both(F::Dst, F::Src)),
            BlendMode::Highlighted => Some(both(F::One, F::OneMinusSrcAlpha)),
            BlendMode::Opaque => None,
        }
    }
}

/// Index of one of the [`PIPELINE_VARIANTS`] scene pipelines.
///
/// Bits 0-1 select the blend mode, then `INVISIBLE`, `OCCLUDE` and `MASKED`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, PartialOrd, Ord)]
pub struct PipelineIndex(u8);

impl PipelineIndex {
    pub const INVISIBLE: u8 = 4;
    pub const OCCLUDE: u8 = 8;
    pub const MASKED: u8 = 16;

    /// Returns `None` for values outside `0..32`.
    pub fn new(raw: u8) -> Option<Self> {
        ((raw as usize) < PIPELINE_VARIANTS).then_some(Self(raw))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn blend(self) -> BlendMode {
        match self.0 & 3 {
            0 => BlendMode::Translucent,
            1 => BlendMode::Modulated,
            2 => BlendMode::Highlighted,
            _ => BlendMode::Opaque,
        }
    }

    /// Color writes disabled.
    #[inline]
    pub fn invisible(self) -> bool {
        self.0 & Self::INVISIBLE != 0
    }

    #[inline]
    pub fn depth_write(self) -> bool {
        self.0 & Self::OCCLUDE != 0
    }

    /// Fragments below the alpha threshold are discarded.
    #[inline]
    pub fn alpha_test(self) -> bool {
        self.0 & Self::MASKED != 0
    }

    pub fn all() -> impl Iterator<Item = PipelineIndex> {
        (0..PIPELINE_VARIANTS as u8).map(PipelineIndex)
    }
}

/// Maps polygon flags to a pipeline variant.
///
/// Non-blended geometry always writes depth; translucent geometry is never alpha
/// tested. The blend mode is the first of Translucent, Modulated, Highlighted
/// present in the flags, else opaque.
pub fn compute_pipeline_index(flags: PolyFlags) -> PipelineIndex {
    let mut flags = flags;
    if !flags.intersects(PolyFlags::TRANSLUCENT | PolyFlags::MODULATED) {
        flags.insert(PolyFlags::OCCLUDE);
    } else if flags.contains(PolyFlags::TRANSLUCENT) {
        flags.remove(PolyFlags::MASKED);
    }

    let mut index = if flags.contains(PolyFlags::TRANSLUCENT) {
        0
    } else if flags.contains(PolyFlags::MODULATED) {
        1
    } else if flags.contains(PolyFlags::HIGHLIGHTED) {
        2
    } else {
        3
    };

    if flags.contains(PolyFlags::INVISIBLE) {
        index |= PipelineIndex::INVISIBLE;
    }
    if flags.contains(PolyFlags::OCCLUDE) {
        index |= PipelineIndex::OCCLUDE;
    }
    if flags.contains(PolyFlags::MASKED) {
        index |= PipelineIndex::MASKED;
    }
    PipelineIndex(index)
}

// ── GPU pipelines ─────────────────────────────────────────────────────────

/// Depth format of the scene depth buffer.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// All scene pipeline variants for one color format and sample count.
pub struct ScenePipelines {
    pipelines: Vec<wgpu::RenderPipeline>,
    sample_count: u32,
}

impl ScenePipelines {
    /// Builds every variant; the first creation error aborts the set.
    pub fn new(
        ctx: &DeviceContext,
        shader: &wgpu::ShaderModule,
        bind_group_layouts: &[&wgpu::BindGroupLayout],
        color_format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> Result<Self> {
        let pipelines = ctx.create_pipeline("nabu scene pipelines", |device| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("nabu scene pipeline layout"),
                bind_group_layouts,
                immediate_size: 0,
            });
            PipelineIndex::all()
                .map(|index| create_variant(device, shader, &layout, color_format, sample_count, index))
                .collect()
        })?;

        log::debug!("built {PIPELINE_VARIANTS} scene pipelines ({sample_count}x MSAA)");
        Ok(Self {
            pipelines,
            sample_count,
        })
    }

    #[inline]
    pub fn get(&self, index: PipelineIndex) -> &wgpu::RenderPipeline {
        &self.pipelines[index.index()]
    }

    #[inline]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}

fn create_variant(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    sample_count: u32,
    index: PipelineIndex,
) -> wgpu::RenderPipeline {
    let label = format!("nabu scene pipeline #{}", index.index());
    let write_mask = if index.invisible() {
        wgpu::ColorWrites::empty()
    } else {
        wgpu::ColorWrites::ALL
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&label),
        layout: Some(layout),

        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[SceneVertex::layout()],
        },

        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(if index.alpha_test() { "fs_masked" } else { "fs_main" }),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: index.blend().state(),
                write_mask,
            })],
        }),

        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Visibility is decided by the scene traversal.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },

        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: index.depth_write(),
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: sample_count,
            ..Default::default()
        },

        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translucent_masked_drops_masked() {
        let a = compute_pipeline_index(PolyFlags::TRANSLUCENT | PolyFlags::MASKED);
        let b = compute_pipeline_index(PolyFlags::TRANSLUCENT);
        assert_eq!(a, b);
        assert_eq!(a.index(), 0);
        assert!(!a.alpha_test());
        assert!(!a.depth_write());
    }

    #[test]
    fn unblended_geometry_forces_occlude() {
        let opaque = compute_pipeline_index(PolyFlags::NONE);
        assert_eq!(opaque.index(), 3 | 8);
        assert!(opaque.depth_write());
        assert_eq!(opaque.blend(), BlendMode::Opaque);

        let masked = compute_pipeline_index(PolyFlags::MASKED);
        assert_eq!(masked.index(), 3 | 8 | 16);

        let highlighted = compute_pipeline_index(PolyFlags::HIGHLIGHTED | PolyFlags::INVISIBLE);
        assert_eq!(highlighted.index(), 2 | 4 | 8);
        assert!(highlighted.invisible());
    }

    #[test]
    fn modulated_keeps_masked_and_priority_order() {
        let m = compute_pipeline_index(PolyFlags::MODULATED | PolyFlags::MASKED | PolyFlags::HIGHLIGHTED);
        assert_eq!(m.index(), 1 | 16);
        assert_eq!(m.blend(), BlendMode::Modulated);

        let t = compute_pipeline_index(PolyFlags::TRANSLUCENT | PolyFlags::MODULATED | PolyFlags::OCCLUDE);
        assert_eq!(t.index(), 8);
        assert_eq!(t.blend(), BlendMode::Translucent);
    }

    #[test]
    fn unrelated_flags_do_not_change_the_index() {
        for extra in [PolyFlags::TWO_SIDED, PolyFlags::NO_SMOOTH, PolyFlags::ENVIRONMENT, PolyFlags::UNLIT] {
            for base in [PolyFlags::NONE, PolyFlags::TRANSLUCENT, PolyFlags::MODULATED | PolyFlags::MASKED] {
                assert_eq!(compute_pipeline_index(base | extra), compute_pipeline_index(base));
            }
        }
    }

    #[test]
    fn every_index_is_in_range() {
        for bits in [0u32, 0x1, 0x2, 0x4, 0x40, 0x1_0000, 0x8000_0000, u32::MAX] {
            assert!(compute_pipeline_index(PolyFlags::from_bits_retain(bits)).index() < PIPELINE_VARIANTS);
        }
        assert_eq!(PipelineIndex::all().count(), PIPELINE_VARIANTS);
        assert!(PipelineIndex::new(32).is_none());
    }

    #[test]
    fn blend_states() {
        assert!(BlendMode::Opaque.state().is_none());
        let t = BlendMode::Translucent.state().unwrap();
        assert_eq!(t.color.dst_factor, wgpu::BlendFactor::OneMinusSrc);
        let m = BlendMode::Modulated.state().unwrap();
        assert_eq!((m.color.src_factor, m.color.dst_factor), (wgpu::BlendFactor::Dst, wgpu::BlendFactor::Src));
    }
}

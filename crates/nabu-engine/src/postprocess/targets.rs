//! Size-dependent render targets.

use crate::batch::DEPTH_FORMAT;
use crate::texture::GpuTexture;

use super::HDR_FORMAT;

// ── pyramid ───────────────────────────────────────────────────────────────

/// One level of an image pyramid.
#[derive(Debug)]
pub struct Level<T> {
    pub width: u32,
    pub height: u32,
    pub images: T,
}

/// Image pyramid whose level sizes follow the source resolution.
#[derive(Debug)]
pub struct Pyramid<T> {
    source: (u32, u32),
    levels: Vec<Level<T>>,
}

impl<T> Default for Pyramid<T> {
    fn default() -> Self {
        Self {
            source: (0, 0),
            levels: Vec::new(),
        }
    }
}

impl<T> Pyramid<T> {
    #[inline]
    pub fn source_size(&self) -> (u32, u32) {
        self.source
    }

    #[inline]
    pub fn levels(&self) -> &[Level<T>] {
        &self.levels
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Recreates every level when the source size or the level layout changed.
    ///
    /// Returns the images of the replaced levels; the caller retires them.
    pub fn ensure(
        &mut self,
        source: (u32, u32),
        sizes: &[(u32, u32)],
        mut create: impl FnMut(usize, u32, u32) -> T,
    ) -> Vec<T> {
        let unchanged = self.source == source
            && self.levels.len() == sizes.len()
            && self
                .levels
                .iter()
                .zip(sizes)
                .all(|(l, s)| (l.width, l.height) == *s);
        if unchanged {
            return Vec::new();
        }

        self.source = source;
        let released = self.levels.drain(..).map(|l| l.images).collect();
        self.levels = sizes
            .iter()
            .enumerate()
            .map(|(i, &(width, height))| Level {
                width,
                height,
                images: create(i, width, height),
            })
            .collect();
        released
    }

    /// Drops every level, returning the images.
    pub fn clear(&mut self) -> Vec<T> {
        self.source = (0, 0);
        self.levels.drain(..).map(|l| l.images).collect()
    }
}

// ── scene targets ─────────────────────────────────────────────────────────

pub(crate) fn create_image(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    sample_count: u32,
    usage: wgpu::TextureUsages,
) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture { texture, view }
}

/// HDR scene color, its optional multisampled twin and the depth buffer.
///
/// With MSAA the scene renders into `msaa` and resolves into `color`; the
/// postprocess chain only ever reads `color`.
pub struct SceneTargets {
    width: u32,
    height: u32,
    sample_count: u32,
    color: GpuTexture,
    msaa: Option<GpuTexture>,
    depth: GpuTexture,
    generation: u64,
}

impl SceneTargets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, sample_count: u32) -> Self {
        let (color, msaa, depth) = Self::create(device, width, height, sample_count);
        Self {
            width,
            height,
            sample_count,
            color,
            msaa,
            depth,
            generation: 0,
        }
    }

    fn create(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> (GpuTexture, Option<GpuTexture>, GpuTexture) {
        let color = create_image(
            device,
            "nabu scene color",
            width,
            height,
            HDR_FORMAT,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let msaa = (sample_count > 1).then(|| {
            create_image(
                device,
                "nabu scene color msaa",
                width,
                height,
                HDR_FORMAT,
                sample_count,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            )
        });
        let depth = create_image(
            device,
            "nabu scene depth",
            width,
            height,
            DEPTH_FORMAT,
            sample_count,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        (color, msaa, depth)
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Bumped every time the textures are recreated.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resolved scene color read by the postprocess chain.
    #[inline]
    pub fn color(&self) -> &GpuTexture {
        &self.color
    }

    /// View to render into and the resolve target, if multisampled.
    pub fn color_attachment(&self) -> (&wgpu::TextureView, Option<&wgpu::TextureView>) {
        match &self.msaa {
            Some(msaa) => (&msaa.view, Some(&self.color.view)),
            None => (&self.color.view, None),
        }
    }

    #[inline]
    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth.view
    }

    /// Recreates the targets when size or sample count changed. Returns the
    /// replaced textures for retirement.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32, sample_count: u32) -> Vec<wgpu::Texture> {
        if (width, height, sample_count) == (self.width, self.height, self.sample_count) {
            return Vec::new();
        }
        log::debug!("scene targets {width}x{height}, {sample_count}x MSAA");

        let (color, msaa, depth) = Self::create(device, width, height, sample_count);
        let old_color = std::mem::replace(&mut self.color, color);
        let old_msaa = std::mem::replace(&mut self.msaa, msaa);
        let old_depth = std::mem::replace(&mut self.depth, depth);
        self.width = width;
        self.height = height;
        self.sample_count = sample_count;
        self.generation += 1;

        std::iter::once(old_color.texture)
            .chain(old_msaa.map(|m| m.texture))
            .chain(std::iter::once(old_depth.texture))
            .collect()
    }
}

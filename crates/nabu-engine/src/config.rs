//! Renderer configuration.
//!
//! Plain structs with conservative defaults. [`RendererConfig::validated`] is
//! applied once when the render device is created.

use crate::postprocess::GrayFormula;

/// Sizes and policies for the batching/caching machinery.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Frames whose resources are tracked for retirement (2..=3).
    pub frames_in_flight: u32,

    /// Scene vertices held by the vertex ring.
    pub vertex_ring_capacity: usize,

    /// Indices held by the index ring.
    pub index_ring_capacity: usize,

    /// Initial size of the upload staging buffer in bytes.
    pub staging_capacity: u64,

    /// Descriptor sets per pool before another pool is allocated.
    pub descriptor_pool_size: usize,

    /// Swapchain recreate-and-retry attempts after an out-of-date acquire.
    pub acquire_retries: u32,

    /// Requested MSAA sample count (1, 2, 4 or 8); clamped to device support.
    pub multisample: u32,

    /// Postprocess chain settings.
    pub postprocess: PostprocessConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            vertex_ring_capacity: 256 * 1024,
            index_ring_capacity: 768 * 1024,
            staging_capacity: 16 * 1024 * 1024,
            descriptor_pool_size: 1000,
            acquire_retries: 1,
            multisample: 1,
            postprocess: PostprocessConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Clamps out-of-range values, logging every adjustment.
    pub fn validated(mut self) -> Self {
        let frames = self.frames_in_flight.clamp(2, 3);
        if frames != self.frames_in_flight {
            log::warn!("frames_in_flight {} clamped to {frames}", self.frames_in_flight);
            self.frames_in_flight = frames;
        }

        // A quad needs 4 vertices and 6 indices; anything smaller cannot draw.
        if self.vertex_ring_capacity < 4 {
            log::warn!("vertex_ring_capacity {} raised to 4", self.vertex_ring_capacity);
            self.vertex_ring_capacity = 4;
        }
        if self.index_ring_capacity < 6 {
            log::warn!("index_ring_capacity {} raised to 6", self.index_ring_capacity);
            self.index_ring_capacity = 6;
        }

        if self.staging_capacity < 64 * 1024 {
            log::warn!("staging_capacity {} raised to 64 KiB", self.staging_capacity);
            self.staging_capacity = 64 * 1024;
        }

        if self.descriptor_pool_size == 0 {
            log::warn!("descriptor_pool_size 0 raised to 1");
            self.descriptor_pool_size = 1;
        }

        if !matches!(self.multisample, 1 | 2 | 4 | 8) {
            let fixed = self.multisample.clamp(1, 8).next_power_of_two().min(8);
            log::warn!("multisample {} replaced by {fixed}", self.multisample);
            self.multisample = fixed;
        }

        self.postprocess = self.postprocess.validated();
        self
    }
}

/// Settings for the postprocess chain.
#[derive(Debug, Clone, Default)]
pub struct PostprocessConfig {
    pub bloom: BloomSettings,
    pub exposure: ExposureSettings,
    pub tonemap: TonemapSettings,
}

impl PostprocessConfig {
    pub(crate) fn validated(mut self) -> Self {
        let levels = self.bloom.levels.clamp(1, 8);
        if levels != self.bloom.levels {
            log::warn!("bloom levels {} clamped to {levels}", self.bloom.levels);
            self.bloom.levels = levels;
        }
        self.bloom.blur_amount = self.bloom.blur_amount.max(0.01);

        self.exposure.min = self.exposure.min.max(1e-4);
        self.exposure.speed = self.exposure.speed.clamp(0.0, 1.0);

        let bits = self.tonemap.output_bits.clamp(1, 16);
        if bits != self.tonemap.output_bits {
            log::warn!("output_bits {} clamped to {bits}", self.tonemap.output_bits);
            self.tonemap.output_bits = bits;
        }
        self.tonemap.gamma = self.tonemap.gamma.max(0.1);
        self
    }
}

/// Bloom pyramid settings.
#[derive(Debug, Clone)]
pub struct BloomSettings {
    pub enabled: bool,
    /// Pyramid depth; level 0 is half the scene resolution.
    pub levels: u32,
    /// Luminance above which a pixel contributes to bloom.
    pub threshold: f32,
    /// Strength of the final additive composite.
    pub amount: f32,
    /// Gaussian θ used to derive the 7 blur taps.
    pub blur_amount: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            levels: 4,
            threshold: 0.75,
            amount: 0.5,
            blur_amount: 1.2,
        }
    }
}

/// Auto-exposure settings: `adjustment = 1 / max(base + light * scale, min)`.
#[derive(Debug, Clone)]
pub struct ExposureSettings {
    pub enabled: bool,
    pub base: f32,
    pub scale: f32,
    pub min: f32,
    /// Exponential smoothing factor applied each frame after the first.
    pub speed: f32,
}

impl Default for ExposureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base: 0.5,
            scale: 1.0,
            min: 0.1,
            speed: 0.05,
        }
    }
}

/// Tonemap/present settings.
#[derive(Debug, Clone)]
pub struct TonemapSettings {
    pub gray_formula: GrayFormula,
    pub contrast: f32,
    pub saturation: f32,
    pub brightness: f32,
    pub gamma: f32,
    /// Output quantization depth per channel.
    pub output_bits: u32,
    /// Add the ordered-dither threshold before quantization.
    pub dither: bool,
}

impl Default for TonemapSettings {
    fn default() -> Self {
        Self {
            gray_formula: GrayFormula::Itu,
            contrast: 1.0,
            saturation: 1.0,
            brightness: 0.0,
            gamma: 1.0,
            output_bits: 8,
            dither: true,
        }
    }
}

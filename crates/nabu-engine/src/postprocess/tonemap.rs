//! Tonemap and present math.
//!
//! `postprocess.wgsl` implements the same formulas; the functions here are the
//! CPU reference used by tests and by framebuffer readback.

use crate::config::TonemapSettings;

/// How color is reduced to gray before saturation is applied.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum GrayFormula {
    /// Unweighted mean of the channels.
    Luminance,
    /// ITU-R BT.709 weights.
    #[default]
    Itu,
    /// Weighted root mean square, closer to perceived brightness.
    Perceptual,
}

impl GrayFormula {
    /// Value passed to the shader.
    pub fn index(self) -> u32 {
        match self {
            GrayFormula::Luminance => 0,
            GrayFormula::Itu => 1,
            GrayFormula::Perceptual => 2,
        }
    }

    pub fn gray(self, [r, g, b]: [f32; 3]) -> f32 {
        match self {
            GrayFormula::Luminance => (r + g + b) / 3.0,
            GrayFormula::Itu => 0.2126 * r + 0.7152 * g + 0.0722 * b,
            GrayFormula::Perceptual => (0.299 * r * r + 0.587 * g * g + 0.114 * b * b).sqrt(),
        }
    }
}

/// 8×8 Bayer matrix, values `0..64`.
pub const DITHER_8X8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Dither threshold in `[0, 1)` for a pixel.
#[inline]
pub fn dither_threshold(x: u32, y: u32) -> f32 {
    (DITHER_8X8[(y % 8) as usize][(x % 8) as usize] as f32 + 0.5) / 64.0
}

/// Highest code of a `bits`-deep output channel; depths outside 1..=16 are clamped.
pub(crate) fn output_levels(bits: u32) -> f32 {
    ((1u64 << bits.clamp(1, 16)) - 1) as f32
}

/// Quantizes `value` in `[0, 1]` to `bits` and returns it as a fraction.
///
/// `threshold` is added before truncation; 0.5 is plain rounding.
pub fn quantize(value: f32, bits: u32, threshold: f32) -> f32 {
    let levels = output_levels(bits);
    ((value.clamp(0.0, 1.0) * levels + threshold).floor() / levels).min(1.0)
}

/// Exposure, color grading and gamma for one pixel, before quantization.
pub fn tonemap(rgb: [f32; 3], exposure: f32, settings: &TonemapSettings) -> [f32; 3] {
    let exposed = rgb.map(|c| c * exposure);
    let gray = settings.gray_formula.gray(exposed);
    exposed.map(|c| {
        let saturated = gray + (c - gray) * settings.saturation;
        let graded = (saturated - 0.5) * settings.contrast + 0.5 + settings.brightness;
        graded.clamp(0.0, 1.0).powf(1.0 / settings.gamma)
    })
}

/// Full present transform of one pixel at `(x, y)`.
pub fn present_pixel(rgb: [f32; 3], exposure: f32, x: u32, y: u32, settings: &TonemapSettings) -> [f32; 3] {
    let threshold = if settings.dither { dither_threshold(x, y) } else { 0.5 };
    tonemap(rgb, exposure, settings).map(|c| quantize(c, settings.output_bits, threshold))
}

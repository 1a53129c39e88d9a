//! Auto-exposure reduction and smoothing.

use crate::config::ExposureSettings;

use super::bloom::half;

/// Sizes produced by each 2×2 reduction step, starting from a `width`×`height`
/// luminance image and ending at 1×1.
///
/// The step count is `ceil(log2(max(width, height)))`.
pub fn reduction_sizes(width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut size = (width.max(1), height.max(1));
    let mut sizes = Vec::new();
    while size != (1, 1) {
        size = (half(size.0), half(size.1));
        sizes.push(size);
    }
    sizes
}

/// `ceil(log2(max(width, height)))`.
pub fn reduction_steps(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - (largest - 1).leading_zeros()
}

/// Exposure multiplier for an average scene `light` level.
pub fn exposure_adjustment(light: f32, settings: &ExposureSettings) -> f32 {
    1.0 / (settings.base + light * settings.scale).max(settings.min)
}

/// Blend factor applied to the new exposure value this frame.
///
/// The first frame has no previous value to blend with.
#[inline]
pub fn exposure_blend(first_frame: bool, speed: f32) -> f32 {
    if first_frame { 1.0 } else { speed }
}

/// CPU reference of the GPU combine pass.
pub fn combine_exposure(previous: Option<f32>, adjustment: f32, speed: f32) -> f32 {
    match previous {
        None => adjustment,
        Some(prev) => {
            let alpha = exposure_blend(false, speed);
            prev + (adjustment - prev) * alpha
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduction_reaches_one_pixel_in_ceil_log2_steps() {
        for (w, h) in [(1, 1), (2, 1), (800, 600), (1920, 1080), (1024, 768), (1025, 3), (7, 9)] {
            let sizes = reduction_sizes(w, h);
            assert_eq!(sizes.len() as u32, reduction_steps(w, h), "{w}x{h}");
            assert_eq!(sizes.last().copied().unwrap_or((w, h)), (1, 1));
        }
        assert_eq!(reduction_steps(800, 600), 10);
        assert_eq!(reduction_steps(1920, 1080), 11);
        assert_eq!(reduction_steps(1024, 1), 10);
    }

    #[test]
    fn adjustment_is_bounded_by_min() {
        let s = ExposureSettings {
            base: 0.0,
            scale: 1.0,
            min: 0.25,
            ..Default::default()
        };
        assert_eq!(exposure_adjustment(0.0, &s), 4.0);
        assert_eq!(exposure_adjustment(2.0, &s), 0.5);
    }

    #[test]
    fn first_frame_is_written_directly() {
        assert_eq!(combine_exposure(None, 3.0, 0.05), 3.0);
        let next = combine_exposure(Some(1.0), 3.0, 0.25);
        assert!((next - 1.5).abs() < 1e-6);
        assert_eq!(exposure_blend(true, 0.25), 1.0);
    }
}

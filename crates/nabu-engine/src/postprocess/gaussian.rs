//! Separable blur weights.

/// Taps of the separable blur, offsets -3..=3.
pub const BLUR_TAPS: usize = 7;

/// Gaussian weights for offsets `-3..=3`, normalized to sum to one.
///
/// `w(n) = 1/sqrt(2πθ) · exp(-n²/(2θ²))` before normalization. Non-positive
/// or non-finite `blur_amount` degrades to a pass-through (all weight on the
/// center tap).
pub fn gaussian_weights(blur_amount: f32) -> [f32; BLUR_TAPS] {
    let theta = blur_amount as f64;
    let mut weights = [0.0f32; BLUR_TAPS];
    if !(theta.is_finite() && theta > 0.0) {
        weights[BLUR_TAPS / 2] = 1.0;
        return weights;
    }

    let scale = 1.0 / (2.0 * std::f64::consts::PI * theta).sqrt();
    let raw: [f64; BLUR_TAPS] = std::array::from_fn(|i| {
        let n = i as f64 - (BLUR_TAPS / 2) as f64;
        scale * (-(n * n) / (2.0 * theta * theta)).exp()
    });
    let sum: f64 = raw.iter().sum();
    for (w, r) in weights.iter_mut().zip(raw) {
        *w = (r / sum) as f32;
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        for blur in [0.01, 0.25, 0.5, 1.0, 1.2, 2.0, 3.5, 10.0, 100.0] {
            let sum: f32 = gaussian_weights(blur).iter().sum();
            assert!((sum - 1.0).abs() <= 1e-5, "blur {blur}: sum {sum}");
        }
    }

    #[test]
    fn weights_are_symmetric_and_peak_in_the_middle() {
        let w = gaussian_weights(1.2);
        for i in 0..3 {
            assert!((w[i] - w[BLUR_TAPS - 1 - i]).abs() < 1e-7);
            assert!(w[i] < w[i + 1]);
        }
    }

    #[test]
    fn degenerate_amount_passes_through() {
        assert_eq!(gaussian_weights(0.0), [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(gaussian_weights(f32::NAN)[3], 1.0);
    }
}

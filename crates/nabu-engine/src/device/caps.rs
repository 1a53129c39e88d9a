use crate::postprocess::HDR_FORMAT;

/// Device capabilities negotiated at creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCaps {
    /// BC1/BC2/BC3 textures can be sampled directly.
    pub texture_compression_bc: bool,

    /// Largest width/height accepted for a 2D texture.
    pub max_texture_dimension: u32,

    /// Sample counts the HDR scene target supports, ascending. Always contains 1.
    pub sample_counts: Vec<u32>,
}

impl DeviceCaps {
    /// Builds the capability set from what the device was created with.
    pub fn new(features: wgpu::Features, limits: &wgpu::Limits, sample_counts: Vec<u32>) -> Self {
        let mut sample_counts = sample_counts;
        if !sample_counts.contains(&1) {
            sample_counts.push(1);
        }
        sample_counts.sort_unstable();
        sample_counts.dedup();

        Self {
            texture_compression_bc: features.contains(wgpu::Features::TEXTURE_COMPRESSION_BC),
            max_texture_dimension: limits.max_texture_dimension_2d,
            sample_counts,
        }
    }

    /// Returns the largest supported sample count not above `requested`.
    pub fn clamp_sample_count(&self, requested: u32) -> u32 {
        self.sample_counts
            .iter()
            .copied()
            .filter(|&n| n <= requested.max(1))
            .max()
            .unwrap_or(1)
    }
}

/// Features to request: whatever the host requires, plus optional features the
/// adapter happens to offer.
pub(crate) fn negotiate_features(
    adapter_features: wgpu::Features,
    required: wgpu::Features,
) -> wgpu::Features {
    let optional = wgpu::Features::TEXTURE_COMPRESSION_BC;
    required | (adapter_features & optional)
}

/// Sample counts usable for the HDR scene target on this adapter.
pub(crate) fn supported_sample_counts(adapter: &wgpu::Adapter) -> Vec<u32> {
    let flags = adapter.get_texture_format_features(HDR_FORMAT).flags;
    [1u32, 2, 4, 8]
        .into_iter()
        .filter(|&n| n == 1 || flags.sample_count_supported(n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(counts: &[u32]) -> DeviceCaps {
        DeviceCaps::new(wgpu::Features::empty(), &wgpu::Limits::default(), counts.to_vec())
    }

    #[test]
    fn sample_count_always_includes_one() {
        assert_eq!(caps(&[4]).sample_counts, vec![1, 4]);
    }

    #[test]
    fn clamp_sample_count_picks_largest_supported() {
        let c = caps(&[1, 2, 4]);
        assert_eq!(c.clamp_sample_count(8), 4);
        assert_eq!(c.clamp_sample_count(4), 4);
        assert_eq!(c.clamp_sample_count(3), 2);
        assert_eq!(c.clamp_sample_count(0), 1);
    }

    #[test]
    fn bc_is_optional() {
        let granted = negotiate_features(
            wgpu::Features::TEXTURE_COMPRESSION_BC | wgpu::Features::DEPTH_CLIP_CONTROL,
            wgpu::Features::empty(),
        );
        assert_eq!(granted, wgpu::Features::TEXTURE_COMPRESSION_BC);

        let none = negotiate_features(wgpu::Features::empty(), wgpu::Features::empty());
        assert!(none.is_empty());
    }

    #[test]
    fn bc_flag_follows_features() {
        let c = DeviceCaps::new(
            wgpu::Features::TEXTURE_COMPRESSION_BC,
            &wgpu::Limits::default(),
            vec![1],
        );
        assert!(c.texture_compression_bc);
        assert_eq!(c.max_texture_dimension, wgpu::Limits::default().max_texture_dimension_2d);
    }
}

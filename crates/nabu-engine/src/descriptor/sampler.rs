use crate::batch::PolyFlags;

/// Sampler-mode bitmask: point filtering, clamping and the dummy-mip LOD shift.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct SamplerMode(u8);

impl SamplerMode {
    pub const POINT_FILTER: u8 = 0b0001;
    pub const CLAMP: u8 = 0b0010;
    const MIP_SHIFT: u8 = 2;
    const MIP_MASK: u8 = 0b1100;

    /// Number of distinct modes.
    pub const COUNT: usize = 16;

    /// Largest dummy-mip count the mode can carry.
    pub const MAX_DUMMY_MIPS: u32 = 3;

    /// Derives the mode for a draw: `NoSmooth` selects point filtering, `clamp`
    /// comes from the caller, the LOD shift from the base texture's dummy mips.
    pub fn from_poly_flags(flags: PolyFlags, clamp: bool, dummy_mips: u32) -> Self {
        let mut bits = 0;
        if flags.contains(PolyFlags::NO_SMOOTH) {
            bits |= Self::POINT_FILTER;
        }
        if clamp {
            bits |= Self::CLAMP;
        }
        bits |= (dummy_mips.min(Self::MAX_DUMMY_MIPS) as u8) << Self::MIP_SHIFT;
        Self(bits)
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn point_filter(self) -> bool {
        self.0 & Self::POINT_FILTER != 0
    }

    #[inline]
    pub fn clamp(self) -> bool {
        self.0 & Self::CLAMP != 0
    }

    #[inline]
    pub fn dummy_mips(self) -> u32 {
        ((self.0 & Self::MIP_MASK) >> Self::MIP_SHIFT) as u32
    }

    /// Sampler descriptor for this mode. Sampling starts at the first real mip.
    pub fn descriptor(self) -> wgpu::SamplerDescriptor<'static> {
        let filter = if self.point_filter() {
            wgpu::FilterMode::Nearest
        } else {
            wgpu::FilterMode::Linear
        };
        let mipmap_filter = if self.point_filter() {
            wgpu::MipmapFilterMode::Nearest
        } else {
            wgpu::MipmapFilterMode::Linear
        };
        let address = if self.clamp() {
            wgpu::AddressMode::ClampToEdge
        } else {
            wgpu::AddressMode::Repeat
        };

        wgpu::SamplerDescriptor {
            label: Some("nabu scene sampler"),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter,
            lod_min_clamp: self.dummy_mips() as f32,
            lod_max_clamp: 32.0,
            ..Default::default()
        }
    }
}

/// Samplers created on first use, one per mode.
pub struct SamplerCache {
    samplers: [Option<wgpu::Sampler>; SamplerMode::COUNT],
}

impl SamplerCache {
    pub fn new() -> Self {
        Self {
            samplers: std::array::from_fn(|_| None),
        }
    }

    pub fn get(&mut self, device: &wgpu::Device, mode: SamplerMode) -> &wgpu::Sampler {
        self.samplers[mode.bits() as usize]
            .get_or_insert_with(|| device.create_sampler(&mode.descriptor()))
    }
}

impl Default for SamplerCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_from_flags() {
        let m = SamplerMode::from_poly_flags(PolyFlags::NO_SMOOTH | PolyFlags::MASKED, true, 2);
        assert!(m.point_filter());
        assert!(m.clamp());
        assert_eq!(m.dummy_mips(), 2);
        assert_eq!(m.bits(), 0b1011);

        let plain = SamplerMode::from_poly_flags(PolyFlags::TRANSLUCENT, false, 0);
        assert_eq!(plain, SamplerMode::default());
    }

    #[test]
    fn dummy_mips_saturate() {
        let m = SamplerMode::from_poly_flags(PolyFlags::NONE, false, 9);
        assert_eq!(m.dummy_mips(), SamplerMode::MAX_DUMMY_MIPS);
        assert!((m.bits() as usize) < SamplerMode::COUNT);
    }

    #[test]
    fn descriptor_skips_dummy_levels() {
        let d = SamplerMode::from_poly_flags(PolyFlags::NONE, true, 1).descriptor();
        assert_eq!(d.lod_min_clamp, 1.0);
        assert_eq!(d.address_mode_u, wgpu::AddressMode::ClampToEdge);
        assert_eq!(d.mag_filter, wgpu::FilterMode::Linear);
    }
}

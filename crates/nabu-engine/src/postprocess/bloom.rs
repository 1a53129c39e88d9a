//! Bloom pyramid layout.
//!
//! Level 0 is half the scene resolution, every further level halves again
//! (rounding up, never below 1×1). Each level owns two images so the separable
//! blur can ping-pong between them.

use crate::texture::GpuTexture;

/// Sizes of the bloom levels for a `width`×`height` scene.
pub fn bloom_level_sizes(width: u32, height: u32, levels: u32) -> Vec<(u32, u32)> {
    let mut size = (half(width), half(height));
    let mut sizes = Vec::with_capacity(levels as usize);
    for _ in 0..levels {
        sizes.push(size);
        size = (half(size.0), half(size.1));
    }
    sizes
}

#[inline]
pub(crate) fn half(v: u32) -> u32 {
    v.div_ceil(2).max(1)
}

/// The two images of one bloom level.
#[derive(Debug)]
pub struct BloomImages {
    /// Holds the level's result between passes.
    pub main: GpuTexture,
    /// Intermediate of the horizontal blur.
    pub scratch: GpuTexture,
}

impl BloomImages {
    pub fn destroy(self) -> [wgpu::Texture; 2] {
        [self.main.texture, self.scratch.texture]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_halve_from_half_resolution() {
        assert_eq!(
            bloom_level_sizes(800, 600, 4),
            vec![(400, 300), (200, 150), (100, 75), (50, 38)]
        );
    }

    #[test]
    fn tiny_scenes_bottom_out_at_one_pixel() {
        assert_eq!(bloom_level_sizes(3, 1, 3), vec![(2, 1), (1, 1), (1, 1)]);
    }
}

//! Postprocess chain.
//!
//! This module is responsible for:
//! - the bloom pyramid (extract, separable blur, downsample, upscale-combine)
//! - auto-exposure (luminance reduction to 1×1, smoothed across frames)
//! - the tonemapped, dithered present into the output image
//! - the size-dependent scene targets the batcher renders into

mod bloom;
mod exposure;
mod gaussian;
mod pipeline;
mod targets;
mod tonemap;

pub use bloom::{bloom_level_sizes, BloomImages};
pub use exposure::{combine_exposure, exposure_adjustment, exposure_blend, reduction_sizes, reduction_steps};
pub use gaussian::{gaussian_weights, BLUR_TAPS};
pub use pipeline::PostprocessPipeline;
pub use targets::{Level, Pyramid, SceneTargets};
pub use tonemap::{dither_threshold, present_pixel, quantize, tonemap, GrayFormula, DITHER_8X8};

/// Format of the scene color and every intermediate image of the chain.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

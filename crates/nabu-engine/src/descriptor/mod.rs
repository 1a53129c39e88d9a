//! Descriptor (bind group) caching.
//!
//! A draw binds up to four textures plus a sampler mode. Each distinct tuple maps
//! to one immutable bind group, created on first use and kept until the texture
//! cache is cleared.

mod cache;
mod gpu;
mod sampler;

pub use cache::{DescriptorCache, DescriptorKey};
pub use gpu::{TextureBindings, TEXTURE_SLOTS};
pub use sampler::{SamplerCache, SamplerMode};

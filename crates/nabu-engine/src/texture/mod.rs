//! Texture cache and uploads.
//!
//! This module is responsible for:
//! - mapping `(cache id, masked)` to exactly one GPU texture
//! - converting source pixel formats on upload through a per-format table
//! - re-uploading realtime textures when their change stamp moves
//! - padding small block-compressed textures with dummy mips

mod cache;
mod format;
mod gpu;
mod layout;
mod source;

pub use cache::{CachedTexture, MipRegion, TextureAllocator, TextureCache, TextureDesc, TextureId, UploadJob};
pub use format::{BlockInfo, CopyJob, FormatUploader, PixelFormat, UploaderTable};
pub use gpu::{GpuTexture, GpuTextureAllocator};
pub use layout::ImageLayout;
pub use source::{MipSource, TextureSource};

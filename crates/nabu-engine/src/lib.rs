//! Nabu render backend.
//!
//! Turns an immediate-mode stream of scene draw calls into batched wgpu
//! submissions, and owns the texture cache, descriptor cache and the
//! postprocess chain that sit behind it.

pub mod batch;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod frame;
pub mod postprocess;
pub mod staging;
pub mod texture;

pub mod logging;
pub mod scene;
pub mod stats;

pub use config::RendererConfig;
pub use error::{RenderError, Result};
pub use scene::RenderDevice;

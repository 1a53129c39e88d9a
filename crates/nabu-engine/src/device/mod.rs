//! GPU device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue
//! - negotiating optional features and recording device limits
//! - classifying surface errors for the frame scheduler

mod caps;
mod context;
mod error;
mod init;
pub(crate) mod surface;

pub use caps::DeviceCaps;
pub use context::{create_instance, DeviceContext};
pub use error::SurfaceErrorAction;
pub use init::DeviceInit;

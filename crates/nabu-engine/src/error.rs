//! Error types for the render backend.

use thiserror::Error;

/// Errors surfaced by the backend.
///
/// Creation-time failures (device, surface, pipelines) are fatal: the backend must
/// not be used after one is returned. Everything else is transient or degraded and
/// is absorbed by the owning frame call.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no suitable GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("failed to create GPU device: {0}")]
    DeviceCreation(String),

    #[error("failed to create presentation surface: {0}")]
    SurfaceCreation(String),

    #[error("failed to build pipeline `{label}`: {reason}")]
    PipelineCreation { label: &'static str, reason: String },

    #[error("texture format {0:?} is not supported by this device")]
    UnsupportedFormat(crate::texture::PixelFormat),

    #[error("texture {id:#x} is malformed: {reason}")]
    InvalidTexture { id: u64, reason: String },

    #[error("texture {width}x{height} exceeds device limit {limit}")]
    TextureTooLarge { width: u32, height: u32, limit: u32 },

    #[error("primitive needs {vertices} vertices / {indices} indices, ring holds {vertex_capacity} / {index_capacity}")]
    PrimitiveTooLarge {
        vertices: usize,
        indices: usize,
        vertex_capacity: usize,
        index_capacity: usize,
    },

    #[error("swapchain image unavailable")]
    SwapchainUnavailable,

    #[error("framebuffer readback failed: {0}")]
    Readback(String),

    #[error(transparent)]
    FrameOrder(#[from] crate::frame::InvalidTransition),

    #[error("GPU error: {0}")]
    Gpu(String),
}

impl RenderError {
    /// Returns `true` for errors after which the backend must not be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::AdapterUnavailable(_)
                | RenderError::DeviceCreation(_)
                | RenderError::SurfaceCreation(_)
                | RenderError::PipelineCreation { .. }
        )
    }
}

impl From<wgpu::Error> for RenderError {
    fn from(e: wgpu::Error) -> Self {
        match e {
            wgpu::Error::OutOfMemory { .. } => RenderError::Gpu("out of GPU memory".into()),
            wgpu::Error::Validation { description, .. } | wgpu::Error::Internal { description, .. } => {
                RenderError::Gpu(description)
            }
        }
    }
}

/// Backend result alias.
pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_failures_are_fatal() {
        assert!(RenderError::DeviceCreation("lost".into()).is_fatal());
        assert!(
            RenderError::PipelineCreation { label: "scene", reason: "bad wgsl".into() }.is_fatal()
        );
    }

    #[test]
    fn steady_state_failures_are_not_fatal() {
        assert!(!RenderError::SwapchainUnavailable.is_fatal());
        assert!(
            !RenderError::PrimitiveTooLarge {
                vertices: 10,
                indices: 30,
                vertex_capacity: 4,
                index_capacity: 6,
            }
            .is_fatal()
        );
        assert!(!RenderError::TextureTooLarge { width: 9000, height: 1, limit: 8192 }.is_fatal());
    }

    #[test]
    fn scoped_wgpu_errors_keep_their_description() {
        let validation = wgpu::Error::Validation {
            source: Box::new(std::fmt::Error),
            description: "texture width 70000 exceeds limit".into(),
        };
        match RenderError::from(validation) {
            RenderError::Gpu(reason) => assert!(reason.contains("70000")),
            other => panic!("unexpected {other:?}"),
        }

        let oom = RenderError::from(wgpu::Error::OutOfMemory {
            source: Box::new(std::fmt::Error),
        });
        assert!(matches!(oom, RenderError::Gpu(_)));
        assert!(!oom.is_fatal());
    }
}

use crate::error::{RenderError, Result};

use super::caps::{negotiate_features, supported_sample_counts};
use super::{DeviceCaps, DeviceInit};

/// Owns the wgpu core objects shared by every backend subsystem.
///
/// Subsystems never hold a pointer back to this type; it is passed by reference
/// into each operation that needs the device or queue.
pub struct DeviceContext {
    /// wgpu instance used to create the adapter and surfaces.
    instance: wgpu::Instance,

    /// Selected adapter.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    /// What the device was created with.
    caps: DeviceCaps,
}

impl DeviceContext {
    /// Creates the device, optionally compatible with an already created surface.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(
        instance: wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
        init: &DeviceInit,
    ) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::AdapterUnavailable(e.to_string()))?;

        let info = adapter.get_info();
        log::info!(
            "using adapter '{}' ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let required_features = negotiate_features(adapter.features(), init.required_features);
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_texture_dimension_2d: adapter_limits
                .max_texture_dimension_2d
                .max(init.required_limits.max_texture_dimension_2d),
            ..init.required_limits.clone()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("nabu device"),
                required_features,
                required_limits: required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| RenderError::DeviceCreation(e.to_string()))?;

        let caps = DeviceCaps::new(
            device.features(),
            &device.limits(),
            supported_sample_counts(&adapter),
        );
        if !caps.texture_compression_bc {
            log::info!("BC texture compression unavailable; compressed textures degrade to placeholders");
        }
        log::debug!("device caps: {caps:?}");

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            caps,
        })
    }

    /// Creates a device with no presentation surface (offscreen rendering, readback, tests).
    pub async fn new_headless(init: &DeviceInit) -> Result<Self> {
        let instance = create_instance(init);
        Self::new(instance, None, init).await
    }

    /// Returns the instance the device was created from.
    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    /// Returns the selected adapter.
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Returns the negotiated capabilities.
    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    /// Blocks until the given submission (or all submitted work) has completed.
    pub fn wait_for(&self, submission: Option<wgpu::SubmissionIndex>) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: submission,
                timeout: None,
            })
            .map(|_| ())
            .map_err(|e| RenderError::Gpu(e.to_string()))
    }

    /// Runs `create` inside out-of-memory and validation error scopes and
    /// returns the first error either caught.
    ///
    /// Without a scope, wgpu hands creation errors to the uncaptured error
    /// handler, which panics.
    pub fn scoped<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> std::result::Result<T, wgpu::Error> {
        let oom = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(validation.pop());
        let oom = pollster::block_on(oom.pop());
        match validation.or(oom) {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }

    /// [`scoped`](Self::scoped) for resources; errors become [`RenderError::Gpu`].
    pub fn create_resource<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.scoped(create).map_err(|e| {
            log::error!("resource creation failed: {e}");
            RenderError::from(e)
        })
    }

    /// [`scoped`](Self::scoped) for layouts and pipelines; errors become
    /// [`RenderError::PipelineCreation`].
    pub fn create_pipeline<T>(&self, label: &'static str, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.scoped(create).map_err(|e| {
            log::error!("'{label}' failed to build: {e}");
            RenderError::PipelineCreation {
                label,
                reason: e.to_string(),
            }
        })
    }

    /// Builds a shader module and turns WGSL compilation errors into a fatal error.
    pub fn create_shader(&self, label: &'static str, source: &'static str) -> Result<wgpu::ShaderModule> {
        let module = self.create_pipeline(label, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| m.message.clone())
            .collect();

        if !errors.is_empty() {
            log::error!("shader '{label}' failed to compile: {}", errors.join("; "));
            return Err(RenderError::PipelineCreation {
                label,
                reason: errors.join("; "),
            });
        }

        Ok(module)
    }
}

/// Creates the wgpu instance for the configured backends.
pub fn create_instance(init: &DeviceInit) -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: init.backends,
        ..Default::default()
    })
}

use crate::device::surface::{choose_alpha_mode, choose_present_mode, choose_surface_format, classify_surface_error};
use crate::device::{DeviceContext, DeviceInit, SurfaceErrorAction};
use crate::error::{RenderError, Result};

/// A swapchain image held for the duration of one frame.
///
/// Holding the surface texture prevents acquisition of subsequent images.
pub struct AcquiredImage {
    pub texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}

/// Result of an acquire with bounded retries.
#[derive(Debug)]
pub enum AcquireOutcome<T> {
    Acquired(T),
    /// No image this frame; presentation is skipped.
    Unavailable,
    Fatal(wgpu::SurfaceError),
}

/// Calls `acquire`, recreating the swapchain and retrying up to `retries` times
/// when the image is out of date.
pub(crate) fn acquire_with_retry<T>(
    retries: u32,
    mut acquire: impl FnMut() -> std::result::Result<T, wgpu::SurfaceError>,
    mut recreate: impl FnMut(),
) -> AcquireOutcome<T> {
    let mut attempts = 0;
    loop {
        let err = match acquire() {
            Ok(image) => return AcquireOutcome::Acquired(image),
            Err(err) => err,
        };

        match classify_surface_error(&err) {
            SurfaceErrorAction::Reconfigured if attempts < retries => {
                attempts += 1;
                log::info!("swapchain out of date ({err}); recreating");
                recreate();
            }
            SurfaceErrorAction::Fatal => return AcquireOutcome::Fatal(err),
            _ => {
                log::warn!("swapchain image unavailable: {err}");
                return AcquireOutcome::Unavailable;
            }
        }
    }
}

/// Surface plus its configuration.
///
/// Out-of-date and suboptimal results mark the swapchain stale; it is
/// reconfigured lazily on the next acquire.
pub struct Swapchain<'w> {
    surface: wgpu::Surface<'w>,
    config: wgpu::SurfaceConfiguration,
    vsync_mode: wgpu::PresentMode,
    immediate_mode: wgpu::PresentMode,
    stale: bool,
}

impl<'w> Swapchain<'w> {
    pub fn new(
        ctx: &DeviceContext,
        surface: wgpu::Surface<'w>,
        init: &DeviceInit,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(ctx.adapter());
        let format = choose_surface_format(&caps, init.prefer_srgb)
            .ok_or_else(|| RenderError::SurfaceCreation("no supported surface formats".into()))?;

        let vsync_mode = choose_present_mode(&caps, init.vsync_present_mode);
        let immediate_mode = choose_present_mode(&caps, init.immediate_present_mode);
        log::info!("surface format {format:?}, present modes {vsync_mode:?}/{immediate_mode:?}");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: vsync_mode,
            alpha_mode: choose_alpha_mode(&caps, init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };

        let swapchain = Self {
            surface,
            config,
            vsync_mode,
            immediate_mode,
            stale: false,
        };
        if swapchain.has_area() {
            swapchain.surface.configure(ctx.device(), &swapchain.config);
        }
        Ok(swapchain)
    }

    #[inline]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    #[inline]
    fn has_area(&self) -> bool {
        self.config.width > 0 && self.config.height > 0
    }

    /// Reconfigures for a new size.
    ///
    /// wgpu does not accept a 0x0 surface; configuration is deferred in that case.
    pub fn resize(&mut self, ctx: &DeviceContext, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        if self.has_area() {
            self.surface.configure(ctx.device(), &self.config);
            self.stale = false;
        }
    }

    /// Switches between the vsync and immediate present modes.
    pub fn set_vsync(&mut self, vsync: bool) {
        let mode = if vsync { self.vsync_mode } else { self.immediate_mode };
        if mode != self.config.present_mode {
            self.config.present_mode = mode;
            self.stale = true;
        }
    }

    /// Acquires the next image. `Ok(None)` means presentation is skipped this frame.
    pub fn acquire(&mut self, ctx: &DeviceContext, retries: u32) -> Result<Option<AcquiredImage>> {
        if !self.has_area() {
            return Ok(None);
        }
        if self.stale {
            self.surface.configure(ctx.device(), &self.config);
            self.stale = false;
        }

        let surface = &self.surface;
        let config = &self.config;
        let outcome = acquire_with_retry(
            retries,
            || surface.get_current_texture(),
            || surface.configure(ctx.device(), config),
        );

        match outcome {
            AcquireOutcome::Acquired(texture) => {
                if texture.suboptimal {
                    self.stale = true;
                }
                let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
                Ok(Some(AcquiredImage { texture, view }))
            }
            AcquireOutcome::Unavailable => Ok(None),
            AcquireOutcome::Fatal(err) => Err(RenderError::Gpu(format!("surface: {err}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn out_of_date_is_retried_once() {
        let calls = Cell::new(0);
        let recreated = Cell::new(0);
        let outcome = acquire_with_retry(
            1,
            || {
                calls.set(calls.get() + 1);
                if calls.get() == 1 { Err(wgpu::SurfaceError::Outdated) } else { Ok(7) }
            },
            || recreated.set(recreated.get() + 1),
        );
        assert!(matches!(outcome, AcquireOutcome::Acquired(7)));
        assert_eq!(recreated.get(), 1);
    }

    #[test]
    fn persistent_failure_yields_unavailable() {
        let recreated = Cell::new(0);
        let outcome: AcquireOutcome<()> = acquire_with_retry(
            1,
            || Err(wgpu::SurfaceError::Outdated),
            || recreated.set(recreated.get() + 1),
        );
        assert!(matches!(outcome, AcquireOutcome::Unavailable));
        assert_eq!(recreated.get(), 1);
    }

    #[test]
    fn timeout_skips_without_recreating() {
        let recreated = Cell::new(0);
        let outcome: AcquireOutcome<()> =
            acquire_with_retry(3, || Err(wgpu::SurfaceError::Timeout), || recreated.set(1));
        assert!(matches!(outcome, AcquireOutcome::Unavailable));
        assert_eq!(recreated.get(), 0);
    }

    #[test]
    fn out_of_memory_is_fatal() {
        let outcome: AcquireOutcome<()> =
            acquire_with_retry(1, || Err(wgpu::SurfaceError::OutOfMemory), || {});
        assert!(matches!(outcome, AcquireOutcome::Fatal(wgpu::SurfaceError::OutOfMemory)));
    }
}

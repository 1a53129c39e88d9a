/// How the instance, adapter, device and surface are set up.
///
/// Everything that changes per frame or per level lives in
/// [`RendererConfig`](crate::RendererConfig) instead.
#[derive(Debug, Clone)]
pub struct DeviceInit {
    /// Backends wgpu may pick from.
    pub backends: wgpu::Backends,

    /// Adapter preference when several are available.
    pub power_preference: wgpu::PowerPreference,

    /// Prefer an sRGB surface format when available.
    ///
    /// Off by default: the present pass applies its own gamma curve and dither,
    /// which only quantizes correctly into a linear (UNORM) target.
    pub prefer_srgb: bool,

    /// Present mode used when vsync is requested.
    pub vsync_present_mode: wgpu::PresentMode,

    /// Present mode used when vsync is off.
    pub immediate_present_mode: wgpu::PresentMode,

    /// Surface alpha mode; an unsupported request falls back to the first supported mode.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Features the host insists on. Optional features (BC compression) are
    /// negotiated on top of these.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Frame latency hint passed to the surface configuration.
    pub desired_maximum_frame_latency: u32,
}

impl Default for DeviceInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::HighPerformance,
            prefer_srgb: false,
            vsync_present_mode: wgpu::PresentMode::Fifo,
            immediate_present_mode: wgpu::PresentMode::AutoNoVsync,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
        }
    }
}

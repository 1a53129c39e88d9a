use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use glam::{Vec2, Vec3, Vec4};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use nabu_engine::batch::PolyFlags;
use nabu_engine::device::{create_instance, DeviceContext, DeviceInit};
use nabu_engine::logging::{init_logging, LoggingConfig};
use nabu_engine::scene::{GouraudVertex, SceneNode, ScenePoint, TileRect};
use nabu_engine::texture::{MipSource, PixelFormat, TextureSource};
use nabu_engine::{RenderDevice, RendererConfig};

const CHECKER_SIZE: u32 = 64;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::new();
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;

    Ok(())
}

struct Viewer {
    window: Arc<Window>,
    device: RenderDevice<'static>,
}

struct Studio {
    init: DeviceInit,
    viewer: Option<Viewer>,
    checker: TextureSource,
    started: Instant,
    vsync: bool,
    multisample: u32,
}

impl Studio {
    fn new() -> Self {
        Self {
            init: DeviceInit::default(),
            viewer: None,
            checker: checker_texture(),
            started: Instant::now(),
            vsync: true,
            multisample: 1,
        }
    }

    fn create_viewer(&self, event_loop: &ActiveEventLoop) -> Result<Viewer> {
        let attrs = Window::default_attributes()
            .with_title("nabu studio")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let instance = create_instance(&self.init);
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let ctx = pollster::block_on(DeviceContext::new(instance, Some(&surface), &self.init))
            .context("GPU initialization failed")?;

        let size = window.inner_size();
        let config = RendererConfig {
            multisample: self.multisample,
            ..RendererConfig::default()
        };
        let device = RenderDevice::new(ctx, surface, &self.init, config, size.width, size.height)
            .context("failed to create render device")?;

        Ok(Viewer { window, device })
    }

    fn on_key(&mut self, code: KeyCode) -> Result<()> {
        let Some(viewer) = self.viewer.as_mut() else {
            return Ok(());
        };
        match code {
            KeyCode::KeyV => {
                self.vsync = !self.vsync;
                log::info!("vsync {}", if self.vsync { "on" } else { "off" });
            }
            KeyCode::KeyM => {
                self.multisample = if self.multisample == 1 { 4 } else { 1 };
                let (width, height) = viewer.device.size();
                viewer.device.resize(width, height, self.multisample)?;
            }
            KeyCode::KeyC => viewer.device.clear_texture_cache()?,
            KeyCode::KeyS => log::info!("{}", viewer.device.stats()),
            _ => {}
        }
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let t = self.started.elapsed().as_secs_f32();
        let Some(viewer) = self.viewer.as_mut() else {
            return Ok(());
        };
        let device = &mut viewer.device;

        if !device.begin_frame()? {
            return Ok(());
        }

        let (width, height) = device.size();
        device.set_scene_node(SceneNode::new(width, height, 90.0));
        draw_scene(device, &mut self.checker, t, width as f32, height as f32);

        device.present(self.vsync)?;
        Ok(())
    }
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }

        match self.create_viewer(event_loop) {
            Ok(viewer) => {
                viewer.window.request_redraw();
                self.viewer = Some(viewer);
            }
            Err(e) => {
                log::error!("failed to create initial window: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw; the scene animates.
        if let Some(viewer) = &self.viewer {
            viewer.window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let result = match event {
            WindowEvent::CloseRequested => {
                self.viewer = None;
                event_loop.exit();
                Ok(())
            }

            WindowEvent::Resized(size) => match self.viewer.as_mut() {
                Some(viewer) => viewer.device.resize(size.width, size.height, self.multisample).map_err(Into::into),
                None => Ok(()),
            },

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if code == KeyCode::Escape {
                    event_loop.exit();
                    Ok(())
                } else {
                    self.on_key(code)
                }
            }

            WindowEvent::RedrawRequested => self.redraw(),

            _ => Ok(()),
        };

        if let Err(e) = result {
            log::error!("{e:#}");
        }
    }
}

/// One animated frame: a floor and a spinning quad in view space, then
/// screen-space overlays on top.
fn draw_scene(device: &mut RenderDevice<'_>, checker: &mut TextureSource, t: f32, width: f32, height: f32) {
    let floor = [
        ScenePoint { pos: Vec3::new(-400.0, 120.0, 200.0), uv: Vec2::new(0.0, 0.0) },
        ScenePoint { pos: Vec3::new(400.0, 120.0, 200.0), uv: Vec2::new(512.0, 0.0) },
        ScenePoint { pos: Vec3::new(400.0, 120.0, 1200.0), uv: Vec2::new(512.0, 512.0) },
        ScenePoint { pos: Vec3::new(-400.0, 120.0, 1200.0), uv: Vec2::new(0.0, 512.0) },
    ];
    device.draw_polygon(&floor, Some(checker), PolyFlags::NONE);

    let (sin, cos) = (t * 0.8).sin_cos();
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    let colors = [
        Vec4::new(1.0, 0.2, 0.2, 1.0),
        Vec4::new(0.2, 1.0, 0.2, 1.0),
        Vec4::new(0.2, 0.2, 1.0, 1.0),
        Vec4::new(2.0, 2.0, 2.0, 1.0),
    ];
    let quad: Vec<GouraudVertex> = corners
        .iter()
        .zip(colors)
        .map(|(&(x, y), light)| GouraudVertex {
            pos: Vec3::new((x * cos - y * sin) * 80.0, (x * sin + y * cos) * 80.0 - 40.0, 500.0),
            uv: Vec2::new((x + 1.0) * 32.0, (y + 1.0) * 32.0),
            light,
        })
        .collect();
    device.draw_gouraud_polygon(&quad, None, PolyFlags::TWO_SIDED);

    let panel = TileRect {
        x: 16.0,
        y: 16.0,
        width: 160.0,
        height: 96.0,
        z: 1.0,
        u: 0.0,
        v: 0.0,
        ul: CHECKER_SIZE as f32,
        vl: CHECKER_SIZE as f32,
    };
    device.draw_tile(&panel, Vec4::new(1.0, 1.0, 1.0, 0.6), Some(checker), PolyFlags::TRANSLUCENT);

    let sweep = (t.sin() * 0.5 + 0.5) * width;
    device.draw_2d_line(
        Vec4::new(1.0, 0.8, 0.1, 1.0),
        PolyFlags::NONE,
        Vec3::new(sweep, 0.0, 1.0),
        Vec3::new(width - sweep, height - 1.0, 1.0),
    );

    for i in 0..16 {
        let x = 24.0 + i as f32 * 10.0;
        let y = height - 24.0;
        device.draw_2d_point(
            Vec4::new(0.3, 0.9, 1.0, 1.0),
            PolyFlags::NONE,
            Vec2::new(x, y),
            Vec2::new(x + 4.0, y + 4.0),
            1.0,
        );
    }
}

fn checker_texture() -> TextureSource {
    let mut texels = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
    for y in 0..CHECKER_SIZE {
        for x in 0..CHECKER_SIZE {
            let light = ((x / 8) + (y / 8)) % 2 == 0;
            let v = if light { 220 } else { 60 };
            texels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    TextureSource::new(1, PixelFormat::Rgba8, vec![MipSource::new(CHECKER_SIZE, CHECKER_SIZE, texels)])
}

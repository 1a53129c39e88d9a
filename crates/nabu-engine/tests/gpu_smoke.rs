#![cfg(feature = "gpu-tests")]

// End-to-end frames on a real (or software) adapter, read back to the CPU.
// Feature-gated so CI without a GPU does not need one; skips gracefully when
// no adapter exists.

use glam::{Vec2, Vec3, Vec4};

use nabu_engine::batch::PolyFlags;
use nabu_engine::device::{DeviceContext, DeviceInit};
use nabu_engine::frame::FrameScheduler;
use nabu_engine::scene::{RenderDevice, TileRect};
use nabu_engine::staging::StagingBuffer;
use nabu_engine::texture::{GpuTextureAllocator, MipSource, PixelFormat, TextureAllocator, TextureDesc, TextureSource};
use nabu_engine::{RenderError, RendererConfig};

fn plain_config() -> RendererConfig {
    let mut config = RendererConfig::default();
    config.postprocess.bloom.enabled = false;
    config.postprocess.exposure.enabled = false;
    config.postprocess.tonemap.dither = false;
    config
}

fn headless_context() -> Option<DeviceContext> {
    let init = DeviceInit {
        backends: wgpu::Backends::all(),
        ..Default::default()
    };
    match pollster::block_on(DeviceContext::new_headless(&init)) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("no compatible GPU adapter ({e}); skipping gpu test");
            None
        }
    }
}

fn render_device(config: RendererConfig, width: u32, height: u32) -> Option<RenderDevice<'static>> {
    let ctx = headless_context()?;
    Some(RenderDevice::headless(ctx, config, width, height).expect("render device"))
}

fn full_tile(width: u32, height: u32) -> TileRect {
    TileRect {
        x: 0.0,
        y: 0.0,
        width: width as f32,
        height: height as f32,
        z: 10.0,
        u: 0.0,
        v: 0.0,
        ul: 1.0,
        vl: 1.0,
    }
}

fn pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

#[test]
fn untextured_tile_reaches_framebuffer() {
    let Some(mut dev) = render_device(plain_config(), 64, 48) else {
        return;
    };

    dev.begin_frame().expect("begin");
    dev.draw_tile(&full_tile(64, 48), Vec4::new(1.0, 0.0, 0.0, 1.0), None, PolyFlags::NONE);
    dev.present(false).expect("present");

    let pixels = dev.read_framebuffer(false).expect("readback");
    assert_eq!(pixels.len(), 64 * 48 * 4);
    assert_eq!(pixel(&pixels, 64, 32, 24), [255, 0, 0, 255]);
    assert_eq!(dev.stats().draw_calls, 1);
}

#[test]
fn empty_frame_clears_to_black() {
    let Some(mut dev) = render_device(plain_config(), 16, 16) else {
        return;
    };
    dev.begin_frame().expect("begin");
    dev.present(true).expect("present");

    let pixels = dev.read_framebuffer(true).expect("readback");
    assert_eq!(pixel(&pixels, 16, 8, 8), [0, 0, 0, 255]);
}

#[test]
fn small_rings_wrap_without_dropping() {
    let mut config = plain_config();
    config.vertex_ring_capacity = 16;
    config.index_ring_capacity = 24;
    let Some(mut dev) = render_device(config, 32, 32) else {
        return;
    };

    dev.begin_frame().expect("begin");
    for i in 0..40u32 {
        let x = (i % 8) as f32 * 4.0;
        let y = (i / 8) as f32 * 4.0;
        dev.draw_2d_point(Vec4::ONE, PolyFlags::NONE, Vec2::new(x, y), Vec2::new(x + 4.0, y + 4.0), 10.0);
    }
    dev.present(false).expect("present");

    let stats = dev.stats();
    assert!(stats.ring_wraps >= 1, "{stats}");
    assert_eq!(stats.dropped_primitives, 0);
    assert_eq!(stats.vertices, 160);

    let pixels = dev.read_framebuffer(false).expect("readback");
    assert_eq!(pixel(&pixels, 32, 1, 1), [255, 255, 255, 255]);
    assert_eq!(pixel(&pixels, 32, 30, 30), [0, 0, 0, 255]);
}

#[test]
fn textured_tile_and_cache_clear() {
    let Some(mut dev) = render_device(plain_config(), 8, 8) else {
        return;
    };
    let green = [0u8, 255, 0, 255].repeat(16);
    let mut texture = TextureSource::new(42, PixelFormat::Rgba8, vec![MipSource::new(4, 4, green)]);

    dev.precache_texture(&mut texture, PolyFlags::NONE);
    assert_eq!(dev.texture_cache().len(), 1);

    dev.begin_frame().expect("begin");
    let mut tile = full_tile(8, 8);
    tile.ul = 4.0;
    tile.vl = 4.0;
    dev.draw_tile(&tile, Vec4::ONE, Some(&mut texture), PolyFlags::NONE);
    dev.present(false).expect("present");
    assert_eq!(dev.stats().texture_uploads, 1);

    let pixels = dev.read_framebuffer(false).expect("readback");
    assert_eq!(pixel(&pixels, 8, 4, 4), [0, 255, 0, 255]);

    dev.clear_texture_cache().expect("clear");
    assert!(dev.texture_cache().is_empty());
}

#[test]
fn resize_rebuilds_pyramids() {
    let Some(mut dev) = render_device(RendererConfig::default(), 800, 600) else {
        return;
    };
    dev.begin_frame().expect("begin");
    dev.draw_2d_line(Vec4::ONE, PolyFlags::NONE, Vec3::new(0.0, 0.0, 5.0), Vec3::new(799.0, 599.0, 5.0));
    dev.present(false).expect("present");
    assert_eq!(dev.postprocess().bloom_levels()[0], (400, 300));

    dev.resize(1920, 1080, 1).expect("resize");
    dev.begin_frame().expect("begin");
    dev.present(false).expect("present");

    let levels = dev.postprocess().bloom_levels();
    assert_eq!(levels.len(), 4);
    assert_eq!(levels[0], (960, 540));
    assert_eq!(dev.postprocess().exposure_levels().last(), Some(&(1, 1)));
    assert_eq!(dev.read_framebuffer(false).expect("readback").len(), 1920 * 1080 * 4);
}

#[test]
fn uploads_larger_than_staging_flush_and_grow() {
    let mut config = plain_config();
    config.staging_capacity = 64 * 1024;
    let Some(mut dev) = render_device(config, 40, 8) else {
        return;
    };
    // 200x200 RGBA8 is 160 000 bytes before row padding; none fits the initial ring.
    let mut textures: Vec<TextureSource> = (1..=5u64)
        .map(|id| TextureSource::new(id, PixelFormat::Rgba8, vec![MipSource::new(200, 200, vec![200; 200 * 200 * 4])]))
        .collect();

    dev.begin_frame().expect("begin");
    for (i, texture) in textures.iter_mut().enumerate() {
        let tile = TileRect {
            x: i as f32 * 8.0,
            width: 8.0,
            height: 8.0,
            ul: 200.0,
            vl: 200.0,
            ..full_tile(8, 8)
        };
        dev.draw_tile(&tile, Vec4::ONE, Some(texture), PolyFlags::NONE);
    }
    dev.present(false).expect("present");
    assert_eq!(dev.stats().texture_uploads, 5);

    let pixels = dev.read_framebuffer(false).expect("readback");
    for i in 0..5 {
        assert_eq!(pixel(&pixels, 40, i * 8 + 4, 4), [200, 200, 200, 255], "tile {i}");
    }
    assert_eq!(pixel(&pixels, 40, 0, 0), [200, 200, 200, 255]);
}

#[test]
fn invalid_shader_is_an_error_not_a_panic() {
    let Some(ctx) = headless_context() else {
        return;
    };
    let err = ctx
        .create_shader("broken shader", "@fragment fn fs_main() -> @location(0) vec4<f32> { return undefined_name; }")
        .expect_err("broken WGSL must not compile");
    assert!(matches!(err, RenderError::PipelineCreation { label: "broken shader", .. }), "{err}");
    assert!(err.is_fatal());
}

#[test]
fn oversized_texture_allocation_is_an_error() {
    let Some(ctx) = headless_context() else {
        return;
    };
    let mut staging = StagingBuffer::new(ctx.device(), 64 * 1024);
    let mut scheduler = FrameScheduler::new(2);
    let mut alloc = GpuTextureAllocator {
        ctx: &ctx,
        staging: &mut staging,
        scheduler: &mut scheduler,
    };

    let too_wide = TextureDesc {
        label: "too wide".into(),
        width: alloc.max_dimension() + 1,
        height: 1,
        mip_levels: 1,
        dummy_mips: 0,
        format: wgpu::TextureFormat::Rgba8Unorm,
    };
    let err = alloc.allocate(&too_wide).expect_err("texture past the device limit");
    assert!(matches!(err, RenderError::Gpu(_)), "{err}");

    // The device stays usable after a captured error.
    let fine = TextureDesc {
        label: "fine".into(),
        width: 4,
        ..too_wide
    };
    assert!(alloc.allocate(&fine).is_ok());
}

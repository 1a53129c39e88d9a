//! Synchronous GPU → CPU image copies.

use std::sync::mpsc;

use crate::device::DeviceContext;
use crate::error::{RenderError, Result};

use super::scheduler::FrameScheduler;

/// Copies mip 0 of a 4-byte-per-texel texture into tightly packed rows, top-down.
///
/// Work already recorded in `scheduler` is submitted first so the copy observes it.
/// The texture needs `COPY_SRC` usage.
pub fn read_texture(
    ctx: &DeviceContext,
    scheduler: &mut FrameScheduler,
    texture: &wgpu::Texture,
) -> Result<Vec<u8>> {
    let width = texture.width();
    let height = texture.height();
    let row_bytes = width * 4;
    let padded = row_bytes.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

    let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("nabu readback buffer"),
        size: padded as u64 * height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    scheduler.submit(ctx);

    let mut encoder = ctx
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("nabu readback encoder"),
        });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: None,
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    let index = ctx.queue().submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = sender.send(res);
    });
    ctx.wait_for(Some(index))?;
    receiver
        .recv()
        .map_err(|_| RenderError::Readback("map_async sender dropped".into()))?
        .map_err(|err| RenderError::Readback(format!("map_async failed: {err}")))?;

    let mapped = slice.get_mapped_range();
    let out = unpad_rows(&mapped, row_bytes as usize, padded as usize, height as usize);
    drop(mapped);
    buffer.unmap();
    buffer.destroy();
    Ok(out)
}

/// Strips per-row padding.
pub(crate) fn unpad_rows(data: &[u8], row_bytes: usize, padded: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(row_bytes * height);
    for row in data.chunks(padded).take(height) {
        out.extend_from_slice(&row[..row_bytes]);
    }
    out
}

/// Swaps the red and blue channels of packed 4-byte texels.
pub fn bgra_to_rgba(pixels: &mut [u8]) {
    for texel in pixels.chunks_exact_mut(4) {
        texel.swap(0, 2);
    }
}

/// Applies `c^(1/gamma)` to the color channels of packed RGBA texels.
pub fn gamma_encode(pixels: &mut [u8], gamma: f32) {
    if (gamma - 1.0).abs() < f32::EPSILON {
        return;
    }
    let inv = 1.0 / gamma.max(0.1);
    let table: Vec<u8> = (0..=255u32)
        .map(|v| ((v as f32 / 255.0).powf(inv) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    for texel in pixels.chunks_exact_mut(4) {
        for c in &mut texel[..3] {
            *c = table[*c as usize];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpad_keeps_only_row_payload() {
        let data: Vec<u8> = (0..16).collect();
        assert_eq!(unpad_rows(&data, 3, 8, 2), vec![0, 1, 2, 8, 9, 10]);
    }

    #[test]
    fn swizzle_swaps_red_and_blue() {
        let mut px = [1, 2, 3, 4, 5, 6, 7, 8];
        bgra_to_rgba(&mut px);
        assert_eq!(px, [3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn gamma_leaves_alpha_and_endpoints() {
        let mut px = [0, 64, 255, 10];
        gamma_encode(&mut px, 2.2);
        assert_eq!(px[0], 0);
        assert!(px[1] > 64);
        assert_eq!(px[2], 255);
        assert_eq!(px[3], 10);

        let mut same = [12, 34, 56, 78];
        gamma_encode(&mut same, 1.0);
        assert_eq!(same, [12, 34, 56, 78]);
    }
}

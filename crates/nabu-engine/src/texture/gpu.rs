use crate::device::DeviceContext;
use crate::error::{RenderError, Result};
use crate::frame::FrameScheduler;
use crate::staging::{StagingBuffer, StagingRegion};

use super::cache::{TextureAllocator, TextureDesc, UploadJob};
use super::format::CopyJob;

/// A cached wgpu texture and its sampled view.
#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Texture allocator backed by the device, the staging ring and the transfer encoder.
///
/// Built on the stack for the duration of one cache call.
pub struct GpuTextureAllocator<'a> {
    pub ctx: &'a DeviceContext,
    pub staging: &'a mut StagingBuffer,
    pub scheduler: &'a mut FrameScheduler,
}

impl GpuTextureAllocator<'_> {
    /// Reserves staging memory, flushing transfers (and growing the ring for
    /// requests that never fit) when the tail is exhausted.
    fn reserve(&mut self, size: u64) -> Result<StagingRegion> {
        if let Ok(region) = self.staging.reserve(size) {
            return Ok(region);
        }

        self.scheduler.flush_transfers(self.ctx)?;
        self.staging.rewind();

        if !self.staging.fits_when_empty(size) {
            let staging = &mut *self.staging;
            let old = self.ctx.create_resource(|device| staging.grow(device, size))?;
            self.scheduler.retire(old);
        }

        self.staging
            .reserve(size)
            .map_err(|full| RenderError::Gpu(format!("staging reservation of {} bytes failed", full.requested)))
    }
}

impl TextureAllocator for GpuTextureAllocator<'_> {
    type Texture = GpuTexture;

    fn max_dimension(&self) -> u32 {
        self.ctx.caps().max_texture_dimension
    }

    fn allocate(&mut self, desc: &TextureDesc) -> Result<GpuTexture> {
        self.ctx.create_resource(|device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&desc.label),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: desc.mip_levels,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: desc.format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            GpuTexture { texture, view }
        })
    }

    fn upload(&mut self, texture: &GpuTexture, _desc: &TextureDesc, job: &UploadJob<'_>) -> Result<()> {
        let uploader = job.uploader;
        let block = uploader.dst_block;

        for region in job.regions {
            let mip = &job.source.mips[region.src_level];
            // Copies must cover whole blocks; the physical level is rounded up too.
            let width = region.width.next_multiple_of(block.width);
            let height = region.height.next_multiple_of(block.height);
            let pitch = uploader.padded_pitch(width);

            let staged = self.reserve(uploader.staging_size(width, height))?;
            uploader.copy(
                &CopyJob {
                    src: &mip.data,
                    src_width: mip.width,
                    x: region.x,
                    y: region.y,
                    width: region.width,
                    height: region.height,
                    palette: job.source.palette.as_deref(),
                    masked: job.masked,
                    dst_pitch: pitch as usize,
                },
                self.staging.write(&staged),
            );
            self.staging.commit(self.ctx.queue(), &staged);

            let encoder = self.scheduler.transfer_encoder(self.ctx.device());
            encoder.copy_buffer_to_texture(
                wgpu::TexelCopyBufferInfo {
                    buffer: self.staging.buffer(),
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: staged.offset(),
                        bytes_per_row: Some(pitch),
                        rows_per_image: Some(uploader.rows(height)),
                    },
                },
                wgpu::TexelCopyTextureInfo {
                    texture: &texture.texture,
                    mip_level: region.dst_level,
                    origin: wgpu::Origin3d {
                        x: region.x,
                        y: region.y,
                        z: 0,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }

        log::trace!(
            "uploaded {} region(s) of texture {:#x} ({:?} from {:?})",
            job.regions.len(),
            job.source.cache_id,
            uploader.format,
            job.previous_layout
        );
        Ok(())
    }
}

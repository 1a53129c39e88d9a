//! Pixel formats and their upload routines.
//!
//! Each source format maps to one [`FormatUploader`] table entry: the GPU format
//! it lands in, block geometry on both sides, and a plain function that converts
//! a region of source texels into staging memory. Adding a format means adding a
//! variant and a table entry.

/// Pixel formats a texture source may arrive in.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    /// 8-bit palette indices.
    P8,
    /// BGRA lightmap texels with 7 significant bits per channel.
    Rgba7,
    /// Packed 5-6-5 RGB, little endian.
    Rgb16,
    /// 8-bit BGRA.
    Bgra8,
    /// 8-bit RGBA.
    Rgba8,
    /// DXT1.
    Bc1,
    /// DXT3.
    Bc2,
    /// DXT5.
    Bc3,
}

impl PixelFormat {
    pub const COUNT: usize = 8;

    pub const ALL: [PixelFormat; Self::COUNT] = [
        PixelFormat::P8,
        PixelFormat::Rgba7,
        PixelFormat::Rgb16,
        PixelFormat::Bgra8,
        PixelFormat::Rgba8,
        PixelFormat::Bc1,
        PixelFormat::Bc2,
        PixelFormat::Bc3,
    ];

    #[inline]
    pub fn is_block_compressed(self) -> bool {
        matches!(self, PixelFormat::Bc1 | PixelFormat::Bc2 | PixelFormat::Bc3)
    }

    /// Block geometry of the source data.
    pub fn source_block(self) -> BlockInfo {
        match self {
            PixelFormat::P8 => BlockInfo::texel(1),
            PixelFormat::Rgb16 => BlockInfo::texel(2),
            PixelFormat::Rgba7 | PixelFormat::Bgra8 | PixelFormat::Rgba8 => BlockInfo::texel(4),
            PixelFormat::Bc1 => BlockInfo::block4x4(8),
            PixelFormat::Bc2 | PixelFormat::Bc3 => BlockInfo::block4x4(16),
        }
    }

    /// Bytes a tightly packed `width`×`height` mip occupies in this format.
    pub fn mip_len(self, width: u32, height: u32) -> usize {
        let b = self.source_block();
        b.row_bytes(width) as usize * b.rows(height) as usize
    }
}

/// Block geometry: uncompressed formats are 1×1 blocks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BlockInfo {
    pub width: u32,
    pub height: u32,
    pub bytes: u32,
}

impl BlockInfo {
    const fn texel(bytes: u32) -> Self {
        Self { width: 1, height: 1, bytes }
    }

    const fn block4x4(bytes: u32) -> Self {
        Self { width: 4, height: 4, bytes }
    }

    #[inline]
    pub fn blocks_across(&self, width: u32) -> u32 {
        width.div_ceil(self.width)
    }

    #[inline]
    pub fn rows(&self, height: u32) -> u32 {
        height.div_ceil(self.height)
    }

    #[inline]
    pub fn row_bytes(&self, width: u32) -> u32 {
        self.blocks_across(width) * self.bytes
    }
}

/// One region of source texels to convert into staging memory.
///
/// `x`, `y`, `width` and `height` are in texels and must be block aligned for
/// compressed formats.
#[derive(Debug, Clone, Copy)]
pub struct CopyJob<'a> {
    /// Whole source mip, tightly packed.
    pub src: &'a [u8],
    /// Width of the whole source mip in texels.
    pub src_width: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub palette: Option<&'a [[u8; 4]]>,
    /// Palette index 0 becomes transparent.
    pub masked: bool,
    /// Bytes between destination rows (of blocks).
    pub dst_pitch: usize,
}

type CopyFn = fn(BlockInfo, &CopyJob<'_>, &mut [u8]);

/// Upload strategy for one source format.
#[derive(Clone)]
pub struct FormatUploader {
    pub format: PixelFormat,
    pub gpu_format: wgpu::TextureFormat,
    pub dst_block: BlockInfo,
    /// Partial-region updates are possible.
    pub supports_rect: bool,
    copy: CopyFn,
}

impl std::fmt::Debug for FormatUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatUploader")
            .field("format", &self.format)
            .field("gpu_format", &self.gpu_format)
            .field("supports_rect", &self.supports_rect)
            .finish()
    }
}

impl FormatUploader {
    /// Destination bytes per row of blocks, unpadded.
    #[inline]
    pub fn row_bytes(&self, width: u32) -> u32 {
        self.dst_block.row_bytes(width)
    }

    /// Destination rows of blocks.
    #[inline]
    pub fn rows(&self, height: u32) -> u32 {
        self.dst_block.rows(height)
    }

    /// Row pitch satisfying wgpu's buffer-to-texture copy alignment.
    #[inline]
    pub fn padded_pitch(&self, width: u32) -> u32 {
        self.row_bytes(width)
            .next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
    }

    /// Staging bytes needed for a `width`×`height` region.
    #[inline]
    pub fn staging_size(&self, width: u32, height: u32) -> u64 {
        self.padded_pitch(width) as u64 * self.rows(height) as u64
    }

    /// Converts `job` into `dst`, which holds `rows(height)` rows of `job.dst_pitch` bytes.
    pub fn copy(&self, job: &CopyJob<'_>, dst: &mut [u8]) {
        debug_assert!(job.dst_pitch >= self.row_bytes(job.width) as usize);
        (self.copy)(self.dst_block, job, dst)
    }
}

/// Uploader lookup, built once per texture cache from the device capabilities.
#[derive(Debug, Clone)]
pub struct UploaderTable {
    entries: [Option<FormatUploader>; PixelFormat::COUNT],
    fallback: FormatUploader,
}

impl UploaderTable {
    /// Builds the table. Block-compressed formats are left out without BC support.
    pub fn new(bc_supported: bool) -> Self {
        let entries = PixelFormat::ALL.map(|format| {
            if format.is_block_compressed() && !bc_supported {
                None
            } else {
                Some(uploader_for(format))
            }
        });
        Self {
            entries,
            fallback: uploader_for(PixelFormat::Rgba8),
        }
    }

    #[inline]
    pub fn get(&self, format: PixelFormat) -> Option<&FormatUploader> {
        self.entries[format as usize].as_ref()
    }

    /// RGBA8 uploader used for the null and placeholder textures.
    #[inline]
    pub fn fallback(&self) -> &FormatUploader {
        &self.fallback
    }
}

fn uploader_for(format: PixelFormat) -> FormatUploader {
    let (gpu_format, copy): (wgpu::TextureFormat, CopyFn) = match format {
        PixelFormat::P8 => (wgpu::TextureFormat::Rgba8Unorm, copy_p8),
        PixelFormat::Rgba7 => (wgpu::TextureFormat::Rgba8Unorm, copy_rgba7),
        PixelFormat::Rgb16 => (wgpu::TextureFormat::Rgba8Unorm, copy_rgb565),
        PixelFormat::Bgra8 => (wgpu::TextureFormat::Bgra8Unorm, copy_verbatim),
        PixelFormat::Rgba8 => (wgpu::TextureFormat::Rgba8Unorm, copy_verbatim),
        PixelFormat::Bc1 => (wgpu::TextureFormat::Bc1RgbaUnorm, copy_verbatim),
        PixelFormat::Bc2 => (wgpu::TextureFormat::Bc2RgbaUnorm, copy_verbatim),
        PixelFormat::Bc3 => (wgpu::TextureFormat::Bc3RgbaUnorm, copy_verbatim),
    };

    let dst_block = if format.is_block_compressed() {
        format.source_block()
    } else {
        BlockInfo::texel(4)
    };

    FormatUploader {
        format,
        gpu_format,
        dst_block,
        supports_rect: !format.is_block_compressed(),
        copy,
    }
}

// ── copy routines ─────────────────────────────────────────────────────────

/// Walks the texel region row by row, handing each source texel and its
/// 4-byte destination slot to `f`.
fn for_each_texel(
    job: &CopyJob<'_>,
    src_bytes: usize,
    dst: &mut [u8],
    mut f: impl FnMut(&[u8], &mut [u8]),
) {
    let src_pitch = job.src_width as usize * src_bytes;
    for row in 0..job.height as usize {
        let src_row = (job.y as usize + row) * src_pitch + job.x as usize * src_bytes;
        let dst_row = row * job.dst_pitch;
        for col in 0..job.width as usize {
            let s = src_row + col * src_bytes;
            let d = dst_row + col * 4;
            f(&job.src[s..s + src_bytes], &mut dst[d..d + 4]);
        }
    }
}

fn copy_p8(_: BlockInfo, job: &CopyJob<'_>, dst: &mut [u8]) {
    for_each_texel(job, 1, dst, |s, d| {
        let index = s[0];
        let texel = if job.masked && index == 0 {
            [0, 0, 0, 0]
        } else {
            match job.palette {
                Some(palette) => palette.get(index as usize).copied().unwrap_or([255; 4]),
                None => [index, index, index, 255],
            }
        };
        d.copy_from_slice(&texel);
    });
}

fn copy_rgba7(_: BlockInfo, job: &CopyJob<'_>, dst: &mut [u8]) {
    // Source is BGRA with 7-bit channels; doubling restores the full range.
    for_each_texel(job, 4, dst, |s, d| {
        d[0] = s[2].saturating_mul(2);
        d[1] = s[1].saturating_mul(2);
        d[2] = s[0].saturating_mul(2);
        d[3] = s[3].saturating_mul(2);
    });
}

fn copy_rgb565(_: BlockInfo, job: &CopyJob<'_>, dst: &mut [u8]) {
    for_each_texel(job, 2, dst, |s, d| {
        let v = u16::from_le_bytes([s[0], s[1]]);
        let r = ((v >> 11) & 0x1f) as u8;
        let g = ((v >> 5) & 0x3f) as u8;
        let b = (v & 0x1f) as u8;
        d[0] = (r << 3) | (r >> 2);
        d[1] = (g << 2) | (g >> 4);
        d[2] = (b << 3) | (b >> 2);
        d[3] = 255;
    });
}

/// Row-wise copy for formats whose source and destination layouts match
/// (8-bit RGBA/BGRA texels and compressed blocks).
fn copy_verbatim(block: BlockInfo, job: &CopyJob<'_>, dst: &mut [u8]) {
    let src_pitch = block.row_bytes(job.src_width) as usize;
    let row_bytes = block.row_bytes(job.width) as usize;
    let first_row = (job.y / block.height) as usize;
    let first_col = (job.x / block.width) as usize * block.bytes as usize;

    for row in 0..block.rows(job.height) as usize {
        let s = (first_row + row) * src_pitch + first_col;
        let d = row * job.dst_pitch;
        dst[d..d + row_bytes].copy_from_slice(&job.src[s..s + row_bytes]);
    }
}

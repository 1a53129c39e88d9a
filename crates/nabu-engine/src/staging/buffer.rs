use std::ops::Range;

use super::ring::{align_up, RingAllocator};

/// Offset alignment for staged regions. Satisfies both buffer-to-texture copy
/// offsets (texel block size) and `write_buffer` alignment.
pub const STAGING_ALIGNMENT: u64 = 256;

/// A region reserved in the staging buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRegion {
    range: Range<u64>,
}

impl StagingRegion {
    /// Byte offset of the region inside the GPU staging buffer.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.range.start
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returned when a reservation does not fit in what is left of the ring.
///
/// The caller must submit pending transfer work, wait for it, and call
/// [`StagingBuffer::rewind`] before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingFull {
    pub requested: u64,
}

/// Host-side ring of upload memory mirrored into a `COPY_SRC` GPU buffer.
///
/// Uploaders write converted texels into the host shadow returned by
/// [`write`](Self::write), then [`commit`](Self::commit) queues the bytes for the
/// GPU buffer. The queued write lands before the next queue submission, ahead of
/// the copy commands recorded against it.
pub struct StagingBuffer {
    buffer: wgpu::Buffer,
    shadow: Vec<u8>,
    ring: RingAllocator,
}

impl StagingBuffer {
    pub fn new(device: &wgpu::Device, capacity: u64) -> Self {
        let capacity = align_up(capacity.max(STAGING_ALIGNMENT), STAGING_ALIGNMENT);
        Self {
            buffer: create_staging_buffer(device, capacity),
            shadow: vec![0; capacity as usize],
            ring: RingAllocator::new(capacity, STAGING_ALIGNMENT),
        }
    }

    /// Reserves `size` bytes. Fails with [`StagingFull`] when the tail is too short.
    pub fn reserve(&mut self, size: u64) -> Result<StagingRegion, StagingFull> {
        self.ring
            .allocate(size)
            .map(|range| StagingRegion { range })
            .ok_or(StagingFull { requested: size })
    }

    /// Host memory backing `region`.
    pub fn write(&mut self, region: &StagingRegion) -> &mut [u8] {
        let start = region.range.start as usize;
        let end = region.range.end as usize;
        &mut self.shadow[start..end]
    }

    /// Queues the host bytes of `region` for the GPU buffer.
    pub fn commit(&self, queue: &wgpu::Queue, region: &StagingRegion) {
        // write_buffer wants a 4-byte multiple; the slack is inside our aligned slot.
        let len = align_up(region.len(), wgpu::COPY_BUFFER_ALIGNMENT);
        let start = region.range.start as usize;
        let end = (start + len as usize).min(self.shadow.len());
        if end > start {
            queue.write_buffer(&self.buffer, region.range.start, &self.shadow[start..end]);
        }
    }

    /// Returns `true` if `size` fits once the ring is rewound.
    #[inline]
    pub fn fits_when_empty(&self, size: u64) -> bool {
        self.ring.fits_when_empty(size)
    }

    /// Rewinds after every reservation handed out so far has been consumed by the GPU.
    #[inline]
    pub fn rewind(&mut self) {
        self.ring.reset();
    }

    /// Replaces the buffer with one that can hold `min_capacity` bytes.
    ///
    /// Only valid right after a rewind; the old buffer is returned so the caller
    /// can retire it.
    pub fn grow(&mut self, device: &wgpu::Device, min_capacity: u64) -> wgpu::Buffer {
        debug_assert!(self.ring.is_empty(), "staging buffer grown while regions are outstanding");
        let capacity = align_up(min_capacity.next_power_of_two(), STAGING_ALIGNMENT);
        log::debug!(
            "growing staging buffer {} -> {} bytes",
            self.ring.capacity(),
            capacity
        );
        self.ring.resize(capacity);
        self.shadow = vec![0; capacity as usize];
        std::mem::replace(&mut self.buffer, create_staging_buffer(device, capacity))
    }

    #[inline]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.ring.capacity()
    }

    #[inline]
    pub fn used(&self) -> u64 {
        self.ring.head()
    }
}

fn create_staging_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("nabu staging buffer"),
        size,
        usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

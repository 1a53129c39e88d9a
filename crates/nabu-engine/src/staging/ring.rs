use std::ops::Range;

/// Offset bookkeeping for a linear ring of fixed capacity.
///
/// Allocation only moves forward; the owner rewinds with [`reset`](Self::reset)
/// once the GPU is known to be done with everything handed out so far. There is
/// no wrap-around inside `allocate`: a request that does not fit in the tail
/// returns `None` and the owner decides whether to flush, wait and rewind.
#[derive(Debug, Clone)]
pub struct RingAllocator {
    capacity: u64,
    head: u64,
    alignment: u64,
}

impl RingAllocator {
    /// Creates an allocator. `alignment` must be a power of two.
    pub fn new(capacity: u64, alignment: u64) -> Self {
        debug_assert!(alignment.is_power_of_two(), "alignment must be a power of two");
        Self {
            capacity,
            head: 0,
            alignment,
        }
    }

    /// Reserves `size` units, aligned to the allocator's alignment.
    pub fn allocate(&mut self, size: u64) -> Option<Range<u64>> {
        let start = align_up(self.head, self.alignment);
        let end = start.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        self.head = end;
        Some(start..end)
    }

    /// Returns `true` if `size` units could ever fit after a rewind.
    #[inline]
    pub fn fits_when_empty(&self, size: u64) -> bool {
        size <= self.capacity
    }

    /// Rewinds to the start. Only call once prior allocations are no longer read by the GPU.
    #[inline]
    pub fn reset(&mut self) {
        self.head = 0;
    }

    /// Replaces the capacity and rewinds.
    pub fn resize(&mut self, capacity: u64) {
        self.capacity = capacity;
        self.head = 0;
    }

    #[inline]
    pub fn head(&self) -> u64 {
        self.head
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(align_up(self.head, self.alignment))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == 0
    }
}

#[inline]
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_sequential() {
        let mut ring = RingAllocator::new(1024, 256);
        assert_eq!(ring.allocate(10), Some(0..10));
        assert_eq!(ring.allocate(10), Some(256..266));
        assert_eq!(ring.head(), 266);
    }

    #[test]
    fn allocation_past_capacity_fails_without_moving() {
        let mut ring = RingAllocator::new(512, 256);
        assert_eq!(ring.allocate(300), Some(0..300));
        assert_eq!(ring.allocate(300), None);
        assert_eq!(ring.head(), 300);
        assert_eq!(ring.remaining(), 0);
    }

    #[test]
    fn reset_rewinds_to_start() {
        let mut ring = RingAllocator::new(100, 1);
        ring.allocate(60);
        assert_eq!(ring.allocate(60), None);
        ring.reset();
        assert!(ring.is_empty());
        assert_eq!(ring.allocate(60), Some(0..60));
    }

    #[test]
    fn exact_fit_is_accepted() {
        let mut ring = RingAllocator::new(8, 4);
        assert_eq!(ring.allocate(8), Some(0..8));
        assert_eq!(ring.allocate(0), Some(8..8));
        assert_eq!(ring.allocate(1), None);
    }

    #[test]
    fn fits_when_empty_checks_total_capacity() {
        let ring = RingAllocator::new(64, 4);
        assert!(ring.fits_when_empty(64));
        assert!(!ring.fits_when_empty(65));
    }

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 4), 260);
    }
}

//! Deferred destruction.
//!
//! Resources replaced during a frame (resized targets, grown buffers, cleared
//! textures) are parked here and only released once the fence of the frame that
//! retired them has been observed.

/// A GPU object waiting for the GPU to finish with it.
#[derive(Debug)]
pub enum RetiredResource {
    Texture(wgpu::Texture),
    Buffer(wgpu::Buffer),
    BindGroup(wgpu::BindGroup),
}

impl RetiredResource {
    /// Frees the GPU memory now. Bind groups are simply dropped.
    pub fn destroy(self) {
        match self {
            RetiredResource::Texture(t) => t.destroy(),
            RetiredResource::Buffer(b) => b.destroy(),
            RetiredResource::BindGroup(_) => {}
        }
    }
}

impl From<wgpu::Texture> for RetiredResource {
    fn from(t: wgpu::Texture) -> Self {
        RetiredResource::Texture(t)
    }
}

impl From<wgpu::Buffer> for RetiredResource {
    fn from(b: wgpu::Buffer) -> Self {
        RetiredResource::Buffer(b)
    }
}

impl From<wgpu::BindGroup> for RetiredResource {
    fn from(b: wgpu::BindGroup) -> Self {
        RetiredResource::BindGroup(b)
    }
}

/// One slot per frame in flight; frame `n` parks into slot `n % depth`.
#[derive(Debug)]
pub struct RetireQueue<T> {
    slots: Vec<Vec<T>>,
    frame: u64,
}

impl<T> RetireQueue<T> {
    pub fn new(frames_in_flight: u32) -> Self {
        let depth = frames_in_flight.max(1) as usize;
        Self {
            slots: (0..depth).map(|_| Vec::new()).collect(),
            frame: 0,
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Frame number new retirements are tagged with.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Parks `item` until the current frame's fence is observed.
    pub fn retire(&mut self, item: T) {
        let slot = self.slot(self.frame);
        self.slots[slot].push(item);
    }

    /// Number of parked items across all frames.
    pub fn pending(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    /// Called once the current frame's fence signaled: hands back what that frame
    /// retired and moves on to the next frame.
    pub fn frame_completed(&mut self) -> Vec<T> {
        let slot = self.slot(self.frame);
        self.frame += 1;
        std::mem::take(&mut self.slots[slot])
    }

    /// Hands back everything, for use after the device went idle.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.slots.iter_mut().flat_map(std::mem::take).collect()
    }

    fn slot(&self, frame: u64) -> usize {
        (frame % self.slots.len() as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_release_with_their_frame() {
        let mut q = RetireQueue::new(2);
        q.retire(1);
        q.retire(2);
        assert_eq!(q.pending(), 2);

        assert_eq!(q.frame_completed(), vec![1, 2]);
        assert_eq!(q.pending(), 0);

        q.retire(3);
        assert_eq!(q.frame(), 1);
        assert_eq!(q.frame_completed(), vec![3]);
        assert!(q.frame_completed().is_empty());
    }

    #[test]
    fn drain_all_empties_every_slot() {
        let mut q = RetireQueue::new(3);
        q.retire("a");
        q.frame_completed();
        q.retire("b");
        let mut all = q.drain_all();
        all.sort();
        assert_eq!(all, vec!["b"]);
        assert_eq!(q.pending(), 0);
        assert_eq!(q.depth(), 3);
    }
}

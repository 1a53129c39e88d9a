use crate::device::DeviceContext;
use crate::error::Result;

use super::retire::{RetireQueue, RetiredResource};
use super::state::{FrameEvent, FrameState};
use super::swapchain::{AcquiredImage, Swapchain};

/// Per-frame command recording, submission order and deferred destruction.
///
/// Uploads record into a transfer encoder and scene/postprocess passes into a
/// draw encoder. Every submission hands both to the queue in one call, transfer
/// first, so draws always observe the uploads recorded before them. The frame
/// fence is the index of the last submission; [`end_frame`](Self::end_frame)
/// blocks on it before anything retired during the frame is destroyed.
pub struct FrameScheduler {
    state: FrameState,
    transfer: Option<wgpu::CommandEncoder>,
    draw: Option<wgpu::CommandEncoder>,
    image: Option<AcquiredImage>,
    fence: Option<wgpu::SubmissionIndex>,
    retired: RetireQueue<RetiredResource>,
    submissions: u32,
}

impl FrameScheduler {
    pub fn new(frames_in_flight: u32) -> Self {
        Self {
            state: FrameState::Idle,
            transfer: None,
            draw: None,
            image: None,
            fence: None,
            retired: RetireQueue::new(frames_in_flight),
            submissions: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of frames completed so far.
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.retired.frame()
    }

    /// Queue submissions during the current frame.
    #[inline]
    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    /// Swapchain image acquired for this frame, if any.
    #[inline]
    pub fn image(&self) -> Option<&AcquiredImage> {
        self.image.as_ref()
    }

    #[inline]
    pub fn has_transfer_work(&self) -> bool {
        self.transfer.is_some()
    }

    /// Starts recording. Acquires a swapchain image when a swapchain is given;
    /// returns whether one is available.
    pub fn begin_frame(
        &mut self,
        ctx: &DeviceContext,
        swapchain: Option<&mut Swapchain<'_>>,
        acquire_retries: u32,
    ) -> Result<bool> {
        self.state.advance(FrameEvent::Begin)?;
        self.submissions = 0;
        self.image = match swapchain {
            Some(swapchain) => swapchain.acquire(ctx, acquire_retries)?,
            None => None,
        };
        Ok(self.image.is_some())
    }

    /// Encoder for upload commands, created on first use.
    pub fn transfer_encoder(&mut self, device: &wgpu::Device) -> &mut wgpu::CommandEncoder {
        self.transfer.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("nabu transfer encoder"),
            })
        })
    }

    /// Encoder for render passes, created on first use.
    pub fn draw_encoder(&mut self, device: &wgpu::Device) -> &mut wgpu::CommandEncoder {
        self.draw.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("nabu draw encoder"),
            })
        })
    }

    /// Submits everything recorded so far, transfer work first. No-op when
    /// nothing was recorded.
    pub fn submit(&mut self, ctx: &DeviceContext) -> Option<wgpu::SubmissionIndex> {
        let buffers: Vec<wgpu::CommandBuffer> = [self.transfer.take(), self.draw.take()]
            .into_iter()
            .flatten()
            .map(wgpu::CommandEncoder::finish)
            .collect();
        if buffers.is_empty() {
            return None;
        }
        let index = ctx.queue().submit(buffers);
        self.submissions += 1;
        self.fence = Some(index.clone());
        Some(index)
    }

    /// Submits and blocks until the GPU is done with everything submitted.
    pub fn submit_and_wait(&mut self, ctx: &DeviceContext) -> Result<()> {
        let index = self.submit(ctx).or_else(|| self.fence.clone());
        ctx.wait_for(index)
    }

    /// Submits pending upload commands alone and waits for them.
    ///
    /// This is the staging-overflow path: once it returns, every staged byte has
    /// been consumed and the staging ring may rewind.
    pub fn flush_transfers(&mut self, ctx: &DeviceContext) -> Result<()> {
        let index = match self.transfer.take() {
            Some(encoder) => {
                self.submissions += 1;
                let index = ctx.queue().submit(std::iter::once(encoder.finish()));
                self.fence = Some(index.clone());
                Some(index)
            }
            None => self.fence.clone(),
        };
        log::debug!("flushed transfer work, waiting");
        ctx.wait_for(index)
    }

    /// Final submission of the frame.
    pub fn finish(&mut self, ctx: &DeviceContext) -> Result<()> {
        self.state.advance(FrameEvent::Submit)?;
        if self.submit(ctx).is_none() {
            // Nothing recorded since the last flush; still fence on an empty submit.
            self.fence = Some(ctx.queue().submit(std::iter::empty()));
        }
        Ok(())
    }

    /// Presents the acquired image. Returns `false` when there was none.
    pub fn present(&mut self) -> Result<bool> {
        let Some(image) = self.image.take() else {
            return Ok(false);
        };
        self.state.advance(FrameEvent::Present)?;
        image.texture.present();
        Ok(true)
    }

    /// Waits for the frame fence, then destroys what the frame retired.
    pub fn end_frame(&mut self, ctx: &DeviceContext) -> Result<()> {
        // An image acquired but never presented is discarded here.
        self.image = None;
        self.state.advance(FrameEvent::End)?;
        ctx.wait_for(self.fence.take())?;

        let released = self.retired.frame_completed();
        if !released.is_empty() {
            log::debug!("destroying {} retired resources", released.len());
        }
        released.into_iter().for_each(RetiredResource::destroy);
        Ok(())
    }

    /// Parks a resource until the current frame's fence is observed.
    pub fn retire(&mut self, resource: impl Into<RetiredResource>) {
        self.retired.retire(resource.into());
    }

    /// Submits outstanding work, waits for the device to go idle and destroys
    /// every retired resource.
    pub fn wait_idle(&mut self, ctx: &DeviceContext) -> Result<()> {
        self.submit(ctx);
        ctx.wait_for(None)?;
        self.fence = None;
        self.retired.drain_all().into_iter().for_each(RetiredResource::destroy);
        Ok(())
    }

    /// Returns to idle after a failed frame.
    ///
    /// Upload commands are still submitted since the texture cache already
    /// considers them done; draw commands are dropped.
    pub fn abandon_frame(&mut self, ctx: &DeviceContext) {
        if self.state != FrameState::Idle {
            log::warn!("abandoning frame in state {:?}", self.state);
        }
        if let Some(encoder) = self.transfer.take() {
            self.fence = Some(ctx.queue().submit(std::iter::once(encoder.finish())));
        }
        self.draw = None;
        self.image = None;
        self.state = FrameState::Idle;
    }
}

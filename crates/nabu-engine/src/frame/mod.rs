//! Frame orchestration.
//!
//! This module is responsible for:
//! - the per-frame state machine and swapchain acquisition/presentation
//! - ordering transfer and draw submissions and fencing the frame
//! - deferring destruction of replaced resources until the fence is observed
//! - synchronous readback of rendered images

mod readback;
mod retire;
mod scheduler;
mod state;
mod swapchain;

pub use readback::{bgra_to_rgba, gamma_encode, read_texture};
pub use retire::{RetireQueue, RetiredResource};
pub use scheduler::FrameScheduler;
pub use state::{FrameEvent, FrameState, InvalidTransition};
pub use swapchain::{AcquireOutcome, AcquiredImage, Swapchain};

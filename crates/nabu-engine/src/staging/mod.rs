//! Upload staging.
//!
//! Every texture upload goes through one ring of host memory. Running out of
//! ring space is the only point where recording blocks: pending transfer work is
//! submitted and waited on, then the ring rewinds.

mod buffer;
mod ring;

pub use buffer::{StagingBuffer, StagingFull, StagingRegion, STAGING_ALIGNMENT};
pub use ring::RingAllocator;

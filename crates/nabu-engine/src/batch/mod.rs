//! Scene draw batching.
//!
//! This module is responsible for:
//! - mapping polygon flags to one of the precompiled pipeline variants
//! - accumulating vertices and indices in ring buffers
//! - coalescing consecutive primitives with identical state into one draw call

mod batcher;
mod flags;
mod pipeline;
mod recorder;
mod vertex;

pub use batcher::{DrawBatcher, FlushEnv};
pub use flags::PolyFlags;
pub use pipeline::{compute_pipeline_index, BlendMode, PipelineIndex, ScenePipelines, DEPTH_FORMAT, PIPELINE_VARIANTS};
pub use recorder::{BatchEntry, BatchRecorder, BatchSink, BatchState, PendingDraws, RecorderCounters, Reservation};
pub use vertex::{SceneUniforms, SceneVertex, VERTEX_DETAIL, VERTEX_FOG, VERTEX_LIGHTMAP, VERTEX_SCREEN};

//! Batch bookkeeping over the vertex/index rings.
//!
//! The recorder never talks to the GPU. It hands closed batches to a
//! [`BatchSink`] on flush and asks the sink to drain in-flight work before the
//! rings wrap, so the ring invariants and coalescing can be tested in isolation.

use std::ops::Range;

use crate::descriptor::DescriptorKey;
use crate::error::{RenderError, Result};

use super::pipeline::PipelineIndex;
use super::vertex::SceneVertex;

/// Pipeline and bindings a batch is drawn with.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct BatchState {
    pub pipeline: PipelineIndex,
    pub descriptor: DescriptorKey,
}

/// A closed run of indices sharing one [`BatchState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub state: BatchState,
    /// Absolute range in the index ring.
    pub indices: Range<u32>,
}

/// Everything recorded since the previous flush.
#[derive(Debug)]
pub struct PendingDraws<'a> {
    /// Vertices to upload, starting at ring slot `first_vertex`.
    pub vertices: &'a [SceneVertex],
    pub first_vertex: u32,
    /// Indices to upload, starting at ring slot `first_index`.
    pub indices: &'a [u32],
    pub first_index: u32,
    pub batches: &'a [BatchEntry],
}

/// Receives flushed batches.
pub trait BatchSink {
    /// Uploads and records the draws. One draw call per batch, in order.
    fn submit(&mut self, draws: &PendingDraws<'_>) -> Result<()>;

    /// Submits everything recorded and blocks until the GPU finished it.
    fn wait_idle(&mut self) -> Result<()>;
}

/// Space reserved for one primitive.
///
/// Indices written into `indices` are absolute: add `base_vertex` to the
/// primitive-local vertex number.
pub struct Reservation<'a> {
    pub vertices: &'a mut [SceneVertex],
    pub indices: &'a mut [u32],
    pub base_vertex: u32,
}

impl Reservation<'_> {
    /// Writes `vertices` and a triangle fan over them.
    pub fn fill_fan(&mut self, vertices: &[SceneVertex]) {
        self.vertices.copy_from_slice(vertices);
        self.write_fan();
    }

    /// Writes triangle-fan indices over the reserved vertices.
    pub fn write_fan(&mut self) {
        for (tri, chunk) in self.indices.chunks_exact_mut(3).enumerate() {
            chunk[0] = self.base_vertex;
            chunk[1] = self.base_vertex + tri as u32 + 1;
            chunk[2] = self.base_vertex + tri as u32 + 2;
        }
    }
}

/// Counters since the last [`BatchRecorder::take_counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderCounters {
    pub batches: u32,
    pub vertices: u64,
    pub indices: u64,
    pub flushes: u32,
    pub ring_wraps: u32,
    pub dropped_primitives: u32,
}

pub struct BatchRecorder {
    vertices: Vec<SceneVertex>,
    indices: Vec<u32>,
    vertex_head: usize,
    index_head: usize,
    flushed_vertex: usize,
    flushed_index: usize,

    open: BatchEntry,
    closed: Vec<BatchEntry>,

    counters: RecorderCounters,
    warned_oversize: bool,
}

impl BatchRecorder {
    pub fn new(vertex_capacity: usize, index_capacity: usize) -> Self {
        Self {
            vertices: vec![SceneVertex::default(); vertex_capacity],
            indices: vec![0; index_capacity],
            vertex_head: 0,
            index_head: 0,
            flushed_vertex: 0,
            flushed_index: 0,
            open: BatchEntry {
                state: BatchState::default(),
                indices: 0..0,
            },
            closed: Vec::new(),
            counters: RecorderCounters::default(),
            warned_oversize: false,
        }
    }

    #[inline]
    pub fn vertex_capacity(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn index_capacity(&self) -> usize {
        self.indices.len()
    }

    /// State of the batch currently accepting primitives.
    #[inline]
    pub fn state(&self) -> BatchState {
        self.open.state
    }

    /// Recorded but not yet flushed primitives exist.
    pub fn has_pending(&self) -> bool {
        !self.closed.is_empty() || !self.open.indices.is_empty()
    }

    pub fn take_counters(&mut self) -> RecorderCounters {
        std::mem::take(&mut self.counters)
    }

    /// Switches the open batch to `state`. Idempotent; only bookkeeping.
    pub fn set_state(&mut self, state: BatchState) {
        if state == self.open.state {
            return;
        }
        self.close_open();
        self.open.state = state;
    }

    /// Reserves ring space for one primitive in the open batch.
    ///
    /// When the rings cannot hold it, pending batches are flushed, the GPU is
    /// drained and the rings wrap to the start. A primitive larger than either
    /// ring is dropped with [`RenderError::PrimitiveTooLarge`].
    pub fn reserve<S: BatchSink>(
        &mut self,
        vertex_count: usize,
        index_count: usize,
        sink: &mut S,
    ) -> Result<Reservation<'_>> {
        if vertex_count > self.vertices.len() || index_count > self.indices.len() {
            self.counters.dropped_primitives += 1;
            let err = RenderError::PrimitiveTooLarge {
                vertices: vertex_count,
                indices: index_count,
                vertex_capacity: self.vertices.len(),
                index_capacity: self.indices.len(),
            };
            if !self.warned_oversize {
                log::warn!("{err}; primitive dropped");
                self.warned_oversize = true;
            }
            return Err(err);
        }

        let fits = self.vertex_head + vertex_count <= self.vertices.len()
            && self.index_head + index_count <= self.indices.len();
        if !fits {
            self.flush(sink)?;
            sink.wait_idle()?;
            self.rewind();
            self.counters.ring_wraps += 1;
            log::debug!("scene rings wrapped");
        }

        let v = self.vertex_head..self.vertex_head + vertex_count;
        let i = self.index_head..self.index_head + index_count;
        self.vertex_head = v.end;
        self.index_head = i.end;
        self.open.indices.end = i.end as u32;
        self.counters.vertices += vertex_count as u64;
        self.counters.indices += index_count as u64;

        Ok(Reservation {
            base_vertex: v.start as u32,
            vertices: &mut self.vertices[v],
            indices: &mut self.indices[i],
        })
    }

    /// Hands every closed batch, plus the open one, to `sink` in recording order.
    pub fn flush<S: BatchSink>(&mut self, sink: &mut S) -> Result<()> {
        self.close_open();
        if self.closed.is_empty() {
            return Ok(());
        }

        let draws = PendingDraws {
            vertices: &self.vertices[self.flushed_vertex..self.vertex_head],
            first_vertex: self.flushed_vertex as u32,
            indices: &self.indices[self.flushed_index..self.index_head],
            first_index: self.flushed_index as u32,
            batches: &self.closed,
        };
        let result = sink.submit(&draws);

        self.counters.batches += self.closed.len() as u32;
        self.counters.flushes += 1;
        self.closed.clear();
        self.flushed_vertex = self.vertex_head;
        self.flushed_index = self.index_head;
        result
    }

    /// Moves both rings back to the start. Only valid once the GPU is done with
    /// everything flushed so far and nothing is pending.
    pub fn rewind(&mut self) {
        debug_assert!(!self.has_pending(), "rewind with unflushed batches");
        self.vertex_head = 0;
        self.index_head = 0;
        self.flushed_vertex = 0;
        self.flushed_index = 0;
        self.open.indices = 0..0;
    }

    /// Discards recorded batches without drawing them.
    pub fn discard(&mut self) {
        self.closed.clear();
        self.open.indices = self.index_head as u32..self.index_head as u32;
        self.flushed_vertex = self.vertex_head;
        self.flushed_index = self.index_head;
    }

    fn close_open(&mut self) {
        let head = self.index_head as u32;
        if !self.open.indices.is_empty() {
            self.closed.push(self.open.clone());
        }
        self.open.indices = head..head;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{compute_pipeline_index, PolyFlags};

    /// Keeps what a GPU would have drawn, resolved through the uploaded rings.
    #[derive(Default)]
    struct RecordingSink {
        vertex_ring: Vec<SceneVertex>,
        index_ring: Vec<u32>,
        draws: Vec<(BatchState, Range<u32>)>,
        drawn_tags: Vec<u32>,
        waits: u32,
        in_flight: Vec<Range<u32>>,
    }

    impl RecordingSink {
        fn new(vcap: usize, icap: usize) -> Self {
            Self {
                vertex_ring: vec![SceneVertex::default(); vcap],
                index_ring: vec![0; icap],
                ..Default::default()
            }
        }
    }

    impl BatchSink for RecordingSink {
        fn submit(&mut self, draws: &PendingDraws<'_>) -> Result<()> {
            let fv = draws.first_vertex as usize;
            let fi = draws.first_index as usize;
            // Uploads must never overwrite ring slots still in flight.
            for r in &self.in_flight {
                assert!(r.end as usize <= fi || r.start as usize >= fi + draws.indices.len());
            }
            self.vertex_ring[fv..fv + draws.vertices.len()].copy_from_slice(draws.vertices);
            self.index_ring[fi..fi + draws.indices.len()].copy_from_slice(draws.indices);

            for batch in draws.batches {
                self.draws.push((batch.state, batch.indices.clone()));
                self.in_flight.push(batch.indices.clone());
                for &index in &self.index_ring[batch.indices.start as usize..batch.indices.end as usize] {
                    self.drawn_tags.push(self.vertex_ring[index as usize].flags);
                }
            }
            Ok(())
        }

        fn wait_idle(&mut self) -> Result<()> {
            self.waits += 1;
            self.in_flight.clear();
            Ok(())
        }
    }

    fn state(flags: PolyFlags) -> BatchState {
        BatchState {
            pipeline: compute_pipeline_index(flags),
            descriptor: DescriptorKey::default(),
        }
    }

    fn tagged_triangle(tag: u32) -> [SceneVertex; 3] {
        let v = SceneVertex {
            flags: tag,
            ..Default::default()
        };
        [v; 3]
    }

    fn push_triangle(r: &mut BatchRecorder, sink: &mut RecordingSink, tag: u32) {
        let mut res = r.reserve(3, 3, sink).unwrap();
        res.fill_fan(&tagged_triangle(tag));
    }

    #[test]
    fn identical_state_coalesces_into_one_draw() {
        let mut r = BatchRecorder::new(64, 64);
        let mut sink = RecordingSink::new(64, 64);

        r.set_state(state(PolyFlags::NONE));
        push_triangle(&mut r, &mut sink, 1);
        r.set_state(state(PolyFlags::NONE));
        push_triangle(&mut r, &mut sink, 2);
        r.flush(&mut sink).unwrap();

        assert_eq!(sink.draws.len(), 1);
        assert_eq!(sink.draws[0].1, 0..6);
        assert_eq!(sink.drawn_tags, vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn state_change_splits_batches_in_order() {
        let mut r = BatchRecorder::new(64, 64);
        let mut sink = RecordingSink::new(64, 64);

        r.set_state(state(PolyFlags::NONE));
        push_triangle(&mut r, &mut sink, 1);
        r.set_state(state(PolyFlags::TRANSLUCENT));
        push_triangle(&mut r, &mut sink, 2);
        r.set_state(state(PolyFlags::NONE));
        push_triangle(&mut r, &mut sink, 3);
        r.flush(&mut sink).unwrap();

        let ranges: Vec<_> = sink.draws.iter().map(|(_, r)| r.clone()).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..9]);
        assert_eq!(sink.draws[1].0, state(PolyFlags::TRANSLUCENT));
    }

    #[test]
    fn empty_batches_are_not_drawn() {
        let mut r = BatchRecorder::new(64, 64);
        let mut sink = RecordingSink::new(64, 64);

        r.set_state(state(PolyFlags::TRANSLUCENT));
        r.set_state(state(PolyFlags::MODULATED));
        push_triangle(&mut r, &mut sink, 1);
        r.flush(&mut sink).unwrap();
        r.flush(&mut sink).unwrap();

        assert_eq!(sink.draws.len(), 1);
        assert_eq!(sink.draws[0].0, state(PolyFlags::MODULATED));
        assert_eq!(r.take_counters().flushes, 1);
    }

    #[test]
    fn oversized_primitive_is_dropped_not_fatal() {
        let mut r = BatchRecorder::new(8, 12);
        let mut sink = RecordingSink::new(8, 12);

        assert!(matches!(
            r.reserve(9, 3, &mut sink),
            Err(RenderError::PrimitiveTooLarge { vertices: 9, .. })
        ));
        push_triangle(&mut r, &mut sink, 4);
        r.flush(&mut sink).unwrap();

        let c = r.take_counters();
        assert_eq!(c.dropped_primitives, 1);
        assert_eq!(sink.drawn_tags, vec![4, 4, 4]);
    }

    #[test]
    fn state_survives_a_wrap() {
        let mut r = BatchRecorder::new(6, 6);
        let mut sink = RecordingSink::new(6, 6);

        r.set_state(state(PolyFlags::MASKED));
        push_triangle(&mut r, &mut sink, 1);
        push_triangle(&mut r, &mut sink, 2);
        push_triangle(&mut r, &mut sink, 3);
        r.flush(&mut sink).unwrap();

        assert_eq!(sink.waits, 1);
        assert_eq!(sink.draws.len(), 2);
        assert!(sink.draws.iter().all(|(s, _)| *s == state(PolyFlags::MASKED)));
        assert_eq!(sink.draws[1].1, 0..3);
        assert_eq!(sink.drawn_tags, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn million_triangles_wrap_without_loss_or_reordering() {
        const TRIANGLES: u32 = 1_000_000;
        let (vcap, icap) = (3 * 1024, 3 * 1024);
        let mut r = BatchRecorder::new(vcap, icap);
        let mut sink = RecordingSink::new(vcap, icap);

        let states = [state(PolyFlags::NONE), state(PolyFlags::TRANSLUCENT), state(PolyFlags::MODULATED)];
        for tag in 0..TRIANGLES {
            // Switch state every 7 triangles so batches straddle wraps.
            r.set_state(states[(tag / 7) as usize % states.len()]);
            push_triangle(&mut r, &mut sink, tag);
        }
        r.flush(&mut sink).unwrap();

        let counters = r.take_counters();
        assert!(counters.ring_wraps > 0);
        assert_eq!(counters.ring_wraps, sink.waits);
        assert_eq!(counters.dropped_primitives, 0);
        assert_eq!(sink.drawn_tags.len(), 3 * TRIANGLES as usize);

        // Order checksum: every tag appears three times, in submission order.
        let mut expected: u64 = 0;
        let mut actual: u64 = 0;
        for (i, &tag) in sink.drawn_tags.iter().enumerate() {
            let want = i as u32 / 3;
            assert_eq!(tag, want, "triangle out of order at index {i}");
            expected = expected.wrapping_mul(31).wrapping_add(want as u64);
            actual = actual.wrapping_mul(31).wrapping_add(tag as u64);
        }
        assert_eq!(expected, actual);
    }

    #[test]
    fn fan_indices_are_absolute() {
        let mut r = BatchRecorder::new(16, 16);
        let mut sink = RecordingSink::new(16, 16);
        push_triangle(&mut r, &mut sink, 0);

        let quad = [SceneVertex::default(); 4];
        let mut res = r.reserve(4, 6, &mut sink).unwrap();
        assert_eq!(res.base_vertex, 3);
        res.fill_fan(&quad);
        assert_eq!(res.indices, &[3, 4, 5, 3, 5, 6]);
    }
}

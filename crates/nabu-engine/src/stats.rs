//! Per-frame counters.

use std::fmt;

use crate::batch::RecorderCounters;

/// How much work the last frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub batches: u32,
    pub draw_calls: u32,
    pub vertices: u64,
    pub indices: u64,
    pub texture_uploads: u64,
    pub descriptor_sets_created: u64,
    pub flushes: u32,
    pub ring_wraps: u32,
    pub dropped_primitives: u32,
}

impl FrameStats {
    /// Frames between two debug log lines.
    pub const LOG_INTERVAL: u64 = 300;

    /// Folds in the batcher counters of one frame.
    pub fn add_recorder(&mut self, counters: RecorderCounters, draw_calls: u32) {
        self.batches += counters.batches;
        self.draw_calls += draw_calls;
        self.vertices += counters.vertices;
        self.indices += counters.indices;
        self.flushes += counters.flushes;
        self.ring_wraps += counters.ring_wraps;
        self.dropped_primitives += counters.dropped_primitives;
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} draws / {} batches, {} verts, {} indices, {} uploads, {} new sets, {} flushes, {} wraps, {} dropped",
            self.draw_calls,
            self.batches,
            self.vertices,
            self.indices,
            self.texture_uploads,
            self.descriptor_sets_created,
            self.flushes,
            self.ring_wraps,
            self.dropped_primitives
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_counters_accumulate() {
        let mut stats = FrameStats::default();
        let counters = RecorderCounters {
            batches: 3,
            vertices: 12,
            indices: 18,
            flushes: 1,
            ring_wraps: 0,
            dropped_primitives: 1,
        };
        stats.add_recorder(counters, 2);
        stats.add_recorder(counters, 1);
        assert_eq!(stats.batches, 6);
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.indices, 36);
        assert_eq!(stats.dropped_primitives, 2);
        assert!(stats.to_string().starts_with("3 draws / 6 batches"));
    }
}

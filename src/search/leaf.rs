//! Per-call view of one segment.

use std::sync::Arc;

use crate::index::Segment;
use crate::search::offsets::PositionToOffset;

/// One leaf of the searched snapshot.
///
/// Built fresh for every search call, so the offset cache is never shared
/// between calls or carried across a reopen.
#[derive(Debug)]
pub struct LeafContext {
    ordinal: usize,
    segment: Arc<Segment>,
    offsets: PositionToOffset,
}

impl LeafContext {
    pub fn new(ordinal: usize, segment: Arc<Segment>) -> Self {
        let offsets = PositionToOffset::new(segment.clone());
        LeafContext {
            ordinal,
            segment,
            offsets,
        }
    }

    /// Contexts for all leaves of a snapshot, in leaf order.
    pub fn for_leaves(leaves: &[Arc<Segment>]) -> Vec<LeafContext> {
        leaves
            .iter()
            .enumerate()
            .map(|(ordinal, segment)| LeafContext::new(ordinal, Arc::clone(segment)))
            .collect()
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn offsets(&mut self) -> &mut PositionToOffset {
        &mut self.offsets
    }

    /// Segment and offset cache at once.
    pub fn parts(&mut self) -> (&Segment, &mut PositionToOffset) {
        (&self.segment, &mut self.offsets)
    }
}

//! Point-in-time index snapshots.

use std::sync::Arc;

use crate::index::fingerprint::{NULL_FINGERPRINT, fingerprint_of};
use crate::index::segment::Segment;

/// An immutable view of one committed generation.
///
/// Searches hold an `Arc<IndexReader>` for their whole duration, so later
/// commits never change what an in-flight search sees.
#[derive(Debug, Clone, Default)]
pub struct IndexReader {
    generation: Option<u64>,
    segments: Vec<Arc<Segment>>,
}

impl IndexReader {
    pub fn new(generation: Option<u64>, segments: Vec<Arc<Segment>>) -> Self {
        IndexReader {
            generation,
            segments,
        }
    }

    /// Commit generation, `None` before the first commit.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    /// Segments in commit order; the position is the leaf ordinal.
    pub fn leaves(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    /// Live documents across all leaves.
    pub fn num_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.num_docs() as u64).sum()
    }

    /// Stored documents across all leaves, deleted ones included.
    pub fn max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.info().doc_count as u64).sum()
    }

    pub fn fingerprint(&self) -> String {
        match self.generation {
            Some(_) => fingerprint_of(self.segments.iter().map(|s| s.as_ref())),
            None => NULL_FINGERPRINT.to_string(),
        }
    }
}

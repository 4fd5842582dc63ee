//! Token position to character offset resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::Result;
use crate::index::{DocId, PositionSource};

/// Offsets returned for positions that were never registered.
pub const UNRESOLVED: (i32, i32) = (0, -1);

/// Batched, lazily resolved offsets of one leaf.
///
/// Callers first [`add`](PositionToOffset::add) every position they are
/// going to need. The first lookup after new additions resolves all
/// pending positions with one stored-document read per document.
pub struct PositionToOffset {
    source: Arc<dyn PositionSource>,
    pending: BTreeMap<DocId, BTreeSet<u32>>,
    resolved: AHashMap<(DocId, u32), (i32, i32)>,
    pages: AHashMap<DocId, Vec<(u32, u32)>>,
}

impl PositionToOffset {
    pub fn new(source: Arc<dyn PositionSource>) -> Self {
        PositionToOffset {
            source,
            pending: BTreeMap::new(),
            resolved: AHashMap::new(),
            pages: AHashMap::new(),
        }
    }

    /// Register a position for the next resolution.
    pub fn add(&mut self, doc: DocId, position: u32) {
        if !self.resolved.contains_key(&(doc, position)) {
            self.pending.entry(doc).or_default().insert(position);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Resolve everything registered so far.
    pub fn resolve(&mut self) -> Result<()> {
        for (doc, positions) in std::mem::take(&mut self.pending) {
            let document = self.source.document(doc)?;
            for position in positions {
                if let Some((start, end)) = document.offsets(position) {
                    self.resolved
                        .insert((doc, position), (start as i32, end as i32));
                }
            }
        }
        Ok(())
    }

    /// `(start, end)` character offsets of a token, [`UNRESOLVED`] when the
    /// position was never added.
    pub fn get(&mut self, doc: DocId, position: u32) -> Result<(i32, i32)> {
        if self.has_pending() {
            self.resolve()?;
        }
        Ok(self
            .resolved
            .get(&(doc, position))
            .copied()
            .unwrap_or(UNRESOLVED))
    }

    pub fn start(&mut self, doc: DocId, position: u32) -> Result<i32> {
        Ok(self.get(doc, position)?.0)
    }

    pub fn end(&mut self, doc: DocId, position: u32) -> Result<i32> {
        Ok(self.get(doc, position)?.1)
    }

    /// Page in effect at a token position: the page of the last page break
    /// at or before it.
    pub fn page_at(&mut self, doc: DocId, position: u32) -> Result<Option<u32>> {
        if !self.pages.contains_key(&doc) {
            let document = self.source.document(doc)?;
            let mut breaks: Vec<(u32, u32)> = document
                .page_breaks
                .iter()
                .map(|pb| (pb.position, pb.page))
                .collect();
            breaks.sort_unstable();
            self.pages.insert(doc, breaks);
        }
        let breaks = self.pages.get(&doc).map(Vec::as_slice).unwrap_or(&[]);
        let after = breaks.partition_point(|&(p, _)| p <= position);
        Ok(after.checked_sub(1).map(|i| breaks[i].1))
    }

    /// Number of resolved positions.
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

impl fmt::Debug for PositionToOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionToOffset")
            .field("pending", &self.pending)
            .field("resolved", &self.resolved.len())
            .finish()
    }
}

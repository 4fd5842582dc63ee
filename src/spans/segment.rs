//! Co-occurrence of two spans at the same position range.

use crate::error::Result;
use crate::index::DocId;
use crate::spans::buffered::{BufferedSpans, DocMatcher, align, same_range};
use crate::spans::{Span, Spans, drain_document};

/// Matches where both operands cover exactly the same `(start, end)`.
pub struct SegmentMatcher<'a> {
    first: Box<dyn Spans + 'a>,
    second: Box<dyn Spans + 'a>,
}

pub type SegmentSpans<'a> = BufferedSpans<SegmentMatcher<'a>>;

impl<'a> BufferedSpans<SegmentMatcher<'a>> {
    pub fn new(first: Box<dyn Spans + 'a>, second: Box<dyn Spans + 'a>) -> Self {
        BufferedSpans::from_matcher(SegmentMatcher { first, second })
    }
}

impl DocMatcher for SegmentMatcher<'_> {
    fn next_candidate(&mut self, target: Option<DocId>) -> Result<Option<DocId>> {
        align(self.first.as_mut(), self.second.as_mut(), target)
    }

    fn collect_matches(&mut self, _doc: DocId, out: &mut Vec<Span>) -> Result<()> {
        let mut firsts = Vec::new();
        let mut seconds = Vec::new();
        drain_document(self.first.as_mut(), &mut firsts)?;
        drain_document(self.second.as_mut(), &mut seconds)?;
        seconds.sort();

        for first in &firsts {
            for second in same_range(&seconds, first.start, first.end) {
                out.push(first.union(second));
            }
        }
        Ok(())
    }

    fn cost(&self) -> u64 {
        self.first.cost().min(self.second.cost())
    }
}

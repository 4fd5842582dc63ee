//! Slices of matched spans.

use crate::error::Result;
use crate::index::DocId;
use crate::spans::buffered::{BufferedSpans, DocMatcher, advance};
use crate::spans::{Span, Spans, drain_document};

/// Cut `span` down to `(from, length)`.
///
/// A non-negative `from` counts from the start of the span, a negative one
/// backwards from its end. A positive `length` gives the size of the slice,
/// anything else keeps the rest of the span. The slice is clipped to the
/// span; `None` when nothing of it is left.
pub fn subspan(span: &Span, from: i32, length: i32) -> Option<Span> {
    let start = if from >= 0 {
        span.start.saturating_add(from)
    } else {
        span.end.saturating_add(from)
    };
    let end = if length > 0 {
        start.saturating_add(length)
    } else {
        span.end
    };

    let start = start.max(span.start);
    let end = end.min(span.end);
    if start >= end {
        return None;
    }

    let class_marks = span
        .class_marks
        .iter()
        .filter_map(|(&class, &(s, e))| {
            let (s, e) = (s.max(start), e.min(end));
            (s < e).then_some((class, (s, e)))
        })
        .collect();

    Some(Span {
        doc_id: span.doc_id,
        start,
        end,
        class_marks,
        payload: span.payload,
    })
}

pub struct SubspanMatcher<'a> {
    inner: Box<dyn Spans + 'a>,
    from: i32,
    length: i32,
}

pub type SubspanSpans<'a> = BufferedSpans<SubspanMatcher<'a>>;

impl<'a> BufferedSpans<SubspanMatcher<'a>> {
    pub fn new(inner: Box<dyn Spans + 'a>, from: i32, length: i32) -> Self {
        BufferedSpans::from_matcher(SubspanMatcher {
            inner,
            from,
            length,
        })
    }
}

impl DocMatcher for SubspanMatcher<'_> {
    fn next_candidate(&mut self, target: Option<DocId>) -> Result<Option<DocId>> {
        advance(self.inner.as_mut(), target)
    }

    fn collect_matches(&mut self, _doc: DocId, out: &mut Vec<Span>) -> Result<()> {
        let mut spans = Vec::new();
        drain_document(self.inner.as_mut(), &mut spans)?;
        out.extend(
            spans
                .iter()
                .filter_map(|span| subspan(span, self.from, self.length)),
        );
        Ok(())
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}

//! Document-at-a-time span evaluation.

use crate::error::Result;
use crate::index::DocId;
use crate::spans::{ClassMarks, CurrentDoc, NO_MORE_POSITIONS, Span, Spans, UNPOSITIONED};

/// Per-document matching logic of a combinator.
///
/// The driver asks for candidate documents and then for all matches in a
/// candidate. A candidate may turn out to hold no match, in which case the
/// driver moves on.
pub trait DocMatcher {
    /// Move the operands to the next candidate document.
    ///
    /// `None` means "after the current candidate", `Some(target)` means
    /// "first candidate `>= target`". Returns `None` once exhausted.
    fn next_candidate(&mut self, target: Option<DocId>) -> Result<Option<DocId>>;

    /// Append every match of `doc` to `out`, in any order.
    fn collect_matches(&mut self, doc: DocId, out: &mut Vec<Span>) -> Result<()>;

    fn cost(&self) -> u64;
}

/// [`Spans`] driver for a [`DocMatcher`].
///
/// The matches of the current document are buffered, sorted by
/// `(start, end)` and deduplicated before they are handed out.
pub struct BufferedSpans<M> {
    matcher: M,
    doc: CurrentDoc,
    buffer: Vec<Span>,
    index: Option<usize>,
    empty_marks: ClassMarks,
}

impl<M: DocMatcher> BufferedSpans<M> {
    pub fn from_matcher(matcher: M) -> Self {
        BufferedSpans {
            matcher,
            doc: CurrentDoc::Unpositioned,
            buffer: Vec::new(),
            index: None,
            empty_marks: ClassMarks::new(),
        }
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    fn current(&self) -> Option<&Span> {
        self.index.and_then(|i| self.buffer.get(i))
    }

    /// Starting from the candidate `found`, settle on the first document
    /// that holds at least one match.
    fn settle(&mut self, mut found: Option<DocId>) -> Result<bool> {
        while let Some(doc) = found {
            self.buffer.clear();
            self.matcher.collect_matches(doc, &mut self.buffer)?;
            if !self.buffer.is_empty() {
                self.buffer.sort();
                self.buffer.dedup();
                self.doc = CurrentDoc::Doc(doc);
                self.index = None;
                return Ok(true);
            }
            found = self.matcher.next_candidate(None)?;
        }
        self.doc = CurrentDoc::End;
        self.buffer.clear();
        self.index = None;
        Ok(false)
    }
}

impl<M: DocMatcher> Spans for BufferedSpans<M> {
    fn current_doc(&self) -> CurrentDoc {
        self.doc
    }

    fn next_doc(&mut self) -> Result<bool> {
        if self.doc == CurrentDoc::End {
            return Ok(false);
        }
        let found = self.matcher.next_candidate(None)?;
        self.settle(found)
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        match self.doc {
            CurrentDoc::End => return Ok(false),
            CurrentDoc::Doc(doc) if doc >= target => return Ok(true),
            _ => {}
        }
        let found = self.matcher.next_candidate(Some(target))?;
        self.settle(found)
    }

    fn next_start_position(&mut self) -> Result<bool> {
        if self.doc.doc().is_none() {
            return Ok(false);
        }
        let next = self.index.map_or(0, |i| i.saturating_add(1));
        self.index = Some(next.min(self.buffer.len()));
        Ok(next < self.buffer.len())
    }

    fn start(&self) -> i32 {
        match (self.index, self.current()) {
            (None, _) => UNPOSITIONED,
            (Some(_), Some(span)) => span.start,
            (Some(_), None) => NO_MORE_POSITIONS,
        }
    }

    fn end(&self) -> i32 {
        match (self.index, self.current()) {
            (None, _) => UNPOSITIONED,
            (Some(_), Some(span)) => span.end,
            (Some(_), None) => NO_MORE_POSITIONS,
        }
    }

    fn class_marks(&self) -> &ClassMarks {
        self.current()
            .map(|span| &span.class_marks)
            .unwrap_or(&self.empty_marks)
    }

    fn payload(&self) -> Option<u32> {
        self.current().and_then(|span| span.payload)
    }

    fn cost(&self) -> u64 {
        self.matcher.cost()
    }
}

/// Move `spans` to the next document (`None`) or the first one `>= target`.
pub(crate) fn advance(spans: &mut dyn Spans, target: Option<DocId>) -> Result<Option<DocId>> {
    let moved = match target {
        None => spans.next_doc()?,
        Some(target) => spans.skip_to(target)?,
    };
    Ok(if moved { spans.current_doc().doc() } else { None })
}

/// Leap-frog two iterators onto the next document both of them hold.
pub(crate) fn align(
    first: &mut dyn Spans,
    second: &mut dyn Spans,
    target: Option<DocId>,
) -> Result<Option<DocId>> {
    let Some(mut doc) = advance(first, target)? else {
        return Ok(None);
    };
    loop {
        if !second.skip_to(doc)? {
            return Ok(None);
        }
        let Some(other) = second.current_doc().doc() else {
            return Ok(None);
        };
        if other == doc {
            return Ok(Some(doc));
        }
        match advance(first, Some(other))? {
            Some(next) => doc = next,
            None => return Ok(None),
        }
    }
}

/// All spans `spans` holds in `doc`, or none when it is positioned past it.
///
/// Only valid for documents in increasing order.
pub(crate) fn spans_in(spans: &mut dyn Spans, doc: DocId) -> Result<Vec<Span>> {
    let mut out = Vec::new();
    if spans.skip_to(doc)? && spans.current_doc() == CurrentDoc::Doc(doc) {
        crate::spans::drain_document(spans, &mut out)?;
    }
    Ok(out)
}

/// Spans of `sorted` with exactly the given `(start, end)`.
pub(crate) fn same_range(sorted: &[Span], start: i32, end: i32) -> &[Span] {
    let from = sorted.partition_point(|s| (s.start, s.end) < (start, end));
    let to = from + sorted[from..].partition_point(|s| (s.start, s.end) == (start, end));
    &sorted[from..to]
}

/// Spans of `sorted` starting exactly at `start`.
pub(crate) fn starting_at(sorted: &[Span], start: i32) -> &[Span] {
    let from = sorted.partition_point(|s| s.start < start);
    let to = from + sorted[from..].partition_point(|s| s.start == start);
    &sorted[from..to]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields fixed spans for a fixed list of documents.
    struct FixedMatcher {
        docs: Vec<(DocId, Vec<Span>)>,
        cursor: Option<usize>,
    }

    impl DocMatcher for FixedMatcher {
        fn next_candidate(&mut self, target: Option<DocId>) -> Result<Option<DocId>> {
            let from = self.cursor.map_or(0, |c| c + 1);
            let next = (from..self.docs.len())
                .find(|&i| target.is_none_or(|t| self.docs[i].0 >= t));
            self.cursor = Some(next.unwrap_or(self.docs.len()));
            Ok(next.map(|i| self.docs[i].0))
        }

        fn collect_matches(&mut self, doc: DocId, out: &mut Vec<Span>) -> Result<()> {
            if let Some((_, spans)) = self.docs.iter().find(|(d, _)| *d == doc) {
                out.extend(spans.iter().cloned());
            }
            Ok(())
        }

        fn cost(&self) -> u64 {
            self.docs.len() as u64
        }
    }

    fn spans() -> BufferedSpans<FixedMatcher> {
        BufferedSpans::from_matcher(FixedMatcher {
            docs: vec![
                (1, vec![Span::new(1, 4, 5), Span::new(1, 0, 2), Span::new(1, 0, 2)]),
                (3, vec![]),
                (5, vec![Span::new(5, 1, 2)]),
                (8, vec![Span::new(8, 0, 1)]),
            ],
            cursor: None,
        })
    }

    #[test]
    fn test_sorts_and_dedups() {
        let mut spans = spans();
        assert!(spans.next_doc().unwrap());
        assert_eq!(spans.current_doc(), CurrentDoc::Doc(1));
        assert!(spans.next_start_position().unwrap());
        assert_eq!((spans.start(), spans.end()), (0, 2));
        assert!(spans.next_start_position().unwrap());
        assert_eq!((spans.start(), spans.end()), (4, 5));
        assert!(!spans.next_start_position().unwrap());
    }

    #[test]
    fn test_skips_empty_candidates() {
        let mut spans = spans();
        assert!(spans.skip_to(2).unwrap());
        assert_eq!(spans.current_doc(), CurrentDoc::Doc(5));
        assert!(spans.skip_to(4).unwrap());
        assert_eq!(spans.current_doc(), CurrentDoc::Doc(5));
        assert!(spans.next_doc().unwrap());
        assert_eq!(spans.current_doc(), CurrentDoc::Doc(8));
        assert!(!spans.skip_to(9).unwrap());
        assert_eq!(spans.current_doc(), CurrentDoc::End);
        assert!(!spans.next_doc().unwrap());
    }

    #[test]
    fn test_range_helpers() {
        let sorted = vec![
            Span::new(0, 0, 1),
            Span::new(0, 1, 2),
            Span::new(0, 1, 2).with_class(1, 1, 2),
            Span::new(0, 1, 3),
            Span::new(0, 2, 3),
        ];
        assert_eq!(same_range(&sorted, 1, 2).len(), 2);
        assert_eq!(starting_at(&sorted, 1).len(), 3);
        assert!(same_range(&sorted, 5, 6).is_empty());
    }
}

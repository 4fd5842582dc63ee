//! Immediate adjacency.

use crate::error::Result;
use crate::index::DocId;
use crate::spans::buffered::{BufferedSpans, DocMatcher, align, starting_at};
use crate::spans::{Span, Spans, drain_document, merge_class_marks};

/// Matches where `second` starts exactly where `first` ends.
pub struct NextMatcher<'a> {
    first: Box<dyn Spans + 'a>,
    second: Box<dyn Spans + 'a>,
}

pub type NextSpans<'a> = BufferedSpans<NextMatcher<'a>>;

impl<'a> BufferedSpans<NextMatcher<'a>> {
    pub fn new(first: Box<dyn Spans + 'a>, second: Box<dyn Spans + 'a>) -> Self {
        BufferedSpans::from_matcher(NextMatcher { first, second })
    }
}

impl DocMatcher for NextMatcher<'_> {
    fn next_candidate(&mut self, target: Option<DocId>) -> Result<Option<DocId>> {
        align(self.first.as_mut(), self.second.as_mut(), target)
    }

    fn collect_matches(&mut self, doc: DocId, out: &mut Vec<Span>) -> Result<()> {
        let mut firsts = Vec::new();
        let mut seconds = Vec::new();
        drain_document(self.first.as_mut(), &mut firsts)?;
        drain_document(self.second.as_mut(), &mut seconds)?;
        seconds.sort();

        for first in &firsts {
            for second in starting_at(&seconds, first.end) {
                let mut class_marks = first.class_marks.clone();
                merge_class_marks(&mut class_marks, &second.class_marks);
                out.push(Span {
                    doc_id: doc,
                    start: first.start,
                    end: second.end,
                    class_marks,
                    payload: first.payload.or(second.payload),
                });
            }
        }
        Ok(())
    }

    fn cost(&self) -> u64 {
        self.first.cost().min(self.second.cost())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::collect_all;
    use crate::spans::fixtures::segment_of;
    use crate::spans::segment::SegmentSpans;
    use crate::spans::term::TermSpans;

    fn next<'a>(segment: &'a crate::index::Segment, a: &str, b: &str) -> NextSpans<'a> {
        NextSpans::new(
            Box::new(TermSpans::new(segment, a)),
            Box::new(TermSpans::new(segment, b)),
        )
    }

    #[test]
    fn test_adjacent_pairs() {
        let segment = segment_of(&[
            &["s:a", "s:b", "s:c", "s:a", "s:b"],
            &["s:b", "s:a"],
            &["s:a", "s:c", "s:b"],
            &["s:a", "s:b"],
        ]);
        let matches = collect_all(&mut next(&segment, "s:a", "s:b")).unwrap();
        let keys: Vec<(DocId, i32, i32)> =
            matches.iter().map(|s| (s.doc_id, s.start, s.end)).collect();
        assert_eq!(keys, vec![(0, 0, 2), (0, 3, 5), (3, 0, 2)]);
    }

    #[test]
    fn test_never_exceeds_operand_counts() {
        let segment = segment_of(&[&["s:a", "s:a", "s:b", "s:a", "s:b", "s:b"]]);
        let matches = collect_all(&mut next(&segment, "s:a", "s:b")).unwrap();
        assert_eq!(matches.len(), 2);
        for m in &matches {
            assert_eq!(m.end - m.start, 2);
        }
    }

    #[test]
    fn test_nested_sequence() {
        let segment = segment_of(&[&["s:der", "s:alte", "s:Baum", "s:der", "s:Baum"]]);
        let inner = next(&segment, "s:der", "s:alte");
        let mut spans = NextSpans::new(
            Box::new(inner),
            Box::new(TermSpans::new(&segment, "s:Baum")),
        );
        let matches = collect_all(&mut spans).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].start, matches[0].end), (0, 3));
    }

    #[test]
    fn test_sequence_of_segments() {
        let segment = segment_of(&[&["s:a|tt/p:ART", "s:b|tt/p:NN", "s:b"]]);
        let article = SegmentSpans::new(
            Box::new(TermSpans::new(&segment, "s:a")),
            Box::new(TermSpans::new(&segment, "tt/p:ART")),
        );
        let mut spans = NextSpans::new(
            Box::new(article),
            Box::new(TermSpans::new(&segment, "tt/p:NN")),
        );
        let matches = collect_all(&mut spans).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].start, matches[0].end), (0, 2));
    }
}

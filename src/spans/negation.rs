//! Requiring or forbidding a co-located span.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::DocId;
use crate::spans::buffered::{BufferedSpans, DocMatcher, advance, align, same_range, spans_in};
use crate::spans::{Span, Spans, drain_document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegationMode {
    /// Keep spans that `other` covers at the same `(start, end)`.
    With,
    /// Drop spans that `other` covers at the same `(start, end)`.
    Without,
}

pub struct NegationMatcher<'a> {
    base: Box<dyn Spans + 'a>,
    other: Box<dyn Spans + 'a>,
    mode: NegationMode,
}

pub type NegationSpans<'a> = BufferedSpans<NegationMatcher<'a>>;

impl<'a> BufferedSpans<NegationMatcher<'a>> {
    pub fn new(base: Box<dyn Spans + 'a>, other: Box<dyn Spans + 'a>, mode: NegationMode) -> Self {
        BufferedSpans::from_matcher(NegationMatcher { base, other, mode })
    }

    pub fn with(base: Box<dyn Spans + 'a>, other: Box<dyn Spans + 'a>) -> Self {
        Self::new(base, other, NegationMode::With)
    }

    pub fn without(base: Box<dyn Spans + 'a>, other: Box<dyn Spans + 'a>) -> Self {
        Self::new(base, other, NegationMode::Without)
    }
}

impl DocMatcher for NegationMatcher<'_> {
    fn next_candidate(&mut self, target: Option<DocId>) -> Result<Option<DocId>> {
        match self.mode {
            NegationMode::With => align(self.base.as_mut(), self.other.as_mut(), target),
            NegationMode::Without => advance(self.base.as_mut(), target),
        }
    }

    fn collect_matches(&mut self, doc: DocId, out: &mut Vec<Span>) -> Result<()> {
        let mut base = Vec::new();
        drain_document(self.base.as_mut(), &mut base)?;
        let mut others = spans_in(self.other.as_mut(), doc)?;
        others.sort();

        let keep = |span: &Span| {
            let covered = !same_range(&others, span.start, span.end).is_empty();
            covered == (self.mode == NegationMode::With)
        };
        out.extend(base.into_iter().filter(|span| keep(span)));
        Ok(())
    }

    fn cost(&self) -> u64 {
        self.base.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::collect_all;
    use crate::spans::fixtures::segment_of;
    use crate::spans::term::TermSpans;

    fn run(mode: NegationMode) -> Vec<(DocId, i32, i32)> {
        let segment = segment_of(&[
            &["s:Baum|tt/p:NN", "s:Baum|tt/p:VVFIN", "s:Baum"],
            &["s:Baum"],
            &["s:Haus|tt/p:NN"],
        ]);
        let mut spans = NegationSpans::new(
            Box::new(TermSpans::new(&segment, "s:Baum")),
            Box::new(TermSpans::new(&segment, "tt/p:NN")),
            mode,
        );
        collect_all(&mut spans)
            .unwrap()
            .iter()
            .map(|s| (s.doc_id, s.start, s.end))
            .collect()
    }

    #[test]
    fn test_with() {
        assert_eq!(run(NegationMode::With), vec![(0, 0, 1)]);
    }

    #[test]
    fn test_without() {
        assert_eq!(run(NegationMode::Without), vec![(0, 1, 2), (0, 2, 3), (1, 0, 1)]);
    }
}

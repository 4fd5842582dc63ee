//! Distance constraints between two spans.
//!
//! A [`DistanceConstraint`] measures the gap between a pair of spans either
//! in words or in enclosing elements (sentences, paragraphs, ...):
//!
//! - word distance is `second.start - first.end` and requires the second
//!   span to start no earlier than the first one ends,
//! - element distance is the number of elements between the element that
//!   contains the start of the first span and the one that contains the end
//!   of the second span; `0` means "same element".
//!
//! Unordered constraints accept the pair in either orientation. Excluded
//! constraints accept exactly the pairs the plain constraint rejects.

use std::fmt;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::index::{DocId, PositionSource};
use crate::spans::buffered::{BufferedSpans, DocMatcher, advance, align, spans_in};
use crate::spans::term::TermSpans;
use crate::spans::{Span, Spans, drain_document};

/// What a distance is counted in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Word,
    /// Element term, e.g. `<>:base/s:s`.
    Element(String),
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceUnit::Word => write!(f, "w"),
            DistanceUnit::Element(term) => write!(f, "{term}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistanceConstraint {
    pub unit: DistanceUnit,
    pub min: u32,
    pub max: u32,
    #[serde(default = "default_ordered")]
    pub ordered: bool,
    #[serde(default)]
    pub excluded: bool,
}

fn default_ordered() -> bool {
    true
}

impl DistanceConstraint {
    pub fn new(unit: DistanceUnit, min: u32, max: u32, ordered: bool, excluded: bool) -> Result<Self> {
        let constraint = DistanceConstraint {
            unit,
            min,
            max,
            ordered,
            excluded,
        };
        constraint.validate()?;
        Ok(constraint)
    }

    /// Ordered word distance in `[min, max]`.
    pub fn words(min: u32, max: u32) -> Result<Self> {
        Self::new(DistanceUnit::Word, min, max, true, false)
    }

    /// Ordered element distance in `[min, max]`.
    pub fn elements<T: Into<String>>(term: T, min: u32, max: u32) -> Result<Self> {
        Self::new(DistanceUnit::Element(term.into()), min, max, true, false)
    }

    pub fn unordered(mut self) -> Self {
        self.ordered = false;
        self
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min > self.max {
            return Err(TesseraError::invalid_constraint(format!(
                "Minimum distance {} is greater than maximum distance {}",
                self.min, self.max
            )));
        }
        if let DistanceUnit::Element(term) = &self.unit
            && term.is_empty()
        {
            return Err(TesseraError::invalid_constraint("Element distance needs an element term"));
        }
        Ok(())
    }

    pub fn element_term(&self) -> Option<&str> {
        match &self.unit {
            DistanceUnit::Word => None,
            DistanceUnit::Element(term) => Some(term),
        }
    }

    /// Whether the pair lies within range, ignoring `excluded`.
    ///
    /// `elements` are the spans of the element term in the pair's document,
    /// sorted; ignored for word distances.
    pub fn within(&self, first: &Span, second: &Span, elements: &[Span]) -> bool {
        self.within_ordered(first, second, elements)
            || (!self.ordered && self.within_ordered(second, first, elements))
    }

    /// Whether the pair is accepted, `excluded` applied.
    pub fn accepts(&self, first: &Span, second: &Span, elements: &[Span]) -> bool {
        self.within(first, second, elements) != self.excluded
    }

    fn within_ordered(&self, first: &Span, second: &Span, elements: &[Span]) -> bool {
        if second.start < first.end {
            return false;
        }
        let distance = match self.unit {
            DistanceUnit::Word => (second.start - first.end) as i64,
            DistanceUnit::Element(_) => {
                let Some(from) = enclosing(elements, first.start) else {
                    return false;
                };
                let Some(to) = enclosing(elements, second.end - 1) else {
                    return false;
                };
                to as i64 - from as i64
            }
        };
        distance >= self.min as i64 && distance <= self.max as i64
    }
}

impl fmt::Display for DistanceConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}:{}]", self.unit, self.min, self.max)?;
        if !self.ordered {
            write!(f, ", unordered")?;
        }
        if self.excluded {
            write!(f, ", excluded")?;
        }
        Ok(())
    }
}

/// Index of the first element containing `position`.
fn enclosing(elements: &[Span], position: i32) -> Option<usize> {
    elements
        .iter()
        .position(|e| e.start <= position && position < e.end)
}

/// Element spans of the current document, one iterator per element term.
pub(crate) struct ElementSpans<'a> {
    source: &'a dyn PositionSource,
    iterators: AHashMap<String, TermSpans<'a>>,
    loaded: AHashMap<String, Vec<Span>>,
}

impl<'a> ElementSpans<'a> {
    pub(crate) fn new<'c, I>(source: &'a dyn PositionSource, constraints: I) -> Self
    where
        I: IntoIterator<Item = &'c DistanceConstraint>,
    {
        let mut iterators = AHashMap::new();
        for constraint in constraints {
            if let Some(term) = constraint.element_term() {
                iterators
                    .entry(term.to_string())
                    .or_insert_with(|| TermSpans::new(source, term));
            }
        }
        ElementSpans {
            source,
            iterators,
            loaded: AHashMap::new(),
        }
    }

    pub(crate) fn load(&mut self, doc: DocId) -> Result<()> {
        self.loaded.clear();
        for (term, spans) in self.iterators.iter_mut() {
            let mut elements = spans_in(spans, doc)?;
            elements.sort();
            self.loaded.insert(term.clone(), elements);
        }
        Ok(())
    }

    pub(crate) fn for_constraint(&self, constraint: &DistanceConstraint) -> &[Span] {
        constraint
            .element_term()
            .and_then(|term| self.loaded.get(term))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl fmt::Debug for ElementSpans<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementSpans")
            .field("max_doc", &self.source.max_doc())
            .field("terms", &self.iterators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Pairs of spans under a single constraint.
///
/// Not excluded: the union of every accepted pair. Excluded: every first
/// span with no second span within range, including documents the second
/// operand does not occur in.
pub struct DistanceMatcher<'a> {
    first: Box<dyn Spans + 'a>,
    second: Box<dyn Spans + 'a>,
    constraint: DistanceConstraint,
    elements: ElementSpans<'a>,
}

pub type DistanceSpans<'a> = BufferedSpans<DistanceMatcher<'a>>;

impl<'a> BufferedSpans<DistanceMatcher<'a>> {
    pub fn new(
        source: &'a dyn PositionSource,
        first: Box<dyn Spans + 'a>,
        second: Box<dyn Spans + 'a>,
        constraint: DistanceConstraint,
    ) -> Self {
        let elements = ElementSpans::new(source, [&constraint]);
        BufferedSpans::from_matcher(DistanceMatcher {
            first,
            second,
            constraint,
            elements,
        })
    }
}

impl DocMatcher for DistanceMatcher<'_> {
    fn next_candidate(&mut self, target: Option<DocId>) -> Result<Option<DocId>> {
        if self.constraint.excluded {
            advance(self.first.as_mut(), target)
        } else {
            align(self.first.as_mut(), self.second.as_mut(), target)
        }
    }

    fn collect_matches(&mut self, doc: DocId, out: &mut Vec<Span>) -> Result<()> {
        let mut firsts = Vec::new();
        drain_document(self.first.as_mut(), &mut firsts)?;
        let seconds = spans_in(self.second.as_mut(), doc)?;
        self.elements.load(doc)?;
        let elements = self.elements.for_constraint(&self.constraint);

        for first in &firsts {
            if self.constraint.excluded {
                if !seconds
                    .iter()
                    .any(|second| self.constraint.within(first, second, elements))
                {
                    out.push(first.clone());
                }
            } else {
                for second in &seconds {
                    if self.constraint.within(first, second, elements) {
                        out.push(first.union(second));
                    }
                }
            }
        }
        Ok(())
    }

    fn cost(&self) -> u64 {
        if self.constraint.excluded {
            self.first.cost()
        } else {
            self.first.cost().min(self.second.cost())
        }
    }
}

/// Pairs of spans satisfying every constraint of a list.
pub struct MultiDistanceMatcher<'a> {
    first: Box<dyn Spans + 'a>,
    second: Box<dyn Spans + 'a>,
    constraints: Vec<DistanceConstraint>,
    elements: ElementSpans<'a>,
}

pub type MultiDistanceSpans<'a> = BufferedSpans<MultiDistanceMatcher<'a>>;

impl<'a> BufferedSpans<MultiDistanceMatcher<'a>> {
    pub fn new(
        source: &'a dyn PositionSource,
        first: Box<dyn Spans + 'a>,
        second: Box<dyn Spans + 'a>,
        constraints: Vec<DistanceConstraint>,
    ) -> Self {
        let elements = ElementSpans::new(source, &constraints);
        BufferedSpans::from_matcher(MultiDistanceMatcher {
            first,
            second,
            constraints,
            elements,
        })
    }
}

impl DocMatcher for MultiDistanceMatcher<'_> {
    fn next_candidate(&mut self, target: Option<DocId>) -> Result<Option<DocId>> {
        align(self.first.as_mut(), self.second.as_mut(), target)
    }

    fn collect_matches(&mut self, doc: DocId, out: &mut Vec<Span>) -> Result<()> {
        let mut firsts = Vec::new();
        let mut seconds = Vec::new();
        drain_document(self.first.as_mut(), &mut firsts)?;
        drain_document(self.second.as_mut(), &mut seconds)?;
        self.elements.load(doc)?;

        for first in &firsts {
            for second in &seconds {
                let accepted = self.constraints.iter().all(|constraint| {
                    constraint.accepts(first, second, self.elements.for_constraint(constraint))
                });
                if accepted {
                    out.push(first.union(second));
                }
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
    use crate::index::document::SENTENCE_ELEMENT;
    use crate::spans::collect_all;
    use crate::spans::fixtures::{doc, segment, segment_of};

    fn keys(spans: &[Span]) -> Vec<(DocId, i32, i32)> {
        spans.iter().map(|s| (s.doc_id, s.start, s.end)).collect()
    }

    fn span(start: i32, end: i32) -> Span {
        Span::new(0, start, end)
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let err = DistanceConstraint::words(3, 1).unwrap_err();
        assert!(matches!(err, TesseraError::InvalidConstraint(_)));
        assert!(DistanceConstraint::elements("", 0, 0).is_err());
    }

    #[test]
    fn test_word_predicate() {
        let c = DistanceConstraint::words(1, 2).unwrap();
        assert!(!c.within(&span(0, 1), &span(1, 2), &[]));
        assert!(c.within(&span(0, 1), &span(2, 3), &[]));
        assert!(c.within(&span(0, 1), &span(3, 4), &[]));
        assert!(!c.within(&span(0, 1), &span(4, 5), &[]));
        // Wrong order.
        assert!(!c.within(&span(3, 4), &span(0, 1), &[]));
    }

    #[test]
    fn test_unordered_is_symmetric_and_excluded_inverts() {
        let pairs = [
            (span(0, 1), span(2, 3)),
            (span(5, 6), span(1, 2)),
            (span(0, 2), span(1, 3)),
            (span(0, 1), span(9, 10)),
        ];
        for (min, max) in [(0, 0), (0, 3), (1, 1), (2, 8)] {
            let plain = DistanceConstraint::words(min, max).unwrap().unordered();
            let excluded = plain.clone().excluded();
            for (a, b) in &pairs {
                assert_eq!(plain.accepts(a, b, &[]), plain.accepts(b, a, &[]));
                assert_eq!(plain.accepts(a, b, &[]), !excluded.accepts(a, b, &[]));
            }
        }
    }

    #[test]
    fn test_element_predicate() {
        let sentences = vec![span(0, 3), span(3, 5), span(5, 9)];
        let same = DistanceConstraint::elements(SENTENCE_ELEMENT, 0, 0).unwrap();
        let next = DistanceConstraint::elements(SENTENCE_ELEMENT, 1, 1).unwrap();

        assert!(same.within(&span(0, 1), &span(2, 3), &sentences));
        assert!(!same.within(&span(0, 1), &span(3, 4), &sentences));
        assert!(next.within(&span(0, 1), &span(3, 4), &sentences));
        assert!(!next.within(&span(0, 1), &span(6, 7), &sentences));
        // Outside of any element.
        assert!(!same.within(&span(9, 10), &span(10, 11), &sentences));
    }

    #[test]
    fn test_distance_spans() {
        let segment = segment_of(&[
            &["s:a", "s:x", "s:b", "s:a", "s:b"],
            &["s:a", "s:x", "s:x", "s:x", "s:b"],
        ]);
        let mut spans = DistanceSpans::new(
            &segment,
            Box::new(TermSpans::new(&segment, "s:a")),
            Box::new(TermSpans::new(&segment, "s:b")),
            DistanceConstraint::words(0, 1).unwrap(),
        );
        let matches = collect_all(&mut spans).unwrap();
        assert_eq!(keys(&matches), vec![(0, 0, 3), (0, 3, 5)]);
    }

    #[test]
    fn test_excluded_distance_keeps_lonely_first_spans() {
        let segment = segment_of(&[
            &["s:a", "s:b", "s:x", "s:x", "s:a"],
            &["s:a", "s:x"],
            &["s:x", "s:b"],
        ]);
        let mut spans = DistanceSpans::new(
            &segment,
            Box::new(TermSpans::new(&segment, "s:a")),
            Box::new(TermSpans::new(&segment, "s:b")),
            DistanceConstraint::words(0, 1).unwrap().unordered().excluded(),
        );
        let matches = collect_all(&mut spans).unwrap();
        assert_eq!(keys(&matches), vec![(0, 4, 5), (1, 0, 1)]);
    }

    #[test]
    fn test_same_sentence() {
        let mut first = doc(&["s:a", "s:x", "s:b", "s:a", "s:b"]);
        first.add_element(SENTENCE_ELEMENT, 0, 3);
        first.add_element(SENTENCE_ELEMENT, 3, 4);
        first.add_element(SENTENCE_ELEMENT, 4, 5);
        let segment = segment(vec![first]);

        let mut spans = MultiDistanceSpans::new(
            &segment,
            Box::new(TermSpans::new(&segment, "s:a")),
            Box::new(TermSpans::new(&segment, "s:b")),
            vec![DistanceConstraint::elements(SENTENCE_ELEMENT, 0, 0).unwrap()],
        );
        let matches = collect_all(&mut spans).unwrap();
        assert_eq!(keys(&matches), vec![(0, 0, 3)]);
    }

    #[test]
    fn test_multi_distance_conjunction_is_order_independent() {
        let mut first = doc(&["s:a", "s:x", "s:b", "s:x", "s:x", "s:b", "s:a", "s:b"]);
        first.add_element(SENTENCE_ELEMENT, 0, 4);
        first.add_element(SENTENCE_ELEMENT, 4, 8);
        let segment = segment(vec![first]);

        let constraints = vec![
            DistanceConstraint::words(0, 3).unwrap(),
            DistanceConstraint::elements(SENTENCE_ELEMENT, 0, 0).unwrap(),
        ];
        let run = |constraints: Vec<DistanceConstraint>| {
            let mut spans = MultiDistanceSpans::new(
                &segment,
                Box::new(TermSpans::new(&segment, "s:a")),
                Box::new(TermSpans::new(&segment, "s:b")),
                constraints,
            );
            keys(&collect_all(&mut spans).unwrap())
        };

        let forward = run(constraints.clone());
        let backward = run(constraints.into_iter().rev().collect());
        assert_eq!(forward, vec![(0, 0, 3), (0, 6, 8)]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_multi_distance_with_excluded_constraint() {
        let segment = segment_of(&[&["s:a", "s:b", "s:x", "s:b"]]);
        let mut spans = MultiDistanceSpans::new(
            &segment,
            Box::new(TermSpans::new(&segment, "s:a")),
            Box::new(TermSpans::new(&segment, "s:b")),
            vec![
                DistanceConstraint::words(0, 5).unwrap(),
                DistanceConstraint::words(0, 0).unwrap().excluded(),
            ],
        );
        let matches = collect_all(&mut spans).unwrap();
        assert_eq!(keys(&matches), vec![(0, 0, 4)]);
    }
}

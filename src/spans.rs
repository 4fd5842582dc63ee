//! Positional span iterators.
//!
//! Every node of a span query evaluates to a [`Spans`] iterator over one
//! segment. Iteration is two-level: documents in strictly increasing order,
//! and within the current document, spans ordered by `(start, end)`.
//!
//! ```text
//! while spans.next_doc()? {
//!     while spans.next_start_position()? {
//!         // spans.start(), spans.end(), spans.class_marks()
//!     }
//! }
//! ```
//!
//! Right after landing on a document `start()` and `end()` are `-1`; once
//! the document is exhausted they are [`NO_MORE_POSITIONS`].
//!
//! Leaves are [`TermSpans`]. Combinators that need to look at the full
//! set of operand spans of a document are built on [`BufferedSpans`], which
//! drives a per-document [`DocMatcher`].

use std::collections::BTreeMap;

use crate::error::Result;
use crate::index::DocId;

pub mod buffered;
pub mod class;
pub mod distance;
pub mod negation;
pub mod next;
pub mod query;
pub mod segment;
pub mod subspan;
pub mod term;

pub use buffered::{BufferedSpans, DocMatcher};
pub use class::ClassSpans;
pub use distance::{
    DistanceConstraint, DistanceSpans, DistanceUnit, MultiDistanceSpans,
};
pub use negation::{NegationMode, NegationSpans};
pub use next::NextSpans;
pub use query::SpanQuery;
pub use segment::SegmentSpans;
pub use subspan::SubspanSpans;
pub use term::TermSpans;

/// Position reported once a document has no further spans.
pub const NO_MORE_POSITIONS: i32 = i32::MAX;

/// Position reported before the first span of a document.
pub const UNPOSITIONED: i32 = -1;

/// Highlight class number.
pub type ClassId = u8;

/// Class marks of a span: class number to marked `(start, end)`.
pub type ClassMarks = BTreeMap<ClassId, (i32, i32)>;

/// Document cursor of a [`Spans`].
///
/// Ordered so that `Unpositioned < Doc(_) < End`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CurrentDoc {
    Unpositioned,
    Doc(DocId),
    End,
}

impl CurrentDoc {
    pub fn doc(self) -> Option<DocId> {
        match self {
            CurrentDoc::Doc(doc) => Some(doc),
            _ => None,
        }
    }
}

/// A single match.
///
/// Field order gives the iteration order: by document, start, end, then
/// class marks and payload as tie breakers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub doc_id: DocId,
    pub start: i32,
    pub end: i32,
    pub class_marks: ClassMarks,
    pub payload: Option<u32>,
}

impl Span {
    pub fn new(doc_id: DocId, start: i32, end: i32) -> Self {
        Span {
            doc_id,
            start,
            end,
            class_marks: ClassMarks::new(),
            payload: None,
        }
    }

    pub fn with_class(mut self, class: ClassId, start: i32, end: i32) -> Self {
        self.class_marks.insert(class, (start, end));
        self
    }

    pub fn with_payload(mut self, payload: Option<u32>) -> Self {
        self.payload = payload;
        self
    }

    pub fn len(&self) -> i32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// The smallest span covering `self` and `other`, with both sets of
    /// class marks. `other` must be in the same document.
    pub fn union(&self, other: &Span) -> Span {
        let mut class_marks = self.class_marks.clone();
        merge_class_marks(&mut class_marks, &other.class_marks);
        Span {
            doc_id: self.doc_id,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            class_marks,
            payload: self.payload.or(other.payload),
        }
    }
}

/// Merge `from` into `into`. A class present on both sides covers both
/// ranges.
pub fn merge_class_marks(into: &mut ClassMarks, from: &ClassMarks) {
    for (&class, &(start, end)) in from {
        into.entry(class)
            .and_modify(|range| {
                range.0 = range.0.min(start);
                range.1 = range.1.max(end);
            })
            .or_insert((start, end));
    }
}

/// Iterator over the spans of one segment.
pub trait Spans {
    fn current_doc(&self) -> CurrentDoc;

    /// Advance to the next document holding at least one span.
    fn next_doc(&mut self) -> Result<bool>;

    /// Advance to the first document `>= target`.
    ///
    /// A target at or before the current document leaves the iterator where
    /// it is and reports whether it is still on a document.
    fn skip_to(&mut self, target: DocId) -> Result<bool>;

    /// Advance to the next span of the current document.
    fn next_start_position(&mut self) -> Result<bool>;

    fn start(&self) -> i32;

    fn end(&self) -> i32;

    fn class_marks(&self) -> &ClassMarks;

    fn payload(&self) -> Option<u32>;

    /// Rough number of documents this iterator may visit.
    fn cost(&self) -> u64;

    /// The current span, if positioned on one.
    fn span(&self) -> Option<Span> {
        let doc_id = self.current_doc().doc()?;
        let (start, end) = (self.start(), self.end());
        if start == UNPOSITIONED || start == NO_MORE_POSITIONS {
            return None;
        }
        Some(Span {
            doc_id,
            start,
            end,
            class_marks: self.class_marks().clone(),
            payload: self.payload(),
        })
    }
}

/// `skip_to` for iterators that can only step one document at a time.
pub(crate) fn skip_by_stepping<S: Spans + ?Sized>(spans: &mut S, target: DocId) -> Result<bool> {
    loop {
        match spans.current_doc() {
            CurrentDoc::End => return Ok(false),
            CurrentDoc::Doc(doc) if doc >= target => return Ok(true),
            _ => {
                if !spans.next_doc()? {
                    return Ok(false);
                }
            }
        }
    }
}

/// Collect the remaining spans of the current document.
pub fn drain_document(spans: &mut dyn Spans, out: &mut Vec<Span>) -> Result<()> {
    while spans.next_start_position()? {
        if let Some(span) = spans.span() {
            out.push(span);
        }
    }
    Ok(())
}

/// Collect every span of every document.
pub fn collect_all(spans: &mut dyn Spans) -> Result<Vec<Span>> {
    let mut out = Vec::new();
    while spans.next_doc()? {
        drain_document(spans, &mut out)?;
    }
    Ok(out)
}

/// Spans that match nothing.
#[derive(Debug, Default)]
pub struct EmptySpans {
    exhausted: bool,
    marks: ClassMarks,
}

impl EmptySpans {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Spans for EmptySpans {
    fn current_doc(&self) -> CurrentDoc {
        if self.exhausted {
            CurrentDoc::End
        } else {
            CurrentDoc::Unpositioned
        }
    }

    fn next_doc(&mut self) -> Result<bool> {
        self.exhausted = true;
        Ok(false)
    }

    fn skip_to(&mut self, _target: DocId) -> Result<bool> {
        self.exhausted = true;
        Ok(false)
    }

    fn next_start_position(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn start(&self) -> i32 {
        NO_MORE_POSITIONS
    }

    fn end(&self) -> i32 {
        NO_MORE_POSITIONS
    }

    fn class_marks(&self) -> &ClassMarks {
        &self.marks
    }

    fn payload(&self) -> Option<u32> {
        None
    }

    fn cost(&self) -> u64 {
        0
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::index::document::AnnotatedDocument;
    use crate::index::segment::{Segment, SegmentCore};

    /// A document with one token per entry; `"s:b|s:c"` puts two terms on
    /// one position. The text is the first term of each token without its
    /// prefix, space separated.
    pub(crate) fn doc(tokens: &[&str]) -> AnnotatedDocument {
        let mut doc = AnnotatedDocument::default();
        let mut text = String::new();
        for token in tokens {
            let terms: Vec<&str> = token.split('|').collect();
            let surface = terms[0].split_once(':').map_or(terms[0], |(_, v)| v);
            if !text.is_empty() {
                text.push(' ');
            }
            let start = text.chars().count() as u32;
            text.push_str(surface);
            let end = text.chars().count() as u32;
            doc.add_token(start, end, terms);
        }
        doc.text = text;
        doc
    }

    pub(crate) fn segment(docs: Vec<AnnotatedDocument>) -> Segment {
        Segment::from_core("_0".to_string(), SegmentCore::build(docs).unwrap())
    }

    pub(crate) fn segment_of(docs: &[&[&str]]) -> Segment {
        segment(docs.iter().map(|tokens| doc(tokens)).collect())
    }
}

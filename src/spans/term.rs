//! Leaf spans over the postings of a single term.

use crate::error::Result;
use crate::index::posting::{PositionEntry, PostingCursor};
use crate::index::{DocId, PositionSource};
use crate::spans::{ClassMarks, CurrentDoc, NO_MORE_POSITIONS, Spans, UNPOSITIONED};

/// Spans of one term (token annotation, element or page break).
///
/// Deleted documents are skipped here, so no combinator ever sees them.
pub struct TermSpans<'a> {
    term: String,
    source: &'a dyn PositionSource,
    cursor: PostingCursor<'a>,
    doc: CurrentDoc,
    positions: &'a [PositionEntry],
    index: Option<usize>,
    marks: ClassMarks,
}

impl<'a> TermSpans<'a> {
    pub fn new(source: &'a dyn PositionSource, term: &str) -> Self {
        TermSpans {
            term: term.to_string(),
            source,
            cursor: source.postings(term),
            doc: CurrentDoc::Unpositioned,
            positions: &[],
            index: None,
            marks: ClassMarks::new(),
        }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    fn current(&self) -> Option<&PositionEntry> {
        self.index.and_then(|i| self.positions.get(i))
    }

    /// Settle on the cursor's document or the next live one after it.
    fn settle(&mut self, mut found: Option<DocId>) -> bool {
        while let Some(doc) = found {
            if !self.source.is_deleted(doc) {
                self.doc = CurrentDoc::Doc(doc);
                self.positions = self.cursor.positions();
                self.index = None;
                return true;
            }
            found = self.cursor.advance();
        }
        self.doc = CurrentDoc::End;
        self.positions = &[];
        self.index = None;
        false
    }
}

impl Spans for TermSpans<'_> {
    fn current_doc(&self) -> CurrentDoc {
        self.doc
    }

    fn next_doc(&mut self) -> Result<bool> {
        if self.doc == CurrentDoc::End {
            return Ok(false);
        }
        let found = self.cursor.advance();
        Ok(self.settle(found))
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        match self.doc {
            CurrentDoc::End => return Ok(false),
            CurrentDoc::Doc(doc) if doc >= target => return Ok(true),
            _ => {}
        }
        let found = self.cursor.skip_to(target);
        Ok(self.settle(found))
    }

    fn next_start_position(&mut self) -> Result<bool> {
        if self.doc.doc().is_none() {
            return Ok(false);
        }
        let next = self.index.map_or(0, |i| i.saturating_add(1));
        self.index = Some(next.min(self.positions.len()));
        Ok(next < self.positions.len())
    }

    fn start(&self) -> i32 {
        match (self.index, self.current()) {
            (None, _) => UNPOSITIONED,
            (Some(_), Some(entry)) => entry.start as i32,
            (Some(_), None) => NO_MORE_POSITIONS,
        }
    }

    fn end(&self) -> i32 {
        match (self.index, self.current()) {
            (None, _) => UNPOSITIONED,
            (Some(_), Some(entry)) => entry.end as i32,
            (Some(_), None) => NO_MORE_POSITIONS,
        }
    }

    fn class_marks(&self) -> &ClassMarks {
        &self.marks
    }

    fn payload(&self) -> Option<u32> {
        self.current().and_then(|entry| entry.payload)
    }

    fn cost(&self) -> u64 {
        self.cursor.cost()
    }
}

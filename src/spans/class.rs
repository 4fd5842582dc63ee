//! Class marking for highlights.

use crate::error::Result;
use crate::index::DocId;
use crate::spans::{ClassId, ClassMarks, CurrentDoc, Spans};

/// Passes the operand through, marking each span with `class`.
///
/// The mark records the operand's own `(start, end)`, so it survives when
/// an enclosing combinator widens the span.
pub struct ClassSpans<'a> {
    inner: Box<dyn Spans + 'a>,
    class: ClassId,
    marks: ClassMarks,
}

impl<'a> ClassSpans<'a> {
    pub fn new(inner: Box<dyn Spans + 'a>, class: ClassId) -> Self {
        ClassSpans {
            inner,
            class,
            marks: ClassMarks::new(),
        }
    }

    pub fn class(&self) -> ClassId {
        self.class
    }
}

impl Spans for ClassSpans<'_> {
    fn current_doc(&self) -> CurrentDoc {
        self.inner.current_doc()
    }

    fn next_doc(&mut self) -> Result<bool> {
        self.marks.clear();
        self.inner.next_doc()
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if self.inner.current_doc().doc().is_none_or(|doc| doc < target) {
            self.marks.clear();
        }
        self.inner.skip_to(target)
    }

    fn next_start_position(&mut self) -> Result<bool> {
        let found = self.inner.next_start_position()?;
        self.marks = self.inner.class_marks().clone();
        if found {
            self.marks
                .insert(self.class, (self.inner.start(), self.inner.end()));
        }
        Ok(found)
    }

    fn start(&self) -> i32 {
        self.inner.start()
    }

    fn end(&self) -> i32 {
        self.inner.end()
    }

    fn class_marks(&self) -> &ClassMarks {
        &self.marks
    }

    fn payload(&self) -> Option<u32> {
        self.inner.payload()
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::collect_all;
    use crate::spans::fixtures::segment_of;
    use crate::spans::next::NextSpans;
    use crate::spans::term::TermSpans;

    #[test]
    fn test_marks_survive_widening() {
        let segment = segment_of(&[&["s:der", "s:Baum"]]);
        let mut spans = NextSpans::new(
            Box::new(TermSpans::new(&segment, "s:der")),
            Box::new(ClassSpans::new(Box::new(TermSpans::new(&segment, "s:Baum")), 3)),
        );
        let matches = collect_all(&mut spans).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].start, matches[0].end), (0, 2));
        assert_eq!(matches[0].class_marks.get(&3), Some(&(1, 2)));
    }

    #[test]
    fn test_nested_classes() {
        let segment = segment_of(&[&["s:a"]]);
        let inner = ClassSpans::new(Box::new(TermSpans::new(&segment, "s:a")), 1);
        let mut spans = ClassSpans::new(Box::new(inner), 2);
        let matches = collect_all(&mut spans).unwrap();
        assert_eq!(matches[0].class_marks.len(), 2);
        assert_eq!(spans.class(), 2);
    }
}

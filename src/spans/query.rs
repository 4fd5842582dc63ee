//! Serializable span query trees.
//!
//! ```
//! use tessera::spans::SpanQuery;
//!
//! let query = SpanQuery::next(SpanQuery::term("s:der"), SpanQuery::term("s:Baum").class(1));
//! let json = serde_json::to_string(&query).unwrap();
//! assert_eq!(serde_json::from_str::<SpanQuery>(&json).unwrap(), query);
//! assert_eq!(query.to_string(), "spanNext(s:der, {1: s:Baum})");
//! ```

use std::collections::BTreeSet;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::PositionSource;
use crate::index::document::SENTENCE_ELEMENT;
use crate::spans::{
    ClassId, ClassSpans, DistanceConstraint, DistanceSpans, EmptySpans, MultiDistanceSpans,
    NegationMode, NegationSpans, NextSpans, SegmentSpans, Spans, SubspanSpans, TermSpans,
};

/// A node of a span query tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpanQuery {
    /// A token annotation term such as `s:Baum` or `tt/p:NN`.
    Term { term: String },
    /// An element term such as `<>:base/s:s`.
    Element { term: String },
    Segment {
        first: Box<SpanQuery>,
        second: Box<SpanQuery>,
    },
    Next {
        first: Box<SpanQuery>,
        second: Box<SpanQuery>,
    },
    Distance {
        first: Box<SpanQuery>,
        second: Box<SpanQuery>,
        constraint: DistanceConstraint,
    },
    MultiDistance {
        first: Box<SpanQuery>,
        second: Box<SpanQuery>,
        constraints: Vec<DistanceConstraint>,
    },
    Subspan {
        query: Box<SpanQuery>,
        from: i32,
        #[serde(default)]
        length: i32,
    },
    Negation {
        query: Box<SpanQuery>,
        other: Box<SpanQuery>,
        mode: NegationMode,
    },
    Class {
        query: Box<SpanQuery>,
        class: ClassId,
    },
}

impl SpanQuery {
    pub fn term<T: Into<String>>(term: T) -> Self {
        SpanQuery::Term { term: term.into() }
    }

    pub fn element<T: Into<String>>(term: T) -> Self {
        SpanQuery::Element { term: term.into() }
    }

    pub fn sentence() -> Self {
        Self::element(SENTENCE_ELEMENT)
    }

    pub fn segment(first: SpanQuery, second: SpanQuery) -> Self {
        SpanQuery::Segment {
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    pub fn next(first: SpanQuery, second: SpanQuery) -> Self {
        SpanQuery::Next {
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    /// Sequence of two or more queries, nested left to right.
    pub fn sequence<I: IntoIterator<Item = SpanQuery>>(queries: I) -> Option<Self> {
        queries.into_iter().reduce(SpanQuery::next)
    }

    pub fn distance(first: SpanQuery, second: SpanQuery, constraint: DistanceConstraint) -> Self {
        SpanQuery::Distance {
            first: Box::new(first),
            second: Box::new(second),
            constraint,
        }
    }

    pub fn multi_distance(
        first: SpanQuery,
        second: SpanQuery,
        constraints: Vec<DistanceConstraint>,
    ) -> Self {
        SpanQuery::MultiDistance {
            first: Box::new(first),
            second: Box::new(second),
            constraints,
        }
    }

    pub fn subspan(self, from: i32, length: i32) -> Self {
        SpanQuery::Subspan {
            query: Box::new(self),
            from,
            length,
        }
    }

    /// Keep only spans where `other` occurs at the same position range.
    pub fn with(self, other: SpanQuery) -> Self {
        SpanQuery::Negation {
            query: Box::new(self),
            other: Box::new(other),
            mode: NegationMode::With,
        }
    }

    /// Drop spans where `other` occurs at the same position range.
    pub fn without(self, other: SpanQuery) -> Self {
        SpanQuery::Negation {
            query: Box::new(self),
            other: Box::new(other),
            mode: NegationMode::Without,
        }
    }

    pub fn class(self, class: ClassId) -> Self {
        SpanQuery::Class {
            query: Box::new(self),
            class,
        }
    }

    /// All term and element terms the tree reads, sorted.
    pub fn terms(&self) -> BTreeSet<&str> {
        let mut terms = BTreeSet::new();
        self.collect_terms(&mut terms);
        terms
    }

    fn collect_terms<'q>(&'q self, terms: &mut BTreeSet<&'q str>) {
        match self {
            SpanQuery::Term { term } | SpanQuery::Element { term } => {
                terms.insert(term.as_str());
            }
            SpanQuery::Segment { first, second } | SpanQuery::Next { first, second } => {
                first.collect_terms(terms);
                second.collect_terms(terms);
            }
            SpanQuery::Distance {
                first,
                second,
                constraint,
            } => {
                first.collect_terms(terms);
                second.collect_terms(terms);
                terms.extend(constraint.element_term());
            }
            SpanQuery::MultiDistance {
                first,
                second,
                constraints,
            } => {
                first.collect_terms(terms);
                second.collect_terms(terms);
                terms.extend(constraints.iter().filter_map(|c| c.element_term()));
            }
            SpanQuery::Subspan { query, .. } | SpanQuery::Class { query, .. } => {
                query.collect_terms(terms);
            }
            SpanQuery::Negation { query, other, .. } => {
                query.collect_terms(terms);
                other.collect_terms(terms);
            }
        }
    }

    /// Build the iterator tree of this query over one segment.
    ///
    /// A distance constraint with `min > max` makes its node match nothing.
    pub fn spans<'a>(&self, source: &'a dyn PositionSource) -> Result<Box<dyn Spans + 'a>> {
        let spans: Box<dyn Spans + 'a> = match self {
            SpanQuery::Term { term } | SpanQuery::Element { term } => {
                Box::new(TermSpans::new(source, term))
            }
            SpanQuery::Segment { first, second } => {
                Box::new(SegmentSpans::new(first.spans(source)?, second.spans(source)?))
            }
            SpanQuery::Next { first, second } => {
                Box::new(NextSpans::new(first.spans(source)?, second.spans(source)?))
            }
            SpanQuery::Distance {
                first,
                second,
                constraint,
            } => match constraint.validate() {
                Ok(()) => Box::new(DistanceSpans::new(
                    source,
                    first.spans(source)?,
                    second.spans(source)?,
                    constraint.clone(),
                )),
                Err(e) => {
                    warn!("Distance query matches nothing: {e}");
                    Box::new(EmptySpans::new())
                }
            },
            SpanQuery::MultiDistance {
                first,
                second,
                constraints,
            } => match constraints.iter().try_for_each(DistanceConstraint::validate) {
                Ok(()) => Box::new(MultiDistanceSpans::new(
                    source,
                    first.spans(source)?,
                    second.spans(source)?,
                    constraints.clone(),
                )),
                Err(e) => {
                    warn!("Distance query matches nothing: {e}");
                    Box::new(EmptySpans::new())
                }
            },
            SpanQuery::Subspan {
                query,
                from,
                length,
            } => Box::new(SubspanSpans::new(query.spans(source)?, *from, *length)),
            SpanQuery::Negation { query, other, mode } => Box::new(NegationSpans::new(
                query.spans(source)?,
                other.spans(source)?,
                *mode,
            )),
            SpanQuery::Class { query, class } => {
                Box::new(ClassSpans::new(query.spans(source)?, *class))
            }
        };
        Ok(spans)
    }
}

impl fmt::Display for SpanQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanQuery::Term { term } | SpanQuery::Element { term } => write!(f, "{term}"),
            SpanQuery::Segment { first, second } => write!(f, "spanSegment({first}, {second})"),
            SpanQuery::Next { first, second } => write!(f, "spanNext({first}, {second})"),
            SpanQuery::Distance {
                first,
                second,
                constraint,
            } => write!(f, "spanDistance({first}, {second}, [{constraint}])"),
            SpanQuery::MultiDistance {
                first,
                second,
                constraints,
            } => {
                write!(f, "spanMultipleDistance({first}, {second}, [")?;
                for (i, constraint) in constraints.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "({constraint})")?;
                }
                write!(f, "])")
            }
            SpanQuery::Subspan {
                query,
                from,
                length,
            } => write!(f, "subspan({query}, {from}, {length})"),
            SpanQuery::Negation { query, other, mode } => match mode {
                NegationMode::With => write!(f, "spanWith({query}, {other})"),
                NegationMode::Without => write!(f, "spanWithout({query}, {other})"),
            },
            SpanQuery::Class { query, class } => write!(f, "{{{class}: {query}}}"),
        }
    }
}

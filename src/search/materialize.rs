//! Turning raw spans into presentable matches.
//!
//! Materializing a span happens in two passes over the hits of a leaf:
//! [`MatchMaterializer::prepare`] registers every token position a match is
//! going to need with the leaf's [`PositionToOffset`], and
//! [`MatchMaterializer::materialize`] builds the [`Match`] once all of them
//! can be resolved in one go.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::index::document::AnnotatedDocument;
use crate::index::{DocId, PositionSource, Segment};
use crate::search::config::{ContextSize, MatchConfig};
use crate::search::highlight::{Markup, Rendered};
use crate::search::leaf::LeafContext;
use crate::search::offsets::PositionToOffset;
use crate::spans::{ClassId, ClassMarks, Span};

lazy_static! {
    static ref MATCH_ID: Regex = Regex::new(
        r"^match-(?P<uid>.+?)-p(?P<start>\d+)-(?P<end>\d+)(?P<classes>(?:\(\d+\)\d+-\d+)*)$"
    )
    .expect("valid match identifier pattern");
    static ref MATCH_ID_CLASS: Regex =
        Regex::new(r"\((\d+)\)(\d+)-(\d+)").expect("valid class pattern");
}

/// Identifier of a match: document uid, position range and class marks.
///
/// Rendered as `match-{uid}-p{start}-{end}` followed by `({class}){start}-{end}`
/// for every class mark. End positions are exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchId {
    pub uid: String,
    pub start: u32,
    pub end: u32,
    pub classes: Vec<(ClassId, u32, u32)>,
}

impl MatchId {
    pub fn new<S: Into<String>>(uid: S, start: u32, end: u32) -> Self {
        MatchId {
            uid: uid.into(),
            start,
            end,
            classes: Vec::new(),
        }
    }

    pub fn from_span<S: Into<String>>(uid: S, span: &Span) -> Self {
        MatchId {
            uid: uid.into(),
            start: span.start.max(0) as u32,
            end: span.end.max(0) as u32,
            classes: span
                .class_marks
                .iter()
                .map(|(&class, &(s, e))| (class, s.max(0) as u32, e.max(0) as u32))
                .collect(),
        }
    }

    /// The span this identifier points at inside `doc`.
    pub fn to_span(&self, doc: DocId) -> Span {
        let mut span = Span::new(doc, self.start as i32, self.end as i32);
        for &(class, start, end) in &self.classes {
            span.class_marks.insert(class, (start as i32, end as i32));
        }
        span
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match-{}-p{}-{}", self.uid, self.start, self.end)?;
        for (class, start, end) in &self.classes {
            write!(f, "({class}){start}-{end}")?;
        }
        Ok(())
    }
}

impl FromStr for MatchId {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TesseraError::invalid_match_id(s);
        let caps = MATCH_ID.captures(s).ok_or_else(invalid)?;
        let number = |name: &str| -> Result<u32> {
            caps.name(name)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(invalid)
        };
        let (start, end) = (number("start")?, number("end")?);
        if start > end {
            return Err(invalid());
        }

        let mut classes = Vec::new();
        if let Some(marks) = caps.name("classes") {
            for mark in MATCH_ID_CLASS.captures_iter(marks.as_str()) {
                let class: ClassId = mark[1].parse().map_err(|_| invalid())?;
                let from: u32 = mark[2].parse().map_err(|_| invalid())?;
                let to: u32 = mark[3].parse().map_err(|_| invalid())?;
                classes.push((class, from, to));
            }
        }

        Ok(MatchId {
            uid: caps["uid"].to_string(),
            start,
            end,
            classes,
        })
    }
}

/// Highlighted class range inside a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSnippet {
    pub class: ClassId,
    pub start_pos: u32,
    pub end_pos: u32,
    pub start_offset: i32,
    pub end_offset: i32,
    pub text: String,
}

/// Terms of the requested layers at one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub position: u32,
    pub terms: Vec<String>,
}

/// A materialized match.
///
/// Positions and offsets describe the visible part of the match; the cut
/// flags tell whether the match continues beyond it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    pub doc_id: DocId,
    pub uid: String,
    pub leaf_ordinal: usize,
    pub start_pos: u32,
    pub end_pos: u32,
    pub start_offset: i32,
    pub end_offset: i32,
    pub start_cutted: bool,
    pub end_cutted: bool,
    pub start_more: bool,
    pub end_more: bool,
    pub class_snippets: Vec<ClassSnippet>,
    pub annotations: Vec<Annotation>,
    pub page_at_start: Option<u32>,
    pub page_at_end: Option<u32>,
    pub snippet_brackets: String,
    pub snippet_html: String,
}

impl Match {
    pub fn id(&self) -> Result<MatchId> {
        self.match_id.parse()
    }
}

/// Token window of a match after sentence extension and truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: u32,
    end: u32,
    start_cutted: bool,
    end_cutted: bool,
}

/// Builds [`Match`]es for one [`MatchConfig`].
#[derive(Debug, Clone, Copy)]
pub struct MatchMaterializer<'c> {
    config: &'c MatchConfig,
}

impl<'c> MatchMaterializer<'c> {
    pub fn new(config: &'c MatchConfig) -> Self {
        MatchMaterializer { config }
    }

    /// Register every position `materialize` will look up for `span`.
    pub fn prepare(&self, leaf: &mut LeafContext, span: &Span) -> Result<()> {
        let (segment, offsets) = leaf.parts();
        let doc = segment.document(span.doc_id)?;
        let window = self.window(doc, span);
        let token_count = doc.token_count();
        let mut add = |position: u32| {
            if position < token_count {
                offsets.add(span.doc_id, position);
            }
        };

        add(window.start);
        add(window.end.saturating_sub(1));
        if let ContextSize::Token(n) = self.config.context.left {
            add(window.start.saturating_sub(n));
        }
        if let ContextSize::Token(n) = self.config.context.right {
            add(window.end.saturating_add(n).min(token_count).saturating_sub(1));
        }
        for (_, start, end) in visible_marks(&span.class_marks, window) {
            add(start);
            add(end - 1);
        }
        for page_break in &doc.page_breaks {
            add(page_break.position);
        }
        if !self.config.layers.is_empty() {
            (window.start..window.end).for_each(add);
        }
        Ok(())
    }

    /// Build the match for `span`; call after `prepare`.
    pub fn materialize(&self, leaf: &mut LeafContext, span: &Span) -> Result<Match> {
        let ordinal = leaf.ordinal();
        let (segment, offsets) = leaf.parts();
        let doc = segment.document(span.doc_id)?;
        let window = self.window(doc, span);
        let token_count = doc.token_count();
        let char_len = doc.char_len();
        let d = span.doc_id;

        // Character ranges of the match and its context.
        let (match_start, match_end) = if window.end > window.start {
            (
                clamp(offsets.start(d, window.start)?),
                clamp(offsets.end(d, window.end - 1)?),
            )
        } else {
            let at = boundary(offsets, d, window.start, token_count, char_len)?;
            (at, at)
        };
        let (left, start_more) = match self.config.context.left {
            ContextSize::Token(n) => {
                let first = window.start.saturating_sub(n);
                let left = if first < window.start {
                    clamp(offsets.start(d, first)?)
                } else {
                    match_start
                };
                (left, first > 0)
            }
            ContextSize::Char(n) => {
                let left = match_start.saturating_sub(n);
                (left, left > 0)
            }
        };
        let (right, end_more) = match self.config.context.right {
            ContextSize::Token(n) => {
                let last = window.end.saturating_add(n).min(token_count);
                let right = if last > window.end {
                    clamp(offsets.end(d, last - 1)?)
                } else {
                    match_end
                };
                (right, last < token_count)
            }
            ContextSize::Char(n) => {
                let right = match_end.saturating_add(n).min(char_len);
                (right, right < char_len)
            }
        };

        let mut left_markup = Markup::new();
        let mut match_markup = Markup::new();
        let mut right_markup = Markup::new();

        let mut class_snippets = Vec::new();
        for (class, start, end) in visible_marks(&span.class_marks, window) {
            let start_offset = offsets.start(d, start)?;
            let end_offset = offsets.end(d, end - 1)?;
            match_markup.highlight(class, clamp(start_offset), clamp(end_offset));
            class_snippets.push(ClassSnippet {
                class,
                start_pos: start,
                end_pos: end,
                start_offset,
                end_offset,
                text: doc
                    .text_between(clamp(start_offset), clamp(end_offset))
                    .to_string(),
            });
        }

        let mut annotations = Vec::new();
        if !self.config.layers.is_empty() {
            for position in window.start..window.end {
                let terms = self.layer_terms(doc, position);
                if terms.is_empty() {
                    continue;
                }
                let (start, end) = offsets.get(d, position)?;
                match_markup.title(clamp(start), clamp(end), terms.join(" "));
                annotations.push(Annotation { position, terms });
            }
        }

        for page_break in &doc.page_breaks {
            let at = boundary(offsets, d, page_break.position, token_count, char_len)?;
            if at >= left && at <= match_start {
                left_markup.page_break(at, page_break.page);
            } else if at > match_start && at < match_end {
                match_markup.page_break(at, page_break.page);
            } else if at >= match_end && at <= right {
                right_markup.page_break(at, page_break.page);
            }
        }

        if window.start_cutted {
            match_markup.cut(match_start);
        }
        if window.end_cutted {
            match_markup.cut(match_end);
        }

        let chars: Vec<char> = doc.text.chars().collect();
        let snippet = render_snippet(
            left_markup.render(&chars, left, match_start),
            match_markup.render(&chars, match_start, match_end),
            right_markup.render(&chars, match_end, right),
            start_more,
            end_more,
        );

        let uid = uid_of(doc, segment, span.doc_id, &self.config.uid_field);
        let match_id = MatchId::from_span(uid.clone(), span).to_string();
        let last = window.end.saturating_sub(1).max(window.start);

        Ok(Match {
            match_id,
            doc_id: span.doc_id,
            uid,
            leaf_ordinal: ordinal,
            start_pos: window.start,
            end_pos: window.end,
            start_offset: match_start as i32,
            end_offset: match_end as i32,
            start_cutted: window.start_cutted,
            end_cutted: window.end_cutted,
            start_more,
            end_more,
            class_snippets,
            annotations,
            page_at_start: offsets.page_at(d, window.start)?,
            page_at_end: offsets.page_at(d, last)?,
            snippet_brackets: snippet.brackets,
            snippet_html: snippet.html,
        })
    }

    /// Sentence extension followed by truncation to `max_match_tokens`.
    fn window(&self, doc: &AnnotatedDocument, span: &Span) -> Window {
        let token_count = doc.token_count();
        let start = (span.start.max(0) as u32).min(token_count);
        let end = (span.end.max(0) as u32).clamp(start, token_count);

        let (from, to) = if self.config.extend_to_sentence {
            self.sentence_bounds(doc, start, end)
        } else {
            (start, end)
        };

        let max = self.config.max_match_tokens;
        if max == 0 || to - from <= max {
            return Window {
                start: from,
                end: to,
                start_cutted: false,
                end_cutted: false,
            };
        }
        // Anchor at the original start, shifted left only as far as needed to
        // fill the window.
        let window_start = start.min(to - max).max(from);
        let window_end = window_start + max;
        Window {
            start: window_start,
            end: window_end,
            start_cutted: window_start > from,
            end_cutted: window_end < to,
        }
    }

    fn sentence_bounds(&self, doc: &AnnotatedDocument, start: u32, end: u32) -> (u32, u32) {
        let element = &self.config.sentence_element;
        let containing = |position: u32| {
            doc.elements
                .iter()
                .filter(|e| &e.term == element && e.start <= position && position < e.end)
                .min_by_key(|e| (e.start, e.end))
        };
        let from = containing(start).map_or(start, |e| e.start.min(start));
        let last = end.saturating_sub(1).max(start);
        let to = containing(last).map_or(end, |e| e.end.max(end));
        (from, to)
    }

    fn layer_terms(&self, doc: &AnnotatedDocument, position: u32) -> Vec<String> {
        let mut terms: Vec<String> = doc
            .terms_at(position)
            .iter()
            .filter(|term| {
                self.config.layers.iter().any(|layer| {
                    term.strip_prefix(layer.as_str())
                        .is_some_and(|rest| rest.starts_with(':'))
                })
            })
            .cloned()
            .collect();
        terms.sort();
        terms
    }
}

/// Class marks clipped to the window, dropping those left empty.
fn visible_marks(marks: &ClassMarks, window: Window) -> impl Iterator<Item = (ClassId, u32, u32)> + '_ {
    marks.iter().filter_map(move |(&class, &(start, end))| {
        let start = (start.max(0) as u32).max(window.start);
        let end = (end.max(0) as u32).min(window.end);
        (start < end).then_some((class, start, end))
    })
}

fn clamp(offset: i32) -> u32 {
    offset.max(0) as u32
}

/// Character offset of the boundary before `position`.
fn boundary(
    offsets: &mut PositionToOffset,
    doc: DocId,
    position: u32,
    token_count: u32,
    char_len: u32,
) -> Result<u32> {
    if position < token_count {
        Ok(clamp(offsets.start(doc, position)?))
    } else {
        Ok(char_len)
    }
}

fn uid_of(doc: &AnnotatedDocument, segment: &Segment, doc_id: DocId, field: &str) -> String {
    doc.field(field)
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("{}.{}", segment.name(), doc_id))
}

fn render_snippet(
    left: Rendered,
    matched: Rendered,
    right: Rendered,
    start_more: bool,
    end_more: bool,
) -> Rendered {
    let mut out = Rendered::default();
    out.html.push_str("<span class=\"context-left\">");
    if start_more {
        out.push("...", "<span class=\"more\"></span>");
    }
    out.append(left);
    out.push("[[", "</span><span class=\"match\"><mark>");
    out.append(matched);
    out.push("]]", "</mark></span><span class=\"context-right\">");
    out.append(right);
    if end_more {
        out.push("...", "<span class=\"more\"></span>");
    }
    out.html.push_str("</span>");
    out
}

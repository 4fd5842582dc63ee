//! Annotated document model.
//!
//! A document is a primary text plus a token stream. Each token knows its
//! character offsets in the text and carries every annotation term indexed at
//! its position (`s:Baum`, `i:baum`, `tt/p:NN`, ...). Structural annotations
//! spanning several tokens are [`ElementAnnotation`]s, and page breaks are
//! positioned markers carrying the page number they open.
//!
//! Offsets count Unicode scalar values, not bytes.

use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Result, TesseraError};

/// Element term of sentence spans.
pub const SENTENCE_ELEMENT: &str = "<>:base/s:s";

/// Term under which page breaks are indexed; the payload is the page number.
pub const PAGE_BREAK_TERM: &str = "~:base/s:pb";

/// A metadata field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl FieldValue {
    /// Whether this value equals a value given in textual form.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            FieldValue::Text(text) => text == value,
            FieldValue::Integer(number) => value.trim().parse::<i64>() == Ok(*number),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(number) => write!(f, "{number}"),
            FieldValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

/// One token position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub start_offset: u32,
    pub end_offset: u32,
    #[serde(default)]
    pub terms: Vec<String>,
}

/// A structural annotation covering the token range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAnnotation {
    pub term: String,
    pub start: u32,
    pub end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<u32>,
}

/// Page `page` begins at token `position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBreak {
    pub position: u32,
    pub page: u32,
}

/// A document as it is ingested and stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub elements: Vec<ElementAnnotation>,
    #[serde(default)]
    pub page_breaks: Vec<PageBreak>,
}

impl AnnotatedDocument {
    /// Create an empty document over `text`.
    pub fn new<S: Into<String>>(text: S) -> Self {
        AnnotatedDocument {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Tokenize plain text into words and sentences.
    ///
    /// Every word gets a surface term `s:` and a lower-cased term `i:`; every
    /// sentence holding at least one word becomes a [`SENTENCE_ELEMENT`].
    pub fn from_text<S: Into<String>>(text: S) -> Self {
        let mut doc = AnnotatedDocument::new(text);
        let text = doc.text.clone();

        let char_starts: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        let char_index = |byte: usize| char_starts.partition_point(|&b| b < byte) as u32;

        let mut token_bytes = Vec::new();
        for (byte, word) in text.unicode_word_indices() {
            let start = char_index(byte);
            let end = char_index(byte + word.len());
            doc.add_token(
                start,
                end,
                [format!("s:{word}"), format!("i:{}", word.to_lowercase())],
            );
            token_bytes.push(byte);
        }

        for (byte, sentence) in text.split_sentence_bound_indices() {
            let first = token_bytes.partition_point(|&b| b < byte);
            let last = token_bytes.partition_point(|&b| b < byte + sentence.len());
            if first < last {
                doc.add_element(SENTENCE_ELEMENT, first as u32, last as u32);
            }
        }

        doc
    }

    /// Run [`AnnotatedDocument::from_text`] over the text of a document that
    /// arrived without tokens, keeping its fields.
    pub fn tokenize_if_empty(self) -> Self {
        if !self.tokens.is_empty() || self.text.is_empty() {
            return self;
        }
        let mut tokenized = AnnotatedDocument::from_text(self.text);
        tokenized.fields = self.fields;
        tokenized.page_breaks = self.page_breaks;
        tokenized.elements.extend(self.elements);
        tokenized
    }

    /// Builder-style field setter.
    pub fn with_field<K: Into<String>, V: Into<FieldValue>>(mut self, name: K, value: V) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set_text_field<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        self.fields
            .insert(name.into(), FieldValue::Text(value.into()));
    }

    /// Parse `raw` as an integer field.
    ///
    /// A value that does not parse is logged and ignored; the previous value
    /// of the field, if any, stays in place.
    pub fn set_numeric_field<K: Into<String>>(&mut self, name: K, raw: &str) -> bool {
        let name = name.into();
        match raw.trim().parse::<i64>() {
            Ok(number) => {
                self.fields.insert(name, FieldValue::Integer(number));
                true
            }
            Err(e) => {
                warn!("Ignoring non-numeric value {raw:?} for field {name}: {e}");
                false
            }
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Append a token and return its position.
    pub fn add_token<I, T>(&mut self, start_offset: u32, end_offset: u32, terms: I) -> u32
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tokens.push(Token {
            start_offset,
            end_offset,
            terms: terms.into_iter().map(Into::into).collect(),
        });
        (self.tokens.len() - 1) as u32
    }

    /// Add another annotation term to an existing token.
    pub fn annotate<T: Into<String>>(&mut self, position: u32, term: T) -> Result<()> {
        let token = self.tokens.get_mut(position as usize).ok_or_else(|| {
            TesseraError::invalid_argument(format!("No token at position {position}"))
        })?;
        token.terms.push(term.into());
        Ok(())
    }

    pub fn add_element<T: Into<String>>(&mut self, term: T, start: u32, end: u32) {
        self.elements.push(ElementAnnotation {
            term: term.into(),
            start,
            end,
            payload: None,
        });
    }

    pub fn add_page_break(&mut self, position: u32, page: u32) {
        self.page_breaks.push(PageBreak { position, page });
    }

    pub fn token_count(&self) -> u32 {
        self.tokens.len() as u32
    }

    /// Length of the primary text in characters.
    pub fn char_len(&self) -> u32 {
        self.text.chars().count() as u32
    }

    /// Character offsets of the token at `position`.
    pub fn offsets(&self, position: u32) -> Option<(u32, u32)> {
        self.tokens
            .get(position as usize)
            .map(|token| (token.start_offset, token.end_offset))
    }

    /// Annotation terms at `position`, empty when out of range.
    pub fn terms_at(&self, position: u32) -> &[String] {
        self.tokens
            .get(position as usize)
            .map(|token| token.terms.as_slice())
            .unwrap_or(&[])
    }

    /// Text between two character offsets, clamped to the text.
    pub fn text_between(&self, start: u32, end: u32) -> &str {
        let start_byte = self.byte_offset(start);
        let end_byte = self.byte_offset(end.max(start));
        &self.text[start_byte..end_byte]
    }

    fn byte_offset(&self, chars: u32) -> usize {
        self.text
            .char_indices()
            .nth(chars as usize)
            .map(|(byte, _)| byte)
            .unwrap_or(self.text.len())
    }

    /// Check offsets and positions against the text and token stream.
    pub fn validate(&self) -> Result<()> {
        let char_len = self.char_len();
        let token_count = self.token_count();

        for (position, token) in self.tokens.iter().enumerate() {
            if token.start_offset > token.end_offset || token.end_offset > char_len {
                return Err(TesseraError::invalid_argument(format!(
                    "Token {position} has offsets {}..{} outside a text of {char_len} characters",
                    token.start_offset, token.end_offset
                )));
            }
        }

        for element in &self.elements {
            if element.start > element.end || element.end > token_count {
                return Err(TesseraError::invalid_argument(format!(
                    "Element {} spans {}..{} outside {token_count} tokens",
                    element.term, element.start, element.end
                )));
            }
        }

        for page_break in &self.page_breaks {
            if page_break.position > token_count {
                return Err(TesseraError::invalid_argument(format!(
                    "Page break for page {} at position {} outside {token_count} tokens",
                    page_break.page, page_break.position
                )));
            }
        }

        Ok(())
    }
}

//! # Tessera
//!
//! A positional span query engine for annotated text corpora.
//!
//! Documents are token streams in which every position carries annotation
//! terms from several layers (surface form, lemma, part of speech, ...) and
//! structural elements such as sentences span ranges of positions. Queries
//! combine term spans by co-occurrence, adjacency, word or element distance,
//! negation, subspan extraction and class marking; matches come back as
//! character-offset snippets.
//!
//! ## Modules
//!
//! - [`index`]: segmented positional index with commits, deletions and
//!   revision fingerprints
//! - [`spans`]: the span iterator protocol and its combinators
//! - [`search`]: match collection across leaves and match materialization
//! - [`storage`]: memory and file storage with checksummed binary files

pub mod cli;
pub mod error;
pub mod index;
pub mod search;
pub mod spans;
pub mod storage;
pub mod util;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

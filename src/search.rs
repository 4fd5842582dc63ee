//! Query evaluation and match presentation.
//!
//! A search call walks the leaves of one reader snapshot:
//!
//! 1. the [`SpanQuery`](crate::spans::SpanQuery) builds a span iterator tree
//!    per leaf,
//! 2. a [`MatchCollector`] counts every span and keeps the requested page of
//!    raw hits, stopping cooperatively at the deadline,
//! 3. a [`MatchMaterializer`] turns the kept hits into [`Match`]es, with
//!    offsets resolved per leaf by a [`PositionToOffset`] in one batch.
//!
//! # Example
//!
//! ```
//! use tessera::index::{AnnotatedDocument, Index};
//! use tessera::spans::SpanQuery;
//!
//! # fn main() -> tessera::error::Result<()> {
//! let index = Index::create_in_memory();
//! index.add_document(AnnotatedDocument::from_text("Der alte Baum").with_field("uid", "d1"))?;
//! index.commit()?;
//!
//! let query = SpanQuery::next(SpanQuery::term("s:alte"), SpanQuery::term("s:Baum"));
//! let result = index.searcher().search(&query, 10)?;
//! assert_eq!(result.total_results, 1);
//! assert_eq!(result.matches[0].match_id, "match-d1-p1-3");
//! assert_eq!(result.matches[0].snippet_brackets, "Der [[alte Baum]]");
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod highlight;
pub mod leaf;
pub mod materialize;
pub mod offsets;
pub mod result;
pub mod searcher;

pub use collector::{Deadline, MatchCollector, RESPONSE_TIME_EXCEEDED, RawHit, Warning};
pub use config::{ContextSize, ContextSpec, MatchConfig, SearchConfig};
pub use leaf::LeafContext;
pub use materialize::{Match, MatchId, MatchMaterializer};
pub use offsets::PositionToOffset;
pub use result::SearchResult;
pub use searcher::Searcher;

//! Search results.

use serde::{Deserialize, Serialize};

use crate::search::collector::Warning;
use crate::search::materialize::Match;

/// Outcome of one search call.
///
/// `total_results` and `total_result_docs` cover every leaf that was
/// consumed before a timeout; `matches` holds the requested page only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Display form of the query tree.
    pub query: String,
    pub matches: Vec<Match>,
    pub total_results: u64,
    pub total_result_docs: u64,
    pub start_index: usize,
    pub items_per_page: usize,
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn match_ids(&self) -> impl Iterator<Item = &str> {
        self.matches.iter().map(|m| m.match_id.as_str())
    }
}

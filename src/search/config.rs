//! Configuration for searches and match rendering.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::document::SENTENCE_ELEMENT;

/// Default upper bound on the number of tokens shown for one match.
pub const DEFAULT_MAX_MATCH_TOKENS: u32 = 50;

/// Default search timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: i64 = 120_000;

/// Size of one side of a match context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSize {
    /// Number of tokens.
    Token(u32),
    /// Number of characters.
    Char(u32),
}

/// Left and right context around a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSpec {
    pub left: ContextSize,
    pub right: ContextSize,
}

impl Default for ContextSpec {
    fn default() -> Self {
        ContextSpec {
            left: ContextSize::Token(6),
            right: ContextSize::Token(6),
        }
    }
}

impl ContextSpec {
    pub fn tokens(left: u32, right: u32) -> Self {
        ContextSpec {
            left: ContextSize::Token(left),
            right: ContextSize::Token(right),
        }
    }

    pub fn chars(left: u32, right: u32) -> Self {
        ContextSpec {
            left: ContextSize::Char(left),
            right: ContextSize::Char(right),
        }
    }
}

/// How a raw span is turned into a [`Match`](super::Match).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Context shown around the match.
    pub context: ContextSpec,
    /// Matches longer than this are cut down to this many tokens.
    pub max_match_tokens: u32,
    /// Annotation layers to expose, as `foundry/layer` prefixes (`tt/p`).
    pub layers: Vec<String>,
    /// Widen the match to the enclosing sentence elements.
    pub extend_to_sentence: bool,
    /// Element term used for sentence extension.
    pub sentence_element: String,
    /// Field holding the document identifier used in match identifiers.
    pub uid_field: String,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            context: ContextSpec::default(),
            max_match_tokens: DEFAULT_MAX_MATCH_TOKENS,
            layers: Vec::new(),
            extend_to_sentence: false,
            sentence_element: SENTENCE_ELEMENT.to_string(),
            uid_field: "uid".to_string(),
        }
    }
}

impl MatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(mut self, context: ContextSpec) -> Self {
        self.context = context;
        self
    }

    pub fn max_match_tokens(mut self, max_match_tokens: u32) -> Self {
        self.max_match_tokens = max_match_tokens;
        self
    }

    pub fn layer<S: Into<String>>(mut self, layer: S) -> Self {
        self.layers.push(layer.into());
        self
    }

    pub fn extend_to_sentence(mut self, extend: bool) -> Self {
        self.extend_to_sentence = extend;
        self
    }

    pub fn uid_field<S: Into<String>>(mut self, field: S) -> Self {
        self.uid_field = field.into();
        self
    }
}

/// Configuration of one search call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of matches to materialize.
    pub count: usize,
    /// Number of leading matches to skip.
    pub start_index: usize,
    /// Wall-clock budget in milliseconds. `0` disables the timeout, a
    /// negative value makes the search time out immediately.
    pub timeout_ms: i64,
    /// How many spans are consumed between two deadline checks.
    pub check_interval: u64,
    /// Process leaves on a thread pool.
    pub parallel_leaves: bool,
    /// Thread pool size; `None` uses the number of CPU cores.
    pub threads: Option<usize>,
    /// Match rendering.
    pub matches: MatchConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            count: 25,
            start_index: 0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            check_interval: 1024,
            parallel_leaves: false,
            threads: None,
            matches: MatchConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configuration from a JSON file; missing keys take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn check_interval(mut self, check_interval: u64) -> Self {
        self.check_interval = check_interval.max(1);
        self
    }

    pub fn parallel_leaves(mut self, parallel: bool) -> Self {
        self.parallel_leaves = parallel;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads.max(1));
        self
    }

    pub fn matches(mut self, matches: MatchConfig) -> Self {
        self.matches = matches;
        self
    }

    pub fn max_match_tokens(mut self, max_match_tokens: u32) -> Self {
        self.matches.max_match_tokens = max_match_tokens;
        self
    }

    pub fn context(mut self, context: ContextSpec) -> Self {
        self.matches.context = context;
        self
    }

    /// Number of threads parallel searches run on.
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Number of raw hits a collector has to keep.
    pub fn hits_to_keep(&self) -> usize {
        self.start_index.saturating_add(self.count)
    }
}

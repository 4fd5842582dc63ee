//! Command line argument parsing for the Tessera CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::search::config::{ContextSize, ContextSpec, DEFAULT_MAX_MATCH_TOKENS};

/// Tessera - span queries over annotated text corpora
#[derive(Parser, Debug, Clone)]
#[command(name = "tessera")]
#[command(about = "Span queries over annotated text corpora")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct TesseraArgs {
    /// Verbosity level (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl TesseraArgs {
    /// Effective verbosity: 0 quiet, 1 normal, 2 verbose, 3+ debug.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose.saturating_add(1)
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add JSONL documents to an index
    Index(IndexArgs),

    /// Run a JSON span query
    Search(SearchArgs),

    /// Show a single match by its identifier
    #[command(name = "match-info")]
    MatchInfo(MatchInfoArgs),

    /// Delete documents by a field value
    Delete(DeleteArgs),

    /// Print the fingerprint of the committed index state
    Fingerprint(FingerprintArgs),

    /// Show index statistics
    Stats(StatsArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct IndexArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Document file, one JSON document per line
    #[arg(value_name = "DOCUMENT_FILE")]
    pub document_file: PathBuf,

    /// Commit after every N documents (0 commits once at the end)
    #[arg(short, long, default_value = "0")]
    pub batch_size: usize,

    /// Leave the documents uncommitted
    #[arg(long)]
    pub no_commit: bool,
}

impl IndexArgs {
    pub fn should_commit(&self) -> bool {
        !self.no_commit
    }
}

/// Match presentation options shared by `search` and `match-info`.
#[derive(clap::Args, Debug, Clone)]
pub struct MatchArgs {
    /// Left context size
    #[arg(long, default_value = "6")]
    pub left: u32,

    /// Right context size
    #[arg(long, default_value = "6")]
    pub right: u32,

    /// Measure context in characters instead of tokens
    #[arg(long)]
    pub char_context: bool,

    /// Maximum number of tokens shown per match (0 = unlimited)
    #[arg(long, default_value_t = DEFAULT_MAX_MATCH_TOKENS)]
    pub max_match_tokens: u32,

    /// Annotation layers to show, e.g. tt/p (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub layers: Vec<String>,

    /// Extend matches to the enclosing sentence
    #[arg(long)]
    pub sentence: bool,
}

impl MatchArgs {
    pub fn context(&self) -> ContextSpec {
        let size = |n| {
            if self.char_context {
                ContextSize::Char(n)
            } else {
                ContextSize::Token(n)
            }
        };
        ContextSpec {
            left: size(self.left),
            right: size(self.right),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Query tree as JSON
    #[arg(value_name = "QUERY", required_unless_present = "query_file")]
    pub query: Option<String>,

    /// Read the query tree from a JSON file
    #[arg(long, conflicts_with = "query")]
    pub query_file: Option<PathBuf>,

    /// Search configuration file (JSON); flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of matches to return
    #[arg(short, long, default_value = "25")]
    pub limit: usize,

    /// Index of the first match to return
    #[arg(short, long, default_value = "0")]
    pub offset: usize,

    /// Timeout in milliseconds (0 = none)
    #[arg(long, allow_negative_numbers = true)]
    pub timeout_ms: Option<i64>,

    /// Process leaves in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Number of worker threads for parallel search
    #[arg(short, long)]
    pub threads: Option<usize>,

    #[command(flatten)]
    pub matches: MatchArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct MatchInfoArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Match identifier, e.g. match-doc1-p4-6
    #[arg(value_name = "MATCH_ID")]
    pub match_id: String,

    /// Metadata field holding document identifiers
    #[arg(long, default_value = "uid")]
    pub uid_field: String,

    #[command(flatten)]
    pub matches: MatchArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Metadata field to match
    #[arg(value_name = "FIELD")]
    pub field: String,

    /// Value the field has to equal
    #[arg(value_name = "VALUE")]
    pub value: String,
}

#[derive(Parser, Debug, Clone)]
pub struct FingerprintArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_command() {
        let args = TesseraArgs::try_parse_from([
            "tessera",
            "search",
            "/path/to/index",
            r#"{"type":"term","term":"s:Baum"}"#,
            "--limit",
            "20",
            "--left",
            "3",
            "--char-context",
            "--layers",
            "tt/p,opennlp/p",
        ])
        .unwrap();

        let Command::Search(search) = args.command else {
            panic!("Expected Search command");
        };
        assert_eq!(search.index_path, PathBuf::from("/path/to/index"));
        assert_eq!(search.limit, 20);
        assert_eq!(search.matches.layers, vec!["tt/p", "opennlp/p"]);
        assert_eq!(search.matches.context().left, ContextSize::Char(3));
        assert_eq!(search.matches.context().right, ContextSize::Char(6));
        assert_eq!(search.matches.max_match_tokens, DEFAULT_MAX_MATCH_TOKENS);
    }

    #[test]
    fn test_search_requires_query() {
        assert!(TesseraArgs::try_parse_from(["tessera", "search", "/idx"]).is_err());
        let args = TesseraArgs::try_parse_from(["tessera", "search", "/idx", "--query-file", "q.json"])
            .unwrap();
        assert!(matches!(args.command, Command::Search(SearchArgs { query: None, .. })));
    }

    #[test]
    fn test_negative_timeout() {
        let args =
            TesseraArgs::try_parse_from(["tessera", "search", "/idx", "{}", "--timeout-ms", "-1"]).unwrap();
        let Command::Search(search) = args.command else {
            panic!("Expected Search command");
        };
        assert_eq!(search.timeout_ms, Some(-1));
    }

    #[test]
    fn test_match_info_command() {
        let args = TesseraArgs::try_parse_from([
            "tessera",
            "match-info",
            "/idx",
            "match-a-p1-2",
            "--sentence",
        ])
        .unwrap();
        let Command::MatchInfo(info) = args.command else {
            panic!("Expected MatchInfo command");
        };
        assert_eq!(info.match_id, "match-a-p1-2");
        assert_eq!(info.uid_field, "uid");
        assert!(info.matches.sentence);
    }

    #[test]
    fn test_verbosity_levels() {
        let args = TesseraArgs::try_parse_from(["tessera", "stats", "/idx"]).unwrap();
        assert_eq!(args.verbosity(), 1);

        let args = TesseraArgs::try_parse_from(["tessera", "-vv", "stats", "/idx"]).unwrap();
        assert_eq!(args.verbosity(), 3);

        let args = TesseraArgs::try_parse_from(["tessera", "stats", "/idx", "--quiet"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_output_format() {
        let args =
            TesseraArgs::try_parse_from(["tessera", "--format", "json", "fingerprint", "/idx"]).unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
    }
}

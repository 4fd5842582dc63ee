//! Output formatting for CLI commands.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, TesseraArgs};
use crate::error::Result;
use crate::index::IndexStats;
use crate::search::{Match, SearchResult};

/// Outcome of the `index` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexingReport {
    pub documents_added: usize,
    pub lines_skipped: usize,
    pub committed: bool,
    pub duration_ms: u64,
    pub fingerprint: String,
}

/// Outcome of the `delete` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletionReport {
    pub field: String,
    pub value: String,
    pub deleted: bool,
    pub fingerprint: String,
}

/// Outcome of the `fingerprint` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct FingerprintReport {
    pub fingerprint: String,
    pub generation: Option<u64>,
}

/// Plain text rendering of a command result.
pub trait HumanReadable {
    fn to_human(&self) -> String;
}

/// Print a result in the selected format.
pub fn output_result<T: Serialize + HumanReadable>(result: &T, args: &TesseraArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => print!("{}", result.to_human()),
        OutputFormat::Json => {
            let json = if args.pretty {
                serde_json::to_string_pretty(result)?
            } else {
                serde_json::to_string(result)?
            };
            println!("{json}");
        }
    }
    Ok(())
}

impl HumanReadable for IndexingReport {
    fn to_human(&self) -> String {
        let mut out = format!(
            "Added {} documents in {} ms",
            self.documents_added, self.duration_ms
        );
        if self.lines_skipped > 0 {
            let _ = write!(out, " ({} lines skipped)", self.lines_skipped);
        }
        out.push('\n');
        if self.committed {
            let _ = writeln!(out, "Fingerprint: {}", self.fingerprint);
        } else {
            out.push_str("Not committed\n");
        }
        out
    }
}

impl HumanReadable for DeletionReport {
    fn to_human(&self) -> String {
        if self.deleted {
            format!(
                "Deleted documents with {}={}\nFingerprint: {}\n",
                self.field, self.value, self.fingerprint
            )
        } else {
            format!("No document with {}={}\n", self.field, self.value)
        }
    }
}

impl HumanReadable for FingerprintReport {
    fn to_human(&self) -> String {
        format!("{}\n", self.fingerprint)
    }
}

impl HumanReadable for IndexStats {
    fn to_human(&self) -> String {
        let mut out = String::from("Index Statistics:\n");
        let generation = self
            .generation
            .map_or_else(|| "-".to_string(), |g| g.to_string());
        let _ = writeln!(out, "  Generation:  {generation}");
        let _ = writeln!(out, "  Fingerprint: {}", self.fingerprint);
        let _ = writeln!(out, "  Documents:   {} ({} stored)", self.num_docs, self.max_doc);
        let _ = writeln!(out, "  Segments:    {}", self.segments.len());
        for segment in &self.segments {
            let _ = writeln!(
                out,
                "    {:<8} docs={} deleted={} del_gen={}",
                segment.name, segment.doc_count, segment.del_count, segment.del_gen
            );
        }
        out
    }
}

impl HumanReadable for Match {
    fn to_human(&self) -> String {
        let mut out = format!("{}\n  {}\n", self.match_id, self.snippet_brackets);
        for snippet in &self.class_snippets {
            let _ = writeln!(out, "  class {}: {}", snippet.class, snippet.text);
        }
        for annotation in &self.annotations {
            let _ = writeln!(out, "  {:>4}: {}", annotation.position, annotation.terms.join(" "));
        }
        out
    }
}

impl HumanReadable for SearchResult {
    fn to_human(&self) -> String {
        let mut out = format!("Query: {}\n", self.query);
        let _ = writeln!(
            out,
            "{} results in {} documents",
            self.total_results, self.total_result_docs
        );
        if self.timed_out {
            out.push_str("(partial: response time exceeded)\n");
        }
        for (i, m) in self.matches.iter().enumerate() {
            let _ = write!(out, "\n{}. {}", self.start_index + i + 1, m.to_human());
        }
        out
    }
}

//! Match counting across leaves under a deadline.

use std::time::{Duration, Instant};

use ahash::AHashSet;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::DocId;
use crate::spans::{Span, Spans};

/// Warning code of a search that ran out of time.
pub const RESPONSE_TIME_EXCEEDED: u32 = 682;

/// A non-fatal problem reported with a search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: u32,
    pub message: String,
}

impl Warning {
    pub fn new<S: Into<String>>(code: u32, message: S) -> Self {
        Warning {
            code,
            message: message.into(),
        }
    }

    pub fn response_time_exceeded() -> Self {
        Self::new(RESPONSE_TIME_EXCEEDED, "Response time exceeded")
    }
}

/// When a search has to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Never,
    At(Instant),
    Expired,
}

impl Deadline {
    /// `0` means no deadline, negative values are already expired.
    pub fn from_timeout_ms(timeout_ms: i64) -> Self {
        match timeout_ms {
            0 => Deadline::Never,
            ms if ms < 0 => Deadline::Expired,
            ms => Deadline::At(Instant::now() + Duration::from_millis(ms as u64)),
        }
    }

    pub fn is_expired(&self) -> bool {
        match self {
            Deadline::Never => false,
            Deadline::At(instant) => Instant::now() >= *instant,
            Deadline::Expired => true,
        }
    }
}

/// A span found in a leaf.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawHit {
    pub leaf: usize,
    pub span: Span,
}

/// Counts spans and keeps the first hits of one search.
///
/// Every search call, or every worker of a parallel search, owns one
/// collector. Collectors of disjoint leaf sets combine with
/// [`merge`](MatchCollector::merge), in any order.
#[derive(Debug, Clone)]
pub struct MatchCollector {
    total_results: u64,
    seen: AHashSet<(usize, DocId)>,
    hits: Vec<RawHit>,
    keep: usize,
    warnings: Vec<Warning>,
    timed_out: bool,
    deadline: Deadline,
    check_interval: u64,
    since_check: u64,
}

impl MatchCollector {
    pub fn new(keep: usize, deadline: Deadline, check_interval: u64) -> Self {
        MatchCollector {
            total_results: 0,
            seen: AHashSet::new(),
            hits: Vec::new(),
            keep,
            warnings: Vec::new(),
            timed_out: false,
            deadline,
            check_interval: check_interval.max(1),
            since_check: 0,
        }
    }

    pub fn total_results(&self) -> u64 {
        self.total_results
    }

    /// Distinct `(leaf, document)` pairs with at least one match.
    pub fn total_result_docs(&self) -> u64 {
        self.seen.len() as u64
    }

    pub fn hits(&self) -> &[RawHit] {
        &self.hits
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn into_hits(self) -> Vec<RawHit> {
        self.hits
    }

    /// Check the deadline; records the timeout once.
    pub fn check_deadline(&mut self) -> bool {
        if self.timed_out {
            return false;
        }
        if self.deadline.is_expired() {
            self.time_out();
            return false;
        }
        true
    }

    fn time_out(&mut self) {
        self.timed_out = true;
        if !self
            .warnings
            .iter()
            .any(|w| w.code == RESPONSE_TIME_EXCEEDED)
        {
            info!("Search timed out after {} results", self.total_results);
            self.warnings.push(Warning::response_time_exceeded());
        }
    }

    /// Count one span. Returns `false` once the search has to stop.
    pub fn collect(&mut self, leaf: usize, span: Span) -> bool {
        if self.timed_out {
            return false;
        }
        self.total_results += 1;
        self.seen.insert((leaf, span.doc_id));
        if self.hits.len() < self.keep {
            self.hits.push(RawHit { leaf, span });
        }

        self.since_check += 1;
        if self.since_check >= self.check_interval {
            self.since_check = 0;
            return self.check_deadline();
        }
        true
    }

    /// Consume all spans of one leaf. Returns `false` if the search has to
    /// stop.
    pub fn collect_leaf(&mut self, leaf: usize, spans: &mut dyn Spans) -> Result<bool> {
        if !self.check_deadline() {
            return Ok(false);
        }
        let before = self.total_results;
        while spans.next_doc()? {
            while spans.next_start_position()? {
                if let Some(span) = spans.span()
                    && !self.collect(leaf, span)
                {
                    debug!("Stopped in leaf {leaf} after {} spans", self.total_results - before);
                    return Ok(false);
                }
            }
        }
        debug!("Leaf {leaf}: {} spans", self.total_results - before);
        Ok(true)
    }

    /// Combine two collectors over disjoint leaves.
    pub fn merge(mut self, other: MatchCollector) -> MatchCollector {
        self.total_results += other.total_results;
        self.seen.extend(other.seen);
        self.keep = self.keep.max(other.keep);
        self.hits.extend(other.hits);
        self.hits.sort();
        self.hits.truncate(self.keep);
        for warning in other.warnings {
            if !self.warnings.iter().any(|w| w.code == warning.code) {
                self.warnings.push(warning);
            }
        }
        self.warnings.sort_by_key(|w| w.code);
        self.timed_out |= other.timed_out;
        self
    }
}

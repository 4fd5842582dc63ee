//! Search facade over one reader snapshot.

use std::sync::Arc;
use std::time::Instant;

use log::debug;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::error::{Result, TesseraError};
use crate::index::{DocId, IndexReader, PositionSource, Segment};
use crate::search::collector::{Deadline, MatchCollector};
use crate::search::config::{MatchConfig, SearchConfig};
use crate::search::leaf::LeafContext;
use crate::search::materialize::{Match, MatchId, MatchMaterializer};
use crate::search::result::SearchResult;
use crate::spans::SpanQuery;

/// Runs span queries against a fixed [`IndexReader`] snapshot.
#[derive(Debug, Clone)]
pub struct Searcher {
    reader: Arc<IndexReader>,
}

impl Searcher {
    pub fn new(reader: Arc<IndexReader>) -> Self {
        Searcher { reader }
    }

    pub fn reader(&self) -> &Arc<IndexReader> {
        &self.reader
    }

    /// Search with default settings, returning up to `limit` matches.
    pub fn search(&self, query: &SpanQuery, limit: usize) -> Result<SearchResult> {
        self.search_with_config(query, &SearchConfig::default().count(limit))
    }

    pub fn search_with_config(
        &self,
        query: &SpanQuery,
        config: &SearchConfig,
    ) -> Result<SearchResult> {
        let started = Instant::now();
        let leaves = self.reader.leaves();
        let deadline = Deadline::from_timeout_ms(config.timeout_ms);
        let keep = config.hits_to_keep();

        let collector = if config.parallel_leaves && leaves.len() > 1 {
            self.collect_parallel(query, config, deadline)?
        } else {
            let mut collector = MatchCollector::new(keep, deadline, config.check_interval);
            for (ordinal, segment) in leaves.iter().enumerate() {
                let mut spans = query.spans(source(segment))?;
                if !collector.collect_leaf(ordinal, spans.as_mut())? {
                    break;
                }
            }
            collector
        };

        let total_results = collector.total_results();
        let total_result_docs = collector.total_result_docs();
        let timed_out = collector.is_timed_out();
        let warnings = collector.warnings().to_vec();
        let page: Vec<_> = collector
            .into_hits()
            .into_iter()
            .skip(config.start_index)
            .take(config.count)
            .collect();

        let materializer = MatchMaterializer::new(&config.matches);
        let mut contexts = LeafContext::for_leaves(leaves);
        for hit in &page {
            materializer.prepare(&mut contexts[hit.leaf], &hit.span)?;
        }
        let matches = page
            .iter()
            .map(|hit| materializer.materialize(&mut contexts[hit.leaf], &hit.span))
            .collect::<Result<Vec<Match>>>()?;

        debug!(
            "Query {query} over {} leaves: {total_results} results in {total_result_docs} docs, {} materialized in {:?}",
            leaves.len(),
            matches.len(),
            started.elapsed()
        );

        Ok(SearchResult {
            query: query.to_string(),
            matches,
            total_results,
            total_result_docs,
            start_index: config.start_index,
            items_per_page: config.count,
            timed_out,
            warnings,
        })
    }

    /// One collector per leaf on a dedicated pool, merged at the end.
    fn collect_parallel(
        &self,
        query: &SpanQuery,
        config: &SearchConfig,
        deadline: Deadline,
    ) -> Result<MatchCollector> {
        let keep = config.hits_to_keep();
        let interval = config.check_interval;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.thread_count())
            .thread_name(|i| format!("tessera-search-{i}"))
            .build()
            .map_err(|e| TesseraError::internal(format!("Failed to create thread pool: {e}")))?;

        pool.install(|| {
            self.reader
                .leaves()
                .par_iter()
                .enumerate()
                .map(|(ordinal, segment)| -> Result<MatchCollector> {
                    let mut collector = MatchCollector::new(keep, deadline, interval);
                    let mut spans = query.spans(source(segment))?;
                    collector.collect_leaf(ordinal, spans.as_mut())?;
                    Ok(collector)
                })
                .try_reduce(
                    || MatchCollector::new(keep, deadline, interval),
                    |a, b| Ok(a.merge(b)),
                )
        })
    }

    /// Materialize a single match from its identifier.
    ///
    /// The document is looked up by `config.uid_field`; identifiers of
    /// documents without that field use the `{segment}.{doc}` form.
    pub fn match_info(
        &self,
        match_id: &str,
        layers: &[String],
        extend_to_sentence: bool,
        config: &MatchConfig,
    ) -> Result<Match> {
        let id: MatchId = match_id.parse()?;
        let (ordinal, doc) = self
            .locate(&id.uid, &config.uid_field)
            .ok_or_else(|| TesseraError::not_found(format!("No document for {match_id}")))?;

        let config = MatchConfig {
            layers: layers.to_vec(),
            extend_to_sentence,
            ..config.clone()
        };
        let segment = Arc::clone(&self.reader.leaves()[ordinal]);
        let mut leaf = LeafContext::new(ordinal, segment);
        let span = id.to_span(doc);
        let materializer = MatchMaterializer::new(&config);
        materializer.prepare(&mut leaf, &span)?;
        materializer.materialize(&mut leaf, &span)
    }

    fn locate(&self, uid: &str, field: &str) -> Option<(usize, DocId)> {
        let leaves = self.reader.leaves();
        let by_field = leaves.iter().enumerate().find_map(|(ordinal, segment)| {
            segment
                .find_by_field(field, uid)
                .first()
                .map(|&doc| (ordinal, doc))
        });
        if by_field.is_some() {
            return by_field;
        }

        let (name, doc) = uid.rsplit_once('.')?;
        let doc: DocId = doc.parse().ok()?;
        let ordinal = leaves.iter().position(|s| s.name() == name)?;
        let segment = &leaves[ordinal];
        (doc < segment.max_doc() && !segment.is_deleted(doc)).then_some((ordinal, doc))
    }
}

fn source(segment: &Arc<Segment>) -> &dyn PositionSource {
    &**segment
}

mod common;

#[cfg(test)]
mod tests {
    use super::common::{char_doc, index_of, text_index};
    use tessera::index::{AnnotatedDocument, Index};
    use tessera::search::config::{ContextSpec, MatchConfig, SearchConfig};
    use tessera::search::{RESPONSE_TIME_EXCEEDED, SearchResult};
    use tessera::spans::SpanQuery;

    /// Three segments, one commit each.
    fn multi_leaf_index() -> Index {
        let index = Index::create_in_memory();
        for batch in [
            vec![char_doc("a0", "abcabcabac", &[]), char_doc("a1", "bcbabd", &[])],
            vec![char_doc("b0", "babababa", &[])],
            vec![char_doc("c0", "cccc", &[]), char_doc("c1", "abba", &[])],
        ] {
            index.add_documents(batch).unwrap();
            index.commit().unwrap();
        }
        index
    }

    fn run(index: &Index, query: &SpanQuery, config: &SearchConfig) -> SearchResult {
        index.searcher().search_with_config(query, config).unwrap()
    }

    #[test]
    fn test_totals_across_leaves() {
        let index = multi_leaf_index();
        assert_eq!(index.reader().leaves().len(), 3);

        let result = run(&index, &SpanQuery::term("s:b"), &SearchConfig::default());
        assert_eq!(result.total_results, 3 + 3 + 4 + 2);
        assert_eq!(result.total_result_docs, 4);
        assert!(result.total_result_docs <= result.total_results);
        assert_eq!(result.matches.last().map(|m| m.leaf_ordinal), Some(2));
    }

    #[test]
    fn test_parallel_leaves_give_identical_results() {
        let index = multi_leaf_index();
        let query = SpanQuery::next(SpanQuery::term("s:a"), SpanQuery::term("s:b"));
        let sequential = run(&index, &query, &SearchConfig::default().count(5));
        for threads in [1, 2, 4] {
            let parallel = run(
                &index,
                &query,
                &SearchConfig::default().count(5).parallel_leaves(true).threads(threads),
            );
            assert_eq!(parallel, sequential, "{threads} threads");
        }
    }

    #[test]
    fn test_expired_timeout_reports_one_warning() {
        let index = multi_leaf_index();
        for parallel in [false, true] {
            let config = SearchConfig::default()
                .timeout_ms(-1)
                .parallel_leaves(parallel)
                .threads(3);
            let result = run(&index, &SpanQuery::term("s:b"), &config);
            assert!(result.timed_out);
            assert_eq!(result.warnings.len(), 1);
            assert_eq!(result.warnings[0].code, RESPONSE_TIME_EXCEEDED);
            assert_eq!(result.total_results, 0);
        }
    }

    #[test]
    fn test_generous_timeout_completes() {
        let index = multi_leaf_index();
        let config = SearchConfig::default().timeout_ms(60_000).check_interval(1);
        let result = run(&index, &SpanQuery::term("s:a"), &config);
        assert!(!result.timed_out);
        assert!(result.warnings.is_empty());
        assert_eq!(result.total_results, 4 + 1 + 4 + 0 + 2);
    }

    #[test]
    fn test_repeated_query_is_identical() {
        let index = multi_leaf_index();
        let searcher = index.searcher();
        let query = SpanQuery::segment(SpanQuery::term("s:b"), SpanQuery::term("i:b"))
            .without(SpanQuery::term("s:c"));
        let config = SearchConfig::default().count(50).context(ContextSpec::tokens(2, 2));

        let first = searcher.search_with_config(&query, &config).unwrap();
        let second = searcher.search_with_config(&query, &config).unwrap();
        assert!(first.total_result_docs <= first.total_results);
        assert_eq!(first.total_results, second.total_results);
        assert_eq!(first.total_result_docs, second.total_result_docs);
        assert_eq!(first.matches, second.matches);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_paging_keeps_totals() {
        let index = multi_leaf_index();
        let query = SpanQuery::term("s:b");
        let all = run(&index, &query, &SearchConfig::default());
        let page = run(&index, &query, &SearchConfig::default().start_index(4).count(3));

        assert_eq!(page.total_results, all.total_results);
        assert_eq!(page.len(), 3);
        assert_eq!(page.matches[..], all.matches[4..7]);
        assert_eq!(page.items_per_page, 3);

        let beyond = run(&index, &query, &SearchConfig::default().start_index(100));
        assert!(beyond.is_empty());
        assert_eq!(beyond.total_results, all.total_results);
    }

    #[test]
    fn test_truncated_match_has_cut_marker() {
        let index = text_index(&["eins zwei drei vier fünf"]);
        let query = SpanQuery::sequence(["s:zwei", "s:drei", "s:vier"].map(SpanQuery::term)).unwrap();
        let config = SearchConfig::default()
            .max_match_tokens(2)
            .context(ContextSpec::tokens(1, 1));
        let result = run(&index, &query, &config);

        let m = &result.matches[0];
        assert!(m.end_cutted);
        assert_eq!(m.match_id, "match-t0-p1-4");
        assert_eq!(m.snippet_brackets, "eins [[zwei drei<!>]] vier...");
    }

    #[test]
    fn test_match_info_by_identifier() {
        let index = text_index(&["Der alte Baum steht. Er ist groß.", "Ein Baum."]);
        let searcher = index.searcher();
        let found = searcher
            .search(&SpanQuery::term("s:Baum"), 10)
            .unwrap();
        assert_eq!(found.total_results, 2);

        let config = MatchConfig::default().context(ContextSpec::tokens(0, 0));
        let info = searcher
            .match_info(&found.matches[0].match_id, &[], true, &config)
            .unwrap();
        assert_eq!((info.start_pos, info.end_pos), (0, 4));
        assert_eq!(info.snippet_brackets, "[[Der alte Baum steht]]...");

        let plain = searcher
            .match_info("match-t1-p1-2", &[], false, &config)
            .unwrap();
        assert_eq!(plain.snippet_brackets, "...[[Baum]]");
        assert_eq!(plain.uid, "t1");
    }

    #[test]
    fn test_match_info_shows_layers() {
        let mut doc = AnnotatedDocument::from_text("Der Baum").with_field("uid", "x");
        doc.annotate(0, "tt/p:ART").unwrap();
        doc.annotate(1, "tt/p:NN").unwrap();
        doc.annotate(1, "tt/l:Baum").unwrap();
        let index = index_of(vec![doc]);

        let info = index
            .searcher()
            .match_info("match-x-p0-2", &["tt/p".to_string()], false, &MatchConfig::default())
            .unwrap();
        let terms: Vec<_> = info.annotations.iter().map(|a| a.terms.join(" ")).collect();
        assert_eq!(terms, vec!["tt/p:ART", "tt/p:NN"]);
        assert!(info.snippet_html.contains("<span title=\"tt/p:NN\">Baum</span>"));
    }
}

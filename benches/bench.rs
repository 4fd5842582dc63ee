//! Criterion benchmarks for Tessera.
//!
//! Covers the hot paths of a search call:
//! - span iteration for term, sequence and distance queries
//! - match materialization with context and class highlights
//! - parallel versus sequential leaf processing

use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use tessera::index::{AnnotatedDocument, Index};
use tessera::search::config::SearchConfig;
use tessera::spans::{DistanceConstraint, SpanQuery};

const WORDS: &[&str] = &[
    "der", "die", "das", "alte", "Baum", "steht", "im", "Wald", "und", "ein", "Haus", "am", "See",
    "wir", "sehen", "den", "großen", "Berg",
];

/// Deterministic pseudo-random sentences.
fn generate_text(seed: usize, sentences: usize) -> String {
    let mut state = seed.wrapping_mul(2654435761) | 1;
    let mut text = String::new();
    for _ in 0..sentences {
        let len = 4 + state % 8;
        for i in 0..len {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            if i > 0 {
                text.push(' ');
            }
            text.push_str(WORDS[state % WORDS.len()]);
        }
        text.push_str(". ");
    }
    text
}

fn build_index(docs: usize, docs_per_segment: usize) -> Index {
    let index = Index::create_in_memory();
    for i in 0..docs {
        let doc = AnnotatedDocument::from_text(generate_text(i, 20)).with_field("uid", format!("d{i}"));
        index.add_document(doc).expect("add document");
        if (i + 1) % docs_per_segment == 0 {
            index.commit().expect("commit");
        }
    }
    index.commit().expect("commit");
    index
}

fn bench_span_queries(c: &mut Criterion) {
    let index = build_index(500, 100);
    let searcher = index.searcher();
    let mut group = c.benchmark_group("span_queries");
    group.throughput(Throughput::Elements(500));

    let queries = [
        ("term", SpanQuery::term("s:Baum")),
        (
            "sequence",
            SpanQuery::sequence(["s:der", "s:alte", "s:Baum"].map(SpanQuery::term)).expect("non-empty"),
        ),
        (
            "segment",
            SpanQuery::segment(SpanQuery::term("s:Baum"), SpanQuery::term("i:baum")),
        ),
        (
            "sentence_distance",
            SpanQuery::distance(
                SpanQuery::term("s:Baum"),
                SpanQuery::term("s:Wald"),
                DistanceConstraint::elements("<>:base/s:s", 0, 0).expect("valid constraint"),
            ),
        ),
        (
            "without",
            SpanQuery::term("s:Baum").without(SpanQuery::term("s:Wald")),
        ),
    ];

    for (name, query) in &queries {
        let config = SearchConfig::default().count(0);
        group.bench_function(*name, |b| {
            b.iter(|| black_box(searcher.search_with_config(query, &config).expect("search")))
        });
    }
    group.finish();
}

fn bench_materialization(c: &mut Criterion) {
    let index = build_index(200, 200);
    let searcher = index.searcher();
    let query = SpanQuery::next(SpanQuery::term("s:alte").class(1), SpanQuery::term("s:Baum").class(2));

    c.bench_function("materialize_25_matches", |b| {
        b.iter(|| black_box(searcher.search(&query, 25).expect("search")))
    });
}

fn bench_parallel_leaves(c: &mut Criterion) {
    let index = build_index(2000, 250);
    let searcher = index.searcher();
    let query = SpanQuery::next(SpanQuery::term("s:den"), SpanQuery::term("s:großen"));
    let mut group = c.benchmark_group("leaves");

    let sequential = SearchConfig::default().count(10);
    let parallel = SearchConfig::default().count(10).parallel_leaves(true);
    group.bench_function("sequential", |b| {
        b.iter(|| black_box(searcher.search_with_config(&query, &sequential).expect("search")))
    });
    group.bench_function("parallel", |b| {
        b.iter(|| black_box(searcher.search_with_config(&query, &parallel).expect("search")))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_span_queries,
    bench_materialization,
    bench_parallel_leaves
);
criterion_main!(benches);

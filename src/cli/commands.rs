//! Command implementations for the Tessera CLI.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::time::Instant;

use log::{debug, info, warn};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::error::{Result, TesseraError};
use crate::index::{AnnotatedDocument, Index};
use crate::search::config::{MatchConfig, SearchConfig};
use crate::spans::SpanQuery;

/// Execute a CLI command.
pub fn execute_command(args: TesseraArgs) -> Result<()> {
    match &args.command {
        Command::Index(index_args) => index_documents(index_args, &args),
        Command::Search(search_args) => search_index(search_args, &args),
        Command::MatchInfo(info_args) => match_info(info_args, &args),
        Command::Delete(delete_args) => delete_documents(delete_args, &args),
        Command::Fingerprint(fingerprint_args) => show_fingerprint(fingerprint_args, &args),
        Command::Stats(stats_args) => show_stats(stats_args, &args),
    }
}

/// Add JSONL documents; documents without tokens are tokenized from their text.
fn index_documents(args: &IndexArgs, cli_args: &TesseraArgs) -> Result<()> {
    let index = Index::open_in_dir(&args.index_path)?;
    let start_time = Instant::now();
    let reader = BufReader::new(File::open(&args.document_file)?);

    let mut documents_added = 0;
    let mut lines_skipped = 0;
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc = match serde_json::from_str::<AnnotatedDocument>(&line) {
            Ok(doc) => doc.tokenize_if_empty(),
            Err(e) => {
                warn!("Skipping line {}: {e}", line_num + 1);
                lines_skipped += 1;
                continue;
            }
        };
        if let Err(e) = index.add_document(doc) {
            warn!("Skipping line {}: {e}", line_num + 1);
            lines_skipped += 1;
            continue;
        }
        documents_added += 1;

        if args.should_commit() && args.batch_size > 0 && documents_added % args.batch_size == 0 {
            index.commit()?;
            info!("Committed {documents_added} documents");
        }
    }

    if args.should_commit() {
        index.commit()?;
    }
    debug!("Indexed {} in {:?}", args.document_file.display(), start_time.elapsed());

    let report = IndexingReport {
        documents_added,
        lines_skipped,
        committed: args.should_commit(),
        duration_ms: start_time.elapsed().as_millis() as u64,
        fingerprint: index.fingerprint(),
    };
    output_result(&report, cli_args)
}

/// Settings from `--config`, overridden by explicit flags.
fn search_config(args: &SearchArgs) -> Result<SearchConfig> {
    let config = match &args.config {
        Some(path) => SearchConfig::from_json_file(path)?,
        None => SearchConfig::default(),
    };
    let parallel = args.parallel || config.parallel_leaves;
    let mut config = config
        .count(args.limit)
        .start_index(args.offset)
        .parallel_leaves(parallel);
    if let Some(timeout_ms) = args.timeout_ms {
        config = config.timeout_ms(timeout_ms);
    }
    if let Some(threads) = args.threads {
        config = config.threads(threads);
    }
    config.matches = match_config(&args.matches, config.matches.clone());
    Ok(config)
}

fn match_config(args: &MatchArgs, base: MatchConfig) -> MatchConfig {
    MatchConfig {
        context: args.context(),
        max_match_tokens: args.max_match_tokens,
        layers: args.layers.clone(),
        extend_to_sentence: args.sentence,
        ..base
    }
}

fn search_index(args: &SearchArgs, cli_args: &TesseraArgs) -> Result<()> {
    let query_json = match (&args.query, &args.query_file) {
        (Some(query), _) => query.clone(),
        (None, Some(path)) => fs::read_to_string(path)?,
        (None, None) => return Err(TesseraError::invalid_argument("No query given")),
    };
    let query: SpanQuery = serde_json::from_str(&query_json)?;

    let config = search_config(args)?;

    let index = Index::open_in_dir(&args.index_path)?;
    let result = index.searcher().search_with_config(&query, &config)?;
    output_result(&result, cli_args)
}

fn match_info(args: &MatchInfoArgs, cli_args: &TesseraArgs) -> Result<()> {
    let config = match_config(
        &args.matches,
        MatchConfig::default().uid_field(args.uid_field.clone()),
    );
    let index = Index::open_in_dir(&args.index_path)?;
    let found = index.searcher().match_info(
        &args.match_id,
        &config.layers,
        config.extend_to_sentence,
        &config,
    )?;
    output_result(&found, cli_args)
}

fn delete_documents(args: &DeleteArgs, cli_args: &TesseraArgs) -> Result<()> {
    let index = Index::open_in_dir(&args.index_path)?;
    let deleted = index.delete_by_field_value(&args.field, &args.value);
    if deleted {
        index.commit()?;
    }
    let report = DeletionReport {
        field: args.field.clone(),
        value: args.value.clone(),
        deleted,
        fingerprint: index.fingerprint(),
    };
    output_result(&report, cli_args)
}

fn show_fingerprint(args: &FingerprintArgs, cli_args: &TesseraArgs) -> Result<()> {
    let index = Index::open_in_dir(&args.index_path)?;
    let report = FingerprintReport {
        fingerprint: index.fingerprint(),
        generation: index.reader().generation(),
    };
    output_result(&report, cli_args)
}

fn show_stats(args: &StatsArgs, cli_args: &TesseraArgs) -> Result<()> {
    let index = Index::open_in_dir(&args.index_path)?;
    output_result(&index.stats(), cli_args)
}

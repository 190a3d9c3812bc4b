//! `search` command

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use super::{parse_toggle, resolve_master_key, resolve_root, ArtifactPaths};
use crate::chunks::ChunkStore;
use crate::cli::output::{print_success, CliError};
use crate::cli::SearchArgs;
use crate::codemap::Codemap;
use crate::config::Config;
use crate::providers::create_provider;
use crate::reranker::{create_reranker, RerankerMode};
use crate::search::{SearchEngine, SearchHit, SearchOptions};
use crate::store::Store;

#[derive(Serialize)]
struct SearchEnvelope<'a> {
    query: &'a str,
    results: &'a [SearchHit],
    total: usize,
    filters: FiltersEcho<'a>,
}

#[derive(Serialize)]
struct FiltersEcho<'a> {
    lang: &'a [String],
    path_glob: &'a [String],
    tags: &'a [String],
    hybrid: bool,
    bm25: bool,
    symbol_boost: bool,
    reranker: String,
}

pub fn cmd_search(args: &SearchArgs, config_file: Option<&Path>) -> Result<(), CliError> {
    // Toggles are rejected before any work happens.
    let hybrid = parse_toggle("hybrid", &args.hybrid)?;
    let bm25 = parse_toggle("bm25", &args.bm25)?;
    let symbol_boost = parse_toggle("symbol_boost", &args.symbol_boost)?;

    let root = resolve_root(args.path.as_deref());
    let config = Config::load(config_file, &root)?;

    let reranker_mode: RerankerMode = match &args.reranker {
        Some(flag) => flag.parse()?,
        None => config.reranker_mode(),
    };

    let paths = ArtifactPaths::for_root(&root);
    paths.require_index()?;

    let provider = create_provider(&args.provider, &config.provider_config())?;
    let master_key = resolve_master_key(args.encryption_key.as_deref(), &config)?;

    let store = Store::open(&paths.db)?;
    let chunk_store = ChunkStore::new(&paths.chunks_dir, master_key);

    // Path weights come from the codemap; a missing codemap means every
    // weight defaults to 1.
    let codemap = Codemap::load(&paths.codemap)?;
    let path_weights: HashMap<String, f64> = codemap
        .iter()
        .map(|(id, meta)| (id.clone(), meta.path_weight))
        .collect();

    let reranker = create_reranker(reranker_mode, &config.reranker, config.timeout_secs)?;

    let options = SearchOptions {
        limit: args.limit,
        path_globs: args.path_globs.clone(),
        languages: args.languages.clone(),
        tags: args.tags.clone(),
        hybrid,
        bm25,
        symbol_boost,
    };

    let engine = SearchEngine::new(&store, &chunk_store, provider.as_ref())
        .with_reranker(reranker.as_deref())
        .with_path_weights(path_weights);
    let hits = engine.search(&args.query, &options)?;

    print_success(&SearchEnvelope {
        query: &args.query,
        total: hits.len(),
        results: &hits,
        filters: FiltersEcho {
            lang: &args.languages,
            path_glob: &args.path_globs,
            tags: &args.tags,
            hybrid,
            bm25,
            symbol_boost,
            reranker: reranker_mode.to_string(),
        },
    });
    Ok(())
}

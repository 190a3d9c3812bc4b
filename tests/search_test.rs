//! Search engine integration tests

mod common;

use std::collections::HashMap;

use common::TestRepo;
use pampax::chunks::compute_sha;
use pampax::providers::{EmbeddingProvider, ProviderError};
use pampax::search::{SearchEngine, SearchError, SearchOptions};
use pampax::store::ChunkRecord;

/// Provider that returns a fixed vector for every input.
struct FixedProvider {
    vector: Vec<f64>,
}

impl EmbeddingProvider for FixedProvider {
    fn generate_embedding(&self, _text: &str) -> Result<Vec<f64>, ProviderError> {
        Ok(self.vector.clone())
    }
    fn dimensions(&self) -> usize {
        self.vector.len()
    }
    fn name(&self) -> &str {
        "fixed"
    }
}

fn record(id: &str, path: &str, symbol: &str, embedding: Option<Vec<f64>>) -> ChunkRecord {
    let dims = embedding.as_ref().map(|v| v.len() as u32);
    ChunkRecord {
        id: id.to_string(),
        file_path: path.to_string(),
        symbol: symbol.to_string(),
        sha: compute_sha(id),
        lang: "rust".to_string(),
        chunk_type: "function".to_string(),
        embedding_provider: embedding.as_ref().map(|_| "fixed".to_string()),
        embedding_dimensions: dims,
        embedding,
        pampa_tags: Some(r#"["rust","function"]"#.to_string()),
        context_info: Some(r#"{"line_start":1,"line_end":5}"#.to_string()),
        ..Default::default()
    }
}

fn vector_only_options(limit: usize) -> SearchOptions {
    SearchOptions {
        limit,
        hybrid: false,
        bm25: false,
        symbol_boost: false,
        ..Default::default()
    }
}

#[test]
fn test_top2_cosine_ordering_matches_reference() {
    // Spec scenario: query [1,0]; a=[0.9,0.1], b=[0.6,0.8], c=[-1,0]
    let repo = TestRepo::new();
    let store = repo.open_store();
    store
        .apply_run(&[
            record("a", "src/a.rs", "alpha", Some(vec![0.9, 0.1])),
            record("b", "src/b.rs", "beta", Some(vec![0.6, 0.8])),
            record("c", "src/c.rs", "gamma", Some(vec![-1.0, 0.0])),
        ])
        .unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    let hits = engine.search("query", &vector_only_options(2)).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "a");
    assert_eq!(hits[1].id, "b");
    assert!((hits[0].score - 0.9939).abs() < 0.01, "got {}", hits[0].score);
    assert!((hits[1].score - 0.6).abs() < 0.01, "got {}", hits[1].score);
}

#[test]
fn test_dimension_mismatch_silently_skipped() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    store
        .apply_run(&[
            record("match", "src/a.rs", "alpha", Some(vec![1.0, 0.0])),
            record("mismatch", "src/b.rs", "beta", Some(vec![1.0, 0.0, 0.0])),
        ])
        .unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    let hits = engine.search("query", &vector_only_options(10)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "match");
}

#[test]
fn test_null_embedding_excluded_from_vector_search() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    store
        .apply_run(&[
            record("embedded", "src/a.rs", "alpha", Some(vec![1.0, 0.0])),
            record("bare", "src/b.rs", "beta", None),
        ])
        .unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    let hits = engine.search("query", &vector_only_options(10)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "embedded");
}

#[test]
fn test_results_respect_declared_filters() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    let mut python = record("py", "app/main.py", "main", Some(vec![1.0, 0.0]));
    python.lang = "python".to_string();
    store
        .apply_run(&[
            record("rs", "src/lib.rs", "run", Some(vec![1.0, 0.0])),
            python,
        ])
        .unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    let mut options = vector_only_options(10);
    options.languages = vec!["python".to_string()];
    let hits = engine.search("query", &options).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].lang, "python");

    let mut options = vector_only_options(10);
    options.path_globs = vec!["src/**".to_string()];
    let hits = engine.search("query", &options).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "src/lib.rs");
}

#[test]
fn test_limit_enforced_and_sort_strictly_monotone() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    let records: Vec<ChunkRecord> = (0..20)
        .map(|i| {
            let x = 1.0 - (i as f64) * 0.03;
            record(
                &format!("id_{i:02}"),
                &format!("src/f{i:02}.rs"),
                "fun",
                Some(vec![x, (1.0 - x * x).max(0.0).sqrt()]),
            )
        })
        .collect();
    store.apply_run(&records).unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    let hits = engine.search("query", &vector_only_options(7)).unwrap();
    assert_eq!(hits.len(), 7);
    for pair in hits.windows(2) {
        assert!(
            pair[0].score > pair[1].score
                || (pair[0].score == pair[1].score && pair[0].path < pair[1].path),
            "ordering must be monotone with deterministic tiebreaks"
        );
    }
}

#[test]
fn test_deterministic_tiebreak_path_then_id() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    // Identical embeddings everywhere: scores tie exactly.
    store
        .apply_run(&[
            record("z_id", "src/same.rs", "one", Some(vec![1.0, 0.0])),
            record("a_id", "src/same.rs", "two", Some(vec![1.0, 0.0])),
            record("m_id", "src/earlier.rs", "three", Some(vec![1.0, 0.0])),
        ])
        .unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    let hits = engine.search("query", &vector_only_options(10)).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["m_id", "a_id", "z_id"]);
}

#[test]
fn test_hybrid_rrf_rewards_lexical_and_vector_agreement() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    let mut relevant = record("relevant", "src/auth.rs", "verify_token", Some(vec![0.9, 0.1]));
    relevant.pampa_intent = Some("verify auth token".to_string());
    let similar_only = record("vector_only", "src/misc.rs", "helper", Some(vec![0.95, 0.05]));
    store.apply_run(&[relevant, similar_only]).unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    let options = SearchOptions {
        limit: 2,
        symbol_boost: false,
        ..Default::default()
    };
    let hits = engine.search("verify token", &options).unwrap();
    assert_eq!(hits[0].id, "relevant", "RRF should prefer the chunk both rankings agree on");
}

#[test]
fn test_symbol_boost_lifts_symbol_matches() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    store
        .apply_run(&[
            record("named", "src/a.rs", "parse_config", Some(vec![0.8, 0.2])),
            record("other", "src/b.rs", "render", Some(vec![0.8, 0.2])),
        ])
        .unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    let options = SearchOptions {
        limit: 2,
        hybrid: false,
        bm25: false,
        symbol_boost: true,
        ..Default::default()
    };
    let hits = engine.search("parse config", &options).unwrap();
    assert_eq!(hits[0].id, "named");
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn test_path_weight_multiplies_score() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    store
        .apply_run(&[
            record("weighted", "src/a.rs", "alpha", Some(vec![0.5, 0.5])),
            record("plain", "src/b.rs", "beta", Some(vec![0.5, 0.5])),
        ])
        .unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let mut weights = HashMap::new();
    weights.insert("weighted".to_string(), 2.0);
    let engine = SearchEngine::new(&store, &chunk_store, &provider).with_path_weights(weights);

    let options = SearchOptions {
        limit: 2,
        hybrid: false,
        bm25: false,
        symbol_boost: true,
        ..Default::default()
    };
    let hits = engine.search("unrelated query", &options).unwrap();
    assert_eq!(hits[0].id, "weighted");
    assert!((hits[0].score - hits[1].score * 2.0).abs() < 1e-9);
}

#[test]
fn test_empty_query_rejected() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    assert!(matches!(
        engine.search("   ", &SearchOptions::default()),
        Err(SearchError::EmptyQuery)
    ));
}

#[test]
fn test_line_range_surfaces_from_context_info() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    let mut rec = record("a", "src/a.rs", "alpha", Some(vec![1.0, 0.0]));
    rec.context_info = Some(r#"{"line_start":42,"line_end":77}"#.to_string());
    store.apply_run(&[rec]).unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    let hits = engine.search("query", &vector_only_options(1)).unwrap();
    assert_eq!(hits[0].line_start, 42);
    assert_eq!(hits[0].line_end, 77);
}

#[test]
fn test_search_records_learning_signals() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    store
        .apply_run(&[record("a", "src/a.rs", "alpha", Some(vec![1.0, 0.0]))])
        .unwrap();

    let provider = FixedProvider {
        vector: vec![1.0, 0.0],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);
    let hits = engine.search("Find Alpha", &vector_only_options(1)).unwrap();

    let cached = store.cached_intention("find alpha").unwrap();
    assert_eq!(cached.as_deref(), Some(hits[0].sha.as_str()));
}

#[test]
fn test_results_reproducible_across_runs() {
    let repo = TestRepo::new();
    let store = repo.open_store();
    let records: Vec<ChunkRecord> = (0..15)
        .map(|i| {
            record(
                &format!("chunk_{i}"),
                &format!("src/m{}.rs", i % 4),
                &format!("sym_{i}"),
                Some(vec![(i as f64) / 15.0, 1.0 - (i as f64) / 15.0]),
            )
        })
        .collect();
    store.apply_run(&records).unwrap();

    let provider = FixedProvider {
        vector: vec![0.7, 0.3],
    };
    let chunk_store = repo.chunk_store(None);
    let engine = SearchEngine::new(&store, &chunk_store, &provider);

    let options = SearchOptions::default();
    let first = engine.search("symbols", &options).unwrap();
    for _ in 0..3 {
        let again = engine.search("symbols", &options).unwrap();
        let a: Vec<(&str, f64)> = first.iter().map(|h| (h.id.as_str(), h.score)).collect();
        let b: Vec<(&str, f64)> = again.iter().map(|h| (h.id.as_str(), h.score)).collect();
        assert_eq!(a, b, "top-K must be byte-for-byte reproducible");
    }
}

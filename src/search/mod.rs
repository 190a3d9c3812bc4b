//! Hybrid search engine
//!
//! Pipeline: embed the query, score vector candidates whose provider and
//! dimensions are compatible (mismatches silently skipped), optionally
//! score BM25 over metadata documents, fuse with Reciprocal Rank Fusion,
//! apply the symbol boost, optionally rerank the head, and return a
//! deterministically ordered top-K. Ties always break lexicographically by
//! path, then id, so the top-10 is byte-for-byte reproducible for a fixed
//! corpus and provider.

pub mod bm25;

use std::collections::{HashMap, HashSet};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

use crate::chunks::{ChunkStore, ChunkStoreError};
use crate::math::cosine_similarity;
use crate::providers::{EmbeddingProvider, ProviderError};
use crate::reranker::{RerankCandidate, Reranker, RerankerError};
use crate::store::{blob_to_embedding, CandidateRow, Store, StoreError};
use bm25::Bm25Index;

/// RRF constant from the original paper; higher K smooths rank differences.
const RRF_K: f64 = 60.0;
/// Additive boost when a query token matches the chunk symbol.
const SYMBOL_TOKEN_BOOST: f64 = 0.10;
/// Additive boost when a query token matches a chunk tag.
const TAG_TOKEN_BOOST: f64 = 0.05;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("invalid path glob {0:?}: {1}")]
    InvalidGlob(String, String),
    #[error("generate query embedding: {0}")]
    Embedding(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    ChunkStore(#[from] ChunkStoreError),
    #[error(transparent)]
    Reranker(#[from] RerankerError),
}

/// Search options; all filters empty by default.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub path_globs: Vec<String>,
    pub languages: Vec<String>,
    pub tags: Vec<String>,
    pub hybrid: bool,
    pub bm25: bool,
    pub symbol_boost: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            path_globs: Vec::new(),
            languages: Vec::new(),
            tags: Vec::new(),
            hybrid: true,
            bm25: true,
            symbol_boost: true,
        }
    }
}

/// One ranked result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub id: String,
    pub sha: String,
    pub path: String,
    pub lang: String,
    pub symbol: Option<String>,
    pub tags: Vec<String>,
    pub score: f64,
    pub line_start: u32,
    pub line_end: u32,
}

/// The engine reads exclusively from the DB (embeddings and metadata), the
/// chunk store (passages on hit), and the codemap (path weights).
pub struct SearchEngine<'a> {
    store: &'a Store,
    chunk_store: &'a ChunkStore,
    provider: &'a dyn EmbeddingProvider,
    reranker: Option<&'a dyn Reranker>,
    /// Per-chunk path weight from the codemap; absent means 1.
    path_weights: HashMap<String, f64>,
}

impl<'a> SearchEngine<'a> {
    pub fn new(
        store: &'a Store,
        chunk_store: &'a ChunkStore,
        provider: &'a dyn EmbeddingProvider,
    ) -> Self {
        Self {
            store,
            chunk_store,
            provider,
            reranker: None,
            path_weights: HashMap::new(),
        }
    }

    pub fn with_reranker(mut self, reranker: Option<&'a dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_path_weights(mut self, weights: HashMap<String, f64>) -> Self {
        self.path_weights = weights;
        self
    }

    /// Run the full pipeline and return at most `limit` hits.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let limit = if options.limit == 0 { 10 } else { options.limit };
        let _span =
            tracing::info_span!("search", limit, hybrid = options.hybrid, bm25 = options.bm25)
                .entered();

        let glob_set = compile_globs(&options.path_globs)?;
        let query_embedding = self.provider.generate_embedding(query)?;

        let all = self.store.candidates()?;
        let candidates: Vec<&CandidateRow> = all
            .iter()
            .filter(|c| passes_filters(c, options, glob_set.as_ref()))
            .collect();

        let vector_ranking = self.vector_ranking(&query_embedding, &candidates);
        let bm25_ranking = if options.bm25 {
            bm25_ranking(query, &candidates)
        } else {
            Vec::new()
        };

        // Fusion only applies when both signals are in play.
        let mut scores: HashMap<String, f64> = if options.hybrid && options.bm25 {
            let vector_ids: Vec<&str> = vector_ranking.iter().map(|(id, _)| id.as_str()).collect();
            let bm25_ids: Vec<&str> = bm25_ranking.iter().map(|(id, _)| id.as_str()).collect();
            rrf_fuse(&vector_ids, &bm25_ids)
        } else {
            vector_ranking.iter().cloned().collect()
        };

        if options.symbol_boost {
            self.apply_symbol_boost(query, &candidates, &mut scores);
        }

        let by_id: HashMap<&str, &CandidateRow> =
            candidates.iter().map(|c| (c.id.as_str(), *c)).collect();
        let mut ranked: Vec<(&CandidateRow, f64)> = scores
            .into_iter()
            .filter_map(|(id, score)| by_id.get(id.as_str()).map(|c| (*c, score)))
            .collect();
        sort_ranked(&mut ranked);

        if let Some(reranker) = self.reranker {
            ranked = self.rerank_head(query, ranked, limit, reranker)?;
        }

        ranked.truncate(limit);
        let hits: Vec<SearchHit> = ranked
            .into_iter()
            .map(|(c, score)| {
                let (line_start, line_end) = c.line_range();
                SearchHit {
                    id: c.id.clone(),
                    sha: c.sha.clone(),
                    path: c.file_path.clone(),
                    lang: c.lang.clone(),
                    symbol: if c.symbol.is_empty() {
                        None
                    } else {
                        Some(c.symbol.clone())
                    },
                    tags: c.tags(),
                    score,
                    line_start,
                    line_end,
                }
            })
            .collect();

        // Learning signals are best-effort; they never affect the result.
        if let Some(top) = hits.first() {
            if let Err(e) = self.store.record_search(&query.to_lowercase(), &top.sha) {
                tracing::warn!(error = %e, "failed to record search in learning tables");
            }
        }

        Ok(hits)
    }

    /// Read the chunk text for a hit.
    ///
    /// Missing chunk files are fatal for the hit they back.
    pub fn read_hit_content(&self, hit: &SearchHit) -> Result<String, SearchError> {
        Ok(self.chunk_store.read_chunk(&hit.sha)?)
    }

    fn vector_ranking(
        &self,
        query_embedding: &[f64],
        candidates: &[&CandidateRow],
    ) -> Vec<(String, f64)> {
        let provider_name = self.provider.name();
        let mut ranking: Vec<(String, f64)> = candidates
            .iter()
            .filter_map(|c| {
                let blob = c.embedding.as_ref()?;
                if c.embedding_provider.as_deref() != Some(provider_name) {
                    return None;
                }
                let dims = c.embedding_dimensions? as usize;
                // Dimension mismatches are silently skipped.
                if dims != query_embedding.len() {
                    return None;
                }
                let vector = match blob_to_embedding(blob) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(id = %c.id, error = %e, "undecodable embedding blob, skipping");
                        return None;
                    }
                };
                if vector.len() != dims {
                    tracing::warn!(
                        id = %c.id,
                        stored = vector.len(),
                        declared = dims,
                        "embedding length disagrees with embedding_dimensions, skipping"
                    );
                    return None;
                }
                Some((c.id.clone(), cosine_similarity(query_embedding, &vector)))
            })
            .collect();

        ranking.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranking
    }

    fn apply_symbol_boost(
        &self,
        query: &str,
        candidates: &[&CandidateRow],
        scores: &mut HashMap<String, f64>,
    ) {
        let query_tokens: HashSet<String> = Bm25Index::tokenize(query).into_iter().collect();
        for c in candidates {
            let Some(score) = scores.get_mut(&c.id) else {
                continue;
            };
            let weight = self.path_weights.get(&c.id).copied().unwrap_or(1.0);
            *score *= weight;

            if !query_tokens.is_empty() {
                // Substring containment so "parse" hits "parse_config".
                let symbol_lower = c.symbol.to_lowercase();
                if !symbol_lower.is_empty()
                    && query_tokens.iter().any(|t| symbol_lower.contains(t))
                {
                    *score += SYMBOL_TOKEN_BOOST;
                }
                let tag_tokens: HashSet<String> = c
                    .tags()
                    .iter()
                    .flat_map(|t| Bm25Index::tokenize(t))
                    .collect();
                if query_tokens.iter().any(|t| tag_tokens.contains(t)) {
                    *score += TAG_TOKEN_BOOST;
                }
            }
        }
    }

    /// Rerank the top 3×limit by reranker score, stable on ties.
    fn rerank_head<'c>(
        &self,
        query: &str,
        ranked: Vec<(&'c CandidateRow, f64)>,
        limit: usize,
        reranker: &dyn Reranker,
    ) -> Result<Vec<(&'c CandidateRow, f64)>, SearchError> {
        let head_len = (limit * 3).max(limit).min(ranked.len());
        let (head, tail) = ranked.split_at(head_len);

        let mut passages = Vec::with_capacity(head.len());
        let mut kept: Vec<(&CandidateRow, f64)> = Vec::with_capacity(head.len());
        for (c, score) in head {
            match self.chunk_store.read_chunk(&c.sha) {
                Ok(text) => {
                    passages.push(RerankCandidate {
                        id: c.id.clone(),
                        passage: text,
                    });
                    kept.push((*c, *score));
                }
                Err(ChunkStoreError::NotFound(sha)) => {
                    // Fatal for this hit only.
                    tracing::warn!(id = %c.id, sha = %sha, "referenced chunk file missing, dropping hit");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let rerank_scores = reranker.score(query, &passages)?;
        let mut indexed: Vec<(usize, (&CandidateRow, f64))> = kept
            .into_iter()
            .zip(rerank_scores)
            .enumerate()
            .map(|(i, ((c, _), rs))| (i, (c, rs)))
            .collect();
        // Stable with respect to prior order on ties.
        indexed.sort_by(|a, b| b.1 .1.total_cmp(&a.1 .1).then_with(|| a.0.cmp(&b.0)));

        let mut result: Vec<(&CandidateRow, f64)> =
            indexed.into_iter().map(|(_, pair)| pair).collect();
        result.extend(tail.iter().map(|(c, s)| (*c, *s)));
        Ok(result)
    }
}

fn compile_globs(patterns: &[String]) -> Result<Option<GlobSet>, SearchError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| SearchError::InvalidGlob(pattern.clone(), e.to_string()))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| SearchError::InvalidGlob(patterns.join(","), e.to_string()))?;
    Ok(Some(set))
}

fn passes_filters(c: &CandidateRow, options: &SearchOptions, globs: Option<&GlobSet>) -> bool {
    if !options.languages.is_empty()
        && !options
            .languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&c.lang))
    {
        return false;
    }
    if let Some(set) = globs {
        if !set.is_match(&c.file_path) {
            return false;
        }
    }
    if !options.tags.is_empty() {
        let chunk_tags = c.tags();
        if !options
            .tags
            .iter()
            .any(|t| chunk_tags.iter().any(|ct| ct.eq_ignore_ascii_case(t)))
        {
            return false;
        }
    }
    true
}

fn bm25_ranking(query: &str, candidates: &[&CandidateRow]) -> Vec<(String, f64)> {
    let mut index = Bm25Index::new();
    for c in candidates {
        index.add_document(c.id.clone(), &document_text(c));
    }
    index.search(query)
}

/// The BM25 document for a chunk: every textual signal the DB holds.
fn document_text(c: &CandidateRow) -> String {
    let mut parts = vec![c.symbol.clone(), c.file_path.replace(['/', '.'], " ")];
    parts.extend(c.tags());
    if let Some(intent) = &c.pampa_intent {
        parts.push(intent.clone());
    }
    if let Some(description) = &c.pampa_description {
        parts.push(description.clone());
    }
    if let Some(doc) = &c.doc_comments {
        parts.push(doc.clone());
    }
    parts.join(" ")
}

/// Reciprocal Rank Fusion with the standard constant.
fn rrf_fuse(vector_ids: &[&str], bm25_ids: &[&str]) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for (rank, id) in vector_ids.iter().enumerate() {
        // +1 converts 0-indexed enumerate to 1-indexed ranks.
        *scores.entry(id.to_string()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64 + 1.0);
    }
    for (rank, id) in bm25_ids.iter().enumerate() {
        *scores.entry(id.to_string()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64 + 1.0);
    }
    scores
}

/// Final ordering: score descending, then path ascending, then id.
fn sort_ranked(ranked: &mut [(&CandidateRow, f64)]) {
    ranked.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| a.0.file_path.cmp(&b.0.file_path))
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, path: &str) -> CandidateRow {
        CandidateRow {
            id: id.to_string(),
            file_path: path.to_string(),
            symbol: "handler".to_string(),
            sha: "0".repeat(40),
            lang: "rust".to_string(),
            chunk_type: "function".to_string(),
            embedding: None,
            embedding_provider: None,
            embedding_dimensions: None,
            pampa_tags: None,
            pampa_intent: None,
            pampa_description: None,
            doc_comments: None,
            context_info: None,
        }
    }

    #[test]
    fn test_rrf_rewards_overlap() {
        let scores = rrf_fuse(&["shared", "v_only"], &["shared", "b_only"]);
        assert!(scores["shared"] > scores["v_only"]);
        assert!(scores["shared"] > scores["b_only"]);
    }

    #[test]
    fn test_rrf_uses_standard_constant() {
        let scores = rrf_fuse(&["a"], &[]);
        assert!((scores["a"] - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_scores_positive() {
        let scores = rrf_fuse(&["a", "b"], &["c"]);
        assert!(scores.values().all(|s| *s > 0.0));
    }

    #[test]
    fn test_sort_ranked_tiebreaks() {
        let c1 = candidate("id_b", "src/b.rs");
        let c2 = candidate("id_a", "src/a.rs");
        let c3 = candidate("id_c", "src/a.rs");
        let mut ranked = vec![(&c1, 0.5), (&c2, 0.5), (&c3, 0.5)];
        sort_ranked(&mut ranked);
        // Equal scores: path ascending, then id ascending.
        assert_eq!(ranked[0].0.id, "id_a");
        assert_eq!(ranked[1].0.id, "id_c");
        assert_eq!(ranked[2].0.id, "id_b");
    }

    #[test]
    fn test_sort_ranked_score_dominates() {
        let c1 = candidate("a", "z.rs");
        let c2 = candidate("b", "a.rs");
        let mut ranked = vec![(&c2, 0.2), (&c1, 0.9)];
        sort_ranked(&mut ranked);
        assert_eq!(ranked[0].0.id, "a");
    }

    #[test]
    fn test_filters_language() {
        let c = candidate("a", "src/a.rs");
        let mut options = SearchOptions::default();
        options.languages = vec!["python".to_string()];
        assert!(!passes_filters(&c, &options, None));
        options.languages = vec!["RUST".to_string()];
        assert!(passes_filters(&c, &options, None));
    }

    #[test]
    fn test_filters_glob() {
        let c = candidate("a", "src/deep/a.rs");
        let options = SearchOptions::default();
        let set = compile_globs(&["src/**/*.rs".to_string()]).unwrap();
        assert!(passes_filters(&c, &options, set.as_ref()));
        let miss = compile_globs(&["tests/**".to_string()]).unwrap();
        assert!(!passes_filters(&c, &options, miss.as_ref()));
    }

    #[test]
    fn test_filters_tags() {
        let mut c = candidate("a", "src/a.rs");
        c.pampa_tags = Some(r#"["auth","database"]"#.to_string());
        let mut options = SearchOptions::default();
        options.tags = vec!["AUTH".to_string()];
        assert!(passes_filters(&c, &options, None));
        options.tags = vec!["frontend".to_string()];
        assert!(!passes_filters(&c, &options, None));
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let err = compile_globs(&["[bad".to_string()]);
        assert!(matches!(err, Err(SearchError::InvalidGlob(..))));
    }

    #[test]
    fn test_document_text_includes_metadata() {
        let mut c = candidate("a", "src/auth/login.rs");
        c.pampa_intent = Some("authenticate users".to_string());
        c.doc_comments = Some("Validates credentials".to_string());
        let doc = document_text(&c);
        assert!(doc.contains("handler"));
        assert!(doc.contains("auth"));
        assert!(doc.contains("authenticate users"));
        assert!(doc.contains("Validates credentials"));
    }
}

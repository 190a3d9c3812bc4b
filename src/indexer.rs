//! Index run orchestration
//!
//! A run is: walk the repository, read and chunk every candidate file,
//! embed in provider-sized batches, then persist (chunk files first, DB
//! rows in one transaction, codemap replaced atomically, orphaned chunk
//! files deleted last). Iteration order is the walker's sorted path list,
//! so two runs over identical inputs produce identical artifacts
//! (timestamps aside).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::chunker::{chunk_file, SourceChunk};
use crate::chunks::{compute_sha, ChunkStore, ChunkStoreError};
use crate::codemap::{ChunkMetadata, Codemap, CodemapError};
use crate::discovery::{self, DiscoveryError, IgnoreMatcher, WalkOptions};
use crate::language::language_for_path;
use crate::providers::EmbeddingProvider;
use crate::store::{ChunkRecord, Store, StoreError};

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("index run cancelled")]
    Cancelled,
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    ChunkStore(#[from] ChunkStoreError),
    #[error(transparent)]
    Codemap(#[from] CodemapError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal problem recorded in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunWarning {
    pub code: String,
    pub path: String,
    pub message: String,
}

/// What an index run accomplished.
#[derive(Debug, Serialize)]
pub struct IndexSummary {
    pub root: String,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks_indexed: usize,
    pub chunks_removed: usize,
    pub provider: String,
    pub dimensions: usize,
    pub encrypted: bool,
    pub completed_at: String,
    pub warnings: Vec<RunWarning>,
}

/// Drives one full index run.
pub struct Indexer<'a> {
    store: &'a Store,
    chunk_store: &'a ChunkStore,
    provider: &'a dyn EmbeddingProvider,
    cancel: Option<&'a AtomicBool>,
    /// Character budget per embedding input (approximates the provider's
    /// token limit).
    max_embed_chars: usize,
}

struct PendingChunk {
    file_path: String,
    lang: &'static str,
    chunk: SourceChunk,
    sha: String,
    id: String,
    embedding: Option<Vec<f64>>,
}

impl<'a> Indexer<'a> {
    pub fn new(
        store: &'a Store,
        chunk_store: &'a ChunkStore,
        provider: &'a dyn EmbeddingProvider,
    ) -> Self {
        Self {
            store,
            chunk_store,
            provider,
            cancel: None,
            max_embed_chars: 8191 * 4,
        }
    }

    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        // Rough chars-per-token factor; exact truncation belongs to the
        // provider, this just keeps requests bounded.
        self.max_embed_chars = max_tokens.max(1) * 4;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.map(|c| c.load(Ordering::SeqCst)).unwrap_or(false)
    }

    /// Run a full index of `root`, writing the codemap to `codemap_path`.
    pub fn run(
        &self,
        root: &Path,
        encrypt: bool,
        codemap_path: &Path,
    ) -> Result<IndexSummary, IndexerError> {
        let _span = tracing::info_span!("index_run", root = %root.display()).entered();

        let matcher = IgnoreMatcher::new(root).map_err(DiscoveryError::from)?;
        let root = matcher.root().to_path_buf();

        let mut walk_options = WalkOptions::new(&root);
        walk_options.matcher = Some(&matcher);
        let walked = discovery::walk(walk_options)?;

        let mut warnings: Vec<RunWarning> = walked
            .warnings
            .iter()
            .map(|w| RunWarning {
                code: w.code.as_str().to_string(),
                path: w.path.clone(),
                message: w.message.clone(),
            })
            .collect();

        // Read phase: UTF-8 is a hard requirement per file, not per run.
        let mut files: Vec<(String, &'static str, String)> = Vec::new();
        let mut files_skipped = 0usize;
        for rel in &walked.paths {
            if self.cancelled() {
                return Err(IndexerError::Cancelled);
            }
            let Some(lang) = language_for_path(rel) else {
                continue;
            };
            let bytes = match std::fs::read(root.join(rel)) {
                Ok(b) => b,
                Err(e) => {
                    files_skipped += 1;
                    warnings.push(RunWarning {
                        code: "read_failed".to_string(),
                        path: rel.clone(),
                        message: format!("failed to read file: {e}"),
                    });
                    continue;
                }
            };
            match String::from_utf8(bytes) {
                Ok(content) => files.push((rel.clone(), lang, content)),
                Err(e) => {
                    files_skipped += 1;
                    warnings.push(RunWarning {
                        code: "invalid_utf8".to_string(),
                        path: rel.clone(),
                        message: format!("file is not valid UTF-8, excluded: {e}"),
                    });
                }
            }
        }

        tracing::info!(
            files = files.len(),
            skipped = files_skipped,
            "discovery complete"
        );

        // Chunk phase: parallel per file, order preserved by collect.
        let chunked: Vec<(String, &'static str, Vec<SourceChunk>)> = files
            .into_par_iter()
            .map(|(path, lang, content)| {
                let chunks = chunk_file(lang, &content);
                (path, lang, chunks)
            })
            .collect();

        let files_indexed = chunked.len();
        let mut pending: Vec<PendingChunk> = Vec::new();
        for (path, lang, chunks) in chunked {
            for chunk in chunks {
                let sha = compute_sha(&chunk.text);
                // The composite ID uses ':' separators; identifiers with
                // colons (lua methods) would corrupt the format.
                let id_part = chunk.id_part.replace(':', ".");
                let id = format!("{path}:{id_part}:{}", &sha[..8]);
                pending.push(PendingChunk {
                    file_path: path.clone(),
                    lang,
                    chunk,
                    sha,
                    id,
                    embedding: None,
                });
            }
        }

        self.embed_pending(&mut pending, &mut warnings)?;

        if self.cancelled() {
            return Err(IndexerError::Cancelled);
        }

        // Chunk files are written before the DB rows that reference them.
        for p in &pending {
            self.chunk_store.write_chunk(&p.sha, &p.chunk.text, encrypt)?;
        }

        let records: Vec<ChunkRecord> = pending.iter().map(|p| self.to_record(p)).collect();
        let delta = self.store.apply_run(&records)?;

        let codemap = self.build_codemap(&pending, encrypt);
        codemap.write(codemap_path)?;

        let orphaned_files = self.reconcile_orphans(&pending, &mut warnings)?;
        if orphaned_files > 0 {
            tracing::info!(orphaned_files, "removed orphaned chunk files");
        }

        Ok(IndexSummary {
            root: root.to_string_lossy().to_string(),
            files_indexed,
            files_skipped,
            chunks_indexed: pending.len(),
            chunks_removed: delta.removed_ids.len(),
            provider: self.provider.name().to_string(),
            dimensions: self.provider.dimensions(),
            encrypted: encrypt,
            completed_at: crate::codemap::now_timestamp(),
            warnings,
        })
    }

    /// Batch embedding with retry-then-per-chunk fallback. A chunk whose
    /// embedding fails is persisted without one and excluded from vector
    /// search.
    fn embed_pending(
        &self,
        pending: &mut [PendingChunk],
        warnings: &mut Vec<RunWarning>,
    ) -> Result<(), IndexerError> {
        let batch_size = self.provider.max_batch_size().max(1);

        let mut at = 0;
        while at < pending.len() {
            if self.cancelled() {
                return Err(IndexerError::Cancelled);
            }
            let end = (at + batch_size).min(pending.len());
            let batch = &mut pending[at..end];
            let texts: Vec<String> = batch
                .iter()
                .map(|p| truncate_chars(&p.chunk.text, self.max_embed_chars).to_string())
                .collect();

            let mut batch_result = self.provider.generate_embeddings(&texts);
            if let Err(e) = &batch_result {
                tracing::warn!(error = %e, "embedding batch failed, retrying once");
                batch_result = self.provider.generate_embeddings(&texts);
            }

            match batch_result {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for (p, v) in batch.iter_mut().zip(vectors) {
                        p.embedding = Some(v);
                    }
                }
                other => {
                    if let Err(e) = other {
                        tracing::warn!(error = %e, "embedding batch failed twice, falling back per chunk");
                    }
                    for p in batch.iter_mut() {
                        let text = truncate_chars(&p.chunk.text, self.max_embed_chars);
                        match self.provider.generate_embedding(text) {
                            Ok(v) => p.embedding = Some(v),
                            Err(e) => {
                                warnings.push(RunWarning {
                                    code: "embedding_failed".to_string(),
                                    path: p.file_path.clone(),
                                    message: format!("embedding failed for {}: {e}", p.id),
                                });
                            }
                        }
                    }
                }
            }
            at = end;
        }
        Ok(())
    }

    fn to_record(&self, p: &PendingChunk) -> ChunkRecord {
        let tags = build_tags(p.lang, p.chunk.kind, &p.file_path, p.chunk.symbol.as_deref());
        let context_info = serde_json::json!({
            "line_start": p.chunk.line_start,
            "line_end": p.chunk.line_end,
        });

        ChunkRecord {
            id: p.id.clone(),
            file_path: p.file_path.clone(),
            symbol: p.chunk.symbol.clone().unwrap_or_default(),
            sha: p.sha.clone(),
            lang: p.lang.to_string(),
            chunk_type: p.chunk.kind.to_string(),
            embedding: p.embedding.clone(),
            embedding_provider: p.embedding.as_ref().map(|_| self.provider.name().to_string()),
            embedding_dimensions: p.embedding.as_ref().map(|v| v.len() as u32),
            pampa_tags: Some(serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string())),
            pampa_intent: None,
            pampa_description: None,
            doc_comments: p.chunk.doc.clone(),
            variables_used: Some(
                serde_json::to_string(&p.chunk.variables).unwrap_or_else(|_| "[]".to_string()),
            ),
            context_info: Some(context_info.to_string()),
        }
    }

    fn build_codemap(&self, pending: &[PendingChunk], encrypted: bool) -> Codemap {
        // Per-file symbol -> chunk id map for call target resolution.
        let mut file_symbols: HashMap<&str, HashMap<&str, &str>> = HashMap::new();
        for p in pending {
            if let Some(symbol) = &p.chunk.symbol {
                file_symbols
                    .entry(p.file_path.as_str())
                    .or_default()
                    .insert(symbol.as_str(), p.id.as_str());
            }
        }

        // Reverse call edges within each file.
        let mut callers: HashMap<&str, Vec<String>> = HashMap::new();
        for p in pending {
            let Some(caller) = &p.chunk.symbol else {
                continue;
            };
            for callee in &p.chunk.calls {
                if let Some(symbols) = file_symbols.get(p.file_path.as_str()) {
                    if let Some(id) = symbols.get(callee.as_str()) {
                        callers.entry(*id).or_default().push(caller.clone());
                    }
                }
            }
        }

        let mut codemap = Codemap::new();
        for p in pending {
            let targets: Vec<String> = p
                .chunk
                .calls
                .iter()
                .filter_map(|callee| {
                    file_symbols
                        .get(p.file_path.as_str())
                        .and_then(|symbols| symbols.get(callee.as_str()))
                        .map(|id| id.to_string())
                })
                .collect();

            let tags = build_tags(p.lang, p.chunk.kind, &p.file_path, p.chunk.symbol.as_deref());
            let synonyms = p
                .chunk
                .symbol
                .as_deref()
                .map(tokenize_symbol)
                .unwrap_or_default();

            codemap.insert(
                p.id.clone(),
                ChunkMetadata {
                    chunk_type: Some(p.chunk.kind.to_string()),
                    dimensions: p.embedding.as_ref().map(|v| v.len() as u32),
                    encrypted,
                    file: p.file_path.clone(),
                    has_documentation: p.chunk.doc.is_some(),
                    has_intent: false,
                    has_pampa_tags: !tags.is_empty(),
                    lang: p.lang.to_string(),
                    last_used_at: None,
                    path_weight: 1.0,
                    provider: p
                        .embedding
                        .as_ref()
                        .map(|_| self.provider.name().to_string()),
                    sha: p.sha.clone(),
                    success_rate: 0.0,
                    symbol: p.chunk.symbol.clone(),
                    symbol_call_targets: targets,
                    symbol_callers: callers.get(p.id.as_str()).cloned().unwrap_or_default(),
                    symbol_calls: p.chunk.calls.clone(),
                    symbol_neighbors: p.chunk.neighbors.clone(),
                    symbol_parameters: Some(p.chunk.parameters.clone()),
                    symbol_return: p.chunk.return_type.clone(),
                    symbol_signature: p.chunk.signature.clone(),
                    synonyms,
                    variable_count: p.chunk.variables.len() as u32,
                },
            );
        }
        codemap
    }

    /// Delete chunk files whose SHA no run chunk references any more.
    /// Covers both this run's removals and leftovers from aborted runs.
    fn reconcile_orphans(
        &self,
        pending: &[PendingChunk],
        warnings: &mut Vec<RunWarning>,
    ) -> Result<usize, IndexerError> {
        let referenced: HashSet<&str> = pending.iter().map(|p| p.sha.as_str()).collect();
        let mut removed = 0;
        for sha in self.chunk_store.list_shas()? {
            if !referenced.contains(sha.as_str()) {
                match self.chunk_store.remove_chunk(&sha) {
                    Ok(()) => removed += 1,
                    Err(e) => warnings.push(RunWarning {
                        code: "orphan_removal_failed".to_string(),
                        path: sha.clone(),
                        message: format!("failed to remove orphaned chunk: {e}"),
                    }),
                }
            }
        }
        Ok(removed)
    }
}

/// Truncate to a character budget without splitting a code point.
fn truncate_chars(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Tags for a chunk: language, kind, leading path segment, symbol tokens.
fn build_tags(lang: &str, kind: &str, file_path: &str, symbol: Option<&str>) -> Vec<String> {
    let mut tags = vec![lang.to_string(), kind.to_string()];
    if let Some(top) = file_path.split('/').next() {
        if top != file_path {
            tags.push(top.to_string());
        }
    }
    if let Some(symbol) = symbol {
        tags.extend(tokenize_symbol(symbol));
    }
    tags.dedup();
    tags
}

/// Split an identifier into lowercase tokens on case and underscore
/// boundaries: `parseConfigFile` -> [parse, config, file].
fn tokenize_symbol(symbol: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in symbol.chars() {
        if c == '_' || c == '-' || c == '.' || c == ':' {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && !current.is_empty()
            && current.chars().last().is_some_and(|l| l.is_lowercase())
        {
            tokens.push(std::mem::take(&mut current));
            current.push(c.to_ascii_lowercase());
        } else {
            current.push(c.to_ascii_lowercase());
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens.retain(|t| t.len() > 1);
    tokens
}

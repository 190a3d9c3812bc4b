//! Store helper types, embedding BLOB conversion, and JSON field validation

use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),
}

/// A chunk row prepared for insertion.
///
/// `symbol` is never NULL in the database; a chunk without a symbol stores
/// the empty string (the codemap is where absence becomes JSON `null`).
#[derive(Debug, Clone, Default)]
pub struct ChunkRecord {
    pub id: String,
    pub file_path: String,
    pub symbol: String,
    pub sha: String,
    pub lang: String,
    pub chunk_type: String,
    pub embedding: Option<Vec<f64>>,
    pub embedding_provider: Option<String>,
    pub embedding_dimensions: Option<u32>,
    /// JSON array text, validated on write.
    pub pampa_tags: Option<String>,
    pub pampa_intent: Option<String>,
    pub pampa_description: Option<String>,
    pub doc_comments: Option<String>,
    /// JSON array text, validated on write.
    pub variables_used: Option<String>,
    /// JSON object text, validated on write.
    pub context_info: Option<String>,
}

/// A full chunk row as read back for search.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub id: String,
    pub file_path: String,
    pub symbol: String,
    pub sha: String,
    pub lang: String,
    pub chunk_type: String,
    pub embedding: Option<Vec<u8>>,
    pub embedding_provider: Option<String>,
    pub embedding_dimensions: Option<i64>,
    pub pampa_tags: Option<String>,
    pub pampa_intent: Option<String>,
    pub pampa_description: Option<String>,
    pub doc_comments: Option<String>,
    pub context_info: Option<String>,
}

impl CandidateRow {
    /// Parse `pampa_tags` into a vector; NULL or malformed yields empty.
    pub fn tags(&self) -> Vec<String> {
        self.pampa_tags
            .as_deref()
            .and_then(|t| serde_json::from_str::<Vec<String>>(t).ok())
            .unwrap_or_default()
    }

    /// Line range recorded by the indexer inside `context_info`.
    pub fn line_range(&self) -> (u32, u32) {
        let parsed: Option<serde_json::Value> = self
            .context_info
            .as_deref()
            .and_then(|c| serde_json::from_str(c).ok());
        let get = |v: &serde_json::Value, key: &str| {
            v.get(key).and_then(|n| n.as_u64()).unwrap_or(0) as u32
        };
        match parsed {
            Some(v) => (get(&v, "line_start"), get(&v, "line_end")),
            None => (0, 0),
        }
    }
}

/// Aggregate statistics for the `info` command.
#[derive(Debug, Default, serde::Serialize)]
pub struct IndexStats {
    pub total_chunks: u64,
    pub total_files: u64,
    pub chunks_by_language: HashMap<String, u64>,
    pub chunks_by_provider: HashMap<String, u64>,
    pub chunks_without_embedding: u64,
    pub intention_cache_entries: u64,
    pub query_patterns: u64,
    pub db_size_bytes: u64,
}

/// What a run changed: rows deleted and the SHAs they released.
#[derive(Debug, Default)]
pub struct RunDelta {
    pub removed_ids: Vec<String>,
    pub removed_shas: Vec<String>,
}

// ============ Embedding BLOB ============

/// Encode an embedding as the BLOB contract requires: UTF-8 bytes of a
/// compact JSON array of doubles, no whitespace, shortest round-trip
/// number formatting. NaN and infinities are rejected.
pub fn embedding_to_blob(vector: &[f64]) -> Result<Vec<u8>, StoreError> {
    if let Some(bad) = vector.iter().find(|v| !v.is_finite()) {
        return Err(StoreError::InvalidEmbedding(format!(
            "non-finite component {bad} cannot be stored"
        )));
    }
    serde_json::to_vec(vector).map_err(|e| StoreError::InvalidEmbedding(e.to_string()))
}

/// Decode an embedding BLOB back into a vector.
pub fn blob_to_embedding(bytes: &[u8]) -> Result<Vec<f64>, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::InvalidEmbedding(e.to_string()))
}

// ============ JSON field validation ============

/// Expected shape of a JSON-typed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Array,
    Object,
}

/// Validate a JSON-typed field before insertion.
///
/// Returns the trimmed value when it parses to the expected shape.
/// Violations (bad syntax, wrong shape, empty string) warn and yield None
/// so the column stores NULL; a bad metadata field never aborts an insert.
pub fn validate_json_field(field: &str, value: Option<&str>, shape: JsonShape) -> Option<String> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!(field, "invalid JSON field, skipping: empty value");
        return None;
    }

    let parsed: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(field, error = %e, "invalid JSON field, skipping");
            return None;
        }
    };

    let ok = match shape {
        JsonShape::Array => parsed.is_array(),
        JsonShape::Object => parsed.is_object(),
    };
    if !ok {
        tracing::warn!(
            field,
            expected = ?shape,
            "invalid JSON field, skipping: wrong shape"
        );
        return None;
    }

    Some(trimmed.to_string())
}

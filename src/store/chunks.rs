//! Chunk row CRUD: run application, candidate loading, statistics

use std::collections::HashSet;

use sqlx::Row;

use super::helpers::{
    embedding_to_blob, validate_json_field, CandidateRow, ChunkRecord, IndexStats, JsonShape,
    RunDelta, StoreError,
};
use super::Store;

impl Store {
    /// Apply an index run: upsert every record and delete rows the run no
    /// longer references, all in a single transaction.
    ///
    /// Returns the deleted ids plus the SHAs they released (SHAs that no
    /// surviving row references) so the indexer can reconcile chunk files.
    pub fn apply_run(&self, records: &[ChunkRecord]) -> Result<RunDelta, StoreError> {
        let new_ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let new_shas: HashSet<&str> = records.iter().map(|r| r.sha.as_str()).collect();

        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;

            let existing: Vec<(String, String)> =
                sqlx::query_as("SELECT id, sha FROM code_chunks")
                    .fetch_all(&mut *tx)
                    .await?;

            let mut delta = RunDelta::default();
            for (id, sha) in existing {
                if !new_ids.contains(id.as_str()) {
                    delta.removed_ids.push(id);
                    if !new_shas.contains(sha.as_str()) {
                        delta.removed_shas.push(sha);
                    }
                }
            }
            delta.removed_shas.sort();
            delta.removed_shas.dedup();

            for id in &delta.removed_ids {
                sqlx::query("DELETE FROM code_chunks WHERE id = ?1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }

            for record in records {
                let embedding_blob = match &record.embedding {
                    Some(v) => Some(embedding_to_blob(v)?),
                    None => None,
                };
                // A bad metadata field is skipped (NULL), never a failed insert.
                let pampa_tags =
                    validate_json_field("pampa_tags", record.pampa_tags.as_deref(), JsonShape::Array);
                let variables_used = validate_json_field(
                    "variables_used",
                    record.variables_used.as_deref(),
                    JsonShape::Array,
                );
                let context_info = validate_json_field(
                    "context_info",
                    record.context_info.as_deref(),
                    JsonShape::Object,
                );

                sqlx::query(
                    "INSERT INTO code_chunks (
                         id, file_path, symbol, sha, lang, chunk_type,
                         embedding, embedding_provider, embedding_dimensions,
                         pampa_tags, pampa_intent, pampa_description,
                         doc_comments, variables_used, context_info
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                     ON CONFLICT(id) DO UPDATE SET
                         file_path = excluded.file_path,
                         symbol = excluded.symbol,
                         sha = excluded.sha,
                         lang = excluded.lang,
                         chunk_type = excluded.chunk_type,
                         embedding = excluded.embedding,
                         embedding_provider = excluded.embedding_provider,
                         embedding_dimensions = excluded.embedding_dimensions,
                         pampa_tags = excluded.pampa_tags,
                         pampa_intent = excluded.pampa_intent,
                         pampa_description = excluded.pampa_description,
                         doc_comments = excluded.doc_comments,
                         variables_used = excluded.variables_used,
                         context_info = excluded.context_info,
                         updated_at = CURRENT_TIMESTAMP",
                )
                .bind(&record.id)
                .bind(&record.file_path)
                .bind(&record.symbol)
                .bind(&record.sha)
                .bind(&record.lang)
                .bind(&record.chunk_type)
                .bind(embedding_blob)
                .bind(&record.embedding_provider)
                .bind(record.embedding_dimensions.map(|d| d as i64))
                .bind(pampa_tags)
                .bind(&record.pampa_intent)
                .bind(&record.pampa_description)
                .bind(&record.doc_comments)
                .bind(variables_used)
                .bind(context_info)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(delta)
        })
    }

    /// Load every chunk row for search candidate scoring.
    pub fn candidates(&self) -> Result<Vec<CandidateRow>, StoreError> {
        self.rt.block_on(async {
            let rows = sqlx::query(
                "SELECT id, file_path, symbol, sha, lang, chunk_type,
                        embedding, embedding_provider, embedding_dimensions,
                        pampa_tags, pampa_intent, pampa_description,
                        doc_comments, context_info
                 FROM code_chunks
                 ORDER BY file_path ASC, id ASC",
            )
            .fetch_all(&self.pool)
            .await?;

            Ok(rows
                .into_iter()
                .map(|row| CandidateRow {
                    id: row.get(0),
                    file_path: row.get(1),
                    symbol: row.get(2),
                    sha: row.get(3),
                    lang: row.get(4),
                    chunk_type: row.get(5),
                    embedding: row.get(6),
                    embedding_provider: row.get(7),
                    embedding_dimensions: row.get(8),
                    pampa_tags: row.get(9),
                    pampa_intent: row.get(10),
                    pampa_description: row.get(11),
                    doc_comments: row.get(12),
                    context_info: row.get(13),
                })
                .collect())
        })
    }

    /// SHAs referenced by any current row.
    pub fn referenced_shas(&self) -> Result<Vec<String>, StoreError> {
        self.rt.block_on(async {
            let rows: Vec<(String,)> =
                sqlx::query_as("SELECT DISTINCT sha FROM code_chunks ORDER BY sha")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows.into_iter().map(|(sha,)| sha).collect())
        })
    }

    /// Aggregate statistics for the `info` command.
    pub fn stats(&self, db_path: &std::path::Path) -> Result<IndexStats, StoreError> {
        let db_size_bytes = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

        self.rt.block_on(async {
            let mut stats = IndexStats {
                db_size_bytes,
                ..Default::default()
            };

            let (total,): (i64,) = sqlx::query_as("SELECT COUNT(1) FROM code_chunks")
                .fetch_one(&self.pool)
                .await?;
            stats.total_chunks = total as u64;

            let (files,): (i64,) =
                sqlx::query_as("SELECT COUNT(DISTINCT file_path) FROM code_chunks")
                    .fetch_one(&self.pool)
                    .await?;
            stats.total_files = files as u64;

            let langs: Vec<(String, i64)> =
                sqlx::query_as("SELECT lang, COUNT(1) FROM code_chunks GROUP BY lang")
                    .fetch_all(&self.pool)
                    .await?;
            for (lang, count) in langs {
                stats.chunks_by_language.insert(lang, count as u64);
            }

            let providers: Vec<(String, i64)> = sqlx::query_as(
                "SELECT embedding_provider, COUNT(1) FROM code_chunks
                 WHERE embedding_provider IS NOT NULL GROUP BY embedding_provider",
            )
            .fetch_all(&self.pool)
            .await?;
            for (provider, count) in providers {
                stats.chunks_by_provider.insert(provider, count as u64);
            }

            let (missing,): (i64,) =
                sqlx::query_as("SELECT COUNT(1) FROM code_chunks WHERE embedding IS NULL")
                    .fetch_one(&self.pool)
                    .await?;
            stats.chunks_without_embedding = missing as u64;

            let (intentions,): (i64,) = sqlx::query_as("SELECT COUNT(1) FROM intention_cache")
                .fetch_one(&self.pool)
                .await?;
            stats.intention_cache_entries = intentions as u64;

            let (patterns,): (i64,) = sqlx::query_as("SELECT COUNT(1) FROM query_patterns")
                .fetch_one(&self.pool)
                .await?;
            stats.query_patterns = patterns as u64;

            Ok(stats)
        })
    }
}

//! SQLite storage for chunk rows and embeddings (sqlx async with sync wrappers)
//!
//! Callers use the `Store` synchronously; internally a tokio runtime
//! executes the sqlx operations. SQLite is single-writer, multi-reader:
//! the indexer commits one transaction per run, readers take shared locks.
//!
//! The v1 schema is frozen. Databases are created with `page_size=4096`,
//! `journal_mode=delete`, UTF-8 encoding, and foreign keys off; databases
//! created elsewhere with other page sizes are still readable.

mod chunks;
pub(crate) mod helpers;

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::runtime::Runtime;

pub use helpers::{
    blob_to_embedding, embedding_to_blob, validate_json_field, CandidateRow, ChunkRecord,
    IndexStats, JsonShape, RunDelta, StoreError,
};

/// Synchronous facade over a pooled SQLite connection.
pub struct Store {
    pub(crate) pool: SqlitePool,
    pub(crate) rt: Runtime,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let rt = Runtime::new().map_err(|e| StoreError::Runtime(e.to_string()))?;

        // Forward slashes keep the URL form valid on Windows.
        let path_str = path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{path_str}?mode=rwc");

        let pool = rt.block_on(async {
            SqlitePoolOptions::new()
                .max_connections(4)
                .after_connect(|conn, _meta| {
                    Box::pin(async move {
                        // Page size and encoding only take effect before the
                        // first page is written; existing databases keep
                        // whatever they were created with.
                        sqlx::query("PRAGMA page_size = 4096")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA encoding = 'UTF-8'")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA journal_mode = DELETE")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA foreign_keys = OFF")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA busy_timeout = 5000")
                            .execute(&mut *conn)
                            .await?;
                        Ok(())
                    })
                })
                .connect(&db_url)
                .await
        })?;

        let store = Self { pool, rt };
        tracing::debug!(path = %path.display(), "database connected");
        Ok(store)
    }

    /// Create the v1 schema. Safe to call on an existing database.
    pub fn init(&self) -> Result<(), StoreError> {
        self.rt.block_on(async {
            let schema = include_str!("schema.sql");
            for statement in schema.split(';') {
                let stmt: String = statement
                    .lines()
                    .filter(|line| !line.trim().starts_with("--"))
                    .collect::<Vec<_>>()
                    .join("\n");
                let stmt = stmt.trim();
                if stmt.is_empty() {
                    continue;
                }
                sqlx::query(stmt).execute(&self.pool).await?;
            }
            tracing::debug!("schema initialized");
            Ok(())
        })
    }

    /// Record a successful search for the learning tables: the normalized
    /// query maps to its top hit in `intention_cache`, and the raw pattern
    /// counts a use in `query_patterns`. Failures here never affect search
    /// results; callers log and move on.
    pub fn record_search(&self, normalized_query: &str, top_sha: &str) -> Result<(), StoreError> {
        if normalized_query.is_empty() || top_sha.is_empty() {
            return Ok(());
        }
        self.rt.block_on(async {
            sqlx::query(
                "INSERT INTO intention_cache (query_normalized, target_sha)
                 VALUES (?1, ?2)
                 ON CONFLICT(query_normalized) DO UPDATE SET
                     target_sha = excluded.target_sha,
                     usage_count = usage_count + 1,
                     last_used = CURRENT_TIMESTAMP",
            )
            .bind(normalized_query)
            .bind(top_sha)
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "INSERT INTO query_patterns (pattern)
                 VALUES (?1)
                 ON CONFLICT(pattern) DO UPDATE SET
                     frequency = frequency + 1,
                     updated_at = CURRENT_TIMESTAMP",
            )
            .bind(normalized_query)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    /// Look up a cached intention for a normalized query.
    pub fn cached_intention(&self, normalized_query: &str) -> Result<Option<String>, StoreError> {
        self.rt.block_on(async {
            let row: Option<(String,)> = sqlx::query_as(
                "SELECT target_sha FROM intention_cache WHERE query_normalized = ?1",
            )
            .bind(normalized_query)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(sha,)| sha))
        })
    }

    /// Close the pool. Also happens implicitly on drop.
    pub fn close(self) {
        self.rt.block_on(async {
            self.pool.close().await;
        });
    }
}

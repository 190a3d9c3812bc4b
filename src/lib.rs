//! # pampax - Local Semantic Code Index
//!
//! Walks a source repository, splits files into symbol-aware chunks,
//! computes embeddings, and serves hybrid (BM25 + vector) ranked queries.
//! Every run produces portable, interchangeable artifacts:
//!
//! - `.pampa/pampa.db`: SQLite database of chunks and embeddings
//! - `.pampa/chunks/{sha}.gz[.enc]`: content-addressed chunk store,
//!   optionally AES-256-GCM encrypted
//! - `pampa.codemap.json`: human-readable manifest with observable
//!   insertion order
//!
//! ## Quick start
//!
//! ```no_run
//! use pampax::chunks::ChunkStore;
//! use pampax::indexer::Indexer;
//! use pampax::providers::{create_provider, ProviderConfig};
//! use pampax::store::Store;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let root = Path::new(".");
//! let store = Store::open(Path::new(".pampa/pampa.db"))?;
//! store.init()?;
//! let chunk_store = ChunkStore::new(".pampa/chunks", None);
//! let provider = create_provider("local", &ProviderConfig::default())?;
//!
//! let indexer = Indexer::new(&store, &chunk_store, provider.as_ref());
//! let summary = indexer.run(root, false, Path::new("pampa.codemap.json"))?;
//! println!("indexed {} chunks", summary.chunks_indexed);
//! # Ok(())
//! # }
//! ```

pub mod chunker;
pub mod chunks;
pub mod cli;
pub mod codemap;
pub mod config;
pub mod discovery;
pub mod indexer;
pub mod language;
pub mod providers;
pub mod reranker;
pub mod search;
pub mod store;

pub(crate) mod math;
pub(crate) mod pathutil;

pub use chunks::{compute_sha, ChunkStore, ChunkStoreError};
pub use codemap::{ChunkMetadata, Codemap};
pub use indexer::{IndexSummary, Indexer};
pub use providers::{create_provider, EmbeddingProvider, ProviderConfig};
pub use search::{SearchEngine, SearchHit, SearchOptions};
pub use store::{ChunkRecord, Store};

/// Name of the per-repository artifact directory.
pub const PAMPA_DIR: &str = ".pampa";

/// Database filename inside [`PAMPA_DIR`].
pub const DB_FILE: &str = "pampa.db";

/// Chunk store directory name inside [`PAMPA_DIR`].
pub const CHUNKS_DIR: &str = "chunks";

/// Codemap filename at the repository root.
pub const CODEMAP_FILE: &str = "pampa.codemap.json";

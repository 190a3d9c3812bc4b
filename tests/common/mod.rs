//! Common test fixtures and helpers
//!
//! Usage in test files:
//! ```ignore
//! mod common;
//! use common::TestRepo;
//! ```

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use pampax::chunks::ChunkStore;
use pampax::providers::{create_provider, EmbeddingProvider, ProviderConfig};
use pampax::store::Store;
use tempfile::TempDir;

/// A temporary repository with `.pampa` artifact paths wired up.
pub struct TestRepo {
    pub dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp repo"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file under the repo root, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).expect("create parent dirs");
        std::fs::write(path, content).expect("write file");
    }

    /// Write raw bytes (for non-UTF-8 fixtures).
    pub fn write_bytes(&self, rel: &str, content: &[u8]) {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).expect("create parent dirs");
        std::fs::write(path, content).expect("write file");
    }

    pub fn db_path(&self) -> PathBuf {
        self.root().join(".pampa/pampa.db")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.root().join(".pampa/chunks")
    }

    pub fn codemap_path(&self) -> PathBuf {
        self.root().join("pampa.codemap.json")
    }

    /// Open (and initialize) the store for this repo.
    pub fn open_store(&self) -> Store {
        std::fs::create_dir_all(self.root().join(".pampa")).expect("create .pampa");
        let store = Store::open(&self.db_path()).expect("open store");
        store.init().expect("init schema");
        store
    }

    pub fn chunk_store(&self, master_key: Option<[u8; 32]>) -> ChunkStore {
        ChunkStore::new(self.chunks_dir(), master_key)
    }
}

/// The deterministic local provider (no network, stable vectors).
pub fn local_provider() -> Box<dyn EmbeddingProvider> {
    create_provider("local", &ProviderConfig::default()).expect("local provider")
}

/// A 32-byte test master key.
pub fn test_master_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    for (i, b) in key.iter_mut().enumerate() {
        *b = (i * 7 % 251) as u8;
    }
    key
}

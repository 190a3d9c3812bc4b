//! Content-addressed chunk store
//!
//! Chunks live in a flat directory keyed by the SHA-1 of their raw bytes:
//! `{sha}.gz` for plaintext or `{sha}.gz.enc` for the encrypted envelope.
//! The two forms are mutually exclusive per SHA: writing one removes any
//! residual file of the other. Writes go through an in-directory temp file
//! and rename so readers never see a partial payload.

mod encrypt;
mod gzip;
mod sha;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use encrypt::{decrypt, derive_chunk_key, encrypt, parse_master_key};
pub use gzip::{compress, decompress};
pub use sha::compute_sha;

use crate::pathutil::{retry_io, write_atomic};

/// Chunk store operation errors.
#[derive(Error, Debug)]
pub enum ChunkStoreError {
    #[error("sha is required")]
    EmptySha,
    #[error("chunk {0} not found")]
    NotFound(String),
    #[error("chunk {0} is encrypted and no key was provided")]
    EncryptedNoKey(String),
    #[error("chunk authentication failed: payload was tampered with or the key does not match")]
    AuthFailed,
    #[error("{0}")]
    InvalidMasterKey(String),
    #[error("{0}")]
    MalformedPayload(String),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed chunk store rooted at a single flat directory.
pub struct ChunkStore {
    dir: PathBuf,
    master_key: Option<[u8; 32]>,
}

impl ChunkStore {
    /// Create a store over `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, master_key: Option<[u8; 32]>) -> Self {
        Self {
            dir: dir.into(),
            master_key,
        }
    }

    /// The directory chunks are stored in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a master key is configured.
    pub fn has_key(&self) -> bool {
        self.master_key.is_some()
    }

    fn plain_path(&self, sha: &str) -> PathBuf {
        self.dir.join(format!("{sha}.gz"))
    }

    fn encrypted_path(&self, sha: &str) -> PathBuf {
        self.dir.join(format!("{sha}.gz.enc"))
    }

    /// Write a chunk as `{sha}.gz` or `{sha}.gz.enc`.
    ///
    /// The residual file of the other mode is deleted so the two variants
    /// stay mutually exclusive for a given SHA.
    pub fn write_chunk(&self, sha: &str, code: &str, encrypted: bool) -> Result<(), ChunkStoreError> {
        if sha.is_empty() {
            return Err(ChunkStoreError::EmptySha);
        }
        retry_io(|| std::fs::create_dir_all(&self.dir))?;

        let compressed = compress(code.as_bytes())?;
        let plain = self.plain_path(sha);
        let enc = self.encrypted_path(sha);

        if encrypted {
            let key = self
                .master_key
                .as_ref()
                .ok_or_else(|| ChunkStoreError::EncryptedNoKey(sha.to_string()))?;
            let payload = encrypt(&compressed, key)?;
            retry_io(|| write_atomic(&enc, &payload))?;
            remove_if_exists(&plain)?;
        } else {
            retry_io(|| write_atomic(&plain, &compressed))?;
            remove_if_exists(&enc)?;
        }

        Ok(())
    }

    /// Read a chunk back, preferring the encrypted variant when present.
    ///
    /// An encrypted chunk without a configured master key is a distinct
    /// error ([`ChunkStoreError::EncryptedNoKey`]); so is an authentication
    /// tag failure; the payload is never silently truncated.
    pub fn read_chunk(&self, sha: &str) -> Result<String, ChunkStoreError> {
        if sha.is_empty() {
            return Err(ChunkStoreError::EmptySha);
        }

        let enc = self.encrypted_path(sha);
        let plain = self.plain_path(sha);

        let raw = if enc.exists() {
            let payload = std::fs::read(&enc)?;
            let key = self
                .master_key
                .as_ref()
                .ok_or_else(|| ChunkStoreError::EncryptedNoKey(sha.to_string()))?;
            decrypt(&payload, key)?
        } else {
            match std::fs::read(&plain) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ChunkStoreError::NotFound(sha.to_string()))
                }
                Err(e) => return Err(e.into()),
            }
        };

        let decompressed = decompress(&raw)?;
        String::from_utf8(decompressed).map_err(|e| {
            ChunkStoreError::MalformedPayload(format!("chunk {sha} is not valid UTF-8: {e}"))
        })
    }

    /// Delete both the plaintext and encrypted variants for a SHA.
    pub fn remove_chunk(&self, sha: &str) -> Result<(), ChunkStoreError> {
        if sha.is_empty() {
            return Err(ChunkStoreError::EmptySha);
        }
        remove_if_exists(&self.plain_path(sha))?;
        remove_if_exists(&self.encrypted_path(sha))?;
        Ok(())
    }

    /// List the SHAs of every chunk file currently on disk.
    ///
    /// Used by the indexer to reconcile orphans at the end of a run.
    pub fn list_shas(&self) -> Result<Vec<String>, ChunkStoreError> {
        let mut shas = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(shas),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let sha = name
                .strip_suffix(".gz.enc")
                .or_else(|| name.strip_suffix(".gz"));
            if let Some(sha) = sha {
                if sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit()) {
                    shas.push(sha.to_string());
                }
            }
        }
        shas.sort();
        shas.dedup();
        Ok(shas)
    }
}

fn remove_if_exists(path: &Path) -> Result<(), ChunkStoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

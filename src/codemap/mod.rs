//! Codemap artifact: insertion-ordered JSON manifest of chunk metadata
//!
//! The codemap maps chunk IDs to metadata objects. Two ordering rules are
//! part of the on-disk contract and must survive round-trips:
//!
//! - Top-level keys appear in insertion order, never alphabetized.
//! - Within each value object, keys appear in ascending lexicographic order.
//!
//! Output is 2-space indented, LF-only, and ends with a trailing newline.
//! `symbol` is always present (`null` when the chunk has none); the
//! `synonyms` / `symbol_calls` / `symbol_call_targets` / `symbol_callers` /
//! `symbol_neighbors` arrays are always present; `symbol_parameters` is
//! omitted entirely when empty, as are the optional strings.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::pathutil::{normalize_relative, write_atomic};

#[derive(Error, Debug)]
pub enum CodemapError {
    #[error("serialize codemap: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Format a timestamp the way codemap fields expect:
/// `YYYY-MM-DDTHH:MM:SS.sssZ` (UTC, millisecond precision).
pub fn format_timestamp(t: chrono::DateTime<chrono::Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// The current time in codemap timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(chrono::Utc::now())
}

/// Metadata for a single chunk.
///
/// Fields are declared in the lexicographic order of their serialized names
/// so the derived serializer emits value-object keys in the contract order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkMetadata {
    #[serde(rename = "chunkType", skip_serializing_if = "Option::is_none")]
    pub chunk_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    pub encrypted: bool,
    pub file: String,
    #[serde(rename = "hasDocumentation")]
    pub has_documentation: bool,
    #[serde(rename = "hasIntent")]
    pub has_intent: bool,
    #[serde(rename = "hasPampaTags")]
    pub has_pampa_tags: bool,
    pub lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    pub path_weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub sha: String,
    pub success_rate: f64,
    pub symbol: Option<String>,
    pub symbol_call_targets: Vec<String>,
    pub symbol_callers: Vec<String>,
    pub symbol_calls: Vec<String>,
    pub symbol_neighbors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_parameters: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_return: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_signature: Option<String>,
    pub synonyms: Vec<String>,
    #[serde(rename = "variableCount")]
    pub variable_count: u32,
}

impl ChunkMetadata {
    /// Normalize metadata before it enters the map.
    ///
    /// Paths get forward slashes, strings are trimmed (empty becomes
    /// absent), arrays are deduplicated preserving first occurrence, and
    /// numeric fields are clamped to their documented ranges.
    pub fn normalized(mut self) -> Self {
        self.file = normalize_relative(&self.file);
        self.symbol = self
            .symbol
            .and_then(|s| non_empty_trimmed(&s));
        self.synonyms = sanitize_string_array(self.synonyms);
        self.symbol_calls = sanitize_string_array(self.symbol_calls);
        self.symbol_call_targets = sanitize_string_array(self.symbol_call_targets);
        self.symbol_callers = sanitize_string_array(self.symbol_callers);
        self.symbol_neighbors = sanitize_string_array(self.symbol_neighbors);

        self.symbol_parameters = self.symbol_parameters.and_then(|params| {
            let params = sanitize_string_array(params);
            if params.is_empty() {
                None
            } else {
                Some(params)
            }
        });

        self.symbol_signature = self.symbol_signature.and_then(|s| non_empty_trimmed(&s));
        self.symbol_return = self.symbol_return.and_then(|s| non_empty_trimmed(&s));
        self.chunk_type = self.chunk_type.and_then(|s| non_empty_trimmed(&s));
        self.provider = self.provider.and_then(|s| non_empty_trimmed(&s));
        self.last_used_at = self.last_used_at.and_then(|s| non_empty_trimmed(&s));

        self.dimensions = self.dimensions.filter(|&d| d > 0);

        if self.path_weight <= 0.0 || !self.path_weight.is_finite() {
            self.path_weight = 1.0;
        }
        if !self.success_rate.is_finite() || self.success_rate < 0.0 {
            self.success_rate = 0.0;
        }
        if self.success_rate > 1.0 {
            self.success_rate = 1.0;
        }

        self
    }
}

fn non_empty_trimmed(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn sanitize_string_array(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter_map(|v| non_empty_trimmed(&v))
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

/// The codemap: chunk ID -> metadata, with observable insertion order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Codemap {
    keys: Vec<String>,
    entries: HashMap<String, ChunkMetadata>,
}

impl Codemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. First insertion fixes the key's position.
    ///
    /// Metadata is normalized on the way in so the in-memory map always
    /// equals its serialized form.
    pub fn insert(&mut self, id: impl Into<String>, metadata: ChunkMetadata) {
        let id = id.into();
        if !self.entries.contains_key(&id) {
            self.keys.push(id.clone());
        }
        self.entries.insert(id, metadata.normalized());
    }

    pub fn get(&self, id: &str) -> Option<&ChunkMetadata> {
        self.entries.get(id)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ChunkMetadata)> {
        self.keys.iter().map(move |k| (k, &self.entries[k]))
    }

    /// Serialize to the canonical on-disk bytes: 2-space indent, LF
    /// newlines, trailing newline.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodemapError> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::pretty(&mut buf);
        self.serialize(&mut ser)?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Parse codemap bytes, preserving document order of the top-level keys.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodemapError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Atomically replace the codemap file at `path`.
    pub fn write(&self, path: &Path) -> Result<(), CodemapError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let payload = self.to_bytes()?;
        write_atomic(path, &payload)?;
        Ok(())
    }

    /// Load the codemap from `path`. A missing file yields an empty map.
    pub fn load(path: &Path) -> Result<Self, CodemapError> {
        match std::fs::read(path) {
            Ok(bytes) => Self::parse(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Serialize for Codemap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.keys.len()))?;
        for key in &self.keys {
            map.serialize_entry(key, &self.entries[key])?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Codemap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CodemapVisitor;

        impl<'de> Visitor<'de> for CodemapVisitor {
            type Value = Codemap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of chunk IDs to chunk metadata")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut codemap = Codemap::new();
                while let Some((key, value)) = access.next_entry::<String, ChunkMetadata>()? {
                    codemap.insert(key, value);
                }
                Ok(codemap)
            }
        }

        deserializer.deserialize_map(CodemapVisitor)
    }
}

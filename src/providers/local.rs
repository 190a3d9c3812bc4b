//! Local embedding provider
//!
//! Produces deterministic vectors derived from the input bytes, with no
//! model download and no network. Model inference itself is outside the core (the
//! spec exposes providers only through the trait), so the local provider
//! guarantees the properties the rest of the system relies on: stable
//! output for identical input, correct dimensions, full offline operation.

use super::{effective_dimensions, EmbeddingProvider, ProviderConfig, ProviderError};

const DEFAULT_MODEL: &str = "Xenova/all-MiniLM-L6-v2";
const DEFAULT_DIMENSIONS: usize = 384;

pub struct LocalProvider {
    model: String,
    dimensions: usize,
}

impl LocalProvider {
    pub fn new(cfg: &ProviderConfig) -> Self {
        let model = if cfg.transformers_model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            cfg.transformers_model.trim().to_string()
        };
        Self {
            model,
            dimensions: effective_dimensions(cfg.dimensions, DEFAULT_DIMENSIONS),
        }
    }
}

impl EmbeddingProvider for LocalProvider {
    fn generate_embedding(&self, text: &str) -> Result<Vec<f64>, ProviderError> {
        if self.dimensions == 0 {
            return Err(ProviderError::InvalidDimensions);
        }

        // Cycle over the seeded input bytes; each byte maps into [-1, 1).
        let combined = format!("transformers:{}\n{}", self.model, text);
        let raw = if combined.is_empty() {
            b"stub".as_slice()
        } else {
            combined.as_bytes()
        };

        let mut values = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let b = raw[i % raw.len()];
            values.push(((b as i32 % 200) as f64 / 100.0) - 1.0);
        }
        Ok(values)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "Transformers.js (Local)"
    }
}

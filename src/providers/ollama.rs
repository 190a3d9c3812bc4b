//! Ollama embedding provider (local HTTP daemon)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::openai::{http_client, retryable};
use super::{effective_dimensions, EmbeddingProvider, ProviderConfig, ProviderError};

const DEFAULT_MODEL: &str = "nomic-embed-text";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_DIMENSIONS: usize = 1024;
const MAX_RETRIES: u32 = 3;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f64>,
}

pub struct OllamaProvider {
    base_url: String,
    model: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
}

impl OllamaProvider {
    pub fn new(cfg: &ProviderConfig) -> Self {
        let base_url = if cfg.ollama_base_url.trim().is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            cfg.ollama_base_url.trim().trim_end_matches('/').to_string()
        };
        let model = if cfg.ollama_model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            cfg.ollama_model.trim().to_string()
        };
        Self {
            base_url,
            model,
            dimensions: effective_dimensions(cfg.dimensions, DEFAULT_DIMENSIONS),
            client: http_client(cfg.timeout_secs),
        }
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn generate_embedding(&self, text: &str) -> Result<Vec<f64>, ProviderError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let mut backoff = Duration::from_secs(1);
        for attempt in 0..=MAX_RETRIES {
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .map_err(|e| ProviderError::Network(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                let parsed: EmbeddingResponse = response
                    .json()
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
                if parsed.embedding.is_empty() {
                    return Err(ProviderError::InvalidResponse(
                        "empty embedding in response".to_string(),
                    ));
                }
                return Ok(parsed.embedding);
            }

            if retryable(status.as_u16()) && attempt < MAX_RETRIES {
                tracing::warn!(status = %status, attempt, "ollama request retrying");
                std::thread::sleep(backoff);
                backoff *= 2;
                continue;
            }

            let detail = response.text().unwrap_or_default();
            return Err(ProviderError::Api(format!("{status}: {detail}")));
        }

        Err(ProviderError::RateLimited(MAX_RETRIES))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "Ollama"
    }

    /// The daemon runs one inference at a time; batches go sequentially.
    fn max_batch_size(&self) -> usize {
        16
    }
}

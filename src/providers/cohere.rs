//! Cohere embedding provider

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::openai::{http_client, retryable};
use super::{effective_dimensions, EmbeddingProvider, ProviderConfig, ProviderError};

const DEFAULT_MODEL: &str = "embed-english-v3.0";
const BASE_URL: &str = "https://api.cohere.com/v1";
const DEFAULT_DIMENSIONS: usize = 1024;
const MAX_RETRIES: u32 = 3;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    input_type: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f64>>,
}

pub struct CohereProvider {
    api_key: String,
    model: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
}

impl CohereProvider {
    pub fn new(cfg: &ProviderConfig) -> Self {
        let model = if cfg.cohere_model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            cfg.cohere_model.trim().to_string()
        };
        Self {
            api_key: cfg.cohere_api_key.trim().to_string(),
            model,
            dimensions: effective_dimensions(cfg.dimensions, DEFAULT_DIMENSIONS),
            client: http_client(cfg.timeout_secs),
        }
    }

    fn send_request(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, ProviderError> {
        let url = format!("{BASE_URL}/embed");
        let body = EmbedRequest {
            model: &self.model,
            texts,
            input_type: "search_document",
        };

        let mut backoff = Duration::from_secs(1);
        for attempt in 0..=MAX_RETRIES {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .map_err(|e| ProviderError::Network(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                let parsed: EmbedResponse = response
                    .json()
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
                if parsed.embeddings.len() != texts.len() {
                    return Err(ProviderError::InvalidResponse(format!(
                        "expected {} embeddings, got {}",
                        texts.len(),
                        parsed.embeddings.len()
                    )));
                }
                return Ok(parsed.embeddings);
            }

            if retryable(status.as_u16()) && attempt < MAX_RETRIES {
                tracing::warn!(status = %status, attempt, "cohere request retrying");
                std::thread::sleep(backoff);
                backoff *= 2;
                continue;
            }

            let detail = response.text().unwrap_or_default();
            return Err(ProviderError::Api(format!("{status}: {detail}")));
        }

        Err(ProviderError::RateLimited(MAX_RETRIES))
    }
}

impl EmbeddingProvider for CohereProvider {
    fn generate_embedding(&self, text: &str) -> Result<Vec<f64>, ProviderError> {
        let batch = self.send_request(std::slice::from_ref(&text.to_string()))?;
        batch
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("empty embeddings array".to_string()))
    }

    fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, ProviderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.send_request(texts)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "Cohere"
    }

    /// Cohere's embed endpoint caps batches at 96 texts.
    fn max_batch_size(&self) -> usize {
        96
    }
}

//! OpenAI-compatible embedding provider

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{effective_dimensions, EmbeddingProvider, ProviderConfig, ProviderError};

const DEFAULT_MODEL: &str = "text-embedding-3-large";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_DIMENSIONS: usize = 3072;
const MAX_RETRIES: u32 = 3;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
pub(crate) struct EmbeddingData {
    pub(crate) embedding: Vec<f64>,
    pub(crate) index: usize,
}

pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// Some only when the user overrode dimensions; forwarded to the API.
    requested_dimensions: Option<usize>,
    client: reqwest::blocking::Client,
}

impl OpenAiProvider {
    pub fn new(cfg: &ProviderConfig) -> Self {
        let base_url = if cfg.openai_base_url.trim().is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            cfg.openai_base_url.trim().trim_end_matches('/').to_string()
        };
        let model = if cfg.openai_embedding_model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            cfg.openai_embedding_model.trim().to_string()
        };
        let requested_dimensions = (cfg.dimensions > 0).then_some(cfg.dimensions);

        Self {
            api_key: cfg.openai_api_key.trim().to_string(),
            base_url,
            model,
            dimensions: effective_dimensions(cfg.dimensions, DEFAULT_DIMENSIONS),
            requested_dimensions,
            client: http_client(cfg.timeout_secs),
        }
    }

    fn send_request(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions,
        };

        let mut backoff = Duration::from_secs(1);
        for attempt in 0..=MAX_RETRIES {
            tracing::debug!(count = texts.len(), url = %url, attempt, "sending embedding request");
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .map_err(|e| ProviderError::Network(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                let parsed: EmbeddingResponse = response
                    .json()
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
                return sort_by_index(parsed.data, texts.len());
            }

            if retryable(status.as_u16()) && attempt < MAX_RETRIES {
                tracing::warn!(status = %status, attempt, "embedding request retrying");
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

impl EmbeddingProvider for OpenAiProvider {
    fn generate_embedding(&self, text: &str) -> Result<Vec<f64>, ProviderError> {
        let batch = self.send_request(std::slice::from_ref(&text.to_string()))?;
        batch
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("empty embedding data".to_string()))
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
        "OpenAI"
    }

    fn max_batch_size(&self) -> usize {
        64
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> reqwest::blocking::Client {
    let timeout = if timeout_secs == 0 { 30 } else { timeout_secs };
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()
        .unwrap_or_default()
}

pub(crate) fn retryable(status: u16) -> bool {
    status == 429 || status >= 500
}

/// APIs may return batch entries out of order; the index field is the
/// authoritative position.
pub(crate) fn sort_by_index(
    data: Vec<EmbeddingData>,
    expected: usize,
) -> Result<Vec<Vec<f64>>, ProviderError> {
    if data.len() != expected {
        return Err(ProviderError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }
    let mut indexed: Vec<(usize, Vec<f64>)> =
        data.into_iter().map(|d| (d.index, d.embedding)).collect();
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

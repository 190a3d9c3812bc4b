//! Second-pass reranking of search results
//!
//! Rerankers score (query, passage) pairs directly and reorder the head of
//! the result list. Two implementations: a local lexical cross-scorer
//! (`transformers` mode; model inference stays outside the core, so this
//! is the deterministic stand-in for a cross-encoder) and an HTTP reranker
//! (`api` mode) that asks an OpenAI-compatible chat endpoint for a binary
//! relevance judgment per passage. Reordering is stable: ties keep their
//! prior order.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::search::bm25::Bm25Index;

#[derive(Error, Debug)]
pub enum RerankerError {
    #[error("invalid reranker mode {0:?}: must be one of [off, transformers, api]")]
    InvalidMode(String),
    #[error("reranker api url is not configured (set PAMPAX_RERANKER_URL)")]
    MissingUrl,
    #[error("reranker request failed: {0}")]
    Request(String),
    #[error("invalid reranker response: {0}")]
    InvalidResponse(String),
}

/// Reranker selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RerankerMode {
    #[default]
    Off,
    Transformers,
    Api,
}

impl FromStr for RerankerMode {
    type Err = RerankerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "" => Ok(RerankerMode::Off),
            "transformers" => Ok(RerankerMode::Transformers),
            "api" => Ok(RerankerMode::Api),
            other => Err(RerankerError::InvalidMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for RerankerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RerankerMode::Off => write!(f, "off"),
            RerankerMode::Transformers => write!(f, "transformers"),
            RerankerMode::Api => write!(f, "api"),
        }
    }
}

/// A result the reranker scores: its id plus the chunk text.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub id: String,
    pub passage: String,
}

/// Scores candidates against a query; higher is more relevant.
pub trait Reranker: Send + Sync {
    fn score(&self, query: &str, candidates: &[RerankCandidate])
        -> Result<Vec<f64>, RerankerError>;
}

/// Build the configured reranker, if any.
///
/// `settings` carries the `PAMPAX_RERANKER_*` values keyed by lowercased
/// suffix (`url`, `model`, `api_key`).
pub fn create_reranker(
    mode: RerankerMode,
    settings: &HashMap<String, String>,
    timeout_secs: u64,
) -> Result<Option<Box<dyn Reranker>>, RerankerError> {
    match mode {
        RerankerMode::Off => Ok(None),
        RerankerMode::Transformers => Ok(Some(Box::new(LexicalReranker))),
        RerankerMode::Api => {
            let url = settings
                .get("url")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or(RerankerError::MissingUrl)?;
            Ok(Some(Box::new(ApiReranker::new(
                url,
                settings.get("model").cloned().unwrap_or_default(),
                settings.get("api_key").cloned(),
                timeout_secs,
            ))))
        }
    }
}

// ============ Local lexical cross-scorer ============

/// Token-overlap cross-scorer standing in for an ONNX cross-encoder.
///
/// Scores each passage by the fraction of query tokens it contains, with a
/// saturating term-frequency bonus. Deterministic and offline.
pub struct LexicalReranker;

impl Reranker for LexicalReranker {
    fn score(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<Vec<f64>, RerankerError> {
        let query_tokens = Bm25Index::tokenize(query);
        if query_tokens.is_empty() {
            return Ok(vec![0.0; candidates.len()]);
        }

        let scores = candidates
            .iter()
            .map(|c| {
                let passage_tokens = Bm25Index::tokenize(&c.passage);
                let mut freqs: HashMap<&str, usize> = HashMap::new();
                for t in &passage_tokens {
                    *freqs.entry(t.as_str()).or_insert(0) += 1;
                }
                let mut covered = 0.0;
                for qt in &query_tokens {
                    let tf = freqs.get(qt.as_str()).copied().unwrap_or(0);
                    if tf > 0 {
                        // Saturate repeats: the third occurrence stops helping.
                        covered += 1.0 + (tf.min(3) as f64 - 1.0) * 0.1;
                    }
                }
                covered / query_tokens.len() as f64
            })
            .collect();
        Ok(scores)
    }
}

// ============ HTTP reranker ============

const PASSAGE_CHAR_LIMIT: usize = 2000;

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Chat-completions reranker compatible with OpenAI-style APIs.
///
/// Each passage gets a yes/no relevance judgment; yes scores 1.0, no 0.0.
/// Passages are judged sequentially since local inference servers handle
/// one request at a time.
pub struct ApiReranker {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl ApiReranker {
    pub fn new(url: String, model: String, api_key: Option<String>, timeout_secs: u64) -> Self {
        let timeout = if timeout_secs == 0 { 30 } else { timeout_secs };
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(timeout))
                .build()
                .unwrap_or_default(),
            url,
            model,
            api_key,
        }
    }

    fn judge(&self, query: &str, passage: &str) -> Result<bool, RerankerError> {
        let endpoint = format!("{}/v1/chat/completions", self.url.trim_end_matches('/'));
        let passage: String = passage.chars().take(PASSAGE_CHAR_LIMIT).collect();

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "Judge whether the Document meets the requirements based on the Query. Answer only \"yes\" or \"no\".".to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("<Query>: {query}\n<Document>: {passage}"),
                },
            ],
            max_tokens: 4,
            temperature: 0.0,
        };

        let mut builder = self.client.post(&endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .map_err(|e| RerankerError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RerankerError::Request(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .map_err(|e| RerankerError::InvalidResponse(e.to_string()))?;
        let answer = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| RerankerError::InvalidResponse("no choices".to_string()))?;
        Ok(parse_relevance(answer))
    }
}

impl Reranker for ApiReranker {
    fn score(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<Vec<f64>, RerankerError> {
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let relevant = self.judge(query, &candidate.passage)?;
            scores.push(if relevant { 1.0 } else { 0.0 });
        }
        Ok(scores)
    }
}

/// Extract the yes/no judgment, tolerating reasoning wrappers.
fn parse_relevance(response: &str) -> bool {
    let cleaned = response
        .split("</think>")
        .last()
        .unwrap_or(response)
        .trim();
    cleaned.to_lowercase().starts_with("yes")
}

//! Embedding providers
//!
//! A provider is a name, an output dimension, and a way to turn text into
//! a vector. The indexer and search engine only ever touch this trait; how
//! a vector is produced (HTTP API, local runtime) is invisible to them.
//! Any dimension >= 1 is tolerated.

mod cohere;
mod local;
mod ollama;
mod openai;

use thiserror::Error;

pub use cohere::CohereProvider;
pub use local::LocalProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("unsupported provider {0:?}: must be one of [auto, openai, transformers, local, ollama, cohere]")]
    Unsupported(String),
    #[error("embedding API request failed: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("rate limited after {0} retries")]
    RateLimited(u32),
    #[error("embedding dimensions must be greater than 0")]
    InvalidDimensions,
}

/// The capability set the core depends on.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    fn generate_embedding(&self, text: &str) -> Result<Vec<f64>, ProviderError>;

    /// Embed a batch of texts. The default maps over single calls;
    /// providers with native batch endpoints override it.
    fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, ProviderError> {
        texts.iter().map(|t| self.generate_embedding(t)).collect()
    }

    /// True output dimension of this provider's vectors.
    fn dimensions(&self) -> usize;

    /// Human-readable provider name, stored next to each embedding.
    fn name(&self) -> &str;

    /// Largest batch the provider's contract allows.
    fn max_batch_size(&self) -> usize {
        32
    }
}

/// Provider construction inputs, resolved from configuration.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_embedding_model: String,
    pub transformers_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub cohere_api_key: String,
    pub cohere_model: String,
    /// Configured dimension override; 0 means each provider's default.
    pub dimensions: usize,
    /// Per-request timeout in seconds for HTTP providers.
    pub timeout_secs: u64,
}

/// Build a provider by name. `auto` (or empty) resolves by available
/// credentials: OpenAI key, then Cohere key, then Ollama base URL, then
/// the local runtime. The choice is logged.
pub fn create_provider(
    requested: &str,
    cfg: &ProviderConfig,
) -> Result<Box<dyn EmbeddingProvider>, ProviderError> {
    let mut resolved = requested.trim().to_lowercase();
    if resolved.is_empty() || resolved == "auto" {
        resolved = resolve_auto(cfg).to_string();
        tracing::info!(provider = %resolved, "auto-selected embedding provider");
    }

    match resolved.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(cfg))),
        "transformers" | "local" => Ok(Box::new(LocalProvider::new(cfg))),
        "ollama" => Ok(Box::new(OllamaProvider::new(cfg))),
        "cohere" => Ok(Box::new(CohereProvider::new(cfg))),
        _ => Err(ProviderError::Unsupported(requested.to_string())),
    }
}

fn resolve_auto(cfg: &ProviderConfig) -> &'static str {
    if !cfg.openai_api_key.trim().is_empty() {
        "openai"
    } else if !cfg.cohere_api_key.trim().is_empty() {
        "cohere"
    } else if !cfg.ollama_base_url.trim().is_empty() {
        "ollama"
    } else {
        "transformers"
    }
}

pub(crate) fn effective_dimensions(configured: usize, default: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_prefers_openai_key() {
        let cfg = ProviderConfig {
            openai_api_key: "sk-test".into(),
            cohere_api_key: "co-test".into(),
            ollama_base_url: "http://localhost:11434".into(),
            ..Default::default()
        };
        assert_eq!(resolve_auto(&cfg), "openai");
    }

    #[test]
    fn test_auto_falls_back_to_cohere_then_ollama_then_local() {
        let mut cfg = ProviderConfig {
            cohere_api_key: "co-test".into(),
            ollama_base_url: "http://localhost:11434".into(),
            ..Default::default()
        };
        assert_eq!(resolve_auto(&cfg), "cohere");

        cfg.cohere_api_key.clear();
        assert_eq!(resolve_auto(&cfg), "ollama");

        cfg.ollama_base_url.clear();
        assert_eq!(resolve_auto(&cfg), "transformers");
    }

    #[test]
    fn test_create_provider_unknown_name() {
        let err = create_provider("quantum", &ProviderConfig::default());
        assert!(matches!(err, Err(ProviderError::Unsupported(_))));
    }

    #[test]
    fn test_create_provider_local_alias() {
        let cfg = ProviderConfig::default();
        let a = create_provider("local", &cfg).unwrap();
        let b = create_provider("transformers", &cfg).unwrap();
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_effective_dimensions() {
        assert_eq!(effective_dimensions(0, 384), 384);
        assert_eq!(effective_dimensions(512, 384), 512);
    }
}

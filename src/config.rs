//! Layered configuration
//!
//! Values are resolved lowest to highest precedence: built-in defaults,
//! the user config file (`~/.config/pampax/config.toml`), the project file
//! (`pampax.toml` in the repository root), `PAMPAX_*` environment
//! variables, and finally CLI flags (applied by the CLI layer).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::reranker::RerankerMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config file {0}: {1}")]
    Read(String, std::io::Error),
    #[error("parse config file {0}: {1}")]
    Parse(String, String),
    #[error(transparent)]
    InvalidReranker(#[from] crate::reranker::RerankerError),
}

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-large";
const DEFAULT_TRANSFORMERS_MODEL: &str = "Xenova/all-MiniLM-L6-v2";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text";
const DEFAULT_COHERE_MODEL: &str = "embed-english-v3.0";
const DEFAULT_MAX_TOKENS: usize = 8191;
const DEFAULT_DIMENSIONS: usize = 1536;
const DEFAULT_RATE_LIMIT: usize = 60;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub encryption_key: Option<String>,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_embedding_model: String,
    pub transformers_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub cohere_api_key: String,
    pub cohere_model: String,
    pub max_tokens: usize,
    /// Embedding dimensions forwarded to providers; floored to the default
    /// so a provider never sees zero.
    pub dimensions: usize,
    pub rate_limit: usize,
    pub timeout_secs: u64,
    pub reranker_mode: String,
    /// Remaining `PAMPAX_RERANKER_*` values keyed by lowercased suffix.
    pub reranker: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encryption_key: None,
            openai_api_key: String::new(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_embedding_model: DEFAULT_OPENAI_MODEL.to_string(),
            transformers_model: DEFAULT_TRANSFORMERS_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            cohere_api_key: String::new(),
            cohere_model: DEFAULT_COHERE_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            dimensions: DEFAULT_DIMENSIONS,
            rate_limit: DEFAULT_RATE_LIMIT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            reranker_mode: "off".to_string(),
            reranker: HashMap::new(),
        }
    }
}

// File-format mirror; every field optional so layers merge cleanly.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    encryption_key: Option<String>,
    max_tokens: Option<usize>,
    dimensions: Option<usize>,
    rate_limit: Option<usize>,
    timeout_secs: Option<u64>,
    openai: FileOpenAi,
    transformers: FileTransformers,
    ollama: FileOllama,
    cohere: FileCohere,
    reranker: FileReranker,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileOpenAi {
    api_key: Option<String>,
    base_url: Option<String>,
    embedding_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileTransformers {
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileOllama {
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileCohere {
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileReranker {
    mode: Option<String>,
    url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
}

impl Config {
    /// Load configuration for a project.
    ///
    /// An explicit `config_file` replaces the user/project file pair and a
    /// failure to read or parse it is an error. The implicit files are
    /// lenient: unreadable or malformed files log a warning and are
    /// skipped.
    pub fn load(config_file: Option<&Path>, project_root: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = config_file {
            let file = load_file_strict(path)?;
            config.apply_file(file);
        } else {
            if let Some(user_path) = dirs::config_dir().map(|d| d.join("pampax/config.toml")) {
                if let Some(file) = load_file_lenient(&user_path) {
                    config.apply_file(file);
                }
            }
            if let Some(file) = load_file_lenient(&project_root.join("pampax.toml")) {
                config.apply_file(file);
            }
        }

        config.apply_env_from(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        apply_string(&mut self.openai_api_key, file.openai.api_key);
        apply_string(&mut self.openai_base_url, file.openai.base_url);
        apply_string(&mut self.openai_embedding_model, file.openai.embedding_model);
        apply_string(&mut self.transformers_model, file.transformers.model);
        apply_string(&mut self.ollama_base_url, file.ollama.base_url);
        apply_string(&mut self.ollama_model, file.ollama.model);
        apply_string(&mut self.cohere_api_key, file.cohere.api_key);
        apply_string(&mut self.cohere_model, file.cohere.model);
        apply_string(&mut self.reranker_mode, file.reranker.mode);

        if let Some(key) = file.encryption_key {
            let trimmed = key.trim().to_string();
            if !trimmed.is_empty() {
                self.encryption_key = Some(trimmed);
            }
        }
        if let Some(v) = file.max_tokens.filter(|v| *v > 0) {
            self.max_tokens = v;
        }
        // Zero is not a valid dimension count; the default stands.
        if let Some(v) = file.dimensions.filter(|v| *v > 0) {
            self.dimensions = v;
        }
        if let Some(v) = file.rate_limit.filter(|v| *v > 0) {
            self.rate_limit = v;
        }
        if let Some(v) = file.timeout_secs.filter(|v| *v > 0) {
            self.timeout_secs = v;
        }
        for (key, value) in [
            ("url", file.reranker.url),
            ("model", file.reranker.model),
            ("api_key", file.reranker.api_key),
        ] {
            if let Some(v) = value {
                self.reranker.insert(key.to_string(), v);
            }
        }
    }

    /// Apply `PAMPAX_*` environment variables over file values.
    pub fn apply_env_from(&mut self, vars: impl Iterator<Item = (String, String)>) {
        for (key, value) in vars {
            let Some(suffix) = key.strip_prefix("PAMPAX_") else {
                continue;
            };
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match suffix {
                "ENCRYPTION_KEY" => self.encryption_key = Some(value),
                "OPENAI_API_KEY" => self.openai_api_key = value,
                "OPENAI_BASE_URL" => self.openai_base_url = value,
                "OPENAI_EMBEDDING_MODEL" => self.openai_embedding_model = value,
                "TRANSFORMERS_MODEL" => self.transformers_model = value,
                "OLLAMA_BASE_URL" => self.ollama_base_url = value,
                "OLLAMA_MODEL" => self.ollama_model = value,
                "COHERE_API_KEY" => self.cohere_api_key = value,
                "COHERE_MODEL" => self.cohere_model = value,
                "MAX_TOKENS" => {
                    if let Ok(v) = value.parse::<usize>() {
                        if v > 0 {
                            self.max_tokens = v;
                        }
                    }
                }
                "DIMENSIONS" => {
                    if let Ok(v) = value.parse::<usize>() {
                        if v > 0 {
                            self.dimensions = v;
                        }
                    }
                }
                "RATE_LIMIT" => {
                    if let Ok(v) = value.parse::<usize>() {
                        if v > 0 {
                            self.rate_limit = v;
                        }
                    }
                }
                "TIMEOUT_SECS" => {
                    if let Ok(v) = value.parse::<u64>() {
                        if v > 0 {
                            self.timeout_secs = v;
                        }
                    }
                }
                "RERANKER_MODE" => self.reranker_mode = value,
                other => {
                    if let Some(reranker_key) = other.strip_prefix("RERANKER_") {
                        self.reranker
                            .insert(reranker_key.to_lowercase(), value);
                    }
                }
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // Mode must parse; the value itself is used later at search time.
        let _: RerankerMode = self.reranker_mode.parse()?;
        Ok(())
    }

    /// Parsed reranker mode.
    pub fn reranker_mode(&self) -> RerankerMode {
        self.reranker_mode.parse().unwrap_or_default()
    }

    /// The provider construction view of this configuration.
    pub fn provider_config(&self) -> crate::providers::ProviderConfig {
        crate::providers::ProviderConfig {
            openai_api_key: self.openai_api_key.clone(),
            openai_base_url: self.openai_base_url.clone(),
            openai_embedding_model: self.openai_embedding_model.clone(),
            transformers_model: self.transformers_model.clone(),
            ollama_base_url: self.ollama_base_url.clone(),
            ollama_model: self.ollama_model.clone(),
            cohere_api_key: self.cohere_api_key.clone(),
            cohere_model: self.cohere_model.clone(),
            dimensions: self.dimensions,
            timeout_secs: self.timeout_secs,
        }
    }
}

fn apply_string(target: &mut String, value: Option<String>) {
    if let Some(v) = value {
        let trimmed = v.trim().to_string();
        if !trimmed.is_empty() {
            *target = trimmed;
        }
    }
}

fn load_file_strict(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse(path.display().to_string(), e.to_string()))
}

fn load_file_lenient(path: &Path) -> Option<FileConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config file");
            return None;
        }
    };
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse config file");
            None
        }
    }
}

//! CLI JSON envelope
//!
//! Every command writes a single JSON object to stdout: a command-specific
//! payload on success, `{error: {code, message, hint}}` on failure. Codes
//! come from a fixed enumeration; logs go to stderr so stdout stays
//! machine-readable.

use serde::Serialize;

use crate::chunks::ChunkStoreError;
use crate::codemap::CodemapError;
use crate::config::ConfigError;
use crate::discovery::DiscoveryError;
use crate::indexer::IndexerError;
use crate::providers::ProviderError;
use crate::reranker::RerankerError;
use crate::search::SearchError;
use crate::store::StoreError;

/// The fixed error code enumeration of the CLI contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    IndexMissing,
    DbError,
    IoError,
    ConfigError,
    EmbeddingError,
    SearchError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::IndexMissing => "INDEX_MISSING",
            ErrorCode::DbError => "DB_ERROR",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::EmbeddingError => "EMBEDDING_ERROR",
            ErrorCode::SearchError => "SEARCH_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// A command failure ready for the error envelope.
#[derive(Debug)]
pub struct CliError {
    pub code: ErrorCode,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

/// Write a success payload to stdout.
pub fn print_success<T: Serialize>(payload: &T) {
    match serde_json::to_string_pretty(payload) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            // Can only happen for non-serializable payloads, which would be
            // a programming error; still emit a valid envelope.
            print_error(&CliError::new(
                ErrorCode::InternalError,
                format!("failed to serialize output: {e}"),
            ));
        }
    }
}

/// Write the error envelope to stdout.
pub fn print_error(error: &CliError) {
    let envelope = ErrorEnvelope {
        error: ErrorBody {
            code: error.code.as_str(),
            message: &error.message,
            hint: error.hint.as_deref(),
        },
    };
    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => println!("{json}"),
        Err(_) => println!(
            "{{\"error\":{{\"code\":\"INTERNAL_ERROR\",\"message\":\"failed to serialize error\"}}}}"
        ),
    }
}

// ============ Error classification ============

impl From<ChunkStoreError> for CliError {
    fn from(e: ChunkStoreError) -> Self {
        let code = match &e {
            ChunkStoreError::NotFound(_) => ErrorCode::NotFound,
            ChunkStoreError::EncryptedNoKey(_) | ChunkStoreError::InvalidMasterKey(_) => {
                ErrorCode::ConfigError
            }
            ChunkStoreError::AuthFailed => ErrorCode::ConfigError,
            ChunkStoreError::EmptySha | ChunkStoreError::MalformedPayload(_) => {
                ErrorCode::InvalidInput
            }
            ChunkStoreError::Crypto(_) => ErrorCode::InternalError,
            ChunkStoreError::Io(_) => ErrorCode::IoError,
        };
        let hint = match &e {
            ChunkStoreError::EncryptedNoKey(_) => {
                Some("set PAMPAX_ENCRYPTION_KEY or pass --encryption-key".to_string())
            }
            ChunkStoreError::AuthFailed => {
                Some("the chunk was written with a different key, or the payload was modified".to_string())
            }
            _ => None,
        };
        CliError {
            code,
            message: e.to_string(),
            hint,
        }
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        let code = match &e {
            StoreError::Io(_) => ErrorCode::IoError,
            _ => ErrorCode::DbError,
        };
        CliError::new(code, e.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::new(ErrorCode::ConfigError, e.to_string())
    }
}

impl From<ProviderError> for CliError {
    fn from(e: ProviderError) -> Self {
        let code = match &e {
            ProviderError::Unsupported(_) => ErrorCode::InvalidInput,
            _ => ErrorCode::EmbeddingError,
        };
        CliError::new(code, e.to_string())
    }
}

impl From<DiscoveryError> for CliError {
    fn from(e: DiscoveryError) -> Self {
        CliError::new(ErrorCode::IoError, e.to_string())
    }
}

impl From<CodemapError> for CliError {
    fn from(e: CodemapError) -> Self {
        CliError::new(ErrorCode::IoError, e.to_string())
    }
}

impl From<RerankerError> for CliError {
    fn from(e: RerankerError) -> Self {
        let code = match &e {
            RerankerError::InvalidMode(_) => ErrorCode::InvalidInput,
            RerankerError::MissingUrl => ErrorCode::ConfigError,
            _ => ErrorCode::SearchError,
        };
        CliError::new(code, e.to_string())
    }
}

impl From<SearchError> for CliError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::EmptyQuery | SearchError::InvalidGlob(..) => {
                CliError::new(ErrorCode::InvalidInput, e.to_string())
            }
            SearchError::Embedding(inner) => inner.into(),
            SearchError::Store(inner) => inner.into(),
            SearchError::ChunkStore(inner) => inner.into(),
            SearchError::Reranker(inner) => inner.into(),
        }
    }
}

impl From<IndexerError> for CliError {
    fn from(e: IndexerError) -> Self {
        match e {
            IndexerError::Cancelled => CliError::new(ErrorCode::InternalError, e.to_string())
                .with_hint("the run was interrupted; rerun to reconcile partial chunk files"),
            IndexerError::Discovery(inner) => inner.into(),
            IndexerError::Store(inner) => inner.into(),
            IndexerError::ChunkStore(inner) => inner.into(),
            IndexerError::Codemap(inner) => inner.into(),
            IndexerError::Io(inner) => CliError::new(ErrorCode::IoError, inner.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(ErrorCode::InvalidInput.as_str(), "INVALID_INPUT");
        assert_eq!(ErrorCode::IndexMissing.as_str(), "INDEX_MISSING");
        assert_eq!(ErrorCode::EmbeddingError.as_str(), "EMBEDDING_ERROR");
    }

    #[test]
    fn test_chunk_store_error_classification() {
        let e: CliError = ChunkStoreError::NotFound("abc".into()).into();
        assert_eq!(e.code, ErrorCode::NotFound);

        let e: CliError = ChunkStoreError::EncryptedNoKey("abc".into()).into();
        assert_eq!(e.code, ErrorCode::ConfigError);
        assert!(e.hint.is_some());

        let e: CliError = ChunkStoreError::AuthFailed.into();
        assert_eq!(e.code, ErrorCode::ConfigError);
        assert!(e.message.contains("tampered") || e.hint.is_some());
    }

    #[test]
    fn test_search_error_classification() {
        let e: CliError = SearchError::EmptyQuery.into();
        assert_eq!(e.code, ErrorCode::InvalidInput);

        let e: CliError =
            SearchError::Embedding(ProviderError::Api("boom".into())).into();
        assert_eq!(e.code, ErrorCode::EmbeddingError);
    }

    #[test]
    fn test_provider_unsupported_is_invalid_input() {
        let e: CliError = ProviderError::Unsupported("quantum".into()).into();
        assert_eq!(e.code, ErrorCode::InvalidInput);
    }
}

//! Command implementations

mod index;
mod info;
mod search;

pub use index::cmd_reindex;
pub use info::cmd_info;
pub use search::cmd_search;

use std::path::{Path, PathBuf};

use super::output::{CliError, ErrorCode};
use crate::chunks::parse_master_key;
use crate::config::Config;

/// Resolve the repository root from an optional positional argument.
pub fn resolve_root(path: Option<&Path>) -> PathBuf {
    path.map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Validate an `on|off` toggle before any work happens.
pub fn parse_toggle(flag: &str, value: &str) -> Result<bool, CliError> {
    match value {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(CliError::new(
            ErrorCode::InvalidInput,
            format!("invalid {flag} value {other:?}: must be one of [on, off]"),
        )),
    }
}

/// Resolve the master key: CLI flag over config/env value.
pub fn resolve_master_key(
    flag_value: Option<&str>,
    config: &Config,
) -> Result<Option<[u8; 32]>, CliError> {
    let raw = flag_value
        .map(str::to_string)
        .or_else(|| config.encryption_key.clone());
    match raw {
        Some(raw) => Ok(Some(parse_master_key(&raw)?)),
        None => Ok(None),
    }
}

/// Paths of the on-disk artifacts for a repository root.
pub struct ArtifactPaths {
    pub pampa_dir: PathBuf,
    pub db: PathBuf,
    pub chunks_dir: PathBuf,
    pub codemap: PathBuf,
}

impl ArtifactPaths {
    pub fn for_root(root: &Path) -> Self {
        let pampa_dir = root.join(crate::PAMPA_DIR);
        Self {
            db: pampa_dir.join(crate::DB_FILE),
            chunks_dir: pampa_dir.join(crate::CHUNKS_DIR),
            codemap: root.join(crate::CODEMAP_FILE),
            pampa_dir,
        }
    }

    /// Fail with `INDEX_MISSING` when the database artifact is absent.
    pub fn require_index(&self) -> Result<(), CliError> {
        if !self.db.exists() {
            return Err(CliError::new(
                ErrorCode::IndexMissing,
                format!("no index found at {}", self.db.display()),
            )
            .with_hint("run `pampax index` first"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toggle() {
        assert!(parse_toggle("hybrid", "on").unwrap());
        assert!(!parse_toggle("hybrid", "off").unwrap());
        let err = parse_toggle("hybrid", "maybe").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert!(err.message.contains("hybrid"));
    }

    #[test]
    fn test_resolve_root_defaults_to_cwd() {
        assert_eq!(resolve_root(None), PathBuf::from("."));
        assert_eq!(
            resolve_root(Some(Path::new("/repo"))),
            PathBuf::from("/repo")
        );
    }

    #[test]
    fn test_artifact_paths_layout() {
        let paths = ArtifactPaths::for_root(Path::new("/repo"));
        assert_eq!(paths.db, Path::new("/repo/.pampa/pampa.db"));
        assert_eq!(paths.chunks_dir, Path::new("/repo/.pampa/chunks"));
        assert_eq!(paths.codemap, Path::new("/repo/pampa.codemap.json"));
    }

    #[test]
    fn test_require_index_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = ArtifactPaths::for_root(dir.path());
        let err = paths.require_index().unwrap_err();
        assert_eq!(err.code, ErrorCode::IndexMissing);
    }

    #[test]
    fn test_resolve_master_key_flag_overrides_config() {
        let mut config = Config::default();
        config.encryption_key = Some("00".repeat(32));
        let flag = "ff".repeat(32);
        let key = resolve_master_key(Some(&flag), &config).unwrap().unwrap();
        assert_eq!(key, [0xffu8; 32]);

        let from_config = resolve_master_key(None, &config).unwrap().unwrap();
        assert_eq!(from_config, [0u8; 32]);

        config.encryption_key = None;
        assert!(resolve_master_key(None, &config).unwrap().is_none());
    }

    #[test]
    fn test_resolve_master_key_rejects_malformed() {
        let config = Config::default();
        let err = resolve_master_key(Some("tooshort"), &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
    }
}

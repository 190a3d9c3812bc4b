//! Layered ignore engine
//!
//! Three layers decide whether a path is excluded, in fixed precedence
//! (lowest to highest): built-in defaults, `.gitignore`, `.pampignore`.
//! A match from a higher layer (exclusion or re-inclusion) overrides any
//! decision from a lower layer. Within a single layer the standard
//! gitignore rule applies: the last matching pattern wins, and `!pattern`
//! re-includes. Nested ignore files apply to paths at or below their
//! directory, and are honored even when their own directory is ignored.

use std::fmt;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use thiserror::Error;

use super::defaults::DEFAULT_IGNORE_PATTERNS;
use crate::pathutil::{normalize_relative, normalize_under_root};

#[derive(Error, Debug)]
pub enum IgnoreError {
    #[error("resolve matcher root: {0}")]
    Root(std::io::Error),
    #[error("compile ignore layer: {0}")]
    Compile(String),
    #[error("walk ignore files: {0}")]
    Scan(std::io::Error),
}

/// Which layer produced an ignore decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    None,
    Default,
    GitIgnore,
    PampIgnore,
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::None => write!(f, "none"),
            RuleSource::Default => write!(f, "default"),
            RuleSource::GitIgnore => write!(f, "gitignore"),
            RuleSource::PampIgnore => write!(f, "pampignore"),
        }
    }
}

/// The full explanation of an inclusion/exclusion decision.
#[derive(Debug, Clone)]
pub struct IgnoreDecision {
    /// Normalized repo-relative path the decision is about.
    pub path: String,
    pub is_dir: bool,
    /// Whether the path is excluded from indexing.
    pub excluded: bool,
    /// Whether any rule matched at all.
    pub matched: bool,
    pub source: RuleSource,
    /// The matching pattern as written.
    pub pattern: String,
    /// Repo-relative path of the originating ignore file, or `<default>`.
    pub ignore_file: String,
    /// True when the match was a `!pattern` re-inclusion.
    pub negated: bool,
}

/// Ignore matcher with fixed layer precedence:
/// defaults < `.gitignore` < `.pampignore`.
pub struct IgnoreMatcher {
    root: PathBuf,
    defaults: Gitignore,
    git: Gitignore,
    pamp: Gitignore,
}

impl IgnoreMatcher {
    /// Build a matcher for a repository root, collecting every nested
    /// `.gitignore` and `.pampignore` below it.
    pub fn new(root: &Path) -> Result<Self, IgnoreError> {
        let root = root.canonicalize().map_err(IgnoreError::Root)?;

        let mut defaults = GitignoreBuilder::new(&root);
        for pattern in DEFAULT_IGNORE_PATTERNS {
            defaults
                .add_line(None, pattern)
                .map_err(|e| IgnoreError::Compile(format!("default pattern {pattern:?}: {e}")))?;
        }
        let defaults = defaults
            .build()
            .map_err(|e| IgnoreError::Compile(e.to_string()))?;

        let (git_files, pamp_files) = collect_ignore_files(&root)?;
        let git = build_layer(&root, &git_files)?;
        let pamp = build_layer(&root, &pamp_files)?;

        Ok(Self {
            root,
            defaults,
            git,
            pamp,
        })
    }

    /// The canonicalized root this matcher was built for.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn should_skip_dir(&self, relative_path: &str) -> bool {
        self.decision_for(relative_path, true).excluded
    }

    pub fn should_skip_file(&self, relative_path: &str) -> bool {
        self.decision_for(relative_path, false).excluded
    }

    /// Decide inclusion for a repo-relative path, with full attribution.
    pub fn decision_for(&self, relative_path: &str, is_dir: bool) -> IgnoreDecision {
        let normalized = normalize_relative(relative_path);
        let mut decision = IgnoreDecision {
            path: normalized.clone(),
            is_dir,
            excluded: false,
            matched: false,
            source: RuleSource::None,
            pattern: String::new(),
            ignore_file: String::new(),
            negated: false,
        };
        if normalized.is_empty() {
            return decision;
        }

        // Higher layers win outright, including re-inclusions.
        let layers = [
            (RuleSource::PampIgnore, &self.pamp),
            (RuleSource::GitIgnore, &self.git),
            (RuleSource::Default, &self.defaults),
        ];
        for (source, layer) in layers {
            let matched = layer.matched_path_or_any_parents(Path::new(&normalized), is_dir);
            let (glob, negated) = match matched {
                ignore::Match::None => continue,
                ignore::Match::Ignore(glob) => (glob, false),
                ignore::Match::Whitelist(glob) => (glob, true),
            };
            decision.matched = true;
            decision.source = source;
            decision.pattern = glob.original().to_string();
            decision.ignore_file = glob
                .from()
                .map(|p| normalize_under_root(&self.root, p))
                .unwrap_or_else(|| "<default>".to_string());
            decision.negated = negated;
            decision.excluded = !negated;
            return decision;
        }

        decision
    }
}

fn build_layer(root: &Path, files: &[PathBuf]) -> Result<Gitignore, IgnoreError> {
    let mut builder = GitignoreBuilder::new(root);
    for file in files {
        if let Some(err) = builder.add(file) {
            // Partial parse errors don't abort the layer.
            tracing::warn!(file = %file.display(), error = %err, "ignore file parsed with errors");
        }
    }
    builder.build().map_err(|e| IgnoreError::Compile(e.to_string()))
}

/// Collect nested `.gitignore` and `.pampignore` files, never following
/// symlinks, sorted by normalized repo-relative path for deterministic
/// layer construction.
fn collect_ignore_files(root: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>), IgnoreError> {
    let mut git_files = Vec::new();
    let mut pamp_files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable directory while collecting ignore files");
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(_) => continue,
            };
            if file_type.is_symlink() {
                continue;
            }
            let path = entry.path();
            if file_type.is_dir() {
                stack.push(path);
            } else {
                match entry.file_name().to_str() {
                    Some(".gitignore") => git_files.push(path),
                    Some(".pampignore") => pamp_files.push(path),
                    _ => {}
                }
            }
        }
    }

    let sort_key = |p: &PathBuf| normalize_under_root(root, p);
    git_files.sort_by_key(sort_key);
    pamp_files.sort_by_key(sort_key);
    Ok((git_files, pamp_files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn matcher_for(dir: &Path) -> IgnoreMatcher {
        IgnoreMatcher::new(dir).unwrap()
    }

    #[test]
    fn test_defaults_exclude_vendor_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let m = matcher_for(dir.path());
        assert!(m.should_skip_file("node_modules/pkg/index.js"));
        assert!(m.should_skip_file("vendor/lib.php"));
        assert!(m.should_skip_file("deep/nested/node_modules/dep/mod.ts"));
        assert!(m.should_skip_dir("deep/node_modules/dep"));
    }

    #[test]
    fn test_defaults_exclude_json_and_sh_at_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let m = matcher_for(dir.path());

        let json = m.decision_for("config.json", false);
        assert!(json.excluded);
        assert_eq!(json.source, RuleSource::Default);
        assert_eq!(json.pattern, "**/*.json");

        let sh = m.decision_for("script.sh", false);
        assert!(sh.excluded);
        assert_eq!(sh.pattern, "**/*.sh");
    }

    #[test]
    fn test_unmatched_path_included() {
        let dir = tempfile::TempDir::new().unwrap();
        let m = matcher_for(dir.path());
        let d = m.decision_for("src/main.rs", false);
        assert!(!d.excluded);
        assert!(!d.matched);
        assert_eq!(d.source, RuleSource::None);
    }

    #[test]
    fn test_gitignore_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "!data.json\n").unwrap();
        let m = matcher_for(dir.path());

        let d = m.decision_for("data.json", false);
        assert!(!d.excluded);
        assert!(d.negated);
        assert_eq!(d.source, RuleSource::GitIgnore);
    }

    #[test]
    fn test_pampignore_overrides_gitignore_reinclusion() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "!data.json\n").unwrap();
        fs::write(dir.path().join(".pampignore"), "data.json\n").unwrap();
        let m = matcher_for(dir.path());

        let d = m.decision_for("data.json", false);
        assert!(d.excluded);
        assert_eq!(d.source, RuleSource::PampIgnore);
        assert_eq!(d.pattern, "data.json");
        assert!(d.ignore_file.ends_with(".pampignore"));
    }

    #[test]
    fn test_last_match_wins_within_layer() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log\n!keep.log\n").unwrap();
        let m = matcher_for(dir.path());

        assert!(m.should_skip_file("debug.log"));
        let keep = m.decision_for("keep.log", false);
        assert!(!keep.excluded);
        assert!(keep.negated);
    }

    #[test]
    fn test_anchored_pattern_only_at_declaring_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "/target\n").unwrap();
        let m = matcher_for(dir.path());

        assert!(m.should_skip_dir("target"));
        assert!(!m.should_skip_dir("sub/target"));
    }

    #[test]
    fn test_directory_only_pattern() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "cache/\n").unwrap();
        let m = matcher_for(dir.path());

        assert!(m.should_skip_dir("cache"));
        assert!(m.should_skip_file("cache/entry.rs"));
        assert!(!m.should_skip_file("cache")); // plain file named "cache"
    }

    #[test]
    fn test_nested_ignore_file_scoped_to_its_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/.gitignore"), "secret.rs\n").unwrap();
        let m = matcher_for(dir.path());

        assert!(m.should_skip_file("sub/secret.rs"));
        assert!(!m.should_skip_file("secret.rs"));
    }

    #[test]
    fn test_decision_attribution_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/.gitignore"), "*.tmp\n").unwrap();
        let m = matcher_for(dir.path());

        let d = m.decision_for("sub/x.tmp", false);
        assert!(d.excluded);
        assert!(d.matched);
        assert_eq!(d.source, RuleSource::GitIgnore);
        assert_eq!(d.pattern, "*.tmp");
        assert_eq!(d.ignore_file, "sub/.gitignore");
        assert!(!d.negated);
    }

    #[test]
    fn test_escaped_hash_pattern() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "\\#literal.rs\n").unwrap();
        let m = matcher_for(dir.path());
        assert!(m.should_skip_file("#literal.rs"));
    }

    #[test]
    fn test_pampa_artifacts_always_excluded_by_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let m = matcher_for(dir.path());
        assert!(m.should_skip_file("pampa.codemap.json"));
        assert!(m.should_skip_file("pampa.codemap.json.backup-2024-01-01"));
        assert!(m.should_skip_file(".pampa/chunks/abc.gz"));
        assert!(m.should_skip_dir(".pampa/chunks"));
    }
}

//! Frozen v1 defaults: ignore patterns and the supported extension set

use std::collections::HashSet;

/// Default ignore patterns, lowest-precedence layer of the ignore engine.
///
/// Frozen for v1. Covers vendor/build/tooling directories and artifact
/// types; `.gitignore` and `.pampignore` rules can re-include entries.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "**/vendor/**",
    "**/node_modules/**",
    "**/.git/**",
    "**/storage/**",
    "**/dist/**",
    "**/build/**",
    "**/tmp/**",
    "**/temp/**",
    "**/.npm/**",
    "**/.yarn/**",
    "**/Library/**",
    "**/System/**",
    "**/.Trash/**",
    "**/.pampa/**",
    "**/pampa.codemap.json",
    "**/pampa.codemap.json.backup-*",
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/*.json",
    "**/*.sh",
    "**/examples/**",
    "**/assets/**",
];

/// Extensions of the supported language set, with leading dots.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".php", ".py", ".js", ".jsx", ".ts", ".tsx", ".go", ".java", ".cs", ".rs", ".rb", ".cpp",
    ".hpp", ".cc", ".c", ".h", ".scala", ".swift", ".sh", ".bash", ".kt", ".lua", ".html", ".htm",
    ".css", ".json", ".ml", ".mli", ".hs", ".ex", ".exs", ".md", ".markdown",
];

/// Build the default supported extension set (lowercased, with dots).
pub fn default_supported_extensions() -> HashSet<String> {
    SUPPORTED_EXTENSIONS
        .iter()
        .map(|e| e.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions_contains_common_languages() {
        let exts = default_supported_extensions();
        for ext in [".rs", ".py", ".ts", ".go", ".md"] {
            assert!(exts.contains(ext), "missing {ext}");
        }
    }

    #[test]
    fn test_supported_extensions_are_lowercase_with_dot() {
        for ext in default_supported_extensions() {
            assert!(ext.starts_with('.'));
            assert_eq!(ext, ext.to_lowercase());
        }
    }

    #[test]
    fn test_default_patterns_cover_lockfiles_and_artifacts() {
        assert!(DEFAULT_IGNORE_PATTERNS.contains(&"**/package-lock.json"));
        assert!(DEFAULT_IGNORE_PATTERNS.contains(&"**/*.json"));
        assert!(DEFAULT_IGNORE_PATTERNS.contains(&"**/.pampa/**"));
    }
}

//! Language classification by file extension
//!
//! Classification is purely extension-based against the frozen supported
//! set; unknown extensions are excluded from indexing.

/// Map a lowercase extension (without the dot) to its language tag.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext {
        "php" => "php",
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "cs" => "csharp",
        "rs" => "rust",
        "rb" => "ruby",
        "cpp" | "hpp" | "cc" => "cpp",
        "c" | "h" => "c",
        "scala" => "scala",
        "swift" => "swift",
        "sh" | "bash" => "shell",
        "kt" => "kotlin",
        "lua" => "lua",
        "html" | "htm" => "html",
        "css" => "css",
        "json" => "json",
        "ml" | "mli" => "ocaml",
        "hs" => "haskell",
        "ex" | "exs" => "elixir",
        "md" | "markdown" => "markdown",
        _ => return None,
    };
    Some(lang)
}

/// Classify a repo-relative path. Comparison is case-insensitive.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?;
    if ext.len() == path.len() {
        return None; // no dot at all
    }
    language_for_extension(&ext.to_lowercase())
}

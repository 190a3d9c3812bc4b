//! Deterministic symbol-aware chunking
//!
//! Splits a source file into a list of chunks that partition the file's
//! bytes exactly. Declaration lines (functions, classes, types) start new
//! chunks; a contiguous comment block directly above a declaration belongs
//! to that declaration's chunk. Regions without declarations become
//! fixed-size `group_N` chunks; markdown splits on headings into
//! `section_<slug>` chunks. The same input always produces the same chunk
//! list; identifiers, boundaries, and metadata are all derived from file
//! content alone.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Lines per symbol-less group chunk.
const GROUP_CHUNK_LINES: usize = 80;

/// A chunk produced from one file.
#[derive(Debug, Clone)]
pub struct SourceChunk {
    /// Symbol name or generated identifier; the middle segment of the
    /// chunk ID.
    pub id_part: String,
    /// Declared symbol, when the chunk has one.
    pub symbol: Option<String>,
    /// Chunk classification: function, method, class, struct, enum,
    /// interface, constant, assignment, section, group.
    pub kind: &'static str,
    /// Byte-exact slice of the file.
    pub text: String,
    /// 1-indexed line range.
    pub line_start: u32,
    pub line_end: u32,
    pub signature: Option<String>,
    pub parameters: Vec<String>,
    pub return_type: Option<String>,
    /// Names called from this chunk's body, first occurrence order.
    pub calls: Vec<String>,
    /// Other symbols declared in the same file.
    pub neighbors: Vec<String>,
    /// Leading documentation comment, when present.
    pub doc: Option<String>,
    /// Local variable names bound in the body.
    pub variables: Vec<String>,
}

struct DeclPattern {
    regex: Regex,
    kind: &'static str,
}

struct LanguageRules {
    decls: Vec<DeclPattern>,
    comment_prefixes: &'static [&'static str],
}

fn decl(pattern: &str, kind: &'static str) -> DeclPattern {
    DeclPattern {
        regex: Regex::new(pattern).expect("declaration pattern compiles"),
        kind,
    }
}

static RUST_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:const\s+)?(?:unsafe\s+)?(?:extern\s+[^\s]+\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)",
            "function",
        ),
        decl(r"^\s*(?:pub(?:\([^)]*\))?\s+)?struct\s+([A-Za-z_][A-Za-z0-9_]*)", "struct"),
        decl(r"^\s*(?:pub(?:\([^)]*\))?\s+)?enum\s+([A-Za-z_][A-Za-z0-9_]*)", "enum"),
        decl(r"^\s*(?:pub(?:\([^)]*\))?\s+)?trait\s+([A-Za-z_][A-Za-z0-9_]*)", "interface"),
        decl(r"^\s*impl(?:<[^>]*>)?\s+(?:[A-Za-z_][A-Za-z0-9_:]*\s+for\s+)?([A-Za-z_][A-Za-z0-9_]*)", "class"),
    ],
    comment_prefixes: &["///", "//!", "//", "/*", "*", "#["],
});

static PYTHON_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(r"^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)", "function"),
        decl(r"^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)", "class"),
        decl(r"^([A-Z_][A-Z0-9_]*)\s*=", "constant"),
    ],
    comment_prefixes: &["#", "\"\"\"", "'''"],
});

static JS_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)",
            "function",
        ),
        decl(r"^\s*(?:export\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][A-Za-z0-9_$]*)", "class"),
        decl(r"^\s*(?:export\s+)?interface\s+([A-Za-z_$][A-Za-z0-9_$]*)", "interface"),
        decl(r"^\s*(?:export\s+)?enum\s+([A-Za-z_$][A-Za-z0-9_$]*)", "enum"),
        decl(
            r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:async\s*)?(?:function|\([^)]*\)\s*=>|[A-Za-z_$][A-Za-z0-9_$]*\s*=>)",
            "function",
        ),
        decl(r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=", "assignment"),
    ],
    comment_prefixes: &["//", "/*", "*"],
});

static GO_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(r"^func\s+\([^)]*\)\s+([A-Za-z_][A-Za-z0-9_]*)", "method"),
        decl(r"^func\s+([A-Za-z_][A-Za-z0-9_]*)", "function"),
        decl(r"^type\s+([A-Za-z_][A-Za-z0-9_]*)\s+struct", "struct"),
        decl(r"^type\s+([A-Za-z_][A-Za-z0-9_]*)\s+interface", "interface"),
    ],
    comment_prefixes: &["//", "/*", "*"],
});

static JVM_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    // Java, C#, Kotlin, Scala, Swift share keyword-led declarations.
    decls: vec![
        decl(r"^\s*(?:[\w@\[\]]+\s+)*class\s+([A-Za-z_][A-Za-z0-9_]*)", "class"),
        decl(r"^\s*(?:[\w@\[\]]+\s+)*interface\s+([A-Za-z_][A-Za-z0-9_]*)", "interface"),
        decl(r"^\s*(?:[\w@\[\]]+\s+)*enum\s+([A-Za-z_][A-Za-z0-9_]*)", "enum"),
        decl(r"^\s*(?:[\w@\[\]]+\s+)*(?:fun|func|def)\s+([A-Za-z_][A-Za-z0-9_]*)", "function"),
        decl(r"^\s*object\s+([A-Za-z_][A-Za-z0-9_]*)", "class"),
    ],
    comment_prefixes: &["//", "/*", "*", "///"],
});

static C_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(r"^\s*(?:typedef\s+)?struct\s+([A-Za-z_][A-Za-z0-9_]*)", "struct"),
        decl(r"^\s*(?:typedef\s+)?enum\s+([A-Za-z_][A-Za-z0-9_]*)", "enum"),
        // Definition heuristic: a paren-bearing line at column zero that
        // does not end in ';' (which would be a prototype).
        decl(
            r"^[A-Za-z_][A-Za-z0-9_\s\*]*[\s\*]([A-Za-z_][A-Za-z0-9_]*)\s*\([^;]*$",
            "function",
        ),
    ],
    comment_prefixes: &["//", "/*", "*"],
});

static PHP_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(
            r"^\s*(?:(?:public|private|protected|static|final|abstract)\s+)*function\s+&?([A-Za-z_][A-Za-z0-9_]*)",
            "function",
        ),
        decl(r"^\s*(?:final\s+|abstract\s+)?class\s+([A-Za-z_][A-Za-z0-9_]*)", "class"),
        decl(r"^\s*interface\s+([A-Za-z_][A-Za-z0-9_]*)", "interface"),
        decl(r"^\s*trait\s+([A-Za-z_][A-Za-z0-9_]*)", "interface"),
    ],
    comment_prefixes: &["//", "/*", "*", "#"],
});

static RUBY_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(r"^\s*def\s+(?:self\.)?([A-Za-z_][A-Za-z0-9_?!]*)", "function"),
        decl(r"^\s*class\s+([A-Z][A-Za-z0-9_]*)", "class"),
        decl(r"^\s*module\s+([A-Z][A-Za-z0-9_]*)", "class"),
    ],
    comment_prefixes: &["#"],
});

static SHELL_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(r"^\s*(?:function\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*\(\)\s*\{?", "function"),
        decl(r"^\s*function\s+([A-Za-z_][A-Za-z0-9_]*)", "function"),
    ],
    comment_prefixes: &["#"],
});

static LUA_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![decl(
        r"^\s*(?:local\s+)?function\s+([A-Za-z_][A-Za-z0-9_.:]*)",
        "function",
    )],
    comment_prefixes: &["--"],
});

static HASKELL_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(r"^([a-z_][A-Za-z0-9_']*)\s*::", "function"),
        decl(r"^data\s+([A-Z][A-Za-z0-9_']*)", "struct"),
    ],
    comment_prefixes: &["--", "{-"],
});

static OCAML_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(r"^\s*let\s+(?:rec\s+)?([a-z_][A-Za-z0-9_']*)", "function"),
        decl(r"^\s*type\s+([a-z_][A-Za-z0-9_']*)", "struct"),
    ],
    comment_prefixes: &["(*"],
});

static ELIXIR_RULES: Lazy<LanguageRules> = Lazy::new(|| LanguageRules {
    decls: vec![
        decl(r"^\s*defp?\s+([a-z_][A-Za-z0-9_?!]*)", "function"),
        decl(r"^\s*defmodule\s+([A-Z][A-Za-z0-9_.]*)", "class"),
    ],
    comment_prefixes: &["#"],
});

fn rules_for(lang: &str) -> Option<&'static LanguageRules> {
    match lang {
        "rust" => Some(&RUST_RULES),
        "python" => Some(&PYTHON_RULES),
        "javascript" | "typescript" => Some(&JS_RULES),
        "go" => Some(&GO_RULES),
        "java" | "csharp" | "kotlin" | "scala" | "swift" => Some(&JVM_RULES),
        "c" | "cpp" => Some(&C_RULES),
        "php" => Some(&PHP_RULES),
        "ruby" => Some(&RUBY_RULES),
        "shell" => Some(&SHELL_RULES),
        "lua" => Some(&LUA_RULES),
        "haskell" => Some(&HASKELL_RULES),
        "ocaml" => Some(&OCAML_RULES),
        "elixir" => Some(&ELIXIR_RULES),
        // json, css, html and anything else: no symbol extraction
        _ => None,
    }
}

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("heading pattern compiles"));
static CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("call pattern compiles")
});
static VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:let|const|var|local|my)\s+(?:mut\s+)?([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("variable pattern compiles")
});
static WALRUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*:=").expect("walrus pattern compiles")
});

static CALL_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "if", "else", "elif", "for", "while", "switch", "match", "return", "catch", "do",
        "try", "new", "fn", "func", "function", "def", "defp", "class", "struct", "enum",
        "impl", "trait", "interface", "print", "println", "assert", "typeof", "sizeof",
        "defined", "not", "and", "or", "in", "await", "yield", "loop", "unless", "until",
        "case", "when", "raise", "throw", "panic", "with", "lambda", "let", "type", "use",
    ]
    .into_iter()
    .collect()
});

/// Split a file into deterministic chunks.
///
/// The chunk texts partition the input: concatenating them in order
/// reproduces the file byte for byte.
pub fn chunk_file(lang: &str, content: &str) -> Vec<SourceChunk> {
    if content.is_empty() {
        return Vec::new();
    }

    let lines = line_spans(content);
    let mut chunks = if lang == "markdown" {
        chunk_markdown(content, &lines)
    } else if let Some(rules) = rules_for(lang) {
        chunk_declarations(content, &lines, rules)
    } else {
        let mut counter = 0;
        group_chunks(content, &lines, 0, lines.len(), &mut counter)
    };

    let symbols: Vec<String> = chunks.iter().filter_map(|c| c.symbol.clone()).collect();
    for chunk in &mut chunks {
        if let Some(ref own) = chunk.symbol {
            chunk.neighbors = symbols.iter().filter(|s| *s != own).cloned().collect();
        }
    }

    chunks
}

/// (byte_start, byte_end_exclusive) for each line, newline included.
fn line_spans(content: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' {
            spans.push((start, i + 1));
            start = i + 1;
        }
    }
    if start < content.len() {
        spans.push((start, content.len()));
    }
    spans
}

fn region_text(content: &str, lines: &[(usize, usize)], start: usize, end: usize) -> String {
    let byte_start = lines[start].0;
    let byte_end = lines[end - 1].1;
    content[byte_start..byte_end].to_string()
}

/// A chunk without symbol metadata (groups and sections).
fn bare_chunk(
    id_part: String,
    kind: &'static str,
    text: String,
    line_start: usize,
    line_end: usize,
) -> SourceChunk {
    SourceChunk {
        id_part,
        symbol: None,
        kind,
        text,
        line_start: (line_start + 1) as u32,
        line_end: line_end as u32,
        signature: None,
        parameters: Vec::new(),
        return_type: None,
        calls: Vec::new(),
        neighbors: Vec::new(),
        doc: None,
        variables: Vec::new(),
    }
}

fn chunk_markdown(content: &str, lines: &[(usize, usize)]) -> Vec<SourceChunk> {
    let mut boundaries: Vec<(usize, String)> = Vec::new();
    for (idx, &(start, end)) in lines.iter().enumerate() {
        let line = content[start..end].trim_end_matches(['\n', '\r']);
        if let Some(caps) = HEADING_RE.captures(line) {
            boundaries.push((idx, slugify(&caps[2])));
        }
    }

    let mut chunks = Vec::new();
    let mut group_counter = 0;
    let first_boundary = boundaries.first().map(|(i, _)| *i).unwrap_or(lines.len());
    if first_boundary > 0 {
        chunks.extend(group_chunks(content, lines, 0, first_boundary, &mut group_counter));
    }

    let mut seen_slugs: HashSet<String> = HashSet::new();
    for (i, (line_idx, slug)) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map(|(next, _)| *next)
            .unwrap_or(lines.len());
        let mut id = format!("section_{slug}");
        let mut n = 2;
        while !seen_slugs.insert(id.clone()) {
            id = format!("section_{slug}_{n}");
            n += 1;
        }
        chunks.push(bare_chunk(
            id,
            "section",
            region_text(content, lines, *line_idx, end),
            *line_idx,
            end,
        ));
    }

    chunks
}

fn slugify(heading: &str) -> String {
    let mut slug = String::new();
    let mut last_underscore = true;
    for c in heading.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            slug.push('_');
            last_underscore = true;
        }
    }
    let slug = slug.trim_end_matches('_').to_string();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

fn group_chunks(
    content: &str,
    lines: &[(usize, usize)],
    start: usize,
    end: usize,
    counter: &mut usize,
) -> Vec<SourceChunk> {
    let mut chunks: Vec<SourceChunk> = Vec::new();
    let mut at = start;
    while at < end {
        let stop = (at + GROUP_CHUNK_LINES).min(end);
        let text = region_text(content, lines, at, stop);
        // Whitespace-only regions carry no signal; fold them into the
        // previous chunk so the byte partition stays exact.
        if text.trim().is_empty() {
            if let Some(prev) = chunks.last_mut() {
                prev.text.push_str(&text);
                prev.line_end = stop as u32;
                at = stop;
                continue;
            }
        }
        *counter += 1;
        chunks.push(bare_chunk(format!("group_{counter}"), "group", text, at, stop));
        at = stop;
    }
    chunks
}

struct DeclMarker {
    line: usize,
    chunk_start: usize,
    name: String,
    kind: &'static str,
}

fn chunk_declarations(
    content: &str,
    lines: &[(usize, usize)],
    rules: &LanguageRules,
) -> Vec<SourceChunk> {
    let mut markers: Vec<DeclMarker> = Vec::new();
    for (idx, &(start, end)) in lines.iter().enumerate() {
        let line = content[start..end].trim_end_matches(['\n', '\r']);
        for pattern in &rules.decls {
            if let Some(caps) = pattern.regex.captures(line) {
                markers.push(DeclMarker {
                    line: idx,
                    chunk_start: idx,
                    name: caps[1].to_string(),
                    kind: pattern.kind,
                });
                break;
            }
        }
    }

    if markers.is_empty() {
        let mut counter = 0;
        return group_chunks(content, lines, 0, lines.len(), &mut counter);
    }

    // Pull each declaration's start up over its contiguous comment block.
    for i in 0..markers.len() {
        let floor = if i == 0 { 0 } else { markers[i - 1].line + 1 };
        let mut start = markers[i].line;
        while start > floor {
            let (s, e) = lines[start - 1];
            let prev = content[s..e].trim();
            if prev.is_empty() || !is_comment_line(prev, rules.comment_prefixes) {
                break;
            }
            start -= 1;
        }
        markers[i].chunk_start = start;
    }

    let mut chunks = Vec::new();
    let mut group_counter = 0;

    let first_start = markers[0].chunk_start;
    if first_start > 0 {
        chunks.extend(group_chunks(content, lines, 0, first_start, &mut group_counter));
    }

    for (i, marker) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map(|m| m.chunk_start)
            .unwrap_or(lines.len());
        if end <= marker.chunk_start {
            continue; // consecutive declaration lines; previous chunk is empty
        }
        let text = region_text(content, lines, marker.chunk_start, end);
        let decl_line = {
            let (s, e) = lines[marker.line];
            content[s..e].trim_end_matches(['\n', '\r'])
        };
        let signature = extract_signature(decl_line);
        let parameters = extract_parameters(&signature, &marker.name);
        let return_type = extract_return_type(&signature);
        let doc = extract_doc(
            content,
            lines,
            marker.chunk_start,
            marker.line,
            rules.comment_prefixes,
        );
        let calls = extract_calls(&text, &marker.name);
        let variables = extract_variables(&text);

        chunks.push(SourceChunk {
            id_part: marker.name.clone(),
            symbol: Some(marker.name.clone()),
            kind: marker.kind,
            text,
            line_start: (marker.chunk_start + 1) as u32,
            line_end: end as u32,
            signature: Some(signature),
            parameters,
            return_type,
            calls,
            neighbors: Vec::new(),
            doc,
            variables,
        });
    }

    chunks
}

fn is_comment_line(trimmed: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| trimmed.starts_with(p))
}

fn extract_signature(decl_line: &str) -> String {
    let mut sig = decl_line;
    if let Some(brace) = sig.find('{') {
        sig = &sig[..brace];
    }
    sig.trim().trim_end_matches(':').trim().to_string()
}

/// Parameters come from the paren group after the symbol name, so a Go
/// receiver group is never mistaken for the parameter list.
fn extract_parameters(signature: &str, name: &str) -> Vec<String> {
    let search_from = signature
        .find(name)
        .map(|i| i + name.len())
        .unwrap_or(0);
    let Some(open) = signature[search_from..].find('(').map(|i| i + search_from) else {
        return Vec::new();
    };
    let bytes = signature.as_bytes();
    let mut depth = 0usize;
    let mut close = None;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' | b'[' | b'<' => depth += 1,
            b')' | b']' | b'>' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && b == b')' {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        return Vec::new();
    };

    let inner = &signature[open + 1..close];
    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in inner.chars() {
        match c {
            '(' | '[' | '<' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '>' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                let trimmed = current.trim().to_string();
                if !trimmed.is_empty() {
                    params.push(trimmed);
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        params.push(trimmed);
    }
    params.retain(|p| p != "self" && p != "&self" && p != "&mut self");
    params
}

fn extract_return_type(signature: &str) -> Option<String> {
    if let Some(pos) = signature.rfind("->") {
        let ret = signature[pos + 2..].trim();
        if !ret.is_empty() {
            return Some(ret.to_string());
        }
    }
    // TypeScript-style `): Type` annotation
    if let Some(close) = signature.rfind(')') {
        let after = signature[close + 1..].trim();
        if let Some(ret) = after.strip_prefix(':') {
            let ret = ret.trim();
            if !ret.is_empty() {
                return Some(ret.to_string());
            }
        }
    }
    None
}

fn extract_doc(
    content: &str,
    lines: &[(usize, usize)],
    chunk_start: usize,
    decl_line: usize,
    prefixes: &[&str],
) -> Option<String> {
    if chunk_start >= decl_line {
        return None;
    }
    let mut doc_lines = Vec::new();
    for idx in chunk_start..decl_line {
        let (s, e) = lines[idx];
        let line = content[s..e].trim();
        if is_comment_line(line, prefixes) {
            doc_lines.push(strip_comment_markers(line));
        }
    }
    if doc_lines.is_empty() {
        None
    } else {
        let joined = doc_lines.join("\n").trim().to_string();
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

fn strip_comment_markers(line: &str) -> String {
    line.trim_start_matches(['/', '!', '#', '*', '-', '('])
        .trim_end_matches(['*', '/', ')'])
        .trim()
        .to_string()
}

fn extract_calls(text: &str, own_name: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut calls = Vec::new();
    for caps in CALL_RE.captures_iter(text) {
        let name = &caps[1];
        if name == own_name || CALL_KEYWORDS.contains(name) {
            continue;
        }
        if seen.insert(name.to_string()) {
            calls.push(name.to_string());
        }
    }
    calls
}

fn extract_variables(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut vars = Vec::new();
    for caps in VAR_RE.captures_iter(text) {
        let name = caps[1].to_string();
        if seen.insert(name.clone()) {
            vars.push(name);
        }
    }
    for caps in WALRUS_RE.captures_iter(text) {
        let name = caps[1].to_string();
        if seen.insert(name.clone()) {
            vars.push(name);
        }
    }
    vars
}

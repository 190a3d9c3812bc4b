//! Codemap contract tests: ordering, presence rules, round-trips

mod common;

use common::TestRepo;
use pampax::codemap::{ChunkMetadata, Codemap};

fn metadata(file: &str, symbol: Option<&str>) -> ChunkMetadata {
    ChunkMetadata {
        file: file.to_string(),
        symbol: symbol.map(String::from),
        sha: "c".repeat(40),
        lang: "rust".to_string(),
        chunk_type: Some("function".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_insertion_order_is_observable() {
    let mut map = Codemap::new();
    map.insert("z-chunk", metadata("src/z.rs", Some("zeta")));
    map.insert("a-chunk", metadata("src/a.rs", Some("alpha")));
    map.insert("m-chunk", metadata("src/m.rs", Some("mid")));

    let out = String::from_utf8(map.to_bytes().unwrap()).unwrap();
    let z = out.find("\"z-chunk\"").unwrap();
    let a = out.find("\"a-chunk\"").unwrap();
    let m = out.find("\"m-chunk\"").unwrap();
    assert!(z < a && a < m, "top-level keys must keep insertion order");
}

#[test]
fn test_value_keys_are_lexicographic() {
    let mut map = Codemap::new();
    map.insert("chunk", metadata("src/a.rs", Some("alpha")));
    let out = String::from_utf8(map.to_bytes().unwrap()).unwrap();

    let file = out.find("\"file\"").unwrap();
    let lang = out.find("\"lang\"").unwrap();
    let sha = out.find("\"sha\"").unwrap();
    assert!(file < lang, "file before lang");
    assert!(lang < sha, "lang before sha");
}

#[test]
fn test_symbol_null_never_empty_string() {
    let mut map = Codemap::new();
    map.insert("no-symbol", metadata("src/a.rs", None));
    map.insert("blank-symbol", metadata("src/b.rs", Some("   ")));

    let out = String::from_utf8(map.to_bytes().unwrap()).unwrap();
    assert_eq!(out.matches("\"symbol\": null").count(), 2);
    assert!(!out.contains("\"symbol\": \"\""));
}

#[test]
fn test_always_present_arrays_even_when_empty() {
    let mut map = Codemap::new();
    map.insert("chunk", metadata("src/a.rs", Some("f")));
    let out = String::from_utf8(map.to_bytes().unwrap()).unwrap();
    for key in [
        "\"synonyms\"",
        "\"symbol_calls\"",
        "\"symbol_call_targets\"",
        "\"symbol_callers\"",
        "\"symbol_neighbors\"",
    ] {
        assert!(out.contains(key), "{key} must always be present");
    }
}

#[test]
fn test_symbol_parameters_omitted_when_empty() {
    let mut with_params = metadata("src/a.rs", Some("f"));
    with_params.symbol_parameters = Some(vec!["input: &str".to_string()]);
    let mut without_params = metadata("src/b.rs", Some("g"));
    without_params.symbol_parameters = Some(Vec::new());

    let mut map = Codemap::new();
    map.insert("with", with_params);
    map.insert("without", without_params);

    let out = String::from_utf8(map.to_bytes().unwrap()).unwrap();
    assert_eq!(out.matches("symbol_parameters").count(), 1);
}

#[test]
fn test_optional_strings_omitted_when_empty() {
    let mut meta = metadata("src/a.rs", Some("f"));
    meta.chunk_type = Some("  ".to_string());
    meta.symbol_signature = Some(String::new());
    meta.symbol_return = None;
    meta.provider = None;
    meta.last_used_at = None;

    let mut map = Codemap::new();
    map.insert("chunk", meta);
    let out = String::from_utf8(map.to_bytes().unwrap()).unwrap();
    for key in [
        "chunkType",
        "symbol_signature",
        "symbol_return",
        "provider",
        "last_used_at",
    ] {
        assert!(!out.contains(key), "{key} must be omitted when empty");
    }
}

#[test]
fn test_numeric_defaults_and_clamps() {
    let mut meta = metadata("src/a.rs", Some("f"));
    meta.path_weight = 0.0;
    meta.success_rate = 2.5;
    let mut map = Codemap::new();
    map.insert("chunk", meta);

    let entry = map.get("chunk").unwrap();
    assert_eq!(entry.path_weight, 1.0);
    assert_eq!(entry.success_rate, 1.0);

    let mut negative = metadata("src/b.rs", Some("g"));
    negative.path_weight = -1.0;
    negative.success_rate = -0.25;
    map.insert("neg", negative);
    let entry = map.get("neg").unwrap();
    assert_eq!(entry.path_weight, 1.0);
    assert_eq!(entry.success_rate, 0.0);
}

#[test]
fn test_paths_forward_slashed_and_relative() {
    let mut map = Codemap::new();
    map.insert("chunk", metadata(".\\src\\deep\\mod.rs", Some("f")));
    assert_eq!(map.get("chunk").unwrap().file, "src/deep/mod.rs");
}

#[test]
fn test_parse_reemit_identical_bytes() {
    let mut map = Codemap::new();
    let mut rich = metadata("src/a.rs", Some("handler"));
    rich.provider = Some("OpenAI".to_string());
    rich.dimensions = Some(1536);
    rich.symbol_parameters = Some(vec!["req: Request".to_string()]);
    rich.symbol_calls = vec!["validate".to_string(), "respond".to_string()];
    rich.synonyms = vec!["handle".to_string()];
    map.insert("z-first", rich);
    map.insert("a-second", metadata("src/b.rs", None));

    let bytes = map.to_bytes().unwrap();
    let parsed = Codemap::parse(&bytes).unwrap();
    assert_eq!(parsed, map);
    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn test_formatting_contract() {
    let mut map = Codemap::new();
    map.insert("chunk", metadata("src/a.rs", Some("f")));
    let bytes = map.to_bytes().unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();

    assert!(text.ends_with('\n'), "trailing newline required");
    assert!(!text.ends_with("\n\n"), "exactly one trailing newline");
    assert!(!text.contains('\r'), "LF only");
    assert!(text.contains("\n  \""), "two-space indentation");
}

#[test]
fn test_write_is_atomic_and_loadable() {
    let repo = TestRepo::new();
    let mut map = Codemap::new();
    map.insert("chunk", metadata("src/a.rs", Some("f")));
    map.write(&repo.codemap_path()).unwrap();

    let loaded = Codemap::load(&repo.codemap_path()).unwrap();
    assert_eq!(loaded, map);

    // Overwrite with new content; no backup or partial state left behind
    let mut updated = Codemap::new();
    updated.insert("other", metadata("src/b.rs", None));
    updated.write(&repo.codemap_path()).unwrap();
    let reloaded = Codemap::load(&repo.codemap_path()).unwrap();
    assert_eq!(reloaded, updated);
}

#[test]
fn test_arrays_sanitized() {
    let mut meta = metadata("src/a.rs", Some("f"));
    meta.symbol_calls = vec![
        " validate ".to_string(),
        "validate".to_string(),
        String::new(),
        "respond".to_string(),
    ];
    let mut map = Codemap::new();
    map.insert("chunk", meta);
    assert_eq!(
        map.get("chunk").unwrap().symbol_calls,
        vec!["validate", "respond"]
    );
}

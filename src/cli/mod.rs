//! CLI surface for pampax
//!
//! Four commands (`index`, `update` as a full reindex in v1, `search`,
//! `info`), all emitting a JSON envelope on stdout. Logs go to stderr;
//! `--pretty` switches them to a human console format, the default is
//! JSON lines. Panics are caught at the command boundary and reported as
//! `INTERNAL_ERROR`.

mod commands;
pub(crate) mod output;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};

use output::{print_error, CliError, ErrorCode};

// Exit codes
const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

static CANCEL: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "pampax")]
#[command(about = "Local semantic code index: chunk, embed, and search your repository")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Human-readable console logging instead of JSON lines
    #[arg(long, global = true)]
    pretty: bool,

    /// Verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Path to a config file (replaces the implicit user/project files)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a repository and produce .pampa artifacts
    Index(ReindexArgs),
    /// Reindex a repository (full reindex)
    Update(ReindexArgs),
    /// Search indexed chunks
    Search(SearchArgs),
    /// Show index health and statistics
    Info(InfoArgs),
}

#[derive(Args)]
pub struct ReindexArgs {
    /// Repository root (defaults to the current directory)
    pub path: Option<PathBuf>,

    /// Embedding provider: auto, openai, transformers, local, ollama, cohere
    #[arg(short = 'p', long, default_value = "auto")]
    pub provider: String,

    /// Master key (base64 or hex, 32 bytes) for chunk encryption
    #[arg(long)]
    pub encryption_key: Option<String>,

    /// Encrypt chunk payloads (on|off); on uses encryption when a key is configured
    #[arg(long, default_value = "on")]
    pub encrypt: String,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Search query (quote multi-word queries)
    pub query: String,

    /// Repository root (defaults to the current directory)
    pub path: Option<PathBuf>,

    /// Maximum number of results
    #[arg(short = 'k', long, visible_alias = "top", default_value = "10")]
    pub limit: usize,

    /// Embedding provider: auto, openai, transformers, local, ollama, cohere
    #[arg(short = 'p', long, default_value = "auto")]
    pub provider: String,

    /// Master key (base64 or hex, 32 bytes) for reading encrypted chunks
    #[arg(long)]
    pub encryption_key: Option<String>,

    /// Filter by language (repeatable)
    #[arg(long = "lang")]
    pub languages: Vec<String>,

    /// Filter by file path glob (repeatable)
    #[arg(long = "path_glob")]
    pub path_globs: Vec<String>,

    /// Filter by tag (repeatable)
    #[arg(long = "tags")]
    pub tags: Vec<String>,

    /// Hybrid BM25 + vector fusion (on|off)
    #[arg(long, default_value = "on")]
    pub hybrid: String,

    /// BM25 candidate generation (on|off)
    #[arg(long, default_value = "on")]
    pub bm25: String,

    /// Symbol-aware ranking boost (on|off)
    #[arg(long, default_value = "on")]
    pub symbol_boost: String,

    /// Reranker mode (off|transformers|api); defaults to the configured mode
    #[arg(long)]
    pub reranker: Option<String>,
}

#[derive(Args)]
pub struct InfoArgs {}

/// Install the Ctrl+C handler: first signal requests cooperative
/// cancellation, second forces exit.
fn setup_signal_handler() {
    let result = ctrlc::set_handler(|| {
        if CANCEL.swap(true, Ordering::SeqCst) {
            std::process::exit(EXIT_INTERRUPTED);
        }
        eprintln!("\nInterrupted. Finishing current batch...");
    });
    if let Err(e) = result {
        tracing::debug!(error = %e, "failed to install Ctrl+C handler");
    }
}

fn init_logging(pretty: bool, verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    if pretty {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Parse arguments, run the selected command, and exit non-zero on error.
pub fn run() {
    let cli = Cli::parse();
    init_logging(cli.pretty, cli.verbose);
    setup_signal_handler();

    let config_file = cli.config.as_deref();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        match &cli.command {
            Commands::Index(args) => commands::cmd_reindex("index", args, config_file, &CANCEL),
            Commands::Update(args) => commands::cmd_reindex("update", args, config_file, &CANCEL),
            Commands::Search(args) => commands::cmd_search(args, config_file),
            Commands::Info(args) => commands::cmd_info(args),
        }
    }));

    let result = match outcome {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unexpected panic".to_string());
            Err(CliError::new(
                ErrorCode::InternalError,
                format!("internal error: {message}"),
            )
            .with_hint("this is a bug; rerun with --verbose and report the logs"))
        }
    };

    if let Err(error) = result {
        tracing::error!(code = error.code.as_str(), message = %error.message, "command failed");
        print_error(&error);
        std::process::exit(EXIT_FAILURE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_flags() {
        let cli = Cli::parse_from([
            "pampax",
            "search",
            "auth middleware",
            "--limit",
            "5",
            "--lang",
            "rust",
            "--path_glob",
            "src/**",
            "--hybrid",
            "off",
        ]);
        let Commands::Search(args) = cli.command else {
            panic!("expected search command");
        };
        assert_eq!(args.query, "auth middleware");
        assert_eq!(args.limit, 5);
        assert_eq!(args.languages, vec!["rust"]);
        assert_eq!(args.path_globs, vec!["src/**"]);
        assert_eq!(args.hybrid, "off");
        assert_eq!(args.bm25, "on");
        assert!(args.reranker.is_none());
    }

    #[test]
    fn test_top_alias_for_limit() {
        let cli = Cli::parse_from(["pampax", "search", "q", "--top", "3"]);
        let Commands::Search(args) = cli.command else {
            panic!("expected search command");
        };
        assert_eq!(args.limit, 3);
    }

    #[test]
    fn test_index_defaults() {
        let cli = Cli::parse_from(["pampax", "index"]);
        let Commands::Index(args) = cli.command else {
            panic!("expected index command");
        };
        assert!(args.path.is_none());
        assert_eq!(args.provider, "auto");
        assert_eq!(args.encrypt, "on");
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["pampax", "info", "--pretty", "--verbose"]);
        assert!(cli.pretty);
        assert!(cli.verbose);
    }
}

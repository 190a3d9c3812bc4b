//! `index` and `update` commands (full reindex in v1)

use std::path::Path;
use std::sync::atomic::AtomicBool;

use super::{parse_toggle, resolve_master_key, resolve_root, ArtifactPaths};
use crate::chunks::ChunkStore;
use crate::cli::output::{print_success, CliError};
use crate::cli::ReindexArgs;
use crate::config::Config;
use crate::indexer::Indexer;
use crate::providers::create_provider;
use crate::store::Store;

pub fn cmd_reindex(
    command_name: &str,
    args: &ReindexArgs,
    config_file: Option<&Path>,
    cancel: &AtomicBool,
) -> Result<(), CliError> {
    let encrypt_requested = parse_toggle("encrypt", &args.encrypt)?;
    let root = resolve_root(args.path.as_deref());
    let config = Config::load(config_file, &root)?;

    let master_key = resolve_master_key(args.encryption_key.as_deref(), &config)?;
    // `--encrypt on` is the default and means "encrypt when a key is
    // configured"; plaintext chunks are still valid artifacts without one.
    let encrypt = encrypt_requested && master_key.is_some();

    let provider = create_provider(&args.provider, &config.provider_config())?;
    tracing::info!(
        command = command_name,
        root = %root.display(),
        provider = provider.name(),
        dimensions = provider.dimensions(),
        encrypt,
        "starting index run"
    );

    let paths = ArtifactPaths::for_root(&root);
    std::fs::create_dir_all(&paths.pampa_dir)
        .map_err(|e| CliError::from(crate::indexer::IndexerError::Io(e)))?;

    let store = Store::open(&paths.db)?;
    store.init()?;
    let chunk_store = ChunkStore::new(&paths.chunks_dir, master_key);

    let indexer = Indexer::new(&store, &chunk_store, provider.as_ref())
        .with_cancel(cancel)
        .with_max_tokens(config.max_tokens);
    let summary = indexer.run(&root, encrypt, &paths.codemap)?;

    tracing::info!(
        files = summary.files_indexed,
        chunks = summary.chunks_indexed,
        removed = summary.chunks_removed,
        warnings = summary.warnings.len(),
        "index run complete"
    );
    print_success(&summary);
    Ok(())
}

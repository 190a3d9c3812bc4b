//! `info` command

use serde::Serialize;

use super::{resolve_root, ArtifactPaths};
use crate::cli::output::{print_success, CliError};
use crate::cli::InfoArgs;
use crate::store::{IndexStats, Store};

#[derive(Serialize)]
struct InfoEnvelope {
    project: ProjectInfo,
    stats: IndexStats,
}

#[derive(Serialize)]
struct ProjectInfo {
    root: String,
    db_path: String,
    chunks_dir: String,
    codemap_present: bool,
}

pub fn cmd_info(_args: &InfoArgs) -> Result<(), CliError> {
    let root = resolve_root(None);
    let paths = ArtifactPaths::for_root(&root);
    paths.require_index()?;

    let store = Store::open(&paths.db)?;
    let stats = store.stats(&paths.db)?;

    print_success(&InfoEnvelope {
        project: ProjectInfo {
            root: root.display().to_string(),
            db_path: paths.db.display().to_string(),
            chunks_dir: paths.chunks_dir.display().to_string(),
            codemap_present: paths.codemap.exists(),
        },
        stats,
    });
    Ok(())
}

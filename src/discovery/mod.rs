//! Repository discovery: parallel walker + layered ignore engine
//!
//! The walker produces a sorted, deduplicated list of repo-relative
//! forward-slash paths whose extension is in the supported set, plus a
//! deterministic sorted list of warnings. Concurrency is observably opaque:
//! results are collected and sorted before return, so output is identical
//! across runs and platforms regardless of worker scheduling.

pub mod defaults;
mod ignore;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use thiserror::Error;

pub use defaults::{default_supported_extensions, DEFAULT_IGNORE_PATTERNS};
pub use self::ignore::{IgnoreDecision, IgnoreError, IgnoreMatcher, RuleSource};

use crate::pathutil::normalize_under_root;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("resolve root path: {0}")]
    Root(std::io::Error),
    #[error("root path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error(transparent)]
    Ignore(#[from] IgnoreError),
}

/// Classification of non-fatal problems encountered during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarningCode {
    BrokenSymlink,
    PermissionDenied,
    ReadDirFailed,
    StatFailed,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::BrokenSymlink => "broken_symlink",
            WarningCode::PermissionDenied => "permission_denied",
            WarningCode::ReadDirFailed => "read_dir_failed",
            WarningCode::StatFailed => "stat_failed",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal problem tied to a repo-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub code: WarningCode,
    pub path: String,
    pub message: String,
}

/// Inclusion filter consulted by the walker with repo-relative paths.
pub trait Matcher: Sync {
    fn should_skip_dir(&self, relative_path: &str) -> bool;
    fn should_skip_file(&self, relative_path: &str) -> bool;
}

impl Matcher for IgnoreMatcher {
    fn should_skip_dir(&self, relative_path: &str) -> bool {
        IgnoreMatcher::should_skip_dir(self, relative_path)
    }
    fn should_skip_file(&self, relative_path: &str) -> bool {
        IgnoreMatcher::should_skip_file(self, relative_path)
    }
}

/// Options for a walk. `workers` of zero means host parallelism.
pub struct WalkOptions<'a> {
    pub root: PathBuf,
    pub workers: usize,
    pub supported_exts: Option<HashSet<String>>,
    pub matcher: Option<&'a dyn Matcher>,
}

impl<'a> WalkOptions<'a> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workers: 0,
            supported_exts: None,
            matcher: None,
        }
    }

    fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Walk output: sorted paths and sorted warnings.
#[derive(Debug, Default)]
pub struct WalkResult {
    pub paths: Vec<String>,
    pub warnings: Vec<Warning>,
}

enum Job {
    Dir(PathBuf),
    Shutdown,
}

/// Walk a repository root with a fixed pool of directory workers.
///
/// Symbolic links are never traversed; a symlink with a missing target
/// produces a `broken_symlink` warning. Permission failures warn and skip
/// the subtree without aborting the walk.
pub fn walk(options: WalkOptions) -> Result<WalkResult, DiscoveryError> {
    let root = options.root.canonicalize().map_err(DiscoveryError::Root)?;
    let meta = std::fs::metadata(&root).map_err(DiscoveryError::Root)?;
    if !meta.is_dir() {
        return Err(DiscoveryError::NotADirectory(root));
    }

    let worker_count = options.worker_count();
    let exts = options
        .supported_exts
        .clone()
        .unwrap_or_else(default_supported_extensions);

    let paths = Mutex::new(Vec::new());
    let warnings = Mutex::new(Vec::new());
    // Outstanding directory jobs; the worker that drops it to zero shuts the
    // pool down.
    let pending = AtomicUsize::new(1);

    let (tx, rx) = crossbeam_channel::unbounded::<Job>();
    tx.send(Job::Dir(root.clone()))
        .expect("walker channel open at start");

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let tx = tx.clone();
            let rx = rx.clone();
            let root = &root;
            let exts = &exts;
            let paths = &paths;
            let warnings = &warnings;
            let pending = &pending;
            let matcher = options.matcher;
            scope.spawn(move || {
                while let Ok(job) = rx.recv() {
                    let dir = match job {
                        Job::Shutdown => break,
                        Job::Dir(dir) => dir,
                    };

                    process_directory(
                        root, &dir, exts, matcher, &tx, pending, paths, warnings,
                    );

                    if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                        for _ in 0..worker_count {
                            let _ = tx.send(Job::Shutdown);
                        }
                    }
                }
            });
        }
    });

    let mut paths = paths.into_inner().unwrap_or_default();
    paths.sort();
    paths.dedup();

    let mut warnings = warnings.into_inner().unwrap_or_default();
    warnings.sort_by(|a, b| {
        (a.path.as_str(), a.code.as_str(), a.message.as_str())
            .cmp(&(b.path.as_str(), b.code.as_str(), b.message.as_str()))
    });

    Ok(WalkResult { paths, warnings })
}

#[allow(clippy::too_many_arguments)]
fn process_directory(
    root: &Path,
    dir: &Path,
    exts: &HashSet<String>,
    matcher: Option<&dyn Matcher>,
    tx: &crossbeam_channel::Sender<Job>,
    pending: &AtomicUsize,
    paths: &Mutex<Vec<String>>,
    warnings: &Mutex<Vec<Warning>>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            let rel = normalize_under_root(root, dir);
            push_warning(warnings, classify_read_dir_error(rel, &e));
            return;
        }
    };

    let mut entries: Vec<_> = entries.filter_map(Result::ok).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let full = entry.path();
        let rel = normalize_under_root(root, &full);

        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                push_warning(
                    warnings,
                    Warning {
                        code: WarningCode::StatFailed,
                        path: rel,
                        message: format!("failed to read path metadata: {e}"),
                    },
                );
                continue;
            }
        };

        // Symlinks are skipped whether they point at files or directories;
        // a dangling target is still worth reporting.
        if file_type.is_symlink() {
            if let Err(e) = std::fs::metadata(&full) {
                push_warning(warnings, classify_stat_error(rel, &e));
            }
            continue;
        }

        if file_type.is_dir() {
            if matcher.map(|m| m.should_skip_dir(&rel)).unwrap_or(false) {
                continue;
            }
            pending.fetch_add(1, Ordering::AcqRel);
            let _ = tx.send(Job::Dir(full));
            continue;
        }

        if !file_type.is_file() {
            continue;
        }

        if matcher.map(|m| m.should_skip_file(&rel)).unwrap_or(false) {
            continue;
        }

        let ext = match full.extension().and_then(|e| e.to_str()) {
            Some(e) => format!(".{}", e.to_lowercase()),
            None => continue,
        };
        if !exts.contains(&ext) {
            continue;
        }

        paths.lock().expect("walker paths lock").push(rel);
    }
}

fn push_warning(warnings: &Mutex<Vec<Warning>>, warning: Warning) {
    warnings.lock().expect("walker warnings lock").push(warning);
}

fn classify_read_dir_error(path: String, err: &std::io::Error) -> Warning {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        Warning {
            code: WarningCode::PermissionDenied,
            path,
            message: format!("permission denied while reading directory: {err}"),
        }
    } else {
        Warning {
            code: WarningCode::ReadDirFailed,
            path,
            message: format!("failed to read directory: {err}"),
        }
    }
}

fn classify_stat_error(path: String, err: &std::io::Error) -> Warning {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => Warning {
            code: WarningCode::PermissionDenied,
            path,
            message: format!("permission denied while reading path metadata: {err}"),
        },
        std::io::ErrorKind::NotFound => Warning {
            code: WarningCode::BrokenSymlink,
            path,
            message: format!("broken symlink target: {err}"),
        },
        _ => Warning {
            code: WarningCode::StatFailed,
            path,
            message: format!("failed to read path metadata: {err}"),
        },
    }
}

//! Path normalization and atomic file writes
//!
//! Every path stored in the database, chunk store, or codemap is
//! repository-relative with forward slashes. These helpers are the single
//! place that enforces that, plus the rename-over-temp write primitive the
//! artifact writers share.

use std::io;
use std::path::Path;
use std::time::Duration;

/// Normalize a repository-relative path for storage.
///
/// Backslashes become forward slashes, and leading `./` or `/` are stripped.
/// The result is suitable for byte-wise sorting and cross-platform artifacts.
pub fn normalize_relative(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    while let Some(rest) = normalized.strip_prefix('/') {
        normalized = rest.to_string();
    }
    normalized
}

/// Normalize the path of `full` relative to `root`.
///
/// Falls back to normalizing the full path when it is not under `root`.
pub fn normalize_under_root(root: &Path, full: &Path) -> String {
    let rel = full.strip_prefix(root).unwrap_or(full);
    normalize_relative(&rel.to_string_lossy())
}

/// Write `data` to `path` atomically: temp file in the same directory, then
/// rename. Readers never observe a partially written file.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    io::Write::write_all(&mut tmp, data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Retry a filesystem operation a few times with bounded backoff.
///
/// Covers transient failures (lock contention, EAGAIN-style interruptions).
/// Non-transient errors are returned on the first attempt.
pub fn retry_io<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    const ATTEMPTS: u32 = 3;
    let mut delay = Duration::from_millis(10);
    let mut last_err = None;
    for attempt in 0..ATTEMPTS {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_transient(&e) => {
                tracing::debug!(attempt, error = %e, "transient filesystem error, retrying");
                last_err = Some(e);
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::other("retry_io: no attempts made")))
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::ResourceBusy
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_backslashes() {
        assert_eq!(normalize_relative("src\\main.rs"), "src/main.rs");
    }

    #[test]
    fn test_normalize_strips_leading_dot_slash() {
        assert_eq!(normalize_relative("./src/main.rs"), "src/main.rs");
    }

    #[test]
    fn test_normalize_strips_leading_slash() {
        assert_eq!(normalize_relative("/src/main.rs"), "src/main.rs");
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = normalize_relative("./a\\b/c");
        assert_eq!(normalize_relative(&once), once);
    }

    #[test]
    fn test_write_atomic_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_write_atomic_overwrites() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_retry_io_succeeds_after_transient() {
        let mut calls = 0;
        let result = retry_io(|| {
            calls += 1;
            if calls < 2 {
                Err(io::Error::from(io::ErrorKind::Interrupted))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_retry_io_gives_up_on_permanent() {
        let mut calls = 0;
        let result: io::Result<()> = retry_io(|| {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::NotFound))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}

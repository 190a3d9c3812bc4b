//! Content addressing for chunk texts

use sha1::{Digest, Sha1};

/// Compute the SHA-1 of the raw UTF-8 bytes of a chunk text.
///
/// The hash covers the bytes exactly as they appear in the source file:
/// BOM, CRLF line endings, everything. Returns 40 lowercase hex characters.
pub fn compute_sha(code: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

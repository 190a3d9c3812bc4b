//! Gzip compression for chunk payloads

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::ChunkStoreError;

/// Gzip-compress `data` at the default compression level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, ChunkStoreError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Expand a gzip payload back into raw bytes.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ChunkStoreError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = b"fn main() { println!(\"hello\"); }";
        let compressed = compress(data).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_roundtrip_empty() {
        let compressed = compress(b"").unwrap();
        assert_eq!(decompress(&compressed).unwrap(), b"");
    }

    #[test]
    fn test_roundtrip_preserves_mixed_line_endings() {
        let data = b"line one\r\nline two\nline three\r\n";
        let compressed = compress(data).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), data.to_vec());
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress(b"not a gzip stream").is_err());
    }
}

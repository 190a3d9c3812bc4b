//! Authenticated encryption for chunk payloads
//!
//! Encrypted chunks use the `PAMPAE1` envelope:
//!
//! ```text
//! "PAMPAE1" || salt(16) || iv(12) || ciphertext || tag(16)
//! ```
//!
//! Each write derives a fresh AES-256 key via HKDF-SHA256 from the 32-byte
//! master key and a random per-chunk salt, then seals the gzipped plaintext
//! with AES-256-GCM (empty AAD). Interchangeable with the other
//! implementations of this format.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use super::ChunkStoreError;

pub(crate) const MAGIC_HEADER: &[u8] = b"PAMPAE1";
pub(crate) const SALT_LEN: usize = 16;
pub(crate) const IV_LEN: usize = 12;
pub(crate) const TAG_LEN: usize = 16;
const HKDF_INFO: &[u8] = b"pampa-chunk-v1";

/// Derive the per-chunk AES key from a 32-byte master key and a 16-byte salt.
pub fn derive_chunk_key(master_key: &[u8], salt: &[u8]) -> Result<[u8; 32], ChunkStoreError> {
    if master_key.len() != 32 {
        return Err(ChunkStoreError::InvalidMasterKey(format!(
            "invalid master key length: got {}, want 32",
            master_key.len()
        )));
    }
    if salt.len() != SALT_LEN {
        return Err(ChunkStoreError::InvalidMasterKey(format!(
            "invalid salt length: got {}, want {}",
            salt.len(),
            SALT_LEN
        )));
    }

    let hk = Hkdf::<Sha256>::new(Some(salt), master_key);
    let mut derived = [0u8; 32];
    hk.expand(HKDF_INFO, &mut derived)
        .map_err(|e| ChunkStoreError::Crypto(format!("derive hkdf key: {e}")))?;
    Ok(derived)
}

/// Wrap gzipped bytes into the `PAMPAE1` encrypted chunk format.
pub fn encrypt(gzipped: &[u8], master_key: &[u8]) -> Result<Vec<u8>, ChunkStoreError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let key = derive_chunk_key(master_key, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| ChunkStoreError::Crypto(format!("create aes cipher: {e}")))?;

    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: gzipped,
                aad: &[],
            },
        )
        .map_err(|e| ChunkStoreError::Crypto(format!("seal chunk payload: {e}")))?;

    let mut payload = Vec::with_capacity(MAGIC_HEADER.len() + SALT_LEN + IV_LEN + sealed.len());
    payload.extend_from_slice(MAGIC_HEADER);
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&iv);
    payload.extend_from_slice(&sealed);
    Ok(payload)
}

/// Unwrap a `PAMPAE1` payload and return the gzipped bytes.
///
/// Authentication failure is reported as [`ChunkStoreError::AuthFailed`],
/// which covers both tampering and a wrong master key. The payload is never
/// partially returned.
pub fn decrypt(payload: &[u8], master_key: &[u8]) -> Result<Vec<u8>, ChunkStoreError> {
    let min_len = MAGIC_HEADER.len() + SALT_LEN + IV_LEN + TAG_LEN + 1;
    if payload.len() < min_len {
        return Err(ChunkStoreError::MalformedPayload(
            "encrypted chunk payload is truncated".to_string(),
        ));
    }
    if &payload[..MAGIC_HEADER.len()] != MAGIC_HEADER {
        return Err(ChunkStoreError::MalformedPayload(
            "encrypted chunk payload has an unknown header".to_string(),
        ));
    }

    let salt_start = MAGIC_HEADER.len();
    let iv_start = salt_start + SALT_LEN;
    let cipher_start = iv_start + IV_LEN;

    let salt = &payload[salt_start..iv_start];
    let iv = &payload[iv_start..cipher_start];
    let sealed = &payload[cipher_start..];

    let key = derive_chunk_key(master_key, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| ChunkStoreError::Crypto(format!("create aes cipher: {e}")))?;

    cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: sealed,
                aad: &[],
            },
        )
        .map_err(|_| ChunkStoreError::AuthFailed)
}

/// Parse a master key from its accepted encodings.
///
/// Accepts exactly two forms of a 32-byte key: standard base64 (44 chars)
/// or hex (64 chars). Anything else is rejected at load time so a bad key
/// never reaches a read or write.
pub fn parse_master_key(raw: &str) -> Result<[u8; 32], ChunkStoreError> {
    let trimmed = raw.trim();
    let decoded = match trimmed.len() {
        44 => BASE64.decode(trimmed).map_err(|e| {
            ChunkStoreError::InvalidMasterKey(format!("invalid base64 master key: {e}"))
        })?,
        64 => hex::decode(trimmed).map_err(|e| {
            ChunkStoreError::InvalidMasterKey(format!("invalid hex master key: {e}"))
        })?,
        n => {
            return Err(ChunkStoreError::InvalidMasterKey(format!(
                "master key must be 44 base64 chars or 64 hex chars, got {n} chars"
            )))
        }
    };

    let bytes: [u8; 32] = decoded.try_into().map_err(|_| {
        ChunkStoreError::InvalidMasterKey("master key must decode to exactly 32 bytes".to_string())
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8;
        }
        key
    }

    #[test]
    fn test_hkdf_known_vector() {
        let master: Vec<u8> = (0u8..0x20).collect();
        let salt = hex::decode("f0e0d0c0b0a090807060504030201000").unwrap();
        let derived = derive_chunk_key(&master, &salt).unwrap();
        assert_eq!(
            hex::encode(derived),
            "6eed612f20f4bcb23e0f5f3023a337c73647da8e626041dea455feafe5ba3b99"
        );
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = b"gzipped chunk bytes";
        let sealed = encrypt(plaintext, &key).unwrap();
        assert_eq!(&sealed[..7], b"PAMPAE1");
        assert_eq!(decrypt(&sealed, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_decrypt_wrong_key_fails_auth() {
        let sealed = encrypt(b"secret", &test_key()).unwrap();
        let mut other = test_key();
        other[0] ^= 0xff;
        assert!(matches!(
            decrypt(&sealed, &other),
            Err(ChunkStoreError::AuthFailed)
        ));
    }

    #[test]
    fn test_decrypt_tampered_payload_fails_auth() {
        let key = test_key();
        let mut sealed = encrypt(b"secret", &key).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            decrypt(&sealed, &key),
            Err(ChunkStoreError::AuthFailed)
        ));
    }

    #[test]
    fn test_decrypt_truncated_payload() {
        assert!(matches!(
            decrypt(b"PAMPAE1short", &test_key()),
            Err(ChunkStoreError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decrypt_unknown_header() {
        let bogus = vec![0u8; 128];
        assert!(matches!(
            decrypt(&bogus, &test_key()),
            Err(ChunkStoreError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_salts_are_fresh_per_write() {
        let key = test_key();
        let a = encrypt(b"same input", &key).unwrap();
        let b = encrypt(b"same input", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_master_key_hex() {
        let hex_key = "00".repeat(32);
        assert_eq!(parse_master_key(&hex_key).unwrap(), [0u8; 32]);
    }

    #[test]
    fn test_parse_master_key_base64() {
        let encoded = BASE64.encode([7u8; 32]);
        assert_eq!(encoded.len(), 44);
        assert_eq!(parse_master_key(&encoded).unwrap(), [7u8; 32]);
    }

    #[test]
    fn test_parse_master_key_rejects_other_lengths() {
        assert!(parse_master_key("short").is_err());
        assert!(parse_master_key(&"ab".repeat(16)).is_err()); // 32 hex chars = 16 bytes
    }

    proptest! {
        /// decrypt(encrypt(x, K), K) == x for any payload and any 32-byte key
        #[test]
        fn prop_encrypt_roundtrip(
            data in prop::collection::vec(any::<u8>(), 0..2048),
            key in prop::array::uniform32(any::<u8>())
        ) {
            let sealed = encrypt(&data, &key).unwrap();
            prop_assert_eq!(decrypt(&sealed, &key).unwrap(), data);
        }

        /// Decryption with a different key always fails
        #[test]
        fn prop_wrong_key_rejected(
            data in prop::collection::vec(any::<u8>(), 1..512),
            key in prop::array::uniform32(any::<u8>()),
            flip in 0usize..32
        ) {
            let sealed = encrypt(&data, &key).unwrap();
            let mut other = key;
            other[flip] ^= 0x01;
            prop_assert!(decrypt(&sealed, &other).is_err());
        }
    }
}

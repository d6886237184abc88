//! Hashing and key derivation helpers. Kept apart from password hashing and
//! the envelope cipher so each primitive has one obvious caller.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("hkdf expansion failed: {0}")]
    HkdfFailed(String),
    #[error("hmac failed: {0}")]
    HmacFailed(String),
}

type HmacSha256 = Hmac<Sha256>;

const SHORT_ID_LEN: usize = 8;

/// Produces a raw SHA-256 digest of the provided bytes.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Returns the hexadecimal representation of a SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_digest(data))
}

/// Generates an HMAC-SHA256 tag for the provided data.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, IntegrityError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| IntegrityError::HmacFailed(format!("{e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derives key material using HKDF-SHA256.
pub fn hkdf_expand(
    input_key_material: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, IntegrityError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), input_key_material);
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm)
        .map_err(|e| IntegrityError::HkdfFailed(format!("{e}")))?;
    Ok(okm)
}

/// Keyed hash of a client address. Submissions keep this instead of the IP.
pub fn hash_ip(pepper: &[u8], ip: &str) -> Result<String, IntegrityError> {
    hmac_sha256(pepper, ip.as_bytes()).map(hex::encode)
}

/// Short display id for e-mail subjects and logs. Not unique.
pub fn short_id(id: &str) -> String {
    sha256_hex(id.as_bytes())[..SHORT_ID_LEN].to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::{hash_ip, hkdf_expand, hmac_sha256, sha256_hex, short_id};

    #[test]
    fn hashes_to_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn builds_hmac() {
        let tag = hmac_sha256(b"key", b"payload").expect("hmac should succeed");
        assert_eq!(tag.len(), 32);
        assert_eq!(tag, hmac_sha256(b"key", b"payload").unwrap());
        assert_ne!(tag, hmac_sha256(b"other", b"payload").unwrap());
    }

    #[test]
    fn expands_with_hkdf() {
        let okm = hkdf_expand(b"ikm", b"salt", b"info", 42).expect("hkdf should work");
        assert_eq!(okm.len(), 42);
    }

    #[test]
    fn ip_hash_is_keyed_and_stable() {
        let a = hash_ip(b"pepper", "203.0.113.7").unwrap();
        assert_eq!(a, hash_ip(b"pepper", "203.0.113.7").unwrap());
        assert_ne!(a, hash_ip(b"pepper2", "203.0.113.7").unwrap());
        assert!(!a.contains("203"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn short_id_is_eight_uppercase_hex_chars() {
        let id = short_id("0123456789abcdef0123456789abcdef");
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(id, short_id("0123456789abcdef0123456789abcdef"));
    }
}

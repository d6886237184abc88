//! Authenticated envelope built on ChaCha20-Poly1305.
//! The submission list is stored as iv + ciphertext + auth tag so the data
//! directory never holds a plaintext copy of anything a visitor typed.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use super::integrity::sha256_digest;

const NONCE_LEN: usize = 12;
const TAG_SIZE: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid key length; expected 32 bytes")]
    InvalidKeyLength,
    #[error("encryption secret is empty")]
    EmptySecret,
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("base64 decoding failed: {0}")]
    Base64DecodeFailed(String),
}

/// Serializable envelope for encrypted data. Every field is base64 so the
/// envelope can be written as a small JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub iv: String,
    #[serde(rename = "authTag")]
    pub auth_tag: String,
    pub data: String,
}

/// Holds the symmetric key that protects the submission store.
pub struct EnvelopeCipher {
    key: Key,
}

impl EnvelopeCipher {
    /// Builds a cipher from raw key bytes. The key must be 32 bytes.
    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if key_bytes.len() != KEY_LEN {
            return Err(EnvelopeError::InvalidKeyLength);
        }
        let mut key = Key::default();
        key.copy_from_slice(key_bytes);
        Ok(Self { key })
    }

    /// Derives the key by hashing the configured secret with SHA-256.
    pub fn from_secret(secret: &str) -> Result<Self, EnvelopeError> {
        if secret.is_empty() {
            return Err(EnvelopeError::EmptySecret);
        }
        let mut digest = sha256_digest(secret.as_bytes());
        let cipher = Self::from_key_bytes(&digest)?;
        digest.zeroize();
        Ok(cipher)
    }

    /// Encrypts plaintext under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope, EnvelopeError> {
        let cipher = ChaCha20Poly1305::new(&self.key);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

        let mut ciphertext_and_tag = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| EnvelopeError::EncryptionFailed(format!("{e}")))?;
        if ciphertext_and_tag.len() < TAG_SIZE {
            return Err(EnvelopeError::EncryptionFailed(
                "ciphertext shorter than authentication tag".to_string(),
            ));
        }
        let tag_start = ciphertext_and_tag.len() - TAG_SIZE;
        let tag_bytes = ciphertext_and_tag.split_off(tag_start);

        Ok(Envelope {
            iv: STANDARD_NO_PAD.encode(nonce),
            auth_tag: STANDARD_NO_PAD.encode(tag_bytes),
            data: STANDARD_NO_PAD.encode(ciphertext_and_tag),
        })
    }

    /// Verifies the tag and returns the plaintext. Any mismatch is an error;
    /// nothing is recovered from a damaged envelope.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
        let nonce_bytes = decode(&envelope.iv)?;
        let tag = decode(&envelope.auth_tag)?;
        let ciphertext = decode(&envelope.data)?;

        if nonce_bytes.len() != NONCE_LEN {
            return Err(EnvelopeError::DecryptionFailed(
                "nonce length mismatch".to_string(),
            ));
        }
        if tag.len() != TAG_SIZE {
            return Err(EnvelopeError::DecryptionFailed(
                "auth tag length mismatch".to_string(),
            ));
        }

        let mut combined = Vec::with_capacity(ciphertext.len() + tag.len());
        combined.extend_from_slice(&ciphertext);
        combined.extend_from_slice(&tag);

        let cipher = ChaCha20Poly1305::new(&self.key);
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), combined.as_ref())
            .map_err(|e| EnvelopeError::DecryptionFailed(format!("{e}")))
    }
}

fn decode(field: &str) -> Result<Vec<u8>, EnvelopeError> {
    STANDARD_NO_PAD
        .decode(field.as_bytes())
        .map_err(|e| EnvelopeError::Base64DecodeFailed(format!("{e}")))
}

impl Drop for EnvelopeCipher {
    fn drop(&mut self) {
        self.key.as_mut_slice().zeroize();
    }
}

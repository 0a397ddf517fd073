//! Field codec — authenticated symmetric encryption of individual values.
//!
//! Each value is sealed with AES-256-GCM under the process-wide key and a
//! fresh random 96-bit nonce. The stored text form is
//! `base64(nonce || ciphertext || tag)`, so encrypting the same plaintext
//! twice never yields the same string.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};

use crate::error::CodecError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypts and decrypts text fields with a pre-shared key.
#[derive(Clone)]
pub struct FieldCodec {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCodec").finish_non_exhaustive()
    }
}

impl FieldCodec {
    /// Build a codec from a base64 key (standard or URL-safe alphabet).
    pub fn from_base64_key(key: &SecretString) -> Result<Self, CodecError> {
        let encoded = key.expose_secret().trim();
        let raw = BASE64
            .decode(encoded.as_bytes())
            .or_else(|_| URL_SAFE.decode(encoded.as_bytes()))
            .map_err(|e| CodecError::InvalidKey(format!("not base64: {e}")))?;
        if raw.len() != KEY_LEN {
            return Err(CodecError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                raw.len()
            )));
        }
        Self::from_bytes(&raw)
    }

    fn from_bytes(key: &[u8]) -> Result<Self, CodecError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| CodecError::InvalidKey("wrong key length".into()))?;
        Ok(Self { cipher })
    }

    /// Generate a random key, base64-encoded.
    pub fn generate_key() -> SecretString {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        SecretString::from(BASE64.encode(key))
    }

    /// Encrypt one value. Non-deterministic.
    pub fn encrypt(&self, value: &str) -> Result<String, CodecError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(nonce, value.as_bytes())
            .map_err(|_| CodecError::Encrypt)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt) under the same key.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CodecError> {
        let blob = BASE64
            .decode(ciphertext.trim().as_bytes())
            .map_err(|e| CodecError::Decode(format!("invalid base64: {e}")))?;
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::Decode("ciphertext truncated".into()));
        }
        let (nonce_bytes, sealed) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| CodecError::Decode("authentication failed (wrong key or tampered)".into()))?;
        String::from_utf8(plaintext).map_err(|e| CodecError::Decode(format!("not UTF-8: {e}")))
    }

    /// Encrypt a fixed-order tuple of fields. Output order matches input order.
    pub fn encrypt_fields<const N: usize>(
        &self,
        values: [&str; N],
    ) -> Result<[String; N], CodecError> {
        let mut out: [String; N] = std::array::from_fn(|_| String::new());
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = self.encrypt(value)?;
        }
        Ok(out)
    }

    /// Decrypt a fixed-order tuple of fields.
    pub fn decrypt_fields<const N: usize>(
        &self,
        values: [&str; N],
    ) -> Result<[String; N], CodecError> {
        let mut out: [String; N] = std::array::from_fn(|_| String::new());
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = self.decrypt(value)?;
        }
        Ok(out)
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Secret Codec
//!
//! Authenticated symmetric encryption for every field persisted at rest
//! (SMTP passwords, webhook secrets, repository credentials). AES-256-GCM
//! with a fresh random 96-bit nonce per seal; the stored form is
//! `base64(nonce ‖ ciphertext‖tag)`.
//!
//! The codec is an explicitly constructed, injected object: whichever
//! component assembles the storage layer at startup builds one from the
//! configured key and hands it to every collaborator that touches secret
//! fields. Components that may run before key initialization hold
//! `Option<Arc<SecretCodec>>` and fail with
//! [`SecretCodecError::KeyNotInitialized`] when a sealed field is touched
//! without one.
//!
//! Empty plaintext maps to empty storage: an unset optional secret must not
//! leak a fixed-size ciphertext saying "no secret configured".

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;

const NONCE_SIZE: usize = 12; // 96 bits for AES-GCM
pub const KEY_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SecretCodecError {
    #[error("encryption key not initialized")]
    KeyNotInitialized,

    #[error("encryption key must be exactly {KEY_SIZE} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("stored value is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("stored value shorter than one nonce")]
    TooShort,

    #[error("authentication failed (tampered data or wrong key)")]
    AuthenticationFailed,

    #[error("encryption failed")]
    EncryptionFailed,
}

pub struct SecretCodec {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec").finish_non_exhaustive()
    }
}

impl SecretCodec {
    /// Build a codec from exactly [`KEY_SIZE`] key bytes.
    pub fn new(key: &[u8]) -> Result<Self, SecretCodecError> {
        if key.len() != KEY_SIZE {
            return Err(SecretCodecError::InvalidKeyLength(key.len()));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| SecretCodecError::InvalidKeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    /// Encrypt a plaintext field for storage. `seal("") == ""`.
    ///
    /// A fresh nonce is drawn from the OS CSPRNG on every call; nonce reuse
    /// under the same key breaks GCM entirely.
    pub fn seal(&self, plaintext: &str) -> Result<String, SecretCodecError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| SecretCodecError::EncryptionFailed)?;

        let mut raw = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(raw))
    }

    /// Decrypt a stored field. `open("") == ""`.
    pub fn open(&self, stored: &str) -> Result<String, SecretCodecError> {
        if stored.is_empty() {
            return Ok(String::new());
        }

        let raw = BASE64.decode(stored)?;
        if raw.len() < NONCE_SIZE {
            return Err(SecretCodecError::TooShort);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| SecretCodecError::AuthenticationFailed)?;

        String::from_utf8(plaintext).map_err(|_| SecretCodecError::AuthenticationFailed)
    }
}

/// Resolve an optional injected codec, failing hard when a sealed field is
/// touched before key initialization.
pub fn require_codec(codec: Option<&SecretCodec>) -> Result<&SecretCodec, SecretCodecError> {
    codec.ok_or(SecretCodecError::KeyNotInitialized)
}

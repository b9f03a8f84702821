//! Authenticated encryption primitives for the note vault.
//!
//! Three AEAD algorithms coexist because two on-disk formats do:
//!
//! - XChaCha20-Poly1305 is the v2 default (24-byte nonce, AAD supported).
//! - AES-256-GCM appears in v1 records and is still accepted in v2
//!   (12-byte nonce, AAD supported).
//! - XSalsa20-Poly1305 is v1 legacy only (24-byte nonce, no AAD); old
//!   records name it `chacha20-poly1305`, which the serde alias absorbs.
//!
//! Security foot-guns to avoid:
//!
//! - Never reuse a `(key, nonce)` pair. Every encrypt call here expects a
//!   freshly sampled nonce; [`generate_nonce`] is the only sanctioned source.
//! - Do not log or print keys, plaintext, or decrypted note content.
//! - Treat returned plaintext as sensitive; it is handed back wrapped in
//!   `Zeroizing` to reduce accidental retention.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use crypto_secretbox::XSalsa20Poly1305;
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretSlice};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Size (bytes) of every symmetric key in the vault.
pub const KEY_LEN: usize = 32;
/// Size (bytes) of the Poly1305 / GCM authentication tag.
pub const TAG_LEN: usize = 16;
/// Size (bytes) of XChaCha20 and XSalsa20 nonces.
pub const XCHACHA_NONCE_LEN: usize = 24;
/// Size (bytes) of AES-GCM nonces (the "IV" in GCM parlance).
pub const AES_GCM_NONCE_LEN: usize = 12;

/// Secret bytes held in memory with zeroize-on-drop semantics.
///
/// We prefer `SecretSlice<u8>` (a boxed slice) because it:
/// - can be constructed from a `Vec<u8>` via `From<Vec<u8>>`
/// - ensures the backing memory is zeroized on drop
pub type SecretBytes = SecretSlice<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeadAlgorithm {
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    // Legacy records written by early clients label XSalsa20-Poly1305 as
    // "chacha20-poly1305"; both names decode to the same cipher.
    #[serde(rename = "xsalsa20-poly1305", alias = "chacha20-poly1305")]
    XSalsa20Poly1305,
}

impl AeadAlgorithm {
    pub fn nonce_len(self) -> usize {
        match self {
            AeadAlgorithm::XChaCha20Poly1305 | AeadAlgorithm::XSalsa20Poly1305 => {
                XCHACHA_NONCE_LEN
            }
            AeadAlgorithm::Aes256Gcm => AES_GCM_NONCE_LEN,
        }
    }

    pub fn supports_aad(self) -> bool {
        !matches!(self, AeadAlgorithm::XSalsa20Poly1305)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AeadAlgorithm::XChaCha20Poly1305 => "xchacha20-poly1305",
            AeadAlgorithm::Aes256Gcm => "aes-256-gcm",
            AeadAlgorithm::XSalsa20Poly1305 => "xsalsa20-poly1305",
        }
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length")]
    InvalidKeyLength,

    #[error("invalid nonce length")]
    InvalidNonceLength,

    #[error("algorithm does not support associated data")]
    AadUnsupported,

    #[error("aead error")]
    Aead,
}

/// Generate `N` cryptographically-secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a fresh 32-byte symmetric key.
pub fn generate_key() -> SecretBytes {
    SecretBytes::from(random_bytes::<KEY_LEN>().to_vec())
}

/// Sample a fresh nonce of the length `alg` requires.
pub fn generate_nonce(alg: AeadAlgorithm) -> Vec<u8> {
    let mut nonce = vec![0u8; alg.nonce_len()];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `key`, returning ciphertext with the tag
/// appended.
///
/// Pass an empty `aad` for no associated data. XSalsa20-Poly1305 rejects a
/// non-empty `aad` rather than silently dropping it.
pub fn encrypt(
    alg: AeadAlgorithm,
    key: &SecretBytes,
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_inputs(alg, nonce, aad)?;
    let payload = Payload {
        msg: plaintext,
        aad,
    };
    match alg {
        AeadAlgorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new_from_slice(key.expose_secret())
                .map_err(|_| CryptoError::InvalidKeyLength)?;
            cipher
                .encrypt(XNonce::from_slice(nonce), payload)
                .map_err(|_| CryptoError::Aead)
        }
        AeadAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key.expose_secret())
                .map_err(|_| CryptoError::InvalidKeyLength)?;
            cipher
                .encrypt(aes_gcm::Nonce::from_slice(nonce), payload)
                .map_err(|_| CryptoError::Aead)
        }
        AeadAlgorithm::XSalsa20Poly1305 => {
            let cipher = XSalsa20Poly1305::new_from_slice(key.expose_secret())
                .map_err(|_| CryptoError::InvalidKeyLength)?;
            cipher
                .encrypt(crypto_secretbox::Nonce::from_slice(nonce), payload)
                .map_err(|_| CryptoError::Aead)
        }
    }
}

/// Decrypt `ciphertext` (tag included) under `key`.
///
/// Fails with [`CryptoError::Aead`] on any tag mismatch, wrong key, wrong
/// nonce, or AAD mismatch. Plaintext is returned wrapped in
/// `Zeroizing<Vec<u8>>` to reduce accidental retention.
pub fn decrypt(
    alg: AeadAlgorithm,
    key: &SecretBytes,
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    check_inputs(alg, nonce, aad)?;
    let payload = Payload {
        msg: ciphertext,
        aad,
    };
    let plaintext = match alg {
        AeadAlgorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new_from_slice(key.expose_secret())
                .map_err(|_| CryptoError::InvalidKeyLength)?;
            cipher
                .decrypt(XNonce::from_slice(nonce), payload)
                .map_err(|_| CryptoError::Aead)?
        }
        AeadAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key.expose_secret())
                .map_err(|_| CryptoError::InvalidKeyLength)?;
            cipher
                .decrypt(aes_gcm::Nonce::from_slice(nonce), payload)
                .map_err(|_| CryptoError::Aead)?
        }
        AeadAlgorithm::XSalsa20Poly1305 => {
            let cipher = XSalsa20Poly1305::new_from_slice(key.expose_secret())
                .map_err(|_| CryptoError::InvalidKeyLength)?;
            cipher
                .decrypt(crypto_secretbox::Nonce::from_slice(nonce), payload)
                .map_err(|_| CryptoError::Aead)?
        }
    };
    Ok(Zeroizing::new(plaintext))
}

fn check_inputs(alg: AeadAlgorithm, nonce: &[u8], aad: &[u8]) -> Result<(), CryptoError> {
    if nonce.len() != alg.nonce_len() {
        return Err(CryptoError::InvalidNonceLength);
    }
    if !aad.is_empty() && !alg.supports_aad() {
        return Err(CryptoError::AadUnsupported);
    }
    Ok(())
}

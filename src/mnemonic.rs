//! Recovery phrase handling.
//!
//! The 12-word BIP-39 phrase is the only long-term secret. Everything the
//! rest of the crate needs is derived from its normalized form: the KDF
//! input, the full SHA-256 vault hash used to authenticate unlock attempts,
//! and the short `vault-` identifier used to scope stored records.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::aead::random_bytes;

/// Required phrase length in words.
pub const WORD_COUNT: usize = 12;
/// Entropy (bytes) behind a 12-word phrase.
const ENTROPY_LEN: usize = 16;
/// Hex characters of the vault hash kept in the vault id.
const VAULT_ID_HEX_LEN: usize = 16;

const VAULT_ID_PREFIX: &str = "vault-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MnemonicError {
    #[error("invalid mnemonic phrase")]
    Invalid,
}

/// A validated, normalized recovery phrase.
///
/// The phrase is held in a [`SecretString`] so it is zeroized on drop and
/// never shows up in `Debug` output.
pub struct Mnemonic {
    phrase: SecretString,
}

impl std::fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mnemonic").finish_non_exhaustive()
    }
}

impl Mnemonic {
    /// Generate a fresh phrase from 128 bits of OS entropy.
    pub fn generate() -> Result<Self, MnemonicError> {
        let entropy = random_bytes::<ENTROPY_LEN>();
        let mnemonic = bip39::Mnemonic::from_entropy_in(bip39::Language::English, &entropy)
            .map_err(|_| MnemonicError::Invalid)?;
        Ok(Self {
            phrase: SecretString::from(mnemonic.to_string()),
        })
    }

    /// Normalize and validate `phrase` (12 words, checksum holds).
    pub fn parse(phrase: &str) -> Result<Self, MnemonicError> {
        let normalized = normalize(phrase);
        let mnemonic =
            bip39::Mnemonic::parse_in_normalized(bip39::Language::English, &normalized)
                .map_err(|_| MnemonicError::Invalid)?;
        if mnemonic.word_count() != WORD_COUNT {
            return Err(MnemonicError::Invalid);
        }
        Ok(Self {
            phrase: SecretString::from(normalized),
        })
    }

    /// The normalized phrase. Treat as sensitive.
    pub fn phrase(&self) -> &str {
        self.phrase.expose_secret()
    }

    /// Full hex SHA-256 of the normalized phrase.
    pub fn vault_hash(&self) -> String {
        hash_normalized(self.phrase())
    }

    /// `vault-` followed by the first 16 hex chars of the vault hash.
    pub fn vault_id(&self) -> String {
        let hash = self.vault_hash();
        format!("{VAULT_ID_PREFIX}{}", &hash[..VAULT_ID_HEX_LEN])
    }
}

/// Trim, collapse internal whitespace to single spaces, lowercase.
pub fn normalize(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `phrase` is a valid 12-word BIP-39 phrase under normalization.
pub fn validate(phrase: &str) -> bool {
    Mnemonic::parse(phrase).is_ok()
}

/// Hex SHA-256 of the normalized form of `phrase`, without validating it.
pub fn vault_hash(phrase: &str) -> String {
    hash_normalized(&normalize(phrase))
}

/// Vault identifier for `phrase`, without validating it.
pub fn vault_id(phrase: &str) -> String {
    let hash = vault_hash(phrase);
    format!("{VAULT_ID_PREFIX}{}", &hash[..VAULT_ID_HEX_LEN])
}

fn hash_normalized(normalized: &str) -> String {
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

//! Key derivation from the recovery phrase.
//!
//! Two families cover the two on-disk formats: Argon2id is the preferred
//! stretch for every newly created vault, PBKDF2-HMAC-SHA256 is kept for
//! legacy vaults and as the runtime fallback. Tunings are protocol
//! constants, not user policy: vaults must derive the same key on every
//! device, so there is no runtime calibration.

use argon2::{Algorithm, Argon2, Params as Argon2Params, Version};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::aead::SecretBytes;

/// Output size (bytes) of the derived vault key.
pub const KEY_LEN: usize = 32;
/// Size (bytes) of the per-vault KDF salt.
pub const SALT_LEN: usize = 16;

/// Argon2id protocol constants: 64 MiB, 3 passes, 4 lanes.
pub const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
pub const ARGON2_ITERATIONS: u32 = 3;
pub const ARGON2_PARALLELISM: u32 = 4;

/// PBKDF2-HMAC-SHA256 protocol constant.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdfAlgorithm {
    #[serde(rename = "argon2id")]
    Argon2id,
    #[serde(rename = "pbkdf2")]
    Pbkdf2,
}

impl KdfAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            KdfAlgorithm::Argon2id => "argon2id",
            KdfAlgorithm::Pbkdf2 => "pbkdf2",
        }
    }
}

/// KDF tuning persisted unencrypted with the vault metadata.
///
/// Created once per vault and immutable afterwards. `memory_kib` and
/// `parallelism` are only meaningful for Argon2id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    #[serde(with = "salt_b64")]
    pub salt: [u8; SALT_LEN],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_kib: Option<u32>,
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
}

impl KdfParams {
    /// Fixed tunings for `algorithm` with a fresh random salt.
    pub fn generate(algorithm: KdfAlgorithm) -> Self {
        Self::with_salt(algorithm, generate_salt())
    }

    /// Fixed tunings for `algorithm` with a caller-provided salt.
    pub fn with_salt(algorithm: KdfAlgorithm, salt: [u8; SALT_LEN]) -> Self {
        match algorithm {
            KdfAlgorithm::Argon2id => Self {
                algorithm,
                salt,
                memory_kib: Some(ARGON2_MEMORY_KIB),
                iterations: ARGON2_ITERATIONS,
                parallelism: Some(ARGON2_PARALLELISM),
            },
            KdfAlgorithm::Pbkdf2 => Self {
                algorithm,
                salt,
                memory_kib: None,
                iterations: PBKDF2_ITERATIONS,
                parallelism: None,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum KdfError {
    #[error("argon2 error")]
    Argon2(#[from] argon2::Error),

    #[error("key derivation unavailable")]
    Unavailable,
}

/// Result of [`derive_with_fallback`].
pub struct Derived {
    pub key: SecretBytes,
    /// Algorithm that actually ran (differs from the stored one after a
    /// runtime downgrade).
    pub algorithm: KdfAlgorithm,
    pub downgraded: bool,
}

/// Generate a fresh 16-byte KDF salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Stretch the normalized phrase bytes into a 32-byte key per `params`.
pub fn derive(phrase: &[u8], params: &KdfParams) -> Result<SecretBytes, KdfError> {
    match params.algorithm {
        KdfAlgorithm::Argon2id => derive_argon2id(phrase, params),
        KdfAlgorithm::Pbkdf2 => Ok(derive_pbkdf2(phrase, &params.salt, params.iterations)),
    }
}

/// Like [`derive`], but if the Argon2id instantiation fails at runtime the
/// derivation downgrades to PBKDF2 at the protocol iteration count instead of
/// failing outright. The downgrade is reported to the caller and logged; the
/// stored params are never rewritten.
pub fn derive_with_fallback(phrase: &[u8], params: &KdfParams) -> Result<Derived, KdfError> {
    match params.algorithm {
        KdfAlgorithm::Argon2id => match derive_argon2id(phrase, params) {
            Ok(key) => Ok(Derived {
                key,
                algorithm: KdfAlgorithm::Argon2id,
                downgraded: false,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "argon2id unavailable, downgrading to pbkdf2");
                Ok(Derived {
                    key: derive_pbkdf2(phrase, &params.salt, PBKDF2_ITERATIONS),
                    algorithm: KdfAlgorithm::Pbkdf2,
                    downgraded: true,
                })
            }
        },
        KdfAlgorithm::Pbkdf2 => Ok(Derived {
            key: derive_pbkdf2(phrase, &params.salt, params.iterations),
            algorithm: KdfAlgorithm::Pbkdf2,
            downgraded: false,
        }),
    }
}

fn derive_argon2id(phrase: &[u8], params: &KdfParams) -> Result<SecretBytes, KdfError> {
    let argon2_params = Argon2Params::new(
        params.memory_kib.unwrap_or(ARGON2_MEMORY_KIB),
        params.iterations,
        params.parallelism.unwrap_or(ARGON2_PARALLELISM),
        Some(KEY_LEN),
    )?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut out = vec![0u8; KEY_LEN];
    argon2.hash_password_into(phrase, &params.salt, &mut out)?;
    Ok(SecretBytes::from(out))
}

fn derive_pbkdf2(phrase: &[u8], salt: &[u8], iterations: u32) -> SecretBytes {
    let mut out = vec![0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(phrase, salt, iterations, &mut out);
    SecretBytes::from(out)
}

pub mod salt_b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD_NO_PAD;
    use serde::{Deserialize, Deserializer, Serializer, de};

    use super::SALT_LEN;

    pub fn serialize<S>(salt: &[u8; SALT_LEN], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD_NO_PAD.encode(salt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; SALT_LEN], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = STANDARD_NO_PAD
            .decode(s.as_bytes())
            .map_err(de::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| de::Error::custom("salt must be 16 bytes"))
    }
}

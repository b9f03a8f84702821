//! On-disk payload formats for a single encrypted blob.
//!
//! v2 is a self-describing JSON object; v1 is an opaque base64 blob laid out
//! as nonce-then-ciphertext, where the nonce length is fixed by the record's
//! algorithm. Detection happens once, here, so higher layers dispatch on a
//! tagged [`Detected`] value instead of re-sniffing bytes.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aead::AeadAlgorithm;
use crate::kdf::{KdfAlgorithm, KdfParams, SALT_LEN};

/// Version string carried in every v2 payload. Absence means v1.
pub const VERSION_V2: &str = "2.0";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("unsupported payload version {0}")]
    UnsupportedVersion(String),

    #[error("invalid base64 encoding")]
    InvalidEncoding,

    #[error("invalid kdf descriptor: {0}")]
    InvalidKdf(&'static str),

    #[error("payload too short for {0} nonce")]
    TruncatedV1(&'static str),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// KDF parameters as serialized inside a v2 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfDescriptor {
    pub alg: KdfAlgorithm,
    pub salt_b64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<u32>,
    pub iter: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub par: Option<u32>,
}

impl KdfDescriptor {
    pub fn from_params(params: &KdfParams) -> Self {
        Self {
            alg: params.algorithm,
            salt_b64: STANDARD_NO_PAD.encode(params.salt),
            mem: params.memory_kib,
            iter: params.iterations,
            par: params.parallelism,
        }
    }

    pub fn to_params(&self) -> Result<KdfParams, PayloadError> {
        let salt_bytes = STANDARD_NO_PAD
            .decode(self.salt_b64.as_bytes())
            .map_err(|_| PayloadError::InvalidEncoding)?;
        let salt: [u8; SALT_LEN] = salt_bytes
            .as_slice()
            .try_into()
            .map_err(|_| PayloadError::InvalidKdf("salt must be 16 bytes"))?;
        Ok(KdfParams {
            algorithm: self.alg,
            salt,
            memory_kib: self.mem,
            iterations: self.iter,
            parallelism: self.par,
        })
    }
}

/// A self-describing v2 payload.
///
/// Binary fields are unpadded standard base64; the serialized form is the
/// canonical JSON object stored in encrypted note fields, session tokens,
/// and backup envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadV2 {
    pub v: String,
    pub kdf: KdfDescriptor,
    pub nonce_b64: String,
    pub ct_b64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_b64: Option<String>,
}

impl PayloadV2 {
    pub fn new(
        kdf_params: &KdfParams,
        nonce: &[u8],
        ciphertext: &[u8],
        aad: Option<&[u8]>,
    ) -> Self {
        Self {
            v: VERSION_V2.to_owned(),
            kdf: KdfDescriptor::from_params(kdf_params),
            nonce_b64: STANDARD_NO_PAD.encode(nonce),
            ct_b64: STANDARD_NO_PAD.encode(ciphertext),
            aad_b64: aad.map(|bytes| STANDARD_NO_PAD.encode(bytes)),
        }
    }

    pub fn serialize(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a v2 payload, rejecting unknown version strings.
    pub fn parse(blob: &str) -> Result<Self, PayloadError> {
        let payload: PayloadV2 = serde_json::from_str(blob)?;
        if payload.v != VERSION_V2 {
            return Err(PayloadError::UnsupportedVersion(payload.v));
        }
        Ok(payload)
    }

    pub fn nonce(&self) -> Result<Vec<u8>, PayloadError> {
        STANDARD_NO_PAD
            .decode(self.nonce_b64.as_bytes())
            .map_err(|_| PayloadError::InvalidEncoding)
    }

    pub fn ciphertext(&self) -> Result<Vec<u8>, PayloadError> {
        STANDARD_NO_PAD
            .decode(self.ct_b64.as_bytes())
            .map_err(|_| PayloadError::InvalidEncoding)
    }

    pub fn aad(&self) -> Result<Option<Vec<u8>>, PayloadError> {
        self.aad_b64
            .as_deref()
            .map(|b64| {
                STANDARD_NO_PAD
                    .decode(b64.as_bytes())
                    .map_err(|_| PayloadError::InvalidEncoding)
            })
            .transpose()
    }
}

/// Outcome of format detection on a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detected {
    V2(PayloadV2),
    /// Opaque legacy blob; split with [`parse_v1`] once the record's
    /// algorithm is known.
    V1,
}

/// Decide which format a stored blob is in.
///
/// A JSON object with `v == "2.0"` is v2; a JSON object carrying any other
/// version string is rejected outright; everything else is treated as an
/// opaque v1 blob.
pub fn detect(blob: &str) -> Result<Detected, PayloadError> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(blob) else {
        return Ok(Detected::V1);
    };
    let Some(obj) = value.as_object() else {
        return Ok(Detected::V1);
    };
    match obj.get("v").and_then(serde_json::Value::as_str) {
        Some(VERSION_V2) => Ok(Detected::V2(PayloadV2::parse(blob)?)),
        Some(other) => Err(PayloadError::UnsupportedVersion(other.to_owned())),
        None => Ok(Detected::V1),
    }
}

/// Encode a v1 blob: standard (padded) base64 over nonce-then-ciphertext,
/// matching what legacy clients produced.
pub fn encode_v1(nonce: &[u8], ciphertext: &[u8]) -> String {
    let mut raw = Vec::with_capacity(nonce.len() + ciphertext.len());
    raw.extend_from_slice(nonce);
    raw.extend_from_slice(ciphertext);
    STANDARD.encode(raw)
}

/// Split a v1 blob into `(nonce, ciphertext)` using the nonce length of
/// `alg`.
pub fn parse_v1(blob: &str, alg: AeadAlgorithm) -> Result<(Vec<u8>, Vec<u8>), PayloadError> {
    let raw = STANDARD
        .decode(blob.as_bytes())
        .map_err(|_| PayloadError::InvalidEncoding)?;
    let nonce_len = alg.nonce_len();
    if raw.len() < nonce_len {
        return Err(PayloadError::TruncatedV1(alg.as_str()));
    }
    let (nonce, ciphertext) = raw.split_at(nonce_len);
    Ok((nonce.to_vec(), ciphertext.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> KdfParams {
        KdfParams::with_salt(KdfAlgorithm::Argon2id, [9u8; SALT_LEN])
    }

    #[test]
    fn v2_serialize_parse_roundtrip() {
        let payload = PayloadV2::new(&sample_params(), &[1u8; 24], b"ciphertext", Some(b"aad"));
        let blob = payload.serialize().unwrap();
        let parsed = PayloadV2::parse(&blob).unwrap();
        assert_eq!(parsed, payload);
        assert_eq!(parsed.nonce().unwrap(), vec![1u8; 24]);
        assert_eq!(parsed.ciphertext().unwrap(), b"ciphertext");
        assert_eq!(parsed.aad().unwrap().unwrap(), b"aad");
    }

    #[test]
    fn v2_without_aad_omits_the_field() {
        let payload = PayloadV2::new(&sample_params(), &[0u8; 24], b"ct", None);
        let blob = payload.serialize().unwrap();
        assert!(!blob.contains("aad_b64"));
        assert_eq!(PayloadV2::parse(&blob).unwrap().aad().unwrap(), None);
    }

    #[test]
    fn kdf_descriptor_roundtrips_params() {
        let params = sample_params();
        let descriptor = KdfDescriptor::from_params(&params);
        assert_eq!(descriptor.to_params().unwrap(), params);

        let pbkdf2 = KdfParams::with_salt(KdfAlgorithm::Pbkdf2, [2u8; SALT_LEN]);
        let descriptor = KdfDescriptor::from_params(&pbkdf2);
        assert_eq!(descriptor.mem, None);
        assert_eq!(descriptor.to_params().unwrap(), pbkdf2);
    }

    #[test]
    fn detect_classifies_v2_and_v1() {
        let v2 = PayloadV2::new(&sample_params(), &[0u8; 24], b"ct", None)
            .serialize()
            .unwrap();
        assert!(matches!(detect(&v2).unwrap(), Detected::V2(_)));

        let v1 = encode_v1(&[0u8; 24], b"ciphertext");
        assert_eq!(detect(&v1).unwrap(), Detected::V1);
    }

    #[test]
    fn detect_rejects_unknown_version() {
        let err = detect("{\"v\":\"3.0\",\"x\":1}").unwrap_err();
        assert!(matches!(err, PayloadError::UnsupportedVersion(v) if v == "3.0"));
    }

    #[test]
    fn json_object_without_version_is_v1() {
        assert_eq!(detect("{\"foo\":\"bar\"}").unwrap(), Detected::V1);
    }

    #[test]
    fn v1_splits_by_algorithm_nonce_length() {
        let nonce = [7u8; 12];
        let blob = encode_v1(&nonce, b"tail");
        let (n, ct) = parse_v1(&blob, AeadAlgorithm::Aes256Gcm).unwrap();
        assert_eq!(n, nonce);
        assert_eq!(ct, b"tail");

        let nonce = [7u8; 24];
        let blob = encode_v1(&nonce, b"tail");
        let (n, ct) = parse_v1(&blob, AeadAlgorithm::XSalsa20Poly1305).unwrap();
        assert_eq!(n, nonce);
        assert_eq!(ct, b"tail");
    }

    #[test]
    fn truncated_v1_is_rejected() {
        let blob = STANDARD.encode([0u8; 8]);
        let err = parse_v1(&blob, AeadAlgorithm::XSalsa20Poly1305).unwrap_err();
        assert!(matches!(err, PayloadError::TruncatedV1(_)));
    }
}

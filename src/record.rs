//! Note model and per-note encryption.
//!
//! A plaintext [`Note`] maps to an [`EncryptedNoteV2`] whose sensitive
//! fields are each an independent v2 payload bound to `(note-id, vault-id,
//! "2.0")`, and back. The legacy [`EncryptedNoteV1`] shape (three encrypted
//! fields, plaintext metadata) is kept for decryption and migration.
//!
//! Field ciphertexts are independent: each carries its own fresh nonce and
//! no cross-field state, so a caller may fan the AEAD calls out. All fields
//! of one note share one AAD; a failure on any single field aborts the whole
//! note with no partial plaintext surfaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::aad::AadContext;
use crate::aead::{self, AeadAlgorithm, SecretBytes};
use crate::error::VaultError;
use crate::kdf::KdfParams;
use crate::padding;
use crate::payload::{self, PayloadV2, VERSION_V2};

/// List surface a note lives in. Plaintext metadata in both formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    #[default]
    Notes,
    Favorites,
    Reminders,
    Monographs,
    Trash,
    Archive,
}

/// A decrypted note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub body: String,
    pub preview: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub section: Section,
    #[serde(default)]
    pub order: i64,
}

/// The encrypted timestamps field of a v2 record.
#[derive(Debug, Serialize, Deserialize)]
struct Timestamps {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A v2 encrypted note record.
///
/// Every `encrypted-*` field holds the string form of a v2 payload whose
/// AAD is `(id, vault_id, "2.0")`. Coarse day-precision timestamps stay in
/// the clear for list ordering without decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedNoteV2 {
    pub id: String,
    pub vault_id: String,
    pub title: String,
    pub body: String,
    pub preview: String,
    pub tags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<String>,
    pub timestamps: String,
    pub coarse_created_at: String,
    pub coarse_updated_at: String,
    pub version: String,
    pub algorithm: AeadAlgorithm,
    pub is_favorite: bool,
    pub section: Section,
    pub order: i64,
}

/// A legacy v1 encrypted note record: three encrypted fields, everything
/// else in the clear. Sparse records from early clients may omit most of
/// the metadata, hence the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedNoteV1 {
    pub id: String,
    pub title: String,
    pub body: String,
    pub preview: String,
    pub algorithm: AeadAlgorithm,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub section: Section,
    #[serde(default)]
    pub order: i64,
}

/// Encrypt `note` into a v2 record under `key`.
///
/// Always encrypts with XChaCha20-Poly1305; `kdf_params` are recorded in
/// each field payload so the record stays self-describing.
pub fn encrypt_note_v2(
    note: &Note,
    key: &SecretBytes,
    vault_id: &str,
    kdf_params: &KdfParams,
) -> Result<EncryptedNoteV2, VaultError> {
    let aad = AadContext::new(&note.id, vault_id, VERSION_V2)?.encode();

    let title = seal_field(note.title.as_bytes(), key, &aad, kdf_params)?;
    let body = seal_field(note.body.as_bytes(), key, &aad, kdf_params)?;
    let preview = seal_field(note.preview.as_bytes(), key, &aad, kdf_params)?;
    let tags = seal_field(&serde_json::to_vec(&note.tags)?, key, &aad, kdf_params)?;
    let notebook_id = note
        .notebook_id
        .as_deref()
        .map(|id| seal_field(id.as_bytes(), key, &aad, kdf_params))
        .transpose()?;
    let timestamps = seal_field(
        &serde_json::to_vec(&Timestamps {
            created_at: note.created_at,
            updated_at: note.updated_at,
        })?,
        key,
        &aad,
        kdf_params,
    )?;

    Ok(EncryptedNoteV2 {
        id: note.id.clone(),
        vault_id: vault_id.to_owned(),
        title,
        body,
        preview,
        tags,
        notebook_id,
        timestamps,
        coarse_created_at: coarse_date(note.created_at),
        coarse_updated_at: coarse_date(note.updated_at),
        version: VERSION_V2.to_owned(),
        algorithm: AeadAlgorithm::XChaCha20Poly1305,
        is_favorite: note.is_favorite,
        section: note.section,
        order: note.order,
    })
}

/// Decrypt a v2 record under `key`.
///
/// The expected AAD is always `(enc.id, enc.vault_id, "2.0")` and must match
/// the AAD recorded in each field payload byte-for-byte before any AEAD call
/// runs. A failure on any field aborts the whole note.
pub fn decrypt_note_v2(enc: &EncryptedNoteV2, key: &SecretBytes) -> Result<Note, VaultError> {
    if enc.version != VERSION_V2 {
        return Err(VaultError::Payload(
            payload::PayloadError::UnsupportedVersion(enc.version.clone()),
        ));
    }
    let expected = AadContext::new(&enc.id, &enc.vault_id, VERSION_V2)?.encode();

    let title = open_field_string(&enc.title, key, enc.algorithm, &expected)?;
    let body = open_field_string(&enc.body, key, enc.algorithm, &expected)?;
    let preview = open_field_string(&enc.preview, key, enc.algorithm, &expected)?;
    let tags: Vec<String> =
        serde_json::from_slice(&open_field(&enc.tags, key, enc.algorithm, &expected)?)?;
    let notebook_id = enc
        .notebook_id
        .as_deref()
        .map(|blob| open_field_string(blob, key, enc.algorithm, &expected))
        .transpose()?;
    let timestamps: Timestamps =
        serde_json::from_slice(&open_field(&enc.timestamps, key, enc.algorithm, &expected)?)?;

    Ok(Note {
        id: enc.id.clone(),
        title,
        body,
        preview,
        tags,
        notebook_id,
        created_at: timestamps.created_at,
        updated_at: timestamps.updated_at,
        is_favorite: enc.is_favorite,
        section: enc.section,
        order: enc.order,
    })
}

/// Encrypt `note` as a legacy v1 record: title, body, and preview only,
/// no AAD, no padding; all other fields are copied through in the clear.
pub fn encrypt_note_v1(
    note: &Note,
    key: &SecretBytes,
    algorithm: AeadAlgorithm,
) -> Result<EncryptedNoteV1, VaultError> {
    Ok(EncryptedNoteV1 {
        id: note.id.clone(),
        title: seal_field_v1(note.title.as_bytes(), key, algorithm)?,
        body: seal_field_v1(note.body.as_bytes(), key, algorithm)?,
        preview: seal_field_v1(note.preview.as_bytes(), key, algorithm)?,
        algorithm,
        tags: note.tags.clone(),
        notebook_id: note.notebook_id.clone(),
        created_at: note.created_at,
        updated_at: note.updated_at,
        is_favorite: note.is_favorite,
        section: note.section,
        order: note.order,
    })
}

/// Decrypt a legacy v1 record under `key`.
pub fn decrypt_note_v1(enc: &EncryptedNoteV1, key: &SecretBytes) -> Result<Note, VaultError> {
    Ok(Note {
        id: enc.id.clone(),
        title: open_field_v1(&enc.title, key, enc.algorithm)?,
        body: open_field_v1(&enc.body, key, enc.algorithm)?,
        preview: open_field_v1(&enc.preview, key, enc.algorithm)?,
        tags: enc.tags.clone(),
        notebook_id: enc.notebook_id.clone(),
        created_at: enc.created_at,
        updated_at: enc.updated_at,
        is_favorite: enc.is_favorite,
        section: enc.section,
        order: enc.order,
    })
}

/// Pad, encrypt, and wrap one plaintext field as a serialized v2 payload.
pub(crate) fn seal_field(
    plaintext: &[u8],
    key: &SecretBytes,
    aad: &[u8],
    kdf_params: &KdfParams,
) -> Result<String, VaultError> {
    let padded = Zeroizing::new(padding::pad(plaintext));
    let nonce = aead::generate_nonce(AeadAlgorithm::XChaCha20Poly1305);
    let ciphertext = aead::encrypt(
        AeadAlgorithm::XChaCha20Poly1305,
        key,
        &nonce,
        aad,
        &padded,
    )?;
    Ok(PayloadV2::new(kdf_params, &nonce, &ciphertext, Some(aad)).serialize()?)
}

/// Unwrap, authenticate, decrypt, and unpad one v2 payload string.
///
/// The payload's recorded AAD must equal `expected` exactly; a missing or
/// differing AAD means the record was relocated and is refused before the
/// AEAD runs.
pub(crate) fn open_field(
    blob: &str,
    key: &SecretBytes,
    algorithm: AeadAlgorithm,
    expected_aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let payload = PayloadV2::parse(blob)?;
    match payload.aad()? {
        Some(recorded) if recorded == expected_aad => {}
        _ => return Err(VaultError::AadMismatch),
    }

    let nonce = payload.nonce()?;
    let ciphertext = payload.ciphertext()?;
    let padded = aead::decrypt(algorithm, key, &nonce, expected_aad, &ciphertext)
        .map_err(decrypt_error)?;
    Ok(Zeroizing::new(padding::unpad(&padded)?))
}

fn open_field_string(
    blob: &str,
    key: &SecretBytes,
    algorithm: AeadAlgorithm,
    expected_aad: &[u8],
) -> Result<String, VaultError> {
    let bytes = open_field(blob, key, algorithm, expected_aad)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| VaultError::Decrypt)
}

fn seal_field_v1(
    plaintext: &[u8],
    key: &SecretBytes,
    algorithm: AeadAlgorithm,
) -> Result<String, VaultError> {
    let nonce = aead::generate_nonce(algorithm);
    let ciphertext = aead::encrypt(algorithm, key, &nonce, b"", plaintext)?;
    Ok(payload::encode_v1(&nonce, &ciphertext))
}

fn open_field_v1(
    blob: &str,
    key: &SecretBytes,
    algorithm: AeadAlgorithm,
) -> Result<String, VaultError> {
    let (nonce, ciphertext) = payload::parse_v1(blob, algorithm)?;
    let plaintext =
        aead::decrypt(algorithm, key, &nonce, b"", &ciphertext).map_err(decrypt_error)?;
    String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::Decrypt)
}

fn decrypt_error(err: aead::CryptoError) -> VaultError {
    match err {
        aead::CryptoError::Aead => VaultError::Decrypt,
        other => VaultError::Crypto(other),
    }
}

fn coarse_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{KdfAlgorithm, SALT_LEN};
    use chrono::TimeZone;

    fn test_key() -> SecretBytes {
        aead::generate_key()
    }

    fn test_params() -> KdfParams {
        KdfParams::with_salt(KdfAlgorithm::Argon2id, [4u8; SALT_LEN])
    }

    fn sample_note() -> Note {
        Note {
            id: "n1".to_owned(),
            title: "hello".to_owned(),
            body: "body text".to_owned(),
            preview: "body…".to_owned(),
            tags: vec!["work".to_owned(), "ideas".to_owned()],
            notebook_id: Some("nb-1".to_owned()),
            created_at: Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 16, 8, 0, 0).unwrap(),
            is_favorite: true,
            section: Section::Favorites,
            order: 7,
        }
    }

    #[test]
    fn v2_roundtrip_preserves_note() {
        let key = test_key();
        let note = sample_note();

        let enc = encrypt_note_v2(&note, &key, "vault-abc", &test_params()).unwrap();
        assert_eq!(enc.version, "2.0");
        assert_eq!(enc.algorithm, AeadAlgorithm::XChaCha20Poly1305);
        assert_eq!(enc.coarse_created_at, "2024-03-15");
        assert_eq!(enc.coarse_updated_at, "2024-03-16");
        assert_eq!(enc.order, 7);

        let back = decrypt_note_v2(&enc, &key).unwrap();
        assert_eq!(back, note);
    }

    #[test]
    fn v2_roundtrip_with_empty_fields() {
        let key = test_key();
        let mut note = sample_note();
        note.body = String::new();
        note.tags = Vec::new();
        note.notebook_id = None;

        let enc = encrypt_note_v2(&note, &key, "vault-abc", &test_params()).unwrap();
        assert!(enc.notebook_id.is_none());
        assert_eq!(decrypt_note_v2(&enc, &key).unwrap(), note);
    }

    #[test]
    fn v2_rejects_wrong_key() {
        let note = sample_note();
        let enc = encrypt_note_v2(&note, &test_key(), "vault-abc", &test_params()).unwrap();
        let err = decrypt_note_v2(&enc, &test_key()).unwrap_err();
        assert!(matches!(err, VaultError::Decrypt));
    }

    #[test]
    fn v2_relocated_record_is_refused() {
        let key = test_key();
        let note = sample_note();
        let mut enc = encrypt_note_v2(&note, &key, "vault-abc", &test_params()).unwrap();

        // Rename the record to another note id: recorded AAD no longer
        // matches the expected context.
        enc.id = "n2".to_owned();
        let err = decrypt_note_v2(&enc, &key).unwrap_err();
        assert!(matches!(err, VaultError::AadMismatch));

        enc.id = "n1".to_owned();
        enc.vault_id = "vault-other".to_owned();
        let err = decrypt_note_v2(&enc, &key).unwrap_err();
        assert!(matches!(err, VaultError::AadMismatch));
    }

    #[test]
    fn v2_tampered_ciphertext_fails() {
        use base64::Engine as _;
        use base64::engine::general_purpose::STANDARD_NO_PAD;

        let key = test_key();
        let enc = encrypt_note_v2(&sample_note(), &key, "vault-abc", &test_params()).unwrap();

        let mut payload = PayloadV2::parse(&enc.title).unwrap();
        let mut ct = payload.ciphertext().unwrap();
        ct[0] ^= 0x01;
        payload.ct_b64 = STANDARD_NO_PAD.encode(&ct);
        let mut tampered = enc.clone();
        tampered.title = payload.serialize().unwrap();

        let err = decrypt_note_v2(&tampered, &key).unwrap_err();
        assert!(matches!(err, VaultError::Decrypt));
    }

    #[test]
    fn v2_field_lengths_are_bucketed() {
        let key = test_key();
        let params = test_params();
        let mut a = sample_note();
        a.body = "x".repeat(1024);
        let mut b = sample_note();
        b.body = "x".repeat(1025);

        let enc_a = encrypt_note_v2(&a, &key, "vault-abc", &params).unwrap();
        let enc_b = encrypt_note_v2(&b, &key, "vault-abc", &params).unwrap();

        let ct_len = |enc: &EncryptedNoteV2| {
            PayloadV2::parse(&enc.body)
                .unwrap()
                .ciphertext()
                .unwrap()
                .len()
        };
        // Both bodies pad to the 2048-byte boundary.
        assert_eq!(ct_len(&enc_a), ct_len(&enc_b));
    }

    #[test]
    fn v1_roundtrip_both_algorithms() {
        for alg in [AeadAlgorithm::Aes256Gcm, AeadAlgorithm::XSalsa20Poly1305] {
            let key = test_key();
            let note = sample_note();

            let enc = encrypt_note_v1(&note, &key, alg).unwrap();
            assert_eq!(enc.algorithm, alg);
            // Plaintext metadata is carried through untouched.
            assert_eq!(enc.tags, note.tags);
            assert_eq!(enc.order, note.order);

            let back = decrypt_note_v1(&enc, &key).unwrap();
            assert_eq!(back, note);
        }
    }

    #[test]
    fn v1_rejects_wrong_key() {
        let enc =
            encrypt_note_v1(&sample_note(), &test_key(), AeadAlgorithm::Aes256Gcm).unwrap();
        let err = decrypt_note_v1(&enc, &test_key()).unwrap_err();
        assert!(matches!(err, VaultError::Decrypt));
    }

    #[test]
    fn sparse_v1_record_parses_with_defaults() {
        let json = r#"{
            "id": "old-1",
            "title": "AAAA",
            "body": "BBBB",
            "preview": "CCCC",
            "algorithm": "chacha20-poly1305",
            "created_at": "2021-06-01T00:00:00Z",
            "updated_at": "2021-06-02T00:00:00Z"
        }"#;
        let enc: EncryptedNoteV1 = serde_json::from_str(json).unwrap();
        assert_eq!(enc.algorithm, AeadAlgorithm::XSalsa20Poly1305);
        assert!(enc.tags.is_empty());
        assert_eq!(enc.section, Section::Notes);
        assert_eq!(enc.order, 0);
        assert!(!enc.is_favorite);
    }
}

//! Whole-vault encrypted backup.
//!
//! A backup is all decrypted domain data serialized once and sealed as a
//! single v2 payload inside a self-describing envelope. The envelope's
//! field names are the on-disk contract (`.json`-compatible), so they are
//! camelCase regardless of this crate's conventions. Restoring a legacy
//! envelope whose payload is an opaque v1 blob is still supported; the
//! envelope's algorithm field says how to split it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::aad::AadContext;
use crate::aead::{self, AeadAlgorithm, SecretBytes};
use crate::error::VaultError;
use crate::kdf::{KdfParams, SALT_LEN};
use crate::padding;
use crate::payload::{self, Detected, PayloadV2, VERSION_V2};
use crate::record::Note;
use crate::store::{KvSlot, RecordKind, VaultStore};
use crate::vault::Vault;

/// AAD note-id marker for backup payloads.
const BACKUP_AAD_ID: &str = "backup";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("unsupported backup version {0}")]
    UnsupportedVersion(String),

    #[error("invalid backup envelope: {0}")]
    InvalidEnvelope(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    pub id: String,
    pub title: String,
}

/// Everything a backup captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DomainData {
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub notebooks: Vec<Notebook>,
    #[serde(default)]
    pub tags: Vec<TagEntry>,
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// KDF parameters as serialized in the envelope (`kdfParams`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeKdfParams {
    pub alg: crate::kdf::KdfAlgorithm,
    pub salt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<u32>,
    pub iter: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub par: Option<u32>,
}

impl EnvelopeKdfParams {
    fn from_params(params: &KdfParams) -> Self {
        Self {
            alg: params.algorithm,
            salt: STANDARD_NO_PAD.encode(params.salt),
            mem: params.memory_kib,
            iter: params.iterations,
            par: params.parallelism,
        }
    }

    pub fn to_params(&self) -> Result<KdfParams, BackupError> {
        let salt_bytes = STANDARD_NO_PAD
            .decode(self.salt.as_bytes())
            .map_err(|_| BackupError::InvalidEnvelope("salt is not base64".to_owned()))?;
        let salt: [u8; SALT_LEN] = salt_bytes
            .as_slice()
            .try_into()
            .map_err(|_| BackupError::InvalidEnvelope("salt must be 16 bytes".to_owned()))?;
        Ok(KdfParams {
            algorithm: self.alg,
            salt,
            memory_kib: self.mem,
            iterations: self.iter,
            parallelism: self.par,
        })
    }
}

/// The self-describing backup envelope, exactly as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    pub version: String,
    pub vault_id: String,
    pub algorithm: AeadAlgorithm,
    pub kdf_params: EnvelopeKdfParams,
    pub export_date: DateTime<Utc>,
    pub encrypted_data: String,
}

impl BackupEnvelope {
    pub fn serialize(&self) -> Result<String, VaultError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Aggregate counts surfaced before a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPreview {
    pub note_count: usize,
    pub notebook_count: usize,
    pub tag_count: usize,
    pub export_date: DateTime<Utc>,
    pub algorithm: AeadAlgorithm,
    pub vault_id: String,
}

/// Serialize and encrypt `domain` into an envelope stamped `now`.
pub fn create_backup_at(
    domain: &DomainData,
    key: &SecretBytes,
    vault_id: &str,
    kdf_params: &KdfParams,
    now: DateTime<Utc>,
) -> Result<BackupEnvelope, VaultError> {
    let aad = AadContext::new(BACKUP_AAD_ID, vault_id, VERSION_V2)?.encode();
    let plaintext = Zeroizing::new(serde_json::to_vec(domain)?);
    let padded = Zeroizing::new(padding::pad(&plaintext));
    let nonce = aead::generate_nonce(AeadAlgorithm::XChaCha20Poly1305);
    let ciphertext = aead::encrypt(
        AeadAlgorithm::XChaCha20Poly1305,
        key,
        &nonce,
        &aad,
        &padded,
    )?;

    Ok(BackupEnvelope {
        version: VERSION_V2.to_owned(),
        vault_id: vault_id.to_owned(),
        algorithm: AeadAlgorithm::XChaCha20Poly1305,
        kdf_params: EnvelopeKdfParams::from_params(kdf_params),
        export_date: now,
        encrypted_data: PayloadV2::new(kdf_params, &nonce, &ciphertext, Some(&aad)).serialize()?,
    })
}

/// Serialize and encrypt `domain` into an envelope stamped with the current
/// time.
pub fn create_backup(
    domain: &DomainData,
    key: &SecretBytes,
    vault_id: &str,
    kdf_params: &KdfParams,
) -> Result<BackupEnvelope, VaultError> {
    create_backup_at(domain, key, vault_id, kdf_params, Utc::now())
}

/// Parse an envelope blob, rejecting unsupported versions.
pub fn parse_backup_envelope(blob: &str) -> Result<BackupEnvelope, VaultError> {
    let envelope: BackupEnvelope = serde_json::from_str(blob)
        .map_err(|err| VaultError::Backup(BackupError::InvalidEnvelope(err.to_string())))?;
    if envelope.version != VERSION_V2 {
        return Err(VaultError::Backup(BackupError::UnsupportedVersion(
            envelope.version,
        )));
    }
    Ok(envelope)
}

/// Decrypt the envelope and return only aggregate counts.
///
/// `None` means the data could not be decrypted, in practice the wrong
/// vault key. No detail about which check failed is surfaced.
pub fn preview_backup(envelope: &BackupEnvelope, key: &SecretBytes) -> Option<BackupPreview> {
    let domain = restore_backup(envelope, key).ok()?;
    Some(BackupPreview {
        note_count: domain.notes.len(),
        notebook_count: domain.notebooks.len(),
        tag_count: domain.tags.len(),
        export_date: envelope.export_date,
        algorithm: envelope.algorithm,
        vault_id: envelope.vault_id.clone(),
    })
}

/// Decrypt the envelope back into domain data.
///
/// Whether the result merges with or replaces existing data is the
/// caller's policy; records must be re-scoped to the destination vault id
/// when they are written back.
pub fn restore_backup(
    envelope: &BackupEnvelope,
    key: &SecretBytes,
) -> Result<DomainData, VaultError> {
    let plaintext = match payload::detect(&envelope.encrypted_data)? {
        Detected::V2(payload) => {
            let expected =
                AadContext::new(BACKUP_AAD_ID, &envelope.vault_id, VERSION_V2)?.encode();
            let aad = match payload.aad()? {
                Some(recorded) if recorded == expected => recorded,
                Some(_) => return Err(VaultError::AadMismatch),
                None => Vec::new(),
            };
            let nonce = payload.nonce()?;
            let ciphertext = payload.ciphertext()?;
            let padded = aead::decrypt(envelope.algorithm, key, &nonce, &aad, &ciphertext)
                .map_err(|_| VaultError::Decrypt)?;
            Zeroizing::new(padding::unpad(&padded)?)
        }
        Detected::V1 => {
            let (nonce, ciphertext) =
                payload::parse_v1(&envelope.encrypted_data, envelope.algorithm)?;
            let plain = aead::decrypt(envelope.algorithm, key, &nonce, b"", &ciphertext)
                .map_err(|_| VaultError::Decrypt)?;
            Zeroizing::new(plain.to_vec())
        }
    };

    Ok(serde_json::from_slice(&plaintext)?)
}

impl<S: VaultStore> Vault<S> {
    /// Collect all stored domain data and seal it into a backup envelope,
    /// stamping the `last-backup-date` slot on success.
    pub fn export_backup(&self) -> Result<BackupEnvelope, VaultError> {
        let vault_id = self.vault_id()?;

        let notes = self.load_notes()?;
        let mut notebooks = Vec::new();
        for blob in self.store().scan(RecordKind::Notebook, &vault_id)? {
            notebooks.push(serde_json::from_str(&blob)?);
        }
        let mut tags = Vec::new();
        for blob in self.store().scan(RecordKind::Tag, &vault_id)? {
            tags.push(serde_json::from_str(&blob)?);
        }
        let settings = self
            .store()
            .scan(RecordKind::Settings, &vault_id)?
            .first()
            .map(|blob| serde_json::from_str(blob))
            .transpose()?
            .unwrap_or(serde_json::Value::Null);

        let domain = DomainData {
            notes,
            notebooks,
            tags,
            settings,
        };

        let now = Utc::now();
        let envelope = self.with_state(|meta, unlocked| {
            let unlocked = unlocked.ok_or(VaultError::Locked)?;
            create_backup_at(&domain, unlocked.key, &meta.vault_id, &meta.kdf, now)
        })?;

        self.store()
            .put_kv(KvSlot::LastBackupDate, now.to_rfc3339().as_bytes())?;
        tracing::debug!(notes = domain.notes.len(), "backup exported");
        Ok(envelope)
    }
}

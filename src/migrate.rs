//! Per-record upgrade from the legacy v1 format to v2.
//!
//! Migration runs under the current vault key; no key rotation is implied.
//! Each note is independent: decrypt the legacy record, fill in the fields
//! v1 never carried, and re-encrypt through the v2 record cipher. A single
//! corrupt note is reported, not fatal to the batch.

use crate::aead::SecretBytes;
use crate::error::VaultError;
use crate::kdf::KdfParams;
use crate::record::{self, EncryptedNoteV1, EncryptedNoteV2};
use crate::store::{RecordKind, VaultStore};
use crate::vault::Vault;

/// Outcome of a migration batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub failed: usize,
    /// `(note-id, reason)` for every record that could not be upgraded.
    pub errors: Vec<(String, String)>,
}

impl MigrationReport {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    fn record_failure(&mut self, note_id: &str, err: &VaultError) {
        self.failed += 1;
        self.errors.push((note_id.to_owned(), err.to_string()));
    }
}

/// Upgrade a single v1 record to v2 under the existing key.
///
/// Fields absent from the legacy record already carry their defaults on
/// [`EncryptedNoteV1`] (empty tags, order 0, section `notes`), so the
/// produced v2 record is complete.
pub fn migrate_note_v1_to_v2(
    enc: &EncryptedNoteV1,
    key: &SecretBytes,
    vault_id: &str,
    kdf_params: &KdfParams,
) -> Result<EncryptedNoteV2, VaultError> {
    let note = record::decrypt_note_v1(enc, key)?;
    record::encrypt_note_v2(&note, key, vault_id, kdf_params)
}

/// Upgrade a batch. Failures are collected per note; the batch always runs
/// to completion.
pub fn migrate_all(
    notes: &[EncryptedNoteV1],
    key: &SecretBytes,
    vault_id: &str,
    kdf_params: &KdfParams,
) -> (Vec<EncryptedNoteV2>, MigrationReport) {
    let mut migrated = Vec::with_capacity(notes.len());
    let mut report = MigrationReport::default();

    for enc in notes {
        match migrate_note_v1_to_v2(enc, key, vault_id, kdf_params) {
            Ok(v2) => {
                migrated.push(v2);
                report.migrated += 1;
            }
            Err(err) => report.record_failure(&enc.id, &err),
        }
    }

    tracing::info!(
        migrated = report.migrated,
        failed = report.failed,
        "v1 to v2 migration batch finished"
    );
    (migrated, report)
}

impl<S: VaultStore> Vault<S> {
    /// Upgrade every stored legacy note in place.
    ///
    /// A legacy record is replaced only once the store acknowledges the put
    /// of its v2 replacement; per-note atomicity, batch never aborts.
    pub fn migrate_stored_notes(&self) -> Result<MigrationReport, VaultError> {
        let vault_id = self.vault_id()?;
        let mut report = MigrationReport::default();

        for blob in self.store().scan(RecordKind::Note, &vault_id)? {
            // Already v2: a stored record carrying the version marker.
            if serde_json::from_str::<EncryptedNoteV2>(&blob)
                .is_ok_and(|enc| enc.version == "2.0")
            {
                continue;
            }

            let enc: EncryptedNoteV1 = match serde_json::from_str(&blob) {
                Ok(enc) => enc,
                Err(err) => {
                    report.failed += 1;
                    report.errors.push(("<unparsed>".to_owned(), err.to_string()));
                    continue;
                }
            };

            let outcome = self
                .with_state(|meta, unlocked| {
                    let unlocked = unlocked.ok_or(VaultError::Locked)?;
                    migrate_note_v1_to_v2(&enc, unlocked.key, &meta.vault_id, &meta.kdf)
                })
                .and_then(|v2| {
                    let record = serde_json::to_string(&v2)?;
                    // The put replacing the legacy record is the commit
                    // point for this note.
                    self.store().put(RecordKind::Note, &v2.id, &record)?;
                    Ok(())
                });
            match outcome {
                Ok(()) => report.migrated += 1,
                Err(err) => report.record_failure(&enc.id, &err),
            }
        }

        tracing::info!(
            migrated = report.migrated,
            failed = report.failed,
            "stored-note migration finished"
        );
        Ok(report)
    }
}

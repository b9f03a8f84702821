//! Vault lifecycle: create, unlock, lock, destroy.
//!
//! The derived key and the in-memory mnemonic exist only inside the state
//! mutex while the vault is unlocked, wrapped in zeroize-on-drop holders.
//! Teardown happens inside the mutex so no reader can observe a half-wiped
//! key. Persistent state (vault id, vault hash, KDF params) lives in the
//! storage collaborator's `vault-meta` slot; the mnemonic itself is never
//! persisted outside an encrypted session token.
//!
//! Unlock authenticates by comparing SHA-256 hashes of the normalized
//! phrase in constant time. Every failure mode (malformed phrase, bad
//! checksum, wrong hash) reports only [`VaultError::AuthFailed`], so the
//! unlock boundary does not act as an oracle for which check failed.

use std::sync::Mutex;
use std::sync::mpsc;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::aead::SecretBytes;
use crate::error::VaultError;
use crate::kdf::{self, KdfAlgorithm, KdfParams};
use crate::mnemonic::Mnemonic;
use crate::record::{self, EncryptedNoteV1, EncryptedNoteV2, Note};
use crate::store::{KvSlot, RecordKind, VaultStore};

/// Lifecycle transitions published to subscribers.
///
/// A `Locked` event is the cue for collaborators holding decrypted
/// derivatives (the search index, open editors) to drop them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultEvent {
    Created,
    Unlocked,
    Locked,
    Destroyed,
}

/// Persisted vault metadata (`vault-meta` slot). Stored unencrypted; none
/// of it is secret, and the hash alone cannot unlock anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct VaultMeta {
    pub vault_id: String,
    pub vault_hash: String,
    pub kdf: KdfParams,
}

struct UnlockedState {
    key: SecretBytes,
    mnemonic: Mnemonic,
}

struct VaultState {
    meta: Option<VaultMeta>,
    unlocked: Option<UnlockedState>,
    subscribers: Vec<mpsc::Sender<VaultEvent>>,
}

/// A handle over one vault in one store.
pub struct Vault<S: VaultStore> {
    store: S,
    state: Mutex<VaultState>,
}

impl<S: VaultStore> std::fmt::Debug for Vault<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").finish_non_exhaustive()
    }
}

impl<S: VaultStore> Vault<S> {
    /// Create a new vault in `store` and enter the unlocked state.
    ///
    /// Generates a mnemonic when none is supplied. Fails with
    /// [`VaultError::AlreadyExists`] if the store already holds a vault.
    pub fn create(store: S, mnemonic: Option<Mnemonic>) -> Result<Self, VaultError> {
        if store.get_kv(KvSlot::VaultMeta)?.is_some() {
            return Err(VaultError::AlreadyExists);
        }

        let mnemonic = match mnemonic {
            Some(m) => m,
            None => Mnemonic::generate()?,
        };

        let kdf_params = KdfParams::generate(KdfAlgorithm::Argon2id);
        let derived = kdf::derive_with_fallback(mnemonic.phrase().as_bytes(), &kdf_params)?;

        let meta = VaultMeta {
            vault_id: mnemonic.vault_id(),
            vault_hash: mnemonic.vault_hash(),
            kdf: kdf_params,
        };
        store.put_kv(KvSlot::VaultMeta, &serde_json::to_vec(&meta)?)?;
        tracing::debug!(vault_id = %meta.vault_id, "vault created");

        let vault = Self {
            store,
            state: Mutex::new(VaultState {
                meta: Some(meta),
                unlocked: Some(UnlockedState {
                    key: derived.key,
                    mnemonic,
                }),
                subscribers: Vec::new(),
            }),
        };
        vault.emit(VaultEvent::Created);
        Ok(vault)
    }

    /// Open a handle over an existing vault, in the locked state.
    pub fn open(store: S) -> Result<Self, VaultError> {
        let meta = load_meta(&store)?.ok_or(VaultError::NotInitialized)?;
        Ok(Self {
            store,
            state: Mutex::new(VaultState {
                meta: Some(meta),
                unlocked: None,
                subscribers: Vec::new(),
            }),
        })
    }

    pub fn exists(&self) -> bool {
        self.state
            .lock()
            .expect("vault state mutex poisoned")
            .meta
            .is_some()
    }

    pub fn is_unlocked(&self) -> bool {
        self.state
            .lock()
            .expect("vault state mutex poisoned")
            .unlocked
            .is_some()
    }

    /// The hashed vault identifier, e.g. `vault-92f53a8c6e1d0b47`.
    pub fn vault_id(&self) -> Result<String, VaultError> {
        let state = self.state.lock().expect("vault state mutex poisoned");
        Ok(state
            .meta
            .as_ref()
            .ok_or(VaultError::NotInitialized)?
            .vault_id
            .clone())
    }

    /// Unlock with a recovery phrase.
    ///
    /// The phrase hash must match the persisted vault hash (constant-time
    /// comparison) before the KDF runs. Every failure mode collapses into
    /// [`VaultError::AuthFailed`].
    pub fn unlock(&self, phrase: &str) -> Result<(), VaultError> {
        let mut state = self.state.lock().expect("vault state mutex poisoned");
        let meta = state.meta.as_ref().ok_or(VaultError::NotInitialized)?;

        let mnemonic = Mnemonic::parse(phrase).map_err(|_| VaultError::AuthFailed)?;
        if !hashes_match(&meta.vault_hash, &mnemonic.vault_hash()) {
            return Err(VaultError::AuthFailed);
        }

        let derived = kdf::derive_with_fallback(mnemonic.phrase().as_bytes(), &meta.kdf)?;
        if derived.downgraded {
            tracing::warn!(vault_id = %meta.vault_id, "vault key derived via pbkdf2 fallback");
        }

        state.unlocked = Some(UnlockedState {
            key: derived.key,
            mnemonic,
        });
        tracing::debug!("vault unlocked");
        Self::emit_locked(&mut state, VaultEvent::Unlocked);
        Ok(())
    }

    /// Drop the derived key and mnemonic and return to the locked state.
    ///
    /// Both live in zeroize-on-drop holders, and the drop happens while the
    /// state mutex is held.
    pub fn lock(&self) {
        let mut state = self.state.lock().expect("vault state mutex poisoned");
        if state.unlocked.take().is_some() {
            tracing::debug!("vault locked");
            Self::emit_locked(&mut state, VaultEvent::Locked);
        }
    }

    /// Lock, then purge every trace of the vault from the store: metadata,
    /// session slots, and all records scoped to this vault id.
    pub fn destroy(&self) -> Result<(), VaultError> {
        let mut state = self.state.lock().expect("vault state mutex poisoned");
        state.unlocked = None;

        if let Some(meta) = state.meta.take() {
            for kind in [
                RecordKind::Note,
                RecordKind::Notebook,
                RecordKind::Tag,
                RecordKind::Settings,
            ] {
                for record in self.store.scan(kind, &meta.vault_id)? {
                    if let Some(id) = record_id(&record) {
                        self.store.delete(kind, &id)?;
                    }
                }
            }
            for slot in [
                KvSlot::VaultMeta,
                KvSlot::SessionToken,
                KvSlot::SessionKey,
                KvSlot::LastBackupDate,
            ] {
                self.store.delete_kv(slot)?;
            }
            tracing::debug!(vault_id = %meta.vault_id, "vault destroyed");
        }

        Self::emit_locked(&mut state, VaultEvent::Destroyed);
        Ok(())
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> mpsc::Receiver<VaultEvent> {
        let (tx, rx) = mpsc::channel();
        self.state
            .lock()
            .expect("vault state mutex poisoned")
            .subscribers
            .push(tx);
        rx
    }

    /// Borrow the derived key read-only for the duration of one operation.
    ///
    /// No component may retain the key past the closure; the reference does
    /// not escape the state mutex.
    pub fn with_key<R>(
        &self,
        f: impl FnOnce(&SecretBytes) -> Result<R, VaultError>,
    ) -> Result<R, VaultError> {
        let state = self.state.lock().expect("vault state mutex poisoned");
        let unlocked = state.unlocked.as_ref().ok_or(VaultError::Locked)?;
        f(&unlocked.key)
    }

    /// Encrypt `note` as a v2 record under this vault's key and id.
    pub fn encrypt_note(&self, note: &Note) -> Result<EncryptedNoteV2, VaultError> {
        let state = self.state.lock().expect("vault state mutex poisoned");
        let meta = state.meta.as_ref().ok_or(VaultError::NotInitialized)?;
        let unlocked = state.unlocked.as_ref().ok_or(VaultError::Locked)?;
        record::encrypt_note_v2(note, &unlocked.key, &meta.vault_id, &meta.kdf)
    }

    /// Decrypt a v2 record under this vault's key.
    pub fn decrypt_note(&self, enc: &EncryptedNoteV2) -> Result<Note, VaultError> {
        self.with_key(|key| record::decrypt_note_v2(enc, key))
    }

    /// Encrypt and persist `note`.
    pub fn put_note(&self, note: &Note) -> Result<(), VaultError> {
        let enc = self.encrypt_note(note)?;
        self.store
            .put(RecordKind::Note, &enc.id, &serde_json::to_string(&enc)?)?;
        Ok(())
    }

    /// Load and decrypt all stored notes, both formats.
    pub fn load_notes(&self) -> Result<Vec<Note>, VaultError> {
        let vault_id = self.vault_id()?;
        let mut notes = Vec::new();
        for blob in self.store.scan(RecordKind::Note, &vault_id)? {
            let note = self.with_key(|key| {
                if let Ok(enc) = serde_json::from_str::<EncryptedNoteV2>(&blob) {
                    record::decrypt_note_v2(&enc, key)
                } else {
                    let enc: EncryptedNoteV1 = serde_json::from_str(&blob)?;
                    record::decrypt_note_v1(&enc, key)
                }
            })?;
            notes.push(note);
        }
        notes.sort_by_key(|n| n.order);
        Ok(notes)
    }

    /// The storage collaborator this vault talks to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the handle, returning the store (e.g. to reopen later).
    pub fn into_store(self) -> S {
        self.store
    }

    /// Run `f` with the live metadata and (if unlocked) the key.
    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&VaultMeta, Option<&UnlockedParts<'_>>) -> Result<R, VaultError>,
    ) -> Result<R, VaultError> {
        let state = self.state.lock().expect("vault state mutex poisoned");
        let meta = state.meta.as_ref().ok_or(VaultError::NotInitialized)?;
        match state.unlocked.as_ref() {
            Some(unlocked) => {
                let parts = UnlockedParts {
                    key: &unlocked.key,
                    phrase: unlocked.mnemonic.phrase(),
                };
                f(meta, Some(&parts))
            }
            None => f(meta, None),
        }
    }

    fn emit(&self, event: VaultEvent) {
        let mut state = self.state.lock().expect("vault state mutex poisoned");
        Self::emit_locked(&mut state, event);
    }

    fn emit_locked(state: &mut VaultState, event: VaultEvent) {
        state.subscribers.retain(|tx| tx.send(event).is_ok());
    }
}

/// Borrowed view of the unlocked state for one operation.
pub(crate) struct UnlockedParts<'a> {
    pub key: &'a SecretBytes,
    pub phrase: &'a str,
}

pub(crate) fn load_meta<S: VaultStore>(store: &S) -> Result<Option<VaultMeta>, VaultError> {
    match store.get_kv(KvSlot::VaultMeta)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn record_id(record: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(record)
        .ok()?
        .get("id")?
        .as_str()
        .map(str::to_owned)
}

/// Constant-time comparison of two hex-encoded SHA-256 hashes.
fn hashes_match(stored: &str, candidate: &str) -> bool {
    let (Ok(stored), Ok(candidate)) = (hex::decode(stored), hex::decode(candidate)) else {
        return false;
    };
    if stored.len() != candidate.len() {
        return false;
    }
    stored.ct_eq(&candidate).into()
}

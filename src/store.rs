//! Storage collaborator interface.
//!
//! Persistence is external to the crypto core: an opaque key-value record
//! store addressed by object id and scoped by vault id, plus a handful of
//! fixed slots for vault metadata and session state. The core only ever
//! talks to this trait; the store is the sole mutator of persistent state.
//!
//! [`MemoryStore`] backs the test suites and serves embedders that wire up
//! their own persistence later.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Note,
    Notebook,
    Tag,
    Settings,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Note => "note",
            RecordKind::Notebook => "notebook",
            RecordKind::Tag => "tag",
            RecordKind::Settings => "settings",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvSlot {
    VaultMeta,
    SessionToken,
    SessionKey,
    LastBackupDate,
}

impl KvSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            KvSlot::VaultMeta => "vault-meta",
            KvSlot::SessionToken => "session-token",
            KvSlot::SessionKey => "session-key",
            KvSlot::LastBackupDate => "last-backup-date",
        }
    }
}

/// Failures from the storage collaborator, propagated unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// The persistence seam the vault core calls through.
///
/// Records are JSON strings; kv slots hold raw bytes. Implementations must
/// scope `scan` to the given vault id; records that carry no vault id
/// (legacy v1 notes) belong to whichever vault the backing store serves.
pub trait VaultStore: Send + Sync {
    fn put(&self, kind: RecordKind, id: &str, record: &str) -> Result<(), StoreError>;
    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<String>, StoreError>;
    fn delete(&self, kind: RecordKind, id: &str) -> Result<(), StoreError>;
    fn scan(&self, kind: RecordKind, vault_id: &str) -> Result<Vec<String>, StoreError>;

    fn put_kv(&self, slot: KvSlot, bytes: &[u8]) -> Result<(), StoreError>;
    fn get_kv(&self, slot: KvSlot) -> Result<Option<Vec<u8>>, StoreError>;
    fn delete_kv(&self, slot: KvSlot) -> Result<(), StoreError>;
}

/// In-memory store holding one vault's data.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    records: HashMap<(RecordKind, String), String>,
    kv: HashMap<KvSlot, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VaultStore for MemoryStore {
    fn put(&self, kind: RecordKind, id: &str, record: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .records
            .insert((kind, id.to_owned()), record.to_owned());
        Ok(())
    }

    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.records.get(&(kind, id.to_owned())).cloned())
    }

    fn delete(&self, kind: RecordKind, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.records.remove(&(kind, id.to_owned()));
        Ok(())
    }

    fn scan(&self, kind: RecordKind, vault_id: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut out: Vec<String> = inner
            .records
            .iter()
            .filter(|((k, _), record)| *k == kind && record_in_scope(record, vault_id))
            .map(|((_, _), record)| record.clone())
            .collect();
        out.sort();
        Ok(out)
    }

    fn put_kv(&self, slot: KvSlot, bytes: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.kv.insert(slot, bytes.to_vec());
        Ok(())
    }

    fn get_kv(&self, slot: KvSlot) -> Result<Option<Vec<u8>>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.kv.get(&slot).cloned())
    }

    fn delete_kv(&self, slot: KvSlot) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.kv.remove(&slot);
        Ok(())
    }
}

// A record is in scope when its vault_id field matches, or when it has none
// (legacy records are scoped by the store itself holding a single vault).
fn record_in_scope(record: &str, vault_id: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(record) {
        Ok(value) => match value.get("vault_id").and_then(serde_json::Value::as_str) {
            Some(record_vault) => record_vault == vault_id,
            None => true,
        },
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_roundtrip_and_delete() {
        let store = MemoryStore::new();
        store
            .put(RecordKind::Note, "n1", r#"{"vault_id":"vault-a","id":"n1"}"#)
            .unwrap();

        assert!(store.get(RecordKind::Note, "n1").unwrap().is_some());
        assert!(store.get(RecordKind::Notebook, "n1").unwrap().is_none());

        store.delete(RecordKind::Note, "n1").unwrap();
        assert!(store.get(RecordKind::Note, "n1").unwrap().is_none());
    }

    #[test]
    fn scan_is_scoped_by_vault_id() {
        let store = MemoryStore::new();
        store
            .put(RecordKind::Note, "n1", r#"{"vault_id":"vault-a","id":"n1"}"#)
            .unwrap();
        store
            .put(RecordKind::Note, "n2", r#"{"vault_id":"vault-b","id":"n2"}"#)
            .unwrap();
        store
            .put(RecordKind::Note, "legacy", r#"{"id":"legacy"}"#)
            .unwrap();

        let records = store.scan(RecordKind::Note, "vault-a").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.contains("\"n1\"")));
        assert!(records.iter().any(|r| r.contains("\"legacy\"")));
    }

    #[test]
    fn kv_slots_are_independent() {
        let store = MemoryStore::new();
        store.put_kv(KvSlot::SessionToken, b"token").unwrap();
        store.put_kv(KvSlot::SessionKey, b"key").unwrap();

        store.delete_kv(KvSlot::SessionToken).unwrap();
        assert!(store.get_kv(KvSlot::SessionToken).unwrap().is_none());
        assert_eq!(store.get_kv(KvSlot::SessionKey).unwrap().unwrap(), b"key");
    }
}

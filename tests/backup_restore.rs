use chrono::{TimeZone, Utc};
use notevault::aead;
use notevault::backup::{Notebook, TagEntry};
use notevault::{
    DomainData, KdfAlgorithm, KdfParams, KvSlot, MemoryStore, Note, RecordKind, Section, Vault,
    VaultError, VaultStore, create_backup, mnemonic, parse_backup_envelope, preview_backup,
    restore_backup,
};

const VECTOR: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn fast_params() -> KdfParams {
    KdfParams {
        algorithm: KdfAlgorithm::Argon2id,
        salt: [21u8; 16],
        memory_kib: Some(8 * 1024),
        iterations: 1,
        parallelism: Some(1),
    }
}

fn note(id: &str) -> Note {
    Note {
        id: id.to_owned(),
        title: format!("note {id}"),
        body: "body".to_owned(),
        preview: String::new(),
        tags: vec!["backup".to_owned()],
        notebook_id: Some("nb1".to_owned()),
        created_at: Utc.with_ymd_and_hms(2024, 4, 10, 8, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 4, 10, 8, 0, 0).unwrap(),
        is_favorite: false,
        section: Section::Notes,
        order: 0,
    }
}

fn domain() -> DomainData {
    DomainData {
        notes: vec![note("n1"), note("n2"), note("n3")],
        notebooks: vec![
            Notebook {
                id: "nb1".to_owned(),
                title: "Work".to_owned(),
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            },
            Notebook {
                id: "nb2".to_owned(),
                title: "Travel".to_owned(),
                created_at: Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
            },
        ],
        tags: vec![TagEntry {
            id: "t1".to_owned(),
            title: "backup".to_owned(),
        }],
        settings: serde_json::json!({"sort": "updated"}),
    }
}

#[test]
fn preview_then_restore_matches_source() {
    let key = aead::generate_key();
    let envelope = create_backup(&domain(), &key, "vault-src", &fast_params()).unwrap();

    let preview = preview_backup(&envelope, &key).unwrap();
    assert_eq!(
        (preview.note_count, preview.notebook_count, preview.tag_count),
        (3, 2, 1)
    );

    let restored = restore_backup(&envelope, &key).unwrap();
    let ids: Vec<&str> = restored.notes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["n1", "n2", "n3"]);
    assert_eq!(restored, domain());
}

#[test]
fn wrong_key_is_a_quiet_preview_and_a_hard_restore_failure() {
    let key = aead::generate_key();
    let wrong = aead::generate_key();
    let envelope = create_backup(&domain(), &key, "vault-src", &fast_params()).unwrap();

    assert!(preview_backup(&envelope, &wrong).is_none());
    assert!(matches!(
        restore_backup(&envelope, &wrong).unwrap_err(),
        VaultError::Decrypt
    ));
}

#[test]
fn envelope_survives_the_disk_roundtrip() {
    let key = aead::generate_key();
    let envelope = create_backup(&domain(), &key, "vault-src", &fast_params()).unwrap();

    let blob = envelope.serialize().unwrap();
    let parsed = parse_backup_envelope(&blob).unwrap();
    assert_eq!(parsed, envelope);
    assert_eq!(restore_backup(&parsed, &key).unwrap(), domain());
}

#[test]
fn tampered_envelope_payload_fails_restore() {
    let key = aead::generate_key();
    let mut envelope = create_backup(&domain(), &key, "vault-src", &fast_params()).unwrap();

    // Claiming another vault id changes the expected AAD.
    envelope.vault_id = "vault-other".to_owned();
    assert!(matches!(
        restore_backup(&envelope, &key).unwrap_err(),
        VaultError::AadMismatch
    ));
    assert!(preview_backup(&envelope, &key).is_none());
}

#[test]
fn vault_export_covers_the_whole_store() {
    let store = MemoryStore::new();
    let kdf = fast_params();
    let meta = serde_json::json!({
        "vault_id": mnemonic::vault_id(VECTOR),
        "vault_hash": mnemonic::vault_hash(VECTOR),
        "kdf": kdf,
    });
    store
        .put_kv(KvSlot::VaultMeta, &serde_json::to_vec(&meta).unwrap())
        .unwrap();

    let vault = Vault::open(store).unwrap();
    vault.unlock(VECTOR).unwrap();
    for n in &domain().notes {
        vault.put_note(n).unwrap();
    }
    for nb in &domain().notebooks {
        vault
            .store()
            .put(
                RecordKind::Notebook,
                &nb.id,
                &serde_json::to_string(nb).unwrap(),
            )
            .unwrap();
    }
    for tag in &domain().tags {
        vault
            .store()
            .put(RecordKind::Tag, &tag.id, &serde_json::to_string(tag).unwrap())
            .unwrap();
    }

    let envelope = vault.export_backup().unwrap();
    assert_eq!(envelope.vault_id, mnemonic::vault_id(VECTOR));
    assert!(
        vault
            .store()
            .get_kv(KvSlot::LastBackupDate)
            .unwrap()
            .is_some()
    );

    let restored = vault
        .with_key(|key| restore_backup(&envelope, key))
        .unwrap();
    assert_eq!(restored.notes.len(), 3);
    assert_eq!(restored.notebooks.len(), 2);
    assert_eq!(restored.tags.len(), 1);
}

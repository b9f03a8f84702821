//! Vault cryptography core for an encrypted personal note store.
//!
//! The recovery phrase is the only long-term secret: it derives the vault
//! key (Argon2id, with a PBKDF2 legacy path), authenticates unlock attempts
//! through its hash, and names the vault. Note records are encrypted
//! field-by-field as self-describing v2 payloads bound to their record and
//! vault by AAD, with a legacy v1 format kept readable for migration.
//! Sessions ("remember me") and whole-vault backups compose over the same
//! record cipher.
//!
//! Persistence is a collaborator, not a concern of this crate: everything
//! goes through the [`store::VaultStore`] trait.

pub mod aad;
pub mod aead;
pub mod backup;
pub mod error;
pub mod kdf;
pub mod migrate;
pub mod mnemonic;
pub mod padding;
pub mod payload;
pub mod record;
pub mod session;
pub mod store;
pub mod vault;

pub use backup::{
    BackupEnvelope, BackupPreview, DomainData, Notebook, TagEntry, create_backup,
    parse_backup_envelope, preview_backup, restore_backup,
};
pub use error::VaultError;
pub use kdf::{KdfAlgorithm, KdfParams};
pub use migrate::{MigrationReport, migrate_all, migrate_note_v1_to_v2};
pub use mnemonic::Mnemonic;
pub use record::{
    EncryptedNoteV1, EncryptedNoteV2, Note, Section, decrypt_note_v1, decrypt_note_v2,
    encrypt_note_v1, encrypt_note_v2,
};
pub use session::SessionDuration;
pub use store::{KvSlot, MemoryStore, RecordKind, StoreError, VaultStore};
pub use vault::{Vault, VaultEvent};

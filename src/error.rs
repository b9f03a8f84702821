use thiserror::Error;

use crate::{aad, aead, backup, kdf, mnemonic, padding, payload, store};

/// Crate-level error type.
///
/// Module-specific errors bubble up transparently; the variants declared
/// here are the cross-cutting outcomes callers branch on. Unlock and
/// backup-preview deliberately collapse their internals into a single
/// coarse failure so callers cannot probe which check failed.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("unlock failed")]
    AuthFailed,

    #[error("record decryption failed")]
    Decrypt,

    #[error("stored AAD does not match the expected context")]
    AadMismatch,

    #[error("session expired")]
    ExpiredSession,

    #[error("vault already exists")]
    AlreadyExists,

    #[error("vault is not initialized")]
    NotInitialized,

    #[error("vault is locked")]
    Locked,

    #[error(transparent)]
    Mnemonic(#[from] mnemonic::MnemonicError),

    #[error(transparent)]
    Kdf(#[from] kdf::KdfError),

    #[error(transparent)]
    Crypto(#[from] aead::CryptoError),

    #[error(transparent)]
    Padding(#[from] padding::PaddingError),

    #[error(transparent)]
    Aad(#[from] aad::AadError),

    #[error(transparent)]
    Payload(#[from] payload::PayloadError),

    #[error(transparent)]
    Backup(#[from] backup::BackupError),

    #[error(transparent)]
    Storage(#[from] store::StoreError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

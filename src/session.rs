//! Remember-me sessions.
//!
//! A session token is the mnemonic encrypted under a random 32-byte session
//! key, never one derived from the vault key or the phrase: a stolen token
//! without its key discloses nothing, and a stolen session key without the
//! token is just random bytes. Token and key are persisted in separate
//! storage slots on purpose, so deleting either one is enough to break
//! auto-unlock without destroying the vault.
//!
//! Expiry is enforced deterministically from the persisted `expires_at`,
//! not from a timer; every check takes an explicit `now` so callers (and
//! tests) own the clock.

use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::aad::AadContext;
use crate::aead::{self, AeadAlgorithm, KEY_LEN, SecretBytes};
use crate::error::VaultError;
use crate::kdf::{KdfAlgorithm, KdfParams};
use crate::padding;
use crate::payload::{PayloadV2, VERSION_V2};
use crate::store::{KvSlot, VaultStore};
use crate::vault::Vault;

/// AAD note-id marker for session payloads.
const SESSION_AAD_ID: &str = "session";

/// How long a saved session stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionDuration {
    SevenDays,
    ThirtyDays,
    Indefinite,
}

impl SessionDuration {
    fn expiry_from(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            SessionDuration::SevenDays => Some(now + Duration::days(7)),
            SessionDuration::ThirtyDays => Some(now + Duration::days(30)),
            SessionDuration::Indefinite => None,
        }
    }
}

/// Persisted token record (`session-token` slot). The session key lives in
/// its own slot, `session-key`.
#[derive(Debug, Serialize, Deserialize)]
struct SessionToken {
    encrypted_mnemonic: String,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    vault_id: String,
    version: String,
    kdf: KdfParams,
}

impl<S: VaultStore> Vault<S> {
    /// Persist a session token for the currently unlocked vault.
    pub fn save_session_token(&self, duration: SessionDuration) -> Result<(), VaultError> {
        self.save_session_token_at(duration, Utc::now())
    }

    pub fn save_session_token_at(
        &self,
        duration: SessionDuration,
        now: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        let (token, session_key) = self.with_state(|meta, unlocked| {
            let unlocked = unlocked.ok_or(VaultError::Locked)?;

            let session_key = aead::generate_key();
            // Recorded with the token for forward compatibility; the session
            // key itself is random, not derived.
            let session_kdf = KdfParams::generate(KdfAlgorithm::Argon2id);

            let aad = AadContext::new(SESSION_AAD_ID, &meta.vault_id, VERSION_V2)?.encode();
            let padded = Zeroizing::new(padding::pad(unlocked.phrase.as_bytes()));
            let nonce = aead::generate_nonce(AeadAlgorithm::XChaCha20Poly1305);
            let ciphertext = aead::encrypt(
                AeadAlgorithm::XChaCha20Poly1305,
                &session_key,
                &nonce,
                &aad,
                &padded,
            )?;

            let token = SessionToken {
                encrypted_mnemonic: PayloadV2::new(&session_kdf, &nonce, &ciphertext, Some(&aad))
                    .serialize()?,
                created_at: now,
                expires_at: duration.expiry_from(now),
                vault_id: meta.vault_id.clone(),
                version: VERSION_V2.to_owned(),
                kdf: session_kdf,
            };
            Ok((token, session_key))
        })?;

        self.store()
            .put_kv(KvSlot::SessionToken, &serde_json::to_vec(&token)?)?;
        self.store()
            .put_kv(KvSlot::SessionKey, session_key.expose_secret())?;
        tracing::debug!(expires_at = ?token.expires_at, "session token saved");
        Ok(())
    }

    /// Attempt an auto-unlock from a persisted session.
    ///
    /// Returns `Ok(true)` when the vault ends up unlocked. A missing
    /// session fails quietly; a stale, relocated, expired, or undecryptable
    /// one additionally wipes both session slots. A phrase that decrypts
    /// but no longer matches the vault bubbles up as the underlying unlock
    /// error.
    pub fn auto_unlock(&self) -> Result<bool, VaultError> {
        self.auto_unlock_at(Utc::now())
    }

    pub fn auto_unlock_at(&self, now: DateTime<Utc>) -> Result<bool, VaultError> {
        if self.is_unlocked() {
            return Ok(true);
        }

        let phrase = match self.recover_session_phrase(now) {
            Ok(Some(phrase)) => phrase,
            Ok(None) => return Ok(false),
            Err(err @ VaultError::Storage(_)) => return Err(err),
            Err(err) => {
                tracing::debug!(error = %err, "clearing unusable session");
                self.clear_session_token()?;
                return Ok(false);
            }
        };

        self.unlock(&phrase)?;
        Ok(true)
    }

    /// Delete both session slots.
    pub fn clear_session_token(&self) -> Result<(), VaultError> {
        self.store().delete_kv(KvSlot::SessionToken)?;
        self.store().delete_kv(KvSlot::SessionKey)?;
        Ok(())
    }

    /// Lock the vault; with `clear_session` also forget the session so the
    /// next launch cannot auto-unlock.
    pub fn logout(&self, clear_session: bool) -> Result<(), VaultError> {
        self.lock();
        if clear_session {
            self.clear_session_token()?;
        }
        Ok(())
    }

    /// Load, validate, and decrypt the persisted session.
    ///
    /// `Ok(None)` means no session is stored; any `Err` means the session
    /// exists but is unusable and must be wiped.
    fn recover_session_phrase(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Zeroizing<String>>, VaultError> {
        let Some(token_bytes) = self.store().get_kv(KvSlot::SessionToken)? else {
            return Ok(None);
        };
        let Some(key_bytes) = self.store().get_kv(KvSlot::SessionKey)? else {
            return Ok(None);
        };

        let token: SessionToken = serde_json::from_slice(&token_bytes)?;
        if token.vault_id != self.vault_id()? {
            return Err(VaultError::AadMismatch);
        }
        if let Some(expires_at) = token.expires_at {
            if now > expires_at {
                return Err(VaultError::ExpiredSession);
            }
        }
        if key_bytes.len() != KEY_LEN {
            return Err(VaultError::Decrypt);
        }
        let session_key = SecretBytes::from(key_bytes);

        let payload = PayloadV2::parse(&token.encrypted_mnemonic)?;
        let expected = AadContext::new(SESSION_AAD_ID, &token.vault_id, VERSION_V2)?.encode();
        let aad = match payload.aad()? {
            Some(recorded) if recorded == expected => recorded,
            Some(_) => return Err(VaultError::AadMismatch),
            // AAD is optional on session payloads from older clients.
            None => Vec::new(),
        };

        let nonce = payload.nonce()?;
        let ciphertext = payload.ciphertext()?;
        let padded = aead::decrypt(
            AeadAlgorithm::XChaCha20Poly1305,
            &session_key,
            &nonce,
            &aad,
            &ciphertext,
        )
        .map_err(|_| VaultError::Decrypt)?;
        let phrase_bytes = padding::unpad(&padded)?;
        let phrase = String::from_utf8(phrase_bytes).map_err(|_| VaultError::Decrypt)?;
        Ok(Some(Zeroizing::new(phrase)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnemonic::Mnemonic;
    use crate::store::MemoryStore;
    use crate::vault::VaultMeta;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn fast_vault() -> Vault<MemoryStore> {
        let store = MemoryStore::new();
        let mnemonic = Mnemonic::parse(PHRASE).unwrap();
        let mut kdf_params = KdfParams::generate(KdfAlgorithm::Argon2id);
        kdf_params.memory_kib = Some(8 * 1024);
        kdf_params.iterations = 1;
        kdf_params.parallelism = Some(1);
        let meta = VaultMeta {
            vault_id: mnemonic.vault_id(),
            vault_hash: mnemonic.vault_hash(),
            kdf: kdf_params,
        };
        store
            .put_kv(KvSlot::VaultMeta, &serde_json::to_vec(&meta).unwrap())
            .unwrap();
        let vault = Vault::open(store).unwrap();
        vault.unlock(PHRASE).unwrap();
        vault
    }

    #[test]
    fn session_roundtrip_auto_unlocks() {
        let vault = fast_vault();
        vault
            .save_session_token(SessionDuration::SevenDays)
            .unwrap();
        vault.lock();

        assert!(vault.auto_unlock().unwrap());
        assert!(vault.is_unlocked());
    }

    #[test]
    fn session_key_differs_from_vault_key() {
        let vault = fast_vault();
        vault
            .save_session_token(SessionDuration::Indefinite)
            .unwrap();

        let session_key = vault.store().get_kv(KvSlot::SessionKey).unwrap().unwrap();
        let vault_key = vault
            .with_key(|key| Ok(key.expose_secret().to_vec()))
            .unwrap();
        assert_ne!(session_key, vault_key);
    }

    #[test]
    fn expired_session_fails_and_wipes_both_slots() {
        let vault = fast_vault();
        let saved_at = Utc::now();
        vault
            .save_session_token_at(SessionDuration::SevenDays, saved_at)
            .unwrap();
        vault.lock();

        let eight_days_on = saved_at + Duration::days(8);
        assert!(!vault.auto_unlock_at(eight_days_on).unwrap());
        assert!(!vault.is_unlocked());
        assert!(
            vault
                .store()
                .get_kv(KvSlot::SessionToken)
                .unwrap()
                .is_none()
        );
        assert!(vault.store().get_kv(KvSlot::SessionKey).unwrap().is_none());
    }

    #[test]
    fn indefinite_session_never_expires() {
        let vault = fast_vault();
        let saved_at = Utc::now();
        vault
            .save_session_token_at(SessionDuration::Indefinite, saved_at)
            .unwrap();
        vault.lock();

        let years_on = saved_at + Duration::days(10 * 365);
        assert!(vault.auto_unlock_at(years_on).unwrap());
    }

    #[test]
    fn missing_session_fails_quietly() {
        let vault = fast_vault();
        vault.lock();
        assert!(!vault.auto_unlock().unwrap());
    }

    #[test]
    fn deleting_only_the_session_key_breaks_auto_unlock() {
        let vault = fast_vault();
        vault
            .save_session_token(SessionDuration::SevenDays)
            .unwrap();
        vault.lock();

        vault.store().delete_kv(KvSlot::SessionKey).unwrap();
        assert!(!vault.auto_unlock().unwrap());
        assert!(!vault.is_unlocked());
        // The vault itself survives.
        assert!(vault.exists());
        vault.unlock(PHRASE).unwrap();
    }

    #[test]
    fn tampered_session_key_wipes_session() {
        let vault = fast_vault();
        vault
            .save_session_token(SessionDuration::SevenDays)
            .unwrap();
        vault.lock();

        vault
            .store()
            .put_kv(KvSlot::SessionKey, &[0u8; KEY_LEN])
            .unwrap();
        assert!(!vault.auto_unlock().unwrap());
        assert!(
            vault
                .store()
                .get_kv(KvSlot::SessionToken)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn logout_with_clear_forgets_the_session() {
        let vault = fast_vault();
        vault
            .save_session_token(SessionDuration::ThirtyDays)
            .unwrap();

        vault.logout(true).unwrap();
        assert!(!vault.is_unlocked());
        assert!(!vault.auto_unlock().unwrap());
    }

    #[test]
    fn logout_without_clear_preserves_the_session() {
        let vault = fast_vault();
        vault
            .save_session_token(SessionDuration::ThirtyDays)
            .unwrap();

        vault.logout(false).unwrap();
        assert!(vault.auto_unlock().unwrap());
    }

    #[test]
    fn session_duration_serde_names() {
        assert_eq!(
            serde_json::to_string(&SessionDuration::SevenDays).unwrap(),
            "\"seven-days\""
        );
    }
}

//! Associated-data binding between a ciphertext and its home record.
//!
//! Every v2 ciphertext carries AAD built from `(note-id, vault-id,
//! format-version)`. A record copied into another vault, renamed to another
//! id, or replayed under a different format version fails authentication
//! instead of decrypting in the wrong place.

use thiserror::Error;

const DELIMITER: u8 = 0x00;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AadError {
    #[error("context field contains a NUL byte")]
    EmbeddedNul,

    #[error("malformed AAD encoding")]
    Malformed,
}

/// The context a v2 ciphertext is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AadContext {
    pub note_id: String,
    pub vault_id: String,
    pub version: String,
}

impl AadContext {
    /// Build a context; fields may not contain the NUL delimiter.
    pub fn new(note_id: &str, vault_id: &str, version: &str) -> Result<Self, AadError> {
        for field in [note_id, vault_id, version] {
            if field.as_bytes().contains(&DELIMITER) {
                return Err(AadError::EmbeddedNul);
            }
        }
        Ok(Self {
            note_id: note_id.to_owned(),
            vault_id: vault_id.to_owned(),
            version: version.to_owned(),
        })
    }

    /// Serialize as `note_id \0 vault_id \0 version`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.note_id.len() + self.vault_id.len() + self.version.len() + 2,
        );
        out.extend_from_slice(self.note_id.as_bytes());
        out.push(DELIMITER);
        out.extend_from_slice(self.vault_id.as_bytes());
        out.push(DELIMITER);
        out.extend_from_slice(self.version.as_bytes());
        out
    }

    /// Parse an encoded context; requires exactly three NUL-separated
    /// UTF-8 fields.
    pub fn decode(bytes: &[u8]) -> Result<Self, AadError> {
        let mut parts = bytes.split(|b| *b == DELIMITER);
        let note_id = parts.next().ok_or(AadError::Malformed)?;
        let vault_id = parts.next().ok_or(AadError::Malformed)?;
        let version = parts.next().ok_or(AadError::Malformed)?;
        if parts.next().is_some() {
            return Err(AadError::Malformed);
        }

        let as_str =
            |b: &[u8]| -> Result<String, AadError> {
                String::from_utf8(b.to_vec()).map_err(|_| AadError::Malformed)
            };
        Ok(Self {
            note_id: as_str(note_id)?,
            vault_id: as_str(vault_id)?,
            version: as_str(version)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let ctx = AadContext::new("n1", "vault-0123456789abcdef", "2.0").unwrap();
        let bytes = ctx.encode();
        assert_eq!(bytes, b"n1\0vault-0123456789abcdef\x002.0");
        assert_eq!(AadContext::decode(&bytes).unwrap(), ctx);
    }

    #[test]
    fn nul_in_field_is_rejected() {
        let err = AadContext::new("n\01", "vault-x", "2.0").unwrap_err();
        assert_eq!(err, AadError::EmbeddedNul);
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        assert_eq!(AadContext::decode(b"a\0b"), Err(AadError::Malformed));
        assert_eq!(AadContext::decode(b"a\0b\0c\0d"), Err(AadError::Malformed));
    }

    #[test]
    fn differing_contexts_encode_differently() {
        let a = AadContext::new("n1", "vault-a", "2.0").unwrap().encode();
        let b = AadContext::new("n2", "vault-a", "2.0").unwrap().encode();
        let c = AadContext::new("n1", "vault-b", "2.0").unwrap().encode();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}

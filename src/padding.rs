//! Length-hiding block padding applied to v2 plaintexts before encryption.
//!
//! Every sensitive field is padded to a 1024-byte boundary so ciphertext
//! lengths reveal only a coarse size bucket, not the exact note length.
//! The scheme is marker padding (ISO/IEC 7816-4): append `0x80`, then zero
//! bytes up to the boundary. A pad run can span the full block, which a
//! single length byte could not express, and the marker keeps stripping
//! unambiguous for every input.

use thiserror::Error;

/// Padding block size (bytes).
pub const BLOCK_LEN: usize = 1024;

const MARKER: u8 = 0x80;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaddingError {
    #[error("invalid padding")]
    Invalid,
}

/// Pad `data` up to the next 1024-byte boundary.
///
/// Fully-aligned inputs gain a whole block, so the output is always strictly
/// longer than the input.
pub fn pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_LEN - data.len() % BLOCK_LEN;
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.push(MARKER);
    out.resize(data.len() + pad_len, 0);
    out
}

/// Strip the padding appended by [`pad`].
///
/// Scans at most one block of trailing zeros for the marker; anything else
/// is [`PaddingError::Invalid`].
pub fn unpad(data: &[u8]) -> Result<Vec<u8>, PaddingError> {
    let scan_floor = data.len().saturating_sub(BLOCK_LEN);
    for i in (scan_floor..data.len()).rev() {
        match data[i] {
            0 => continue,
            MARKER => return Ok(data[..i].to_vec()),
            _ => return Err(PaddingError::Invalid),
        }
    }
    Err(PaddingError::Invalid)
}

// ## src/crypto/kdf.rs

//! crypto/kdf.rs
//! Password-based key derivation for the cell cipher.
//!
//! Design:
//! - PBKDF2-HMAC-SHA256(password, salt, iterations) -> key (16, 24 or 32 bytes)
//! - The derived length selects AES-128/192/256-GCM in [`CellKey`].
//!
//! Deterministic for fixed inputs: every worker of a batch and every later
//! read derives the same key from the same configuration.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::crypto::aead::CellKey;
use crate::crypto::types::{CryptoError, KEY_LENS};

/// Summary: Derive raw key bytes with PBKDF2-HMAC-SHA256.
///
/// Errors:
/// - `key_len` not in 16/24/32 returns `CryptoError::InvalidKeyLen`.
/// - Zero iterations or an empty password returns `CryptoError::Kdf`.
pub fn derive_key_bytes(
    password: &[u8],
    salt: &[u8],
    key_len: usize,
    iterations: u32,
) -> Result<Vec<u8>, CryptoError> {
    if !KEY_LENS.contains(&key_len) {
        return Err(CryptoError::InvalidKeyLen {
            expected: KEY_LENS,
            actual: key_len,
        });
    }
    if iterations == 0 {
        return Err(CryptoError::Kdf("iterations must be > 0".into()));
    }
    if password.is_empty() {
        return Err(CryptoError::Kdf("password must not be empty".into()));
    }

    let mut key = vec![0u8; key_len];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key);
    Ok(key)
}

/// Summary: Derive a ready-to-use [`CellKey`] (the engine's key handle).
#[inline]
pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    key_len: usize,
    iterations: u32,
) -> Result<CellKey, CryptoError> {
    let bytes = derive_key_bytes(password, salt, key_len, iterations)?;
    CellKey::from_bytes(&bytes)
}

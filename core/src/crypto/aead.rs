// ## 📂 File: `src/crypto/aead.rs`

//! src/crypto/aead.rs
//! Per-cell AEAD over AES-GCM.
//!
//! Design notes:
//! - Key length picks the variant: 16 -> AES-128, 24 -> AES-192, 32 -> AES-256.
//! - Cell ciphertext layout is `nonce (12) || ciphertext || tag (16)`.
//! - An empty plaintext is never sealed; the table layer encodes it as a zero-length cell.
//! - Tag verification fails closed (no partial plaintext).

use std::fmt;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};

use crate::crypto::nonce::random_nonce_12;
use crate::crypto::types::{CryptoError, KEY_LENS, MIN_CELL_CIPHERTEXT, NONCE_LEN_12};

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Cipher selected by key length.
#[derive(Clone)]
enum CellCipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// Key handle handed to the engine. Cheap to clone, safe to share across threads.
#[derive(Clone)]
pub struct CellKey {
    cipher: CellCipher,
    key_len: usize,
}

impl CellKey {
    pub fn from_bytes(key: &[u8]) -> Result<Self, CryptoError> {
        let invalid = || CryptoError::InvalidKeyLen {
            expected: KEY_LENS,
            actual: key.len(),
        };
        let cipher = match key.len() {
            16 => CellCipher::Aes128(Aes128Gcm::new_from_slice(key).map_err(|_| invalid())?),
            24 => CellCipher::Aes192(Aes192Gcm::new_from_slice(key).map_err(|_| invalid())?),
            32 => CellCipher::Aes256(Aes256Gcm::new_from_slice(key).map_err(|_| invalid())?),
            _ => return Err(invalid()),
        };
        Ok(Self {
            cipher,
            key_len: key.len(),
        })
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Human-readable method label reported by write workers.
    pub fn method(&self) -> &'static str {
        match self.cipher {
            CellCipher::Aes128(_) => "AES-128-GCM",
            CellCipher::Aes192(_) => "AES-192-GCM",
            CellCipher::Aes256(_) => "AES-256-GCM",
        }
    }

    /// Seal one non-empty cell under a fresh nonce.
    pub fn seal_cell(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = random_nonce_12();
        let n = Nonce::from_slice(&nonce);
        let body = match &self.cipher {
            CellCipher::Aes128(c) => c.encrypt(n, plaintext),
            CellCipher::Aes192(c) => c.encrypt(n, plaintext),
            CellCipher::Aes256(c) => c.encrypt(n, plaintext),
        }
        .map_err(|_| CryptoError::Failure("AES-GCM seal failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN_12 + body.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Open one cell sealed by [`CellKey::seal_cell`]. `cell` is the position used in errors.
    pub fn open_cell(&self, sealed: &[u8], cell: usize) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < MIN_CELL_CIPHERTEXT {
            return Err(CryptoError::TagMismatch { cell });
        }
        let (nonce, body) = sealed.split_at(NONCE_LEN_12);
        let n = Nonce::from_slice(nonce);
        match &self.cipher {
            CellCipher::Aes128(c) => c.decrypt(n, body),
            CellCipher::Aes192(c) => c.decrypt(n, body),
            CellCipher::Aes256(c) => c.decrypt(n, body),
        }
        .map_err(|_| CryptoError::TagMismatch { cell })
    }
}

impl fmt::Debug for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellKey")
            .field("method", &self.method())
            .field("key", &"<redacted>")
            .finish()
    }
}

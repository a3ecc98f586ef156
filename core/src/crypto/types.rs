// ## 📂 File: `src/crypto/types.rs`

use thiserror::Error;

use crate::wire::WireError;

/// Supported AES key sizes; the size selects AES-128/192/256-GCM.
pub const KEY_LENS: [usize; 3] = [16, 24, 32];

/// Standard 12-byte nonce length for AES-GCM.
pub const NONCE_LEN_12: usize = 12;

/// Fixed AEAD tag length (bytes).
pub const TAG_LEN: usize = 16;

/// Smallest well-formed cell ciphertext: nonce + tag around an empty body.
pub const MIN_CELL_CIPHERTEXT: usize = NONCE_LEN_12 + TAG_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key length does not select an AES variant.
    #[error("invalid key length: expected one of {expected:?}, actual={actual}")]
    InvalidKeyLen { expected: [usize; 3], actual: usize },

    /// PBKDF2 parameters rejected before derivation.
    #[error("key derivation rejected: {0}")]
    Kdf(String),

    /// AEAD tag mismatch on one cell (authentication failure).
    #[error("AEAD tag mismatch on cell {cell}")]
    TagMismatch { cell: usize },

    /// Engine worker thread died.
    #[error("engine thread panicked")]
    EnginePanic,

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// General runtime error with context.
    #[error("crypto failure: {0}")]
    Failure(String),
}

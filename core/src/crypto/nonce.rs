//! crypto/nonce.rs
//! Per-cell nonce generation.
//!
//! Every cell gets a fresh random 96-bit nonce from the OS RNG, so two
//! encryptions of the same plaintext under one key never share ciphertext.
//! Cells are independent records with no counter to derive a nonce from.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::types::NONCE_LEN_12;

#[inline]
pub fn random_nonce_12() -> [u8; NONCE_LEN_12] {
    let mut nonce = [0u8; NONCE_LEN_12];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

//! Crypto engine adapter.
//!
//! The only place cipher details live. Everything above this module sees a
//! [`CellKey`] handle and opaque framed blobs.

pub mod types;
pub mod aead;
pub mod kdf;
pub mod nonce;
pub mod table;
pub mod transport;

pub use types::*;
pub use aead::CellKey;
pub use kdf::{derive_key, derive_key_bytes};
pub use table::{decrypt_table, decrypt_table_wire, encrypt_table, split_encrypted, DecryptedTable, DecryptedWire};
pub use transport::{decode_cell, encode_cell};

//! crypto/transport.rs
//! Base64 transport encoding for ciphertext stored in text columns.

use base64::{engine::general_purpose::STANDARD, Engine};

#[inline]
pub fn encode_cell(ciphertext: &[u8]) -> String {
    if ciphertext.is_empty() {
        return String::new();
    }
    STANDARD.encode(ciphertext)
}

/// Decode a stored cell. Undecodable text is treated as an empty cell and logged.
pub fn decode_cell(text: &str) -> Vec<u8> {
    if text.is_empty() {
        return Vec::new();
    }
    match STANDARD.decode(text.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("[ENGINE] base64 decode failed ({} chars): {}; treating as empty", text.len(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stays_empty() {
        assert_eq!(encode_cell(&[]), "");
        assert!(decode_cell("").is_empty());
    }

    #[test]
    fn garbage_decodes_to_empty() {
        assert!(decode_cell("not*base64!").is_empty());
    }

    #[test]
    fn roundtrip_bytes() {
        let raw = [0u8, 1, 2, 250, 255];
        assert_eq!(decode_cell(&encode_cell(&raw)), raw.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use cellshard_core::crypto::{
        decrypt_table, derive_key, derive_key_bytes, encrypt_table, split_encrypted, CellKey, CryptoError,
    };
    use cellshard_core::wire::{encode_cells, parse_cells_lossy};

    fn key(len: usize) -> CellKey {
        derive_key(b"password", &[1, 2, 3, 4], len, 1_000).unwrap()
    }

    #[test]
    fn kdf_is_deterministic() {
        let k1 = derive_key_bytes(b"password", &[1, 2, 3, 4], 32, 1_000).unwrap();
        let k2 = derive_key_bytes(b"password", &[1, 2, 3, 4], 32, 1_000).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn kdf_changes_with_salt_and_password() {
        let base = derive_key_bytes(b"password", &[1, 2, 3, 4], 32, 1_000).unwrap();
        assert_ne!(base, derive_key_bytes(b"password", &[4, 3, 2, 1], 32, 1_000).unwrap());
        assert_ne!(base, derive_key_bytes(b"passw0rd", &[1, 2, 3, 4], 32, 1_000).unwrap());
    }

    #[test]
    fn key_length_selects_cipher() {
        assert_eq!(key(16).method(), "AES-128-GCM");
        assert_eq!(key(24).method(), "AES-192-GCM");
        assert_eq!(key(32).method(), "AES-256-GCM");
        assert!(matches!(
            derive_key(b"password", &[1], 20, 1_000),
            Err(CryptoError::InvalidKeyLen { actual: 20, .. })
        ));
    }

    #[test]
    fn identical_plaintexts_get_fresh_nonces() {
        let k = key(32);
        let blob = encrypt_table(&k, &["same", "same"], 2).unwrap();
        let cells = split_encrypted(&blob, 2).unwrap();
        assert_ne!(cells[0], cells[1]);
        assert_ne!(cells[0][..12], cells[1][..12]);
    }

    #[test]
    fn table_decrypts_with_empty_cells_preserved() {
        let k = key(24);
        let plain = ["a", "", "ccc", "", "e", "ff"];
        let blob = encrypt_table(&k, &plain, 4).unwrap();

        let cells = split_encrypted(&blob, plain.len()).unwrap();
        assert!(cells[1].is_empty());
        assert!(cells[3].is_empty());

        let table = decrypt_table(&k, &blob, 2, 3, 3).unwrap();
        assert!(table.damaged.is_empty());
        let got: Vec<&[u8]> = table.cells.iter().map(Vec::as_slice).collect();
        let want: Vec<&[u8]> = plain.iter().map(|s| s.as_bytes()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn truncated_blob_zero_fills_only_damaged_cells() {
        let k = key(32);
        let blob = encrypt_table(&k, &["first", "second", "third"], 1).unwrap();
        let cut = &blob[..blob.len() - 5];

        let table = decrypt_table(&k, cut, 1, 3, 2).unwrap();
        assert_eq!(table.cells[0], b"first");
        assert_eq!(table.cells[1], b"second");
        assert!(table.cells[2].is_empty());
        assert_eq!(table.damaged, vec![2]);
    }

    #[test]
    fn too_short_cell_decrypts_to_empty() {
        let k = key(32);
        let good = encrypt_table(&k, &["ok"], 1).unwrap();
        let good_cell = split_encrypted(&good, 1).unwrap()[0].to_vec();
        let blob = encode_cells(&[good_cell, vec![1, 2, 3]]).unwrap();

        let table = decrypt_table(&k, &blob, 1, 2, 1).unwrap();
        assert_eq!(table.cells[0], b"ok");
        assert!(table.cells[1].is_empty());
        assert_eq!(table.damaged, vec![1]);
    }

    #[test]
    fn tampered_cell_is_zero_filled_and_reported() {
        let k = key(32);
        let mut blob = encrypt_table(&k, &["left", "secret", "right"], 2).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;

        let table = decrypt_table(&k, &blob, 1, 3, 2).unwrap();
        assert_eq!(table.cells[0], b"left");
        assert_eq!(table.cells[1], b"secret");
        assert!(table.cells[2].is_empty());
        assert_eq!(table.tampered, vec![2]);
        assert!(table.damaged.is_empty());
    }

    #[test]
    fn open_cell_rejects_a_flipped_tag() {
        let k = key(32);
        let mut sealed = k.seal_cell(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(k.open_cell(&sealed, 4), Err(CryptoError::TagMismatch { cell: 4 })));
    }

    #[test]
    fn wrong_key_fails_authentication_on_every_cell() {
        let blob = encrypt_table(&key(32), &["secret", "", "more"], 1).unwrap();
        let other = derive_key(b"other", &[1, 2, 3, 4], 32, 1_000).unwrap();
        let table = decrypt_table(&other, &blob, 1, 3, 1).unwrap();
        assert!(table.cells.iter().all(|c| c.is_empty()));
        // The empty cell carries no tag to check.
        assert_eq!(table.tampered, vec![0, 2]);
    }

    #[test]
    fn thread_count_does_not_change_cell_order() {
        let k = key(16);
        let plain: Vec<String> = (0..37).map(|i| format!("cell-{i}")).collect();
        for threads in [1, 2, 5, 64] {
            let blob = encrypt_table(&k, &plain, threads).unwrap();
            assert!(parse_cells_lossy(&blob, plain.len()).is_clean());
            let table = decrypt_table(&k, &blob, 37, 1, threads).unwrap();
            let got: Vec<String> = table.cells.iter().map(|c| String::from_utf8(c.clone()).unwrap()).collect();
            assert_eq!(got, plain);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use cellshard_core::config::{CryptoConfig, FaultPlan, PipelineConfig};
    use cellshard_core::coordinator::Coordinator;
    use cellshard_core::crypto::{derive_key, encode_cell, encrypt_table, split_encrypted};
    use cellshard_core::dataset::{Dataset, Schema};
    use cellshard_core::storage::{RowUpdate, ShardedMemoryStore, Storage, StorageSession};
    use cellshard_core::telemetry::Stage;

    fn dataset(rows: usize) -> Dataset {
        let schema = Schema::from_keys(["name", "amount", "memo"]).unwrap();
        let rows = (0..rows)
            .map(|i| vec![format!("name-{i}"), (i * 10).to_string(), if i % 4 == 0 { String::new() } else { format!("memo {i}") }])
            .collect();
        Dataset::new(schema, rows).unwrap()
    }

    fn crypto() -> CryptoConfig {
        CryptoConfig::new("test-password", vec![1, 2, 3, 4]).with_iterations(1_000)
    }

    fn coordinator(store: &ShardedMemoryStore, dir: &Path, read_chunk_rows: usize, faults: FaultPlan) -> Coordinator {
        let config = PipelineConfig {
            concurrency: 3,
            read_chunk_rows,
            exchange_dir: dir.to_path_buf(),
            poll_timeout: Duration::from_millis(50),
            faults,
            ..PipelineConfig::default()
        };
        Coordinator::new(Arc::new(store.clone()), config)
            .unwrap()
            .with_crypto(&crypto())
            .unwrap()
    }

    #[test]
    fn round_trip_single_chunk_keeps_source_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, tmp.path(), 2_000, FaultPlan::default());
        let data = dataset(50);

        coord.save(&data, 1, true).unwrap().into_result().unwrap();
        let loaded = coord.load_all(true).unwrap();

        assert!(loaded.success);
        assert_eq!(loaded.columns, 3);
        let cells: Vec<Vec<String>> = loaded.rows.iter().map(|r| r.cells.clone()).collect();
        assert_eq!(cells, data.rows);
        let ids: Vec<u64> = loaded.rows.iter().map(|r| r.row_identifier).collect();
        assert_eq!(ids, (1..=50).collect::<Vec<u64>>());
        assert!(coord.exchange().leftovers().unwrap().is_empty());
    }

    #[test]
    fn round_trip_many_chunks_reproduces_every_row() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, tmp.path(), 7, FaultPlan::default());
        let data = dataset(101);

        coord.save(&data, 4, true).unwrap().into_result().unwrap();
        let loaded = coord.load_all(true).unwrap();
        assert!(loaded.success);
        assert_eq!(loaded.completion_order.len(), 15);
        assert_eq!(loaded.telemetry.counters.cells_decrypted, 303);

        let mut got: Vec<Vec<String>> = loaded.rows.into_iter().map(|r| r.cells).collect();
        let mut want = data.rows.clone();
        got.sort();
        want.sort();
        assert_eq!(got, want);
        assert!(coord.exchange().leftovers().unwrap().is_empty());
    }

    #[test]
    fn rows_are_sorted_even_when_first_chunk_finishes_last() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        coordinator(&store, tmp.path(), 10, FaultPlan::default())
            .save(&dataset(30), 3, true)
            .unwrap()
            .into_result()
            .unwrap();

        let slow_first = FaultPlan::default().delay_worker(0, Duration::from_millis(300));
        let coord = coordinator(&store, tmp.path(), 10, slow_first);
        let loaded = coord.load_all(true).unwrap();

        assert!(loaded.success);
        assert_eq!(loaded.completion_order.len(), 3);
        assert_eq!(loaded.completion_order.last(), Some(&0));
        let ids: Vec<u64> = loaded.rows.iter().map(|r| r.row_identifier).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids.len(), 30);
    }

    #[test]
    fn paged_read_decrypts_in_identifier_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, tmp.path(), 2_000, FaultPlan::default());
        let data = dataset(30);
        coord.save(&data, 1, true).unwrap().into_result().unwrap();

        let page = coord.load_page(10, 5, true).unwrap();
        assert_eq!(page.total, 30);
        let ids: Vec<u64> = page.rows.iter().map(|r| r.row_identifier).collect();
        assert_eq!(ids, vec![11, 12, 13, 14, 15]);
        assert_eq!(page.rows[0].cells, data.rows[10]);

        let tail = coord.load_page(28, 10, true).unwrap();
        assert_eq!(tail.rows.len(), 2);
    }

    #[test]
    fn damaged_stored_cell_reads_back_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, tmp.path(), 2_000, FaultPlan::default());
        coord.save(&dataset(4), 1, true).unwrap().into_result().unwrap();

        store
            .connect()
            .unwrap()
            .apply_updates(&[RowUpdate { row_identifier: 2, cells: vec![(0, encode_cell(&[1, 2, 3]))] }])
            .unwrap();

        let loaded = coord.load_all(true).unwrap();
        assert!(loaded.success);
        assert_eq!(loaded.damaged_cells, 1);
        assert_eq!(loaded.rows[1].cells[0], "");
        assert_eq!(loaded.rows[1].cells[1], "10");
    }

    #[test]
    fn tampered_cell_reads_back_empty_and_is_counted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, tmp.path(), 2, FaultPlan::default());
        let data = dataset(6);
        coord.save(&data, 1, true).unwrap().into_result().unwrap();

        // Valid ciphertext under another key: well-formed, fails authentication.
        let other = derive_key(b"another", &[9, 9], 32, 1_000).unwrap();
        let blob = encrypt_table(&other, &["intruder"], 1).unwrap();
        let foreign = encode_cell(split_encrypted(&blob, 1).unwrap()[0]);
        store
            .connect()
            .unwrap()
            .apply_updates(&[RowUpdate { row_identifier: 1, cells: vec![(0, foreign)] }])
            .unwrap();

        let loaded = coord.load_all(true).unwrap();
        assert!(loaded.success);
        assert!(loaded.failures.is_empty());
        assert_eq!(loaded.tampered_cells, 1);
        assert_eq!(loaded.damaged_cells, 0);
        assert_eq!(loaded.telemetry.counters.cells_tampered, 1);
        assert_eq!(loaded.telemetry.counters.chunks_failed, 0);
        assert_eq!(loaded.rows.len(), 6);
        assert_eq!(loaded.rows[0].cells, vec!["".to_string(), data.rows[0][1].clone(), data.rows[0][2].clone()]);
        let rest: Vec<Vec<String>> = loaded.rows[1..].iter().map(|r| r.cells.clone()).collect();
        assert_eq!(rest, data.rows[1..].to_vec());
        assert!(coord.exchange().leftovers().unwrap().is_empty());

        let page = coord.load_page(0, 2, true).unwrap();
        assert_eq!(page.rows[0].cells[0], "");
        assert_eq!(page.rows[1].cells, data.rows[1]);
    }

    #[test]
    fn export_writes_csv_and_json() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, &tmp.path().join("exchange"), 2_000, FaultPlan::default());
        let data = dataset(5);
        coord.save(&data, 1, true).unwrap().into_result().unwrap();
        let mut loaded = coord.load_all(true).unwrap();
        assert!(loaded.telemetry.stage_times.iter().all(|(stage, _)| *stage != Stage::Export));

        let csv_path = tmp.path().join("out.csv");
        assert_eq!(loaded.export(&csv_path, Some(&data.schema)).unwrap(), 5);
        let text = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("row_identifier,name,amount,memo"));
        assert_eq!(lines.next(), Some("1,name-0,0,"));

        let json_path = tmp.path().join("out.json");
        loaded.export(&json_path, None).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
        assert_eq!(value[1]["row_identifier"], serde_json::json!(2));
        assert_eq!(value[1]["col1"], serde_json::json!("name-1"));
        assert!(loaded.telemetry.stage_times.iter().any(|(stage, _)| *stage == Stage::Export));
    }

    #[test]
    fn reset_empties_storage() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, tmp.path(), 2_000, FaultPlan::default());
        coord.save(&dataset(10), 2, false).unwrap();
        coord.reset().unwrap();
        assert_eq!(coord.load_page(0, 10, false).unwrap().total, 0);
        assert!(coord.load_all(false).unwrap().rows.is_empty());
    }
}

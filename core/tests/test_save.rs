#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use cellshard_core::config::{CryptoConfig, FaultPlan, PipelineConfig};
    use cellshard_core::coordinator::Coordinator;
    use cellshard_core::crypto::decode_cell;
    use cellshard_core::dataset::{Dataset, Schema};
    use cellshard_core::pool::CancellationToken;
    use cellshard_core::storage::{ShardedMemoryStore, Storage, StorageSession, StoreFaults};
    use cellshard_core::types::{ErrorKind, PipelineError};

    fn dataset(rows: usize) -> Dataset {
        let schema = Schema::from_keys(["name", "city", "note"]).unwrap();
        let rows = (0..rows)
            .map(|i| vec![format!("name-{i}"), format!("city-{}", i % 7), if i % 5 == 0 { String::new() } else { format!("n{i}") }])
            .collect();
        Dataset::new(schema, rows).unwrap()
    }

    fn coordinator(store: &ShardedMemoryStore, dir: &Path, faults: FaultPlan) -> Coordinator {
        let config = PipelineConfig {
            concurrency: 4,
            exchange_dir: dir.to_path_buf(),
            poll_timeout: Duration::from_millis(50),
            faults,
            ..PipelineConfig::default()
        };
        let crypto = CryptoConfig::new("test-password", vec![1, 2, 3, 4]).with_iterations(1_000);
        Coordinator::new(Arc::new(store.clone()), config)
            .unwrap()
            .with_crypto(&crypto)
            .unwrap()
    }

    #[test]
    fn ten_thousand_rows_in_four_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, tmp.path(), FaultPlan::default());

        let summary = coord.save(&dataset(10_000), 4, true).unwrap();
        assert!(summary.success);
        assert_eq!(summary.process_count, 4);
        assert!(summary.chunk_rows.values().all(|&n| n == 2_500));
        assert_eq!(summary.rows_affected, 10_000);
        assert_eq!(summary.input_row_count, 10_000);
        assert!(summary.elapsed > Duration::ZERO);
        assert_eq!(summary.encrypt_method.as_deref(), Some("AES-256-GCM"));
        assert!(summary.failures.is_empty());
        assert!(summary.telemetry.sanity_check());

        assert!(coord.exchange().leftovers().unwrap().is_empty());
        assert_eq!(store.partition_sizes().iter().sum::<usize>(), 10_000);
        assert_eq!(store.partition_count(), 30);
    }

    #[test]
    fn stored_cells_are_ciphertext() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, tmp.path(), FaultPlan::default());
        coord.save(&dataset(20), 2, true).unwrap().into_result().unwrap();

        let rows = store.connect().unwrap().fetch_page(0, 100).unwrap();
        assert_eq!(rows.len(), 20);
        for row in &rows {
            assert!(!row.cells[0].starts_with("name-"));
            // nonce + tag around the plaintext
            assert!(decode_cell(&row.cells[0]).len() >= 28);
        }
        // Empty plaintext stays an empty cell.
        assert!(rows.iter().any(|r| r.cells[2].is_empty()));
    }

    #[test]
    fn plain_save_stores_text_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, tmp.path(), FaultPlan::default());
        let summary = coord.save(&dataset(8), 4, false).unwrap();
        assert!(summary.success);
        assert!(!summary.encrypted);
        assert_eq!(summary.encrypt_method, None);

        let mut names: Vec<String> = store
            .connect()
            .unwrap()
            .merge()
            .unwrap()
            .into_iter()
            .map(|r| r.cells[0].clone())
            .collect();
        names.sort();
        assert_eq!(names.first().map(String::as_str), Some("name-0"));
    }

    #[test]
    fn delayed_input_fails_one_chunk_only() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let faults = FaultPlan::default().delay_visibility(1, Duration::from_millis(500));
        let coord = coordinator(&store, tmp.path(), faults);

        let summary = coord.save(&dataset(400), 4, true).unwrap();
        assert!(!summary.success);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].chunk_index, 1);
        assert_eq!(summary.failures[0].kind, ErrorKind::IoError);
        assert_eq!(summary.rows_affected, 300);
        assert!(coord.exchange().leftovers().unwrap().is_empty());

        match summary.into_result() {
            Err(PipelineError::PartialBatchFailure { failed, total, rows_affected }) => {
                assert_eq!((failed, total, rows_affected), (1, 4, 300));
            }
            other => panic!("expected partial batch failure, got {:?}", other),
        }
    }

    #[test]
    fn total_failure_leaves_no_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let faults = (0..4).fold(FaultPlan::default(), |plan, i| plan.delay_visibility(i, Duration::from_millis(700)));
        let coord = coordinator(&store, tmp.path(), faults);

        let summary = coord.save(&dataset(400), 4, true).unwrap();
        assert!(!summary.success);
        assert_eq!(summary.process_count, 4);
        assert_eq!(summary.failures.len(), summary.process_count);
        assert!(summary.failures.iter().all(|f| f.kind == ErrorKind::IoError));
        assert_eq!(summary.rows_affected, 0);
        assert_eq!(summary.telemetry.counters.chunks_failed, 4);
        assert_eq!(store.partition_sizes().iter().sum::<usize>(), 0);
        assert!(coord.exchange().leftovers().unwrap().is_empty());
    }

    #[test]
    fn cancelled_save_dispatches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let token = CancellationToken::new();
        let coord = coordinator(&store, tmp.path(), FaultPlan::default()).with_cancellation(token.clone());
        token.cancel();

        let summary = coord.save(&dataset(40), 4, true).unwrap();
        assert!(!summary.success);
        assert_eq!(summary.failures.len(), 4);
        assert!(summary.failures.iter().all(|f| f.kind == ErrorKind::Cancelled));
        assert_eq!(store.partition_sizes().iter().sum::<usize>(), 0);
        assert!(coord.exchange().leftovers().unwrap().is_empty());
        assert!(matches!(summary.into_result(), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn zero_affected_falls_back_to_processed_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default().with_faults(StoreFaults {
            report_zero_affected: true,
            ..StoreFaults::default()
        });
        let coord = coordinator(&store, tmp.path(), FaultPlan::default());

        let summary = coord.save(&dataset(40), 4, true).unwrap();
        assert!(summary.success);
        assert_eq!(summary.rows_affected, 40);
        assert_eq!(summary.fallback_chunks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn storage_failure_is_attributed_to_its_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default().with_faults(StoreFaults {
            fail_distribute_call: Some(0),
            ..StoreFaults::default()
        });
        let coord = coordinator(&store, tmp.path(), FaultPlan::default());

        let summary = coord.save(&dataset(100), 4, true).unwrap();
        assert!(!summary.success);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].kind, ErrorKind::StorageError);
        assert_eq!(summary.rows_affected, 75);
        assert_eq!(store.partition_sizes().iter().sum::<usize>(), 75);
    }

    #[test]
    fn encrypting_without_a_key_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            concurrency: 2,
            exchange_dir: tmp.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let coord = Coordinator::new(Arc::new(ShardedMemoryStore::default()), config).unwrap();
        let err = coord.save(&dataset(4), 2, true).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn small_dataset_uses_fewer_chunks_than_budget() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ShardedMemoryStore::default();
        let coord = coordinator(&store, tmp.path(), FaultPlan::default());
        let summary = coord.save(&dataset(3), 8, true).unwrap();
        assert_eq!(summary.process_count, 3);
        assert_eq!(summary.rows_affected, 3);

        let empty = coord.save(&dataset(0), 4, true).unwrap();
        assert!(empty.success);
        assert_eq!(empty.process_count, 0);
    }
}

// ## 📂 File: `src/coordinator/distribute.rs`
// ## Write path: split, fan out write workers, aggregate

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::extra_args;
use crate::coordinator::Coordinator;
use crate::dataset::Dataset;
use crate::pool::{DelayedEntry, WorkerEntry};
use crate::telemetry::{Stage, TelemetryCounters, TelemetrySnapshot, TelemetryTimer};
use crate::types::{ChunkFailure, ErrorKind, PipelineError};
use crate::worker::{WriteChunk, WriteChunkWorker, WriteOutcome};

/// Outcome of one save batch.
#[derive(Debug, Clone)]
pub struct SaveSummary {
    /// Every chunk committed.
    pub success: bool,
    /// Sum over successful chunks only.
    pub rows_affected: u64,
    pub input_row_count: usize,
    /// Number of chunks (one worker task each).
    pub process_count: usize,
    pub elapsed: Duration,
    pub encrypted: bool,
    pub encrypt_method: Option<String>,
    /// Rows processed by each successful chunk.
    pub chunk_rows: BTreeMap<usize, u64>,
    /// Chunks whose affected count fell back to the processed count.
    pub fallback_chunks: Vec<usize>,
    pub failures: Vec<ChunkFailure>,
    pub telemetry: TelemetrySnapshot,
}

impl SaveSummary {
    /// `Err(PartialBatchFailure)` unless every chunk committed, or
    /// `Err(Cancelled)` when cancellation is the only reason chunks are missing.
    pub fn into_result(self) -> Result<Self, PipelineError> {
        if self.success {
            return Ok(self);
        }
        if self.failures.iter().all(|f| f.kind == ErrorKind::Cancelled) {
            return Err(PipelineError::Cancelled);
        }
        Err(PipelineError::PartialBatchFailure {
            failed: self.failures.len(),
            total: self.process_count,
            rows_affected: self.rows_affected,
        })
    }
}

/// Rows per chunk so that at most `budget` chunks are produced.
pub fn chunk_size(total: usize, budget: usize) -> usize {
    let budget = budget.max(1);
    ((total + budget - 1) / budget).max(1)
}

impl Coordinator {
    /// Encrypt (optionally) and distribute `dataset` with up to `concurrency` write workers.
    pub fn save(&self, dataset: &Dataset, concurrency: usize, encrypt: bool) -> Result<SaveSummary, PipelineError> {
        if concurrency == 0 {
            return Err(PipelineError::config("concurrency must be >= 1"));
        }
        let key = if encrypt {
            Some(Arc::clone(self.require_key("encryption")?))
        } else {
            None
        };

        let mut timer = TelemetryTimer::new();
        let total = dataset.len();
        let width = dataset.schema.width();

        let chunks: Vec<WriteChunk> = timer.time(Stage::Split, || {
            let size = chunk_size(total, concurrency);
            dataset
                .rows
                .chunks(size)
                .enumerate()
                .map(|(i, rows)| WriteChunk {
                    first_row: i * size,
                    columns: width,
                    rows: rows.to_vec(),
                })
                .collect()
        });
        let process_count = chunks.len();
        log::info!(
            "[SAVE] {} rows x {} cols -> {} chunks (concurrency {}, encrypt={})",
            total,
            width,
            process_count,
            concurrency,
            encrypt
        );

        let encrypt_method = key.as_ref().map(|k| k.method().to_string());
        let worker = WriteChunkWorker::new(Arc::clone(&self.storage), key, self.engine_threads);
        let entry: Arc<dyn WorkerEntry> =
            DelayedEntry::wrap(Arc::new(worker), self.config.faults.worker_delays.clone());
        let extra_arg = if encrypt { extra_args::ENCRYPT } else { extra_args::PLAIN };

        let run = timer.time(Stage::Distribute, || {
            self.pool.run_batch(chunks, entry, concurrency, extra_arg)
        })?;

        let mut counters = TelemetryCounters::default();
        counters.merge(&run.stats.counters);
        let mut rows_affected = 0u64;
        let mut chunk_rows = BTreeMap::new();
        let mut fallback_chunks = Vec::new();
        let mut failures = Vec::new();

        for (index, result) in &run.results {
            if let Some(failure) = result.failure() {
                failures.push(failure);
                continue;
            }
            match result.report.decode::<WriteOutcome>() {
                Ok(outcome) => {
                    rows_affected += outcome.rows_affected;
                    counters.add_rows(outcome.processed_rows, outcome.rows_affected);
                    if outcome.encrypted {
                        counters.add_cells(outcome.processed_rows * width as u64, 0, 0);
                    }
                    chunk_rows.insert(*index, outcome.processed_rows);
                    if outcome.rows_affected_fallback {
                        fallback_chunks.push(*index);
                    }
                }
                Err(e) => failures.push(ChunkFailure {
                    chunk_index: *index,
                    kind: ErrorKind::ParseError,
                    message: format!("unexpected write report: {e}"),
                }),
            }
        }
        for &index in &run.stats.skipped {
            failures.push(ChunkFailure {
                chunk_index: index,
                kind: ErrorKind::Cancelled,
                message: "chunk not dispatched: batch cancelled".into(),
            });
        }
        failures.sort_by_key(|f| f.chunk_index);
        // Side artifacts of write tasks are unused; release them now.
        drop(run.results);

        timer.finish();
        let success = failures.is_empty();
        if success {
            log::info!("[SAVE] done: {} rows affected in {:?}", rows_affected, timer.elapsed());
        } else {
            log::warn!(
                "[SAVE] {} of {} chunks failed, {} rows landed",
                failures.len(),
                process_count,
                rows_affected
            );
        }

        Ok(SaveSummary {
            success,
            rows_affected,
            input_row_count: total,
            process_count,
            elapsed: timer.elapsed(),
            encrypted: encrypt,
            encrypt_method,
            chunk_rows,
            fallback_chunks,
            failures,
            telemetry: TelemetrySnapshot::from(&counters, &timer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::chunk_size;

    #[test]
    fn chunk_size_never_exceeds_budget() {
        assert_eq!(chunk_size(10_000, 4), 2_500);
        assert_eq!(chunk_size(10, 4), 3);
        assert_eq!(chunk_size(3, 8), 1);
        assert_eq!(chunk_size(0, 4), 1);
    }
}

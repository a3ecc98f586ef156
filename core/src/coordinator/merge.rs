// ## 📂 File: `src/coordinator/merge.rs`
// ## Read path: merge once, fan out read workers, reassemble in identifier order

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constants::extra_args;
use crate::coordinator::Coordinator;
use crate::dataset::{DecryptedRow, Schema, StoredRow};
use crate::export::export_rows;
use crate::pool::{DelayedEntry, TaskResult, WorkerEntry};
use crate::telemetry::{Stage, TelemetryCounters, TelemetrySnapshot, TelemetryTimer};
use crate::types::{ChunkFailure, ErrorKind, PipelineError};
use crate::worker::{open_rows, plain_rows, ReadChunk, ReadChunkWorker, ReadOutcome};

/// Outcome of a full read.
#[derive(Debug, Clone)]
pub struct LoadSummary {
    pub success: bool,
    /// Sorted by `row_identifier` ascending.
    pub rows: Vec<DecryptedRow>,
    pub columns: usize,
    pub merged_row_count: usize,
    pub decrypted: bool,
    pub damaged_cells: u64,
    /// Cells that failed authentication and were zero-filled.
    pub tampered_cells: u64,
    /// Chunk indices in the order their tasks finished.
    pub completion_order: Vec<usize>,
    pub failures: Vec<ChunkFailure>,
    pub elapsed: Duration,
    pub telemetry: TelemetrySnapshot,
}

impl LoadSummary {
    /// Write the sorted rows to `path` (CSV or JSON by extension). The time
    /// spent is charged to the export stage of this summary's telemetry.
    pub fn export(&mut self, path: &Path, schema: Option<&Schema>) -> Result<usize, PipelineError> {
        let started = Instant::now();
        let written = export_rows(path, &self.rows, self.columns, schema)?;
        self.telemetry.stage_times.add(Stage::Export, started.elapsed());
        Ok(written)
    }
}

/// One page of decrypted rows plus the total row count in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub total: u64,
    pub rows: Vec<DecryptedRow>,
}

fn split_rows(rows: Vec<StoredRow>, per_chunk: usize, columns: usize) -> Vec<ReadChunk> {
    let mut chunks = Vec::with_capacity(rows.len() / per_chunk.max(1) + 1);
    let mut it = rows.into_iter().peekable();
    while it.peek().is_some() {
        chunks.push(ReadChunk {
            columns,
            rows: it.by_ref().take(per_chunk.max(1)).collect(),
        });
    }
    chunks
}

/// Load a finished read task's side artifact, then delete it.
fn collect_side_output(result: TaskResult) -> Result<(ReadOutcome, Vec<DecryptedRow>), PipelineError> {
    let outcome: ReadOutcome = result.report.decode()?;
    let bytes = fs::read(result.side_output.path())?;
    let rows: Vec<DecryptedRow> = serde_json::from_slice(&bytes)?;
    if rows.len() as u64 != outcome.row_count {
        return Err(PipelineError::parse(format!(
            "side artifact holds {} rows, report says {}",
            rows.len(),
            outcome.row_count
        )));
    }
    result.side_output.release()?;
    Ok((outcome, rows))
}

impl Coordinator {
    /// Merge, decrypt (optionally) and return every row sorted by identifier.
    pub fn load_all(&self, decrypt: bool) -> Result<LoadSummary, PipelineError> {
        let key = if decrypt {
            Some(Arc::clone(self.require_key("decryption")?))
        } else {
            None
        };
        let mut timer = TelemetryTimer::new();

        let stored = {
            let mut session = self.storage.connect()?;
            timer.time(Stage::Merge, || session.merge())?
        };
        let merged_row_count = stored.len();
        let columns = stored.iter().map(|r| r.cells.len()).max().unwrap_or(0);
        let chunks = timer.time(Stage::Split, || split_rows(stored, self.config.read_chunk_rows, columns));
        log::info!(
            "[LOAD] merged {} rows x {} cols -> {} chunks (decrypt={})",
            merged_row_count,
            columns,
            chunks.len(),
            decrypt
        );

        let worker = ReadChunkWorker::new(key, self.engine_threads);
        let entry: Arc<dyn WorkerEntry> =
            DelayedEntry::wrap(Arc::new(worker), self.config.faults.worker_delays.clone());
        let extra_arg = if decrypt { extra_args::DECRYPT } else { extra_args::PLAIN };

        let mut rows: Vec<DecryptedRow> = Vec::with_capacity(merged_row_count);
        let mut failures = Vec::new();
        let mut damaged_cells = 0u64;
        let mut tampered_cells = 0u64;
        let mut unusable = 0u64;
        let mut counters = TelemetryCounters::default();

        let started = Instant::now();
        let stats = self.pool.run_batch_with(chunks, entry, self.config.concurrency, extra_arg, |result| {
            if let Some(failure) = result.failure() {
                failures.push(failure);
                return;
            }
            let index = result.chunk_index;
            match collect_side_output(result) {
                Ok((outcome, chunk_rows)) => {
                    damaged_cells += outcome.damaged_cells;
                    tampered_cells += outcome.tampered_cells;
                    counters.add_rows(outcome.row_count, 0);
                    if outcome.decrypted {
                        counters.add_cells(0, outcome.row_count * columns as u64, outcome.damaged_cells);
                        counters.add_tampered(outcome.tampered_cells);
                    }
                    rows.extend(chunk_rows);
                }
                Err(e) => {
                    log::warn!("[LOAD] chunk {} side artifact unusable: {}", index, e);
                    unusable += 1;
                    failures.push(ChunkFailure {
                        chunk_index: index,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        })?;
        timer.add_stage_time(if decrypt { Stage::Decrypt } else { Stage::Dispatch }, started.elapsed());
        counters.merge(&stats.counters);
        counters.demote_completed(unusable);

        for &index in &stats.skipped {
            failures.push(ChunkFailure {
                chunk_index: index,
                kind: ErrorKind::Cancelled,
                message: "chunk not dispatched: batch cancelled".into(),
            });
        }
        failures.sort_by_key(|f| f.chunk_index);

        timer.time(Stage::Sort, || rows.sort_by_key(|r| r.row_identifier));
        timer.finish();

        let success = failures.is_empty();
        if success {
            log::info!("[LOAD] done: {} rows in {:?}", rows.len(), timer.elapsed());
        } else {
            log::warn!("[LOAD] {} chunks failed, {} rows recovered", failures.len(), rows.len());
        }

        Ok(LoadSummary {
            success,
            rows,
            columns,
            merged_row_count,
            decrypted: decrypt,
            damaged_cells,
            tampered_cells,
            completion_order: stats.completion_order,
            failures,
            elapsed: timer.elapsed(),
            telemetry: TelemetrySnapshot::from(&counters, &timer),
        })
    }

    /// `limit` rows starting at `offset` in identifier order, decrypted in this thread.
    pub fn load_page(&self, offset: u64, limit: u64, decrypt: bool) -> Result<Page, PipelineError> {
        let mut session = self.storage.connect()?;
        let total = session.row_count()?;
        let stored = session.fetch_page(offset, limit)?;
        let columns = stored.iter().map(|r| r.cells.len()).max().unwrap_or(0);

        let rows = if decrypt {
            let key = self.require_key("decryption")?;
            let opened = open_rows(key, stored, columns, self.engine_threads)?;
            if opened.damaged > 0 {
                log::warn!("[LOAD] page at {}: {} damaged cells zero-filled", offset, opened.damaged);
            }
            if opened.tampered > 0 {
                log::warn!("[LOAD] page at {}: {} cells failed authentication", offset, opened.tampered);
            }
            opened.rows
        } else {
            plain_rows(stored, columns)
        };
        log::debug!("[LOAD] page offset={} limit={} -> {} of {}", offset, limit, rows.len(), total);
        Ok(Page { total, rows })
    }

    /// Empty every partition.
    pub fn reset(&self) -> Result<(), PipelineError> {
        self.storage.connect()?.reset()?;
        log::info!("[STORE] {} reset", self.storage.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::split_rows;
    use crate::dataset::StoredRow;

    #[test]
    fn split_keeps_every_row_in_order() {
        let rows: Vec<StoredRow> = (1..=5)
            .map(|id| StoredRow { row_identifier: id, cells: vec![] })
            .collect();
        let chunks = split_rows(rows, 2, 0);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.rows.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(chunks[2].rows[0].row_identifier, 5);
    }
}

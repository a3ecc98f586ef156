//! worker/write.rs
//! Encrypt/write path of a chunk task.
//!
//! Reads its chunk artifact, optionally seals every cell in one engine call,
//! base64-encodes the ciphertext and hands the rows to `distribute` on a
//! session it opened itself.

use std::sync::Arc;

use crate::constants::extra_args;
use crate::crypto::{encode_cell, encrypt_table, split_encrypted, CellKey};
use crate::exchange::read_with_retry;
use crate::pool::{TaskOutput, WorkerContext, WorkerEntry, WorkerReport};
use crate::storage::Storage;
use crate::types::{CryptoContext, PipelineError};
use crate::worker::types::{WriteChunk, WriteOutcome};

pub struct WriteChunkWorker {
    storage: Arc<dyn Storage>,
    key: Option<Arc<CellKey>>,
    engine_threads: usize,
}

impl WriteChunkWorker {
    pub fn new(storage: Arc<dyn Storage>, key: Option<Arc<CellKey>>, engine_threads: usize) -> Self {
        Self {
            storage,
            key,
            engine_threads: engine_threads.max(1),
        }
    }

    fn process(&self, ctx: &WorkerContext, out: &mut TaskOutput) -> Result<WriteOutcome, PipelineError> {
        let encrypt = match ctx.extra_arg.as_str() {
            extra_args::ENCRYPT => true,
            extra_args::PLAIN => false,
            other => return Err(PipelineError::config(format!("write worker got extra arg '{other}'"))),
        };

        let bytes = read_with_retry(&ctx.input, ctx.retry)?;
        let chunk: WriteChunk = serde_json::from_slice(&bytes)?;
        let processed = chunk.rows.len() as u64;
        log::debug!(
            "[WORKER-{}] {} rows x {} cols from row {}",
            ctx.chunk_index,
            processed,
            chunk.columns,
            chunk.first_row
        );

        let (rows, method) = if encrypt {
            let key = self
                .key
                .as_deref()
                .ok_or_else(|| PipelineError::EncryptionFailed("no key configured".into()))?;
            (seal_rows(key, &chunk.rows, self.engine_threads)?, Some(key.method().to_string()))
        } else {
            (chunk.rows, None)
        };

        let mut session = self.storage.connect()?;
        let reported = session.distribute(&rows)?;

        let fallback = reported == 0 && processed > 0;
        let rows_affected = if fallback {
            log::warn!(
                "[WORKER-{}] storage reported 0 affected rows for {} processed; using processed count",
                ctx.chunk_index,
                processed
            );
            out.diag(format!("rowsAffected fallback: reported 0, processed {processed}"));
            processed
        } else {
            reported
        };

        Ok(WriteOutcome {
            rows_affected,
            processed_rows: processed,
            encrypted: encrypt,
            encrypt_method: method,
            rows_affected_fallback: fallback,
        })
    }
}

/// Seal every cell of `rows` in one engine call and re-shape as base64 text rows.
pub fn seal_rows(key: &CellKey, rows: &[Vec<String>], threads: usize) -> Result<Vec<Vec<String>>, PipelineError> {
    let cells: Vec<&[u8]> = rows.iter().flat_map(|r| r.iter().map(String::as_bytes)).collect();
    let blob = encrypt_table(key, &cells, threads).encrypting()?;
    let sealed = split_encrypted(&blob, cells.len()).encrypting()?;

    let mut sealed = sealed.into_iter();
    Ok(rows
        .iter()
        .map(|row| sealed.by_ref().take(row.len()).map(encode_cell).collect())
        .collect())
}

impl WorkerEntry for WriteChunkWorker {
    fn run(&self, ctx: &WorkerContext, out: &mut TaskOutput) {
        let report = match self.process(ctx, out).and_then(|o| WorkerReport::success(&o)) {
            Ok(report) => report,
            Err(e) => {
                log::warn!("[WORKER-{}] write failed: {}", ctx.chunk_index, e);
                out.diag(format!("{}: {}", e.kind(), e));
                WorkerReport::failure(&e)
            }
        };
        out.emit(&report);
    }
}

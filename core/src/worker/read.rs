//! worker/read.rs
//! Decrypt/read path of a chunk task.
//!
//! Every non-identifier cell of the chunk is base64-decoded and framed into
//! one contiguous wire blob, decrypted with a single engine call, and split
//! back per row with the identifier reattached. The rows go to the side
//! artifact; the primary record only names it.

use std::fs;
use std::sync::Arc;

use crate::constants::extra_args;
use crate::crypto::{decode_cell, decrypt_table, CellKey};
use crate::dataset::{DecryptedRow, StoredRow};
use crate::exchange::read_with_retry;
use crate::pool::{TaskOutput, WorkerContext, WorkerEntry, WorkerReport};
use crate::types::{CryptoContext, PipelineError};
use crate::wire::encode_cells;
use crate::worker::types::{ReadChunk, ReadOutcome};

pub struct ReadChunkWorker {
    key: Option<Arc<CellKey>>,
    engine_threads: usize,
}

/// Rows plus the count of cells that came back zero-filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedRows {
    pub rows: Vec<DecryptedRow>,
    pub damaged: usize,
    pub tampered: usize,
}

/// Decrypt stored rows, `columns` cells each, in one engine call.
pub fn open_rows(
    key: &CellKey,
    rows: Vec<StoredRow>,
    columns: usize,
    threads: usize,
) -> Result<OpenedRows, PipelineError> {
    let mut sealed: Vec<Vec<u8>> = Vec::with_capacity(rows.len() * columns);
    for row in &rows {
        for c in 0..columns {
            sealed.push(row.cells.get(c).map(|s| decode_cell(s)).unwrap_or_default());
        }
    }
    let wire = encode_cells(&sealed)?;
    let table = decrypt_table(key, &wire, rows.len(), columns, threads).decrypting()?;

    let mut plain = table.cells.into_iter();
    let out = rows
        .into_iter()
        .map(|row| DecryptedRow {
            row_identifier: row.row_identifier,
            cells: plain
                .by_ref()
                .take(columns)
                .map(|c| String::from_utf8_lossy(&c).into_owned())
                .collect(),
        })
        .collect();
    Ok(OpenedRows {
        rows: out,
        damaged: table.damaged.len(),
        tampered: table.tampered.len(),
    })
}

/// Pass stored rows through unchanged, padded to `columns`.
pub fn plain_rows(rows: Vec<StoredRow>, columns: usize) -> Vec<DecryptedRow> {
    rows.into_iter()
        .map(|mut row| {
            row.cells.resize(columns, String::new());
            DecryptedRow {
                row_identifier: row.row_identifier,
                cells: row.cells,
            }
        })
        .collect()
}

impl ReadChunkWorker {
    pub fn new(key: Option<Arc<CellKey>>, engine_threads: usize) -> Self {
        Self {
            key,
            engine_threads: engine_threads.max(1),
        }
    }

    fn process(&self, ctx: &WorkerContext, out: &mut TaskOutput) -> Result<ReadOutcome, PipelineError> {
        let decrypt = match ctx.extra_arg.as_str() {
            extra_args::DECRYPT => true,
            extra_args::PLAIN => false,
            other => return Err(PipelineError::config(format!("read worker got extra arg '{other}'"))),
        };

        let bytes = read_with_retry(&ctx.input, ctx.retry)?;
        let chunk: ReadChunk = serde_json::from_slice(&bytes)?;
        let row_count = chunk.rows.len() as u64;

        let (rows, damaged, tampered) = if decrypt {
            let key = self
                .key
                .as_deref()
                .ok_or_else(|| PipelineError::DecryptionFailed("no key configured".into()))?;
            let opened = open_rows(key, chunk.rows, chunk.columns, self.engine_threads)?;
            (opened.rows, opened.damaged, opened.tampered)
        } else {
            (plain_rows(chunk.rows, chunk.columns), 0, 0)
        };

        if damaged > 0 {
            out.diag(format!("{damaged} damaged cells zero-filled"));
        }
        if tampered > 0 {
            out.diag(format!("{tampered} cells failed authentication, zero-filled"));
        }

        fs::write(&ctx.output, serde_json::to_vec(&rows)?)?;
        log::debug!("[WORKER-{}] {} rows written to side artifact", ctx.chunk_index, row_count);

        Ok(ReadOutcome {
            output: ctx
                .output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            row_count,
            decrypted: decrypt,
            damaged_cells: damaged as u64,
            tampered_cells: tampered as u64,
        })
    }
}

impl WorkerEntry for ReadChunkWorker {
    fn run(&self, ctx: &WorkerContext, out: &mut TaskOutput) {
        let report = match self.process(ctx, out).and_then(|o| WorkerReport::success(&o)) {
            Ok(report) => report,
            Err(e) => {
                log::warn!("[WORKER-{}] read failed: {}", ctx.chunk_index, e);
                out.diag(format!("{}: {}", e.kind(), e));
                WorkerReport::failure(&e)
            }
        };
        out.emit(&report);
    }
}

//! crypto/table.rs
//! Multi-cell table encrypt/decrypt over the wire format.
//!
//! Summary: the engine takes a row-major cell table, splits it into
//! `ceil(cells / threads)` runs, seals each run on its own scoped thread and
//! concatenates the framed runs in order. Callers see one blocking call.
//!
//! Decrypt tolerates a damaged blob: cells whose frame is missing or cut short,
//! and cells too short to hold a nonce and tag, come back empty and are
//! counted as damaged. A well-formed cell that fails authentication also
//! comes back empty and is counted as tampered. Every other cell still
//! decrypts.

use std::thread;

use crate::crypto::aead::CellKey;
use crate::crypto::types::{CryptoError, MIN_CELL_CIPHERTEXT};
use crate::wire::{parse_cells_lossy, push_cell, scan_exact};

/// Decrypted table plus the cells that had to be zero-filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedTable {
    pub cells: Vec<Vec<u8>>,
    /// Missing, truncated or too-short cells.
    pub damaged: Vec<usize>,
    /// Well-formed cells whose tag did not verify.
    pub tampered: Vec<usize>,
}

/// Framed plaintext `[len][plain]...` plus the zero-filled cell indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedWire {
    pub framed: Vec<u8>,
    pub damaged: Vec<usize>,
    pub tampered: Vec<usize>,
}

struct OpenedRun {
    framed: Vec<u8>,
    short: Vec<usize>,
    tampered: Vec<usize>,
}

fn run_len(total: usize, threads: usize) -> usize {
    let threads = threads.max(1);
    ((total + threads - 1) / threads).max(1)
}

/// Encrypt a row-major table of plaintext cells into one framed blob.
///
/// Empty cells become zero-length entries; every other cell is
/// `nonce || ciphertext || tag` under a fresh nonce.
pub fn encrypt_table<C>(key: &CellKey, cells: &[C], threads: usize) -> Result<Vec<u8>, CryptoError>
where
    C: AsRef<[u8]> + Sync,
{
    if cells.is_empty() {
        return Ok(Vec::new());
    }
    let per_run = run_len(cells.len(), threads);

    let runs: Vec<Result<Vec<u8>, CryptoError>> = thread::scope(|scope| {
        let handles: Vec<_> = cells
            .chunks(per_run)
            .map(|run| {
                scope.spawn(move || -> Result<Vec<u8>, CryptoError> {
                    let mut out = Vec::new();
                    for cell in run {
                        let plain = cell.as_ref();
                        if plain.is_empty() {
                            push_cell(&mut out, &[])?;
                        } else {
                            let sealed = key.seal_cell(plain)?;
                            push_cell(&mut out, &sealed)?;
                        }
                    }
                    Ok(out)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(Err(CryptoError::EnginePanic)))
            .collect()
    });

    let mut blob = Vec::new();
    for run in runs {
        blob.extend_from_slice(&run?);
    }
    Ok(blob)
}

/// Decrypt a framed ciphertext blob into a framed plaintext blob `[len][plain]...`.
pub fn decrypt_table_wire(
    key: &CellKey,
    wire: &[u8],
    rows: usize,
    cols: usize,
    threads: usize,
) -> Result<DecryptedWire, CryptoError> {
    let expected = rows * cols;
    let parsed = parse_cells_lossy(wire, expected);
    if !parsed.is_clean() {
        log::warn!(
            "[ENGINE] wire blob damaged: {} of {} cells zero-filled, {} trailing bytes",
            parsed.damaged.len(),
            expected,
            parsed.trailing
        );
    }
    if expected == 0 {
        return Ok(DecryptedWire {
            framed: Vec::new(),
            damaged: parsed.damaged,
            tampered: Vec::new(),
        });
    }

    let per_run = run_len(expected, threads);
    let cells = &parsed.cells;
    let damaged = &parsed.damaged;

    type Run = Result<OpenedRun, CryptoError>;
    let runs: Vec<Run> = thread::scope(|scope| {
        let handles: Vec<_> = cells
            .chunks(per_run)
            .enumerate()
            .map(|(run_idx, run)| {
                scope.spawn(move || -> Run {
                    let mut out = Vec::new();
                    let mut short = Vec::new();
                    let mut tampered = Vec::new();
                    for (offset, sealed) in run.iter().enumerate() {
                        let index = run_idx * per_run + offset;
                        if sealed.is_empty() || damaged.binary_search(&index).is_ok() {
                            push_cell(&mut out, &[])?;
                            continue;
                        }
                        if sealed.len() < MIN_CELL_CIPHERTEXT {
                            short.push(index);
                            push_cell(&mut out, &[])?;
                            continue;
                        }
                        match key.open_cell(sealed, index) {
                            Ok(plain) => push_cell(&mut out, &plain)?,
                            Err(CryptoError::TagMismatch { .. }) => {
                                tampered.push(index);
                                push_cell(&mut out, &[])?;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    Ok(OpenedRun {
                        framed: out,
                        short,
                        tampered,
                    })
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(Err(CryptoError::EnginePanic)))
            .collect()
    });

    let mut blob = Vec::new();
    let mut all_damaged = parsed.damaged.clone();
    let mut tampered = Vec::new();
    for run in runs {
        let run = run?;
        blob.extend_from_slice(&run.framed);
        all_damaged.extend(run.short);
        tampered.extend(run.tampered);
    }
    if all_damaged.len() > parsed.damaged.len() {
        log::warn!(
            "[ENGINE] {} cells too short to authenticate, zero-filled",
            all_damaged.len() - parsed.damaged.len()
        );
    }
    if !tampered.is_empty() {
        log::warn!("[ENGINE] {} cells failed authentication, zero-filled: {:?}", tampered.len(), tampered);
    }
    all_damaged.sort_unstable();
    all_damaged.dedup();
    Ok(DecryptedWire {
        framed: blob,
        damaged: all_damaged,
        tampered,
    })
}

/// Decrypt a framed ciphertext blob into `rows * cols` plaintext cells.
pub fn decrypt_table(
    key: &CellKey,
    wire: &[u8],
    rows: usize,
    cols: usize,
    threads: usize,
) -> Result<DecryptedTable, CryptoError> {
    let decrypted = decrypt_table_wire(key, wire, rows, cols, threads)?;
    let parsed = parse_cells_lossy(&decrypted.framed, rows * cols);
    Ok(DecryptedTable {
        cells: parsed.cells.into_iter().map(|c| c.to_vec()).collect(),
        damaged: decrypted.damaged,
        tampered: decrypted.tampered,
    })
}

/// Split an encrypted blob produced by [`encrypt_table`] back into per-cell ciphertexts.
pub fn split_encrypted(blob: &[u8], expected: usize) -> Result<Vec<&[u8]>, CryptoError> {
    Ok(scan_exact(blob, expected)?)
}

// ### `src/telemetry/counters.rs`

//! telemetry/counters.rs
//! Mutable counters used during a batch.
//!
//! Summary: the pool manager and coordinators own one instance each and fold
//! per-chunk counts in on their own thread. Converted into an immutable
//! TelemetrySnapshot when the batch ends.
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryCounters {
    pub chunks_dispatched: u64,
    pub chunks_completed: u64,
    pub chunks_failed: u64,
    pub rows_processed: u64,
    pub rows_affected: u64,
    pub cells_encrypted: u64,
    pub cells_decrypted: u64,
    pub cells_damaged: u64,
    pub cells_tampered: u64,
    pub bytes_exchanged: u64,
}

impl TelemetryCounters {
    /// Record one dispatched chunk and the size of its input artifact.
    pub fn add_dispatch(&mut self, artifact_len: usize) {
        self.chunks_dispatched += 1;
        self.bytes_exchanged += artifact_len as u64;
    }

    /// Record one finished chunk.
    pub fn add_outcome(&mut self, success: bool) {
        if success {
            self.chunks_completed += 1;
        } else {
            self.chunks_failed += 1;
        }
    }

    pub fn add_rows(&mut self, processed: u64, affected: u64) {
        self.rows_processed += processed;
        self.rows_affected += affected;
    }

    pub fn add_cells(&mut self, encrypted: u64, decrypted: u64, damaged: u64) {
        self.cells_encrypted += encrypted;
        self.cells_decrypted += decrypted;
        self.cells_damaged += damaged;
    }

    pub fn add_tampered(&mut self, tampered: u64) {
        self.cells_tampered += tampered;
    }

    /// A chunk the pool counted as completed turned out unusable downstream.
    pub fn demote_completed(&mut self, chunks: u64) {
        let moved = chunks.min(self.chunks_completed);
        self.chunks_completed -= moved;
        self.chunks_failed += moved;
    }

    pub fn chunks_finished(&self) -> u64 {
        self.chunks_completed + self.chunks_failed
    }

    pub fn merge(&mut self, other: &TelemetryCounters) {
        self.chunks_dispatched += other.chunks_dispatched;
        self.chunks_completed += other.chunks_completed;
        self.chunks_failed += other.chunks_failed;
        self.rows_processed += other.rows_processed;
        self.rows_affected += other.rows_affected;
        self.cells_encrypted += other.cells_encrypted;
        self.cells_decrypted += other.cells_decrypted;
        self.cells_damaged += other.cells_damaged;
        self.cells_tampered += other.cells_tampered;
        self.bytes_exchanged += other.bytes_exchanged;
    }
}

impl AddAssign for TelemetryCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}

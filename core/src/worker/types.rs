use serde::{Deserialize, Serialize};

use crate::dataset::StoredRow;

/// Input artifact of a write task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteChunk {
    /// Position of the first row in the source dataset.
    pub first_row: usize,
    pub columns: usize,
    pub rows: Vec<Vec<String>>,
}

/// Input artifact of a read task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadChunk {
    pub columns: usize,
    pub rows: Vec<StoredRow>,
}

/// Primary record of a write task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub rows_affected: u64,
    pub processed_rows: u64,
    pub encrypted: bool,
    pub encrypt_method: Option<String>,
    /// Storage reported 0 affected rows and `processed_rows` was substituted.
    #[serde(default)]
    pub rows_affected_fallback: bool,
}

/// Primary record of a read task. The rows themselves are in the side artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOutcome {
    /// File name of the side artifact.
    pub output: String,
    pub row_count: u64,
    pub decrypted: bool,
    #[serde(default)]
    pub damaged_cells: u64,
    #[serde(default)]
    pub tampered_cells: u64,
}

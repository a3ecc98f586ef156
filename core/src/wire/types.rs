use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Blob ended inside a length prefix.
    #[error("truncated length prefix at offset {offset} (blob is {len} bytes)")]
    TruncatedPrefix { offset: usize, len: usize },

    /// Declared cell length runs past the end of the blob.
    #[error("cell {index} declares {declared} bytes at offset {offset}, only {available} available")]
    TruncatedCell {
        index: usize,
        offset: usize,
        declared: usize,
        available: usize,
    },

    #[error("expected {expected} cells, found {actual}")]
    CellCount { expected: usize, actual: usize },

    /// Cell too large for a u32 prefix.
    #[error("cell of {0} bytes exceeds the u32 length prefix")]
    Oversized(usize),
}

/// Result of a lossy parse: always exactly `expected` cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCells<'a> {
    pub cells: Vec<&'a [u8]>,
    /// Indices of cells that were zero-filled or truncated.
    pub damaged: Vec<usize>,
    /// Bytes left over after the last expected cell.
    pub trailing: usize,
}

impl ParsedCells<'_> {
    pub fn is_clean(&self) -> bool {
        self.damaged.is_empty() && self.trailing == 0
    }

    pub fn is_damaged(&self, index: usize) -> bool {
        self.damaged.binary_search(&index).is_ok()
    }
}

use byteorder::{ByteOrder, LittleEndian};

use crate::constants::CELL_LEN_PREFIX;
use crate::wire::types::{ParsedCells, WireError};

/// Strict scan: every byte must belong to a well-formed cell.
///
/// Used on blobs produced inside this process, where any mismatch is a bug
/// in the producer rather than transport damage. Slices borrow from `blob`.
pub fn scan_cells(blob: &[u8]) -> Result<Vec<&[u8]>, WireError> {
    let mut cells = Vec::new();
    let mut off = 0usize;

    while off < blob.len() {
        if off + CELL_LEN_PREFIX > blob.len() {
            return Err(WireError::TruncatedPrefix { offset: off, len: blob.len() });
        }
        let declared = LittleEndian::read_u32(&blob[off..off + CELL_LEN_PREFIX]) as usize;
        off += CELL_LEN_PREFIX;

        let available = blob.len() - off;
        if declared > available {
            return Err(WireError::TruncatedCell {
                index: cells.len(),
                offset: off,
                declared,
                available,
            });
        }
        cells.push(&blob[off..off + declared]);
        off += declared;
    }

    Ok(cells)
}

/// Lossy parse of exactly `expected` cells.
///
/// Never fails and never panics:
/// - a cell whose prefix is missing is zero-filled (empty)
/// - a cell whose payload runs past the end is truncated to what is there
/// - bytes after the last expected cell are counted in `trailing`
pub fn parse_cells_lossy(blob: &[u8], expected: usize) -> ParsedCells<'_> {
    let mut cells = Vec::with_capacity(expected);
    let mut damaged = Vec::new();
    let mut off = 0usize;

    for index in 0..expected {
        if off + CELL_LEN_PREFIX > blob.len() {
            cells.push(&blob[..0]);
            damaged.push(index);
            off = blob.len();
            continue;
        }
        let declared = LittleEndian::read_u32(&blob[off..off + CELL_LEN_PREFIX]) as usize;
        off += CELL_LEN_PREFIX;

        let available = blob.len() - off;
        if declared > available {
            cells.push(&blob[off..]);
            damaged.push(index);
            off = blob.len();
            continue;
        }
        cells.push(&blob[off..off + declared]);
        off += declared;
    }

    ParsedCells {
        cells,
        damaged,
        trailing: blob.len() - off,
    }
}

/// Strict variant of [`parse_cells_lossy`] that also checks the cell count.
pub fn scan_exact(blob: &[u8], expected: usize) -> Result<Vec<&[u8]>, WireError> {
    let cells = scan_cells(blob)?;
    if cells.len() != expected {
        return Err(WireError::CellCount { expected, actual: cells.len() });
    }
    Ok(cells)
}

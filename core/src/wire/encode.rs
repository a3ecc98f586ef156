use byteorder::{ByteOrder, LittleEndian};

use crate::constants::CELL_LEN_PREFIX;
use crate::wire::types::WireError;

/// Append one framed cell to `out`.
///
/// Layout:
///
/// ```text
/// [ len (4, LE) ][ payload (len) ]
/// ```
///
/// An empty payload is encoded as a bare zero prefix.
#[inline]
pub fn push_cell(out: &mut Vec<u8>, payload: &[u8]) -> Result<(), WireError> {
    let len = u32::try_from(payload.len()).map_err(|_| WireError::Oversized(payload.len()))?;
    let mut prefix = [0u8; CELL_LEN_PREFIX];
    LittleEndian::write_u32(&mut prefix, len);
    out.extend_from_slice(&prefix);
    out.extend_from_slice(payload);
    Ok(())
}

/// Frame a row-major sequence of cells into one contiguous blob.
pub fn encode_cells<C: AsRef<[u8]>>(cells: &[C]) -> Result<Vec<u8>, WireError> {
    let body: usize = cells.iter().map(|c| c.as_ref().len()).sum();
    let mut out = Vec::with_capacity(body + cells.len() * CELL_LEN_PREFIX);
    for cell in cells {
        push_cell(&mut out, cell.as_ref())?;
    }
    Ok(out)
}

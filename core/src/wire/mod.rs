//! Cell wire format.
//!
//! Responsibilities:
//! - Frame cells as `[len: u32 LE][payload]` in row-major order
//! - Strict scan of blobs this crate produced
//! - Lossy parse of blobs of unknown provenance (never panics)
//!
//! Non-responsibilities:
//! - Cryptography
//! - Transport encoding
//! - Parallelism

pub mod types;
pub mod encode;
pub mod decode;

pub use types::{ParsedCells, WireError};
pub use encode::{encode_cells, push_cell};
pub use decode::{parse_cells_lossy, scan_cells, scan_exact};

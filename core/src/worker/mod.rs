//! Chunk workers: the code a pool slot runs for one chunk.

pub mod types;
pub mod write;
pub mod read;

pub use types::{ReadChunk, ReadOutcome, WriteChunk, WriteOutcome};
pub use write::{seal_rows, WriteChunkWorker};
pub use read::{open_rows, plain_rows, OpenedRows, ReadChunkWorker};

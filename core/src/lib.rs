//! cellshard-core
//!
//! Encrypted tabular-data pipeline: bounded chunk workers, per-cell AES-GCM,
//! distribute/merge over a partitioned store, transactional partial updates.
//! No FFI.

#![forbid(unsafe_code)]

// Shared and top level
pub mod constants;
pub mod types;
pub mod config;
pub mod parallelism;
pub mod dataset;

// Engine
pub mod wire;
pub mod crypto;

// Execution
pub mod exchange;
pub mod telemetry;
pub mod pool;
pub mod worker;

// Storage and batches
pub mod storage;
pub mod coordinator;
pub mod recovery;
pub mod export;

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::config::{CryptoConfig, DatabaseConfig, FaultPlan, PipelineConfig, RetryPolicy, ShapePolicy};
    pub use crate::coordinator::{Coordinator, LoadSummary, ModifiedCellMap, Page, SaveSummary, UpdateSummary};
    pub use crate::crypto::{derive_key, CellKey};
    pub use crate::dataset::{Dataset, DecryptedRow, Schema, StoredRow};
    pub use crate::pool::{CancellationToken, WorkerPool};
    pub use crate::recovery::ChangeStaging;
    pub use crate::storage::{ShardedMemoryStore, Storage, StoreFaults};
    pub use crate::types::{ChunkFailure, ErrorKind, PipelineError};
}

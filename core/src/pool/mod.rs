//! Worker pool manager.
//!
//! Responsibilities:
//! - Dispatch chunks in submission order, at most `max_concurrency` at a time
//! - Multiplex every active task's stdout/stderr with a bounded wait
//! - Poll liveness independently of stream EOF, then drain, join, classify
//! - Own the exchange artifacts of every task until it is collected
//!
//! Non-responsibilities:
//! - What a chunk means (workers decide)
//! - Reordering rows (coordinators sort)

pub mod types;
pub mod output;
pub mod entry;
pub mod manager;

pub use types::{
    BatchRun,
    BatchStats,
    CancellationToken,
    TaskResult,
    TaskState,
    WorkerContext,
    WorkerReport,
};
pub use output::{ChannelWriter, TaskOutput};
pub use entry::{DelayedEntry, WorkerEntry};
pub use manager::WorkerPool;

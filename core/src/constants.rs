// ## 📂 File: `src/constants.rs`

use std::time::Duration;

/// Length prefix in front of every cell in a wire blob (little-endian u32).
pub const CELL_LEN_PREFIX: usize = 4;

/// Reserved identifier column. Never encrypted, never renamed.
pub const ROW_IDENTIFIER: &str = "row_identifier";
/// Accepted alias of [`ROW_IDENTIFIER`] in source rows.
pub const ROW_IDENTIFIER_ALIAS: &str = "id";

/// Widest row the partitioned store accepts (`col1..col60`).
pub const MAX_COLUMNS: usize = 60;

/// Number of physical partitions behind the reference store (`excel_part1..30`).
pub const DEFAULT_PARTITIONS: usize = 30;

/// Rows per read-path chunk.
pub const DEFAULT_READ_CHUNK_ROWS: usize = 2_000;

/// Bounded wait of the pool's multiplexed readiness loop.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Idle tick when every active task has closed its streams but not yet exited.
pub const LIVENESS_TICK: Duration = Duration::from_millis(5);

/// Input artifact read policy (attempts, spacing).
pub const INPUT_READ_ATTEMPTS: u32 = 3;
pub const INPUT_READ_INTERVAL: Duration = Duration::from_millis(200);

/// Raw primary payload kept on a synthesized failure.
pub const RAW_PAYLOAD_LIMIT: usize = 300;

/// Exit status recorded for a worker that panicked (matches the Rust runtime).
pub const PANIC_EXIT_CODE: i32 = 101;

/// Extra-arg markers passed to chunk workers.
pub mod extra_args {
    pub const ENCRYPT: &str = "encrypt";
    pub const PLAIN: &str = "";
    pub const DECRYPT: &str = "decrypt";
}

/// Key derivation defaults.
pub mod kdf_defaults {
    pub const KEY_LEN: usize = 32;
    pub const ITERATIONS: u32 = 10_000;
    pub const ENGINE_THREADS: usize = 4;
}

/// Storage procedures and tables of the partitioned schema.
pub mod schema {
    pub const DISTRIBUTE_PROC: &str = "sp_distribute_excel_data";
    pub const MERGE_PROC: &str = "sp_merge_excel_data_all";
    pub const MERGED_TABLE: &str = "excel_full";
    pub const PARTITION_PREFIX: &str = "excel_part";
}

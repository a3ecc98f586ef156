//! Storage seam.
//!
//! The partitioned store is an external collaborator. This layer only knows
//! its call/return contract:
//! - `distribute(rows)` takes positional `col1..colN` rows and returns an
//!   aggregate affected-row count
//! - `merge()` returns the full logical row set labelled by `row_identifier`
//!
//! Every worker opens its own [`StorageSession`]; sessions are never shared.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::dataset::{storage_column, StoredRow};

pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;

pub use memory::{ShardedMemoryStore, StoreFaults};
#[cfg(feature = "mysql")]
pub use mysql::MySqlStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("distribute call failed: {0}")]
    Distribute(String),

    #[error("merge call failed: {0}")]
    Merge(String),

    /// Update referenced a row that storage does not hold.
    #[error("row {0} does not exist")]
    UnknownRow(u64),

    #[error("column {0} is not a storage column")]
    UnknownColumn(String),

    /// Update transaction failed and was rolled back.
    #[error("update rolled back: {0}")]
    UpdateRolledBack(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// One row's UPDATE: only the listed columns are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    pub row_identifier: u64,
    /// (zero-based storage column, new stored value)
    pub cells: Vec<(usize, String)>,
}

/// Opens independent sessions against the store.
pub trait Storage: Send + Sync {
    fn connect(&self) -> Result<Box<dyn StorageSession>, StorageError>;

    /// Short label for logs.
    fn name(&self) -> &str;
}

/// One connection. Owned by a single task.
pub trait StorageSession: Send {
    /// Insert rows; returns the store's reported affected count.
    fn distribute(&mut self, rows: &[Vec<String>]) -> Result<u64, StorageError>;

    /// Full logical row set. Order is not guaranteed.
    fn merge(&mut self) -> Result<Vec<StoredRow>, StorageError>;

    /// Rows ordered by identifier, `limit` starting at `offset`.
    fn fetch_page(&mut self, offset: u64, limit: u64) -> Result<Vec<StoredRow>, StorageError>;

    fn row_count(&mut self) -> Result<u64, StorageError>;

    /// Apply every update in one transaction; nothing is kept if any fails.
    fn apply_updates(&mut self, updates: &[RowUpdate]) -> Result<u64, StorageError>;

    /// Empty every partition.
    fn reset(&mut self) -> Result<(), StorageError>;
}

/// JSON argument of the distribute procedure: `[{"col1": .., "colN": ..}, ...]`.
pub fn distribute_payload(rows: &[Vec<String>]) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| {
                let mut obj = Map::with_capacity(row.len());
                for (i, cell) in row.iter().enumerate() {
                    obj.insert(storage_column(i), Value::String(cell.clone()));
                }
                Value::Object(obj)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_positional_keys() {
        let rows = vec![vec!["a".to_string(), "".to_string()]];
        let json = distribute_payload(&rows);
        assert_eq!(json, serde_json::json!([{"col1": "a", "col2": ""}]));
    }
}

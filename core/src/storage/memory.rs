//! storage/memory.rs
//! In-process partitioned store honoring the distribute/merge contract.
//!
//! Rows get monotonically increasing identifiers and are spread across a
//! fixed number of partitions by `row_identifier % partitions`. Merge joins
//! the partitions in partition order, so callers never get identifier order
//! for free. Updates are staged on a copy and swapped in only when all succeed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::{DEFAULT_PARTITIONS, MAX_COLUMNS};
use crate::dataset::StoredRow;
use crate::storage::{RowUpdate, Storage, StorageError, StorageSession};

/// Failures the store can be told to produce.
#[derive(Debug, Clone, Default)]
pub struct StoreFaults {
    /// Report 0 affected rows from every distribute call (rows are still stored).
    pub report_zero_affected: bool,
    /// Fail any update transaction touching this row.
    pub fail_update_row: Option<u64>,
    /// Fail the n-th distribute call (0-based, counted across sessions).
    pub fail_distribute_call: Option<u64>,
}

#[derive(Debug)]
struct StoreState {
    next_id: u64,
    partitions: Vec<BTreeMap<u64, Vec<String>>>,
}

impl StoreState {
    fn find_mut(&mut self, id: u64) -> Option<&mut Vec<String>> {
        let n = self.partitions.len() as u64;
        self.partitions[(id % n) as usize].get_mut(&id)
    }
}

#[derive(Debug, Clone)]
pub struct ShardedMemoryStore {
    state: Arc<Mutex<StoreState>>,
    faults: Arc<StoreFaults>,
    distribute_calls: Arc<AtomicU64>,
}

impl Default for ShardedMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }
}

impl ShardedMemoryStore {
    pub fn new(partitions: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                next_id: 1,
                partitions: vec![BTreeMap::new(); partitions.max(1)],
            })),
            faults: Arc::new(StoreFaults::default()),
            distribute_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_faults(mut self, faults: StoreFaults) -> Self {
        self.faults = Arc::new(faults);
        self
    }

    pub fn partition_count(&self) -> usize {
        self.lock().map(|s| s.partitions.len()).unwrap_or(0)
    }

    /// Rows held by each partition.
    pub fn partition_sizes(&self) -> Vec<usize> {
        self.lock()
            .map(|s| s.partitions.iter().map(BTreeMap::len).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Query("store lock poisoned".into()))
    }
}

impl Storage for ShardedMemoryStore {
    fn connect(&self) -> Result<Box<dyn StorageSession>, StorageError> {
        Ok(Box::new(MemorySession { store: self.clone() }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySession {
    store: ShardedMemoryStore,
}

impl StorageSession for MemorySession {
    fn distribute(&mut self, rows: &[Vec<String>]) -> Result<u64, StorageError> {
        let call = self.store.distribute_calls.fetch_add(1, Ordering::SeqCst);
        if self.store.faults.fail_distribute_call == Some(call) {
            return Err(StorageError::Distribute(format!("injected failure on call {call}")));
        }
        if let Some(wide) = rows.iter().find(|r| r.len() > MAX_COLUMNS) {
            return Err(StorageError::Distribute(format!(
                "row has {} columns, limit is {}",
                wide.len(),
                MAX_COLUMNS
            )));
        }

        let mut state = self.store.lock()?;
        let n = state.partitions.len() as u64;
        for row in rows {
            let id = state.next_id;
            state.next_id += 1;
            state.partitions[(id % n) as usize].insert(id, row.clone());
        }
        log::debug!("[STORE] distributed {} rows across {} partitions", rows.len(), n);

        if self.store.faults.report_zero_affected {
            return Ok(0);
        }
        Ok(rows.len() as u64)
    }

    fn merge(&mut self) -> Result<Vec<StoredRow>, StorageError> {
        let state = self.store.lock()?;
        Ok(state
            .partitions
            .iter()
            .flat_map(|p| p.iter())
            .map(|(&id, cells)| StoredRow {
                row_identifier: id,
                cells: cells.clone(),
            })
            .collect())
    }

    fn fetch_page(&mut self, offset: u64, limit: u64) -> Result<Vec<StoredRow>, StorageError> {
        let state = self.store.lock()?;
        let ids: BTreeSet<u64> = state.partitions.iter().flat_map(|p| p.keys().copied()).collect();
        let n = state.partitions.len() as u64;
        Ok(ids
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|id| {
                state.partitions[(id % n) as usize].get(&id).map(|cells| StoredRow {
                    row_identifier: id,
                    cells: cells.clone(),
                })
            })
            .collect())
    }

    fn row_count(&mut self) -> Result<u64, StorageError> {
        let state = self.store.lock()?;
        Ok(state.partitions.iter().map(|p| p.len() as u64).sum())
    }

    fn apply_updates(&mut self, updates: &[RowUpdate]) -> Result<u64, StorageError> {
        let mut state = self.store.lock()?;
        let mut staged: BTreeMap<u64, Vec<String>> = BTreeMap::new();

        for update in updates {
            if self.store.faults.fail_update_row == Some(update.row_identifier) {
                return Err(StorageError::UpdateRolledBack(format!(
                    "injected failure on row {}",
                    update.row_identifier
                )));
            }
            let current = match staged.get(&update.row_identifier) {
                Some(row) => row.clone(),
                None => state
                    .find_mut(update.row_identifier)
                    .map(|row| row.clone())
                    .ok_or(StorageError::UnknownRow(update.row_identifier))?,
            };
            let mut row = current;
            for (col, value) in &update.cells {
                if *col >= MAX_COLUMNS {
                    return Err(StorageError::UnknownColumn(format!("col{}", col + 1)));
                }
                if row.len() <= *col {
                    row.resize(col + 1, String::new());
                }
                row[*col] = value.clone();
            }
            staged.insert(update.row_identifier, row);
        }

        // Commit: every row validated, swap in.
        let touched = staged.len() as u64;
        for (id, row) in staged {
            if let Some(slot) = state.find_mut(id) {
                *slot = row;
            }
        }
        log::debug!("[STORE] committed updates to {} rows", touched);
        Ok(touched)
    }

    fn reset(&mut self) -> Result<(), StorageError> {
        let mut state = self.store.lock()?;
        for p in state.partitions.iter_mut() {
            p.clear();
        }
        state.next_id = 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Vec<String>> {
        (0..n).map(|i| vec![format!("v{i}")]).collect()
    }

    #[test]
    fn identifiers_are_monotonic_across_sessions() {
        let store = ShardedMemoryStore::new(4);
        store.connect().unwrap().distribute(&rows(3)).unwrap();
        store.connect().unwrap().distribute(&rows(2)).unwrap();
        let mut merged = store.connect().unwrap().merge().unwrap();
        merged.sort_by_key(|r| r.row_identifier);
        let ids: Vec<u64> = merged.iter().map(|r| r.row_identifier).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(store.partition_sizes().iter().sum::<usize>(), 5);
    }

    #[test]
    fn failed_update_changes_nothing() {
        let store = ShardedMemoryStore::new(2).with_faults(StoreFaults {
            fail_update_row: Some(2),
            ..StoreFaults::default()
        });
        let mut s = store.connect().unwrap();
        s.distribute(&rows(2)).unwrap();
        let updates = vec![
            RowUpdate { row_identifier: 1, cells: vec![(0, "new".into())] },
            RowUpdate { row_identifier: 2, cells: vec![(0, "new".into())] },
        ];
        assert!(s.apply_updates(&updates).is_err());
        let page = s.fetch_page(0, 10).unwrap();
        assert_eq!(page[0].cells, vec!["v0"]);
        assert_eq!(page[1].cells, vec!["v1"]);
    }

    #[test]
    fn unknown_row_is_rejected() {
        let store = ShardedMemoryStore::default();
        let mut s = store.connect().unwrap();
        let err = s
            .apply_updates(&[RowUpdate { row_identifier: 42, cells: vec![(0, "x".into())] }])
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownRow(42)));
    }
}

// ## 📂 File: `src/coordinator/update.rs`
// ## Partial update: re-encrypt and persist only edited cells

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinator::Coordinator;
use crate::dataset::{parse_storage_column, storage_column};
use crate::recovery::ChangeStaging;
use crate::storage::{RowUpdate, StorageError};
use crate::telemetry::{Stage, TelemetryTimer};
use crate::types::PipelineError;
use crate::worker::seal_rows;

/// Pending edits: row identifier -> (storage column -> new plaintext).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifiedCellMap {
    rows: BTreeMap<u64, BTreeMap<String, String>>,
}

impl ModifiedCellMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit; a later edit of the same cell replaces the earlier one.
    pub fn insert(&mut self, row_identifier: u64, column: impl Into<String>, value: impl Into<String>) {
        self.rows
            .entry(row_identifier)
            .or_default()
            .insert(column.into(), value.into());
    }

    pub fn get(&self, row_identifier: u64, column: &str) -> Option<&str> {
        self.rows.get(&row_identifier)?.get(column).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.values().all(BTreeMap::is_empty)
    }

    /// Number of edited cells.
    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn row_count(&self) -> usize {
        self.rows.values().filter(|cols| !cols.is_empty()).count()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &BTreeMap<String, String>)> {
        self.rows.iter().map(|(id, cols)| (*id, cols))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    pub rows_updated: u64,
    pub cells_updated: usize,
    pub encrypted: bool,
    pub elapsed: Duration,
}

impl Coordinator {
    /// Apply `changes` in one storage transaction.
    ///
    /// Only the cells present for a row are written; its other cells keep their
    /// stored bytes. On success `changes` and `staging` are cleared. On failure
    /// both are left as they were and storage is rolled back.
    pub fn apply_changes(
        &self,
        changes: &mut ModifiedCellMap,
        encrypt: bool,
        staging: Option<&ChangeStaging>,
    ) -> Result<UpdateSummary, PipelineError> {
        if changes.is_empty() {
            return Err(PipelineError::NoChanges);
        }
        let mut timer = TelemetryTimer::new();

        // Rows ascending; columns ascending by storage position.
        let row_ids: Vec<u64> = changes.iter().filter(|(_, c)| !c.is_empty()).map(|(id, _)| id).collect();
        let mut columns: BTreeSet<usize> = BTreeSet::new();
        for (_, cols) in changes.iter() {
            for name in cols.keys() {
                let pos = parse_storage_column(name)
                    .ok_or_else(|| StorageError::UnknownColumn(name.clone()))?;
                columns.insert(pos);
            }
        }
        let columns: Vec<usize> = columns.into_iter().collect();

        // Dense matrix, "" where a (row, column) pair was not touched.
        let dense: Vec<Vec<String>> = row_ids
            .iter()
            .map(|&id| {
                columns
                    .iter()
                    .map(|&c| {
                        changes
                            .get(id, &storage_column(c))
                            .unwrap_or_default()
                            .to_string()
                    })
                    .collect()
            })
            .collect();

        let stored = if encrypt {
            let key = self.require_key("encryption")?;
            timer.time(Stage::Encrypt, || seal_rows(key, &dense, self.engine_threads))?
        } else {
            dense
        };

        let updates: Vec<RowUpdate> = row_ids
            .iter()
            .zip(stored)
            .map(|(&id, cells)| RowUpdate {
                row_identifier: id,
                cells: columns
                    .iter()
                    .zip(cells)
                    .filter(|(c, _)| changes.get(id, &storage_column(**c)).is_some())
                    .map(|(&c, value)| (c, value))
                    .collect(),
            })
            .collect();
        let cells_updated: usize = updates.iter().map(|u| u.cells.len()).sum();

        let rows_updated = {
            let mut session = self.storage.connect()?;
            timer.time(Stage::Update, || session.apply_updates(&updates))
        };
        let rows_updated = match rows_updated {
            Ok(n) => n,
            Err(e) => {
                log::error!("[UPDATE] transaction rolled back, {} pending cells kept: {}", changes.len(), e);
                return Err(e.into());
            }
        };

        changes.clear();
        if let Some(staging) = staging {
            if let Err(e) = staging.clear() {
                log::warn!("[UPDATE] committed but could not clear staged snapshot {:?}: {}", staging.path(), e);
            }
        }
        timer.finish();
        log::info!(
            "[UPDATE] {} cells in {} rows committed in {:?}",
            cells_updated,
            rows_updated,
            timer.elapsed()
        );

        Ok(UpdateSummary {
            rows_updated,
            cells_updated,
            encrypted: encrypt,
            elapsed: timer.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ModifiedCellMap;

    #[test]
    fn later_edit_replaces_earlier() {
        let mut map = ModifiedCellMap::new();
        map.insert(3, "col2", "a");
        map.insert(3, "col2", "b");
        map.insert(4, "col1", "c");
        assert_eq!(map.len(), 2);
        assert_eq!(map.row_count(), 2);
        assert_eq!(map.get(3, "col2"), Some("b"));
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut map = ModifiedCellMap::new();
        map.insert(7, "col1", "y");
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json, serde_json::json!({"7": {"col1": "y"}}));
    }
}

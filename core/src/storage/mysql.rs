//! storage/mysql.rs
//! MySQL sessions over the partitioned schema (`--features mysql`).
//!
//! Distribute and merge are the stored procedures; paged reads, updates and
//! reset run against the merged table and the partition tables directly.
//! Calls block on a private multi-thread runtime, so pool workers stay plain
//! OS threads.

use std::sync::Arc;
use std::time::Duration;

use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{Column, Connection, MySql, MySqlPool, Row};
use tokio::runtime::Runtime;

use crate::config::DatabaseConfig;
use crate::constants::{schema, DEFAULT_PARTITIONS, ROW_IDENTIFIER};
use crate::dataset::{parse_storage_column, storage_column, StoredRow};
use crate::storage::{distribute_payload, RowUpdate, Storage, StorageError, StorageSession};

pub struct MySqlStore {
    runtime: Arc<Runtime>,
    pool: MySqlPool,
    config: DatabaseConfig,
}

impl MySqlStore {
    /// Connect a pool sized for `max_sessions` concurrent workers.
    pub fn connect(config: DatabaseConfig, max_sessions: u32) -> Result<Self, StorageError> {
        config
            .validate()
            .map_err(|e| StorageError::Connect(e.to_string()))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| StorageError::Connect(format!("runtime: {e}")))?;

        let url = config.to_url();
        let pool = runtime
            .block_on(
                MySqlPoolOptions::new()
                    .max_connections(max_sessions.max(1) + 1)
                    .acquire_timeout(Duration::from_secs(30))
                    .connect(&url),
            )
            .map_err(|e| StorageError::Connect(e.to_string()))?;
        log::info!("[STORE] mysql pool ready: {}:{}/{}", config.host, config.port, config.database);

        Ok(Self {
            runtime: Arc::new(runtime),
            pool,
            config,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }
}

impl Storage for MySqlStore {
    fn connect(&self) -> Result<Box<dyn StorageSession>, StorageError> {
        let conn = self
            .runtime
            .block_on(self.pool.acquire())
            .map_err(|e| StorageError::Connect(e.to_string()))?;
        Ok(Box::new(MySqlSession {
            runtime: Arc::clone(&self.runtime),
            conn,
        }))
    }

    fn name(&self) -> &str {
        "mysql"
    }
}

struct MySqlSession {
    runtime: Arc<Runtime>,
    conn: PoolConnection<MySql>,
}

fn query_err(e: sqlx::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

/// `row_identifier` plus every `colN` column of a result row, in column order.
fn stored_row(row: &MySqlRow) -> Result<StoredRow, StorageError> {
    let id: i64 = row.try_get(ROW_IDENTIFIER).map_err(query_err)?;
    let mut cells: Vec<(usize, String)> = Vec::new();
    for column in row.columns() {
        if let Some(pos) = parse_storage_column(column.name()) {
            let value: Option<String> = row.try_get(column.ordinal()).map_err(query_err)?;
            cells.push((pos, value.unwrap_or_default()));
        }
    }
    cells.sort_by_key(|(pos, _)| *pos);
    let width = cells.last().map_or(0, |(pos, _)| pos + 1);
    let mut out = vec![String::new(); width];
    for (pos, value) in cells {
        out[pos] = value;
    }
    Ok(StoredRow {
        row_identifier: id as u64,
        cells: out,
    })
}

impl StorageSession for MySqlSession {
    fn distribute(&mut self, rows: &[Vec<String>]) -> Result<u64, StorageError> {
        let payload = distribute_payload(rows).to_string();
        let sql = format!("CALL {}(?)", schema::DISTRIBUTE_PROC);
        let result = self.runtime.block_on(
            sqlx::query(&sql)
                .bind(payload)
                .fetch_all(&mut *self.conn),
        );
        let result_rows = result.map_err(|e| StorageError::Distribute(e.to_string()))?;
        let affected = result_rows
            .first()
            .and_then(|r| r.try_get::<i64, _>("total_rows_affected").ok())
            .unwrap_or(0);
        Ok(affected.max(0) as u64)
    }

    fn merge(&mut self) -> Result<Vec<StoredRow>, StorageError> {
        let sql = format!("CALL {}()", schema::MERGE_PROC);
        let rows = self
            .runtime
            .block_on(sqlx::query(&sql).fetch_all(&mut *self.conn))
            .map_err(|e| StorageError::Merge(e.to_string()))?;
        rows.iter().map(stored_row).collect()
    }

    fn fetch_page(&mut self, offset: u64, limit: u64) -> Result<Vec<StoredRow>, StorageError> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY {} LIMIT ? OFFSET ?",
            schema::MERGED_TABLE,
            ROW_IDENTIFIER
        );
        let rows = self
            .runtime
            .block_on(
                sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&mut *self.conn),
            )
            .map_err(query_err)?;
        rows.iter().map(stored_row).collect()
    }

    fn row_count(&mut self) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", schema::MERGED_TABLE);
        let row = self
            .runtime
            .block_on(sqlx::query(&sql).fetch_one(&mut *self.conn))
            .map_err(query_err)?;
        let n: i64 = row.try_get("n").map_err(query_err)?;
        Ok(n.max(0) as u64)
    }

    fn apply_updates(&mut self, updates: &[RowUpdate]) -> Result<u64, StorageError> {
        let conn = &mut self.conn;
        self.runtime.block_on(async move {
            let mut tx = conn
                .begin()
                .await
                .map_err(|e| StorageError::UpdateRolledBack(e.to_string()))?;
            let exists_sql = format!(
                "SELECT COUNT(*) AS n FROM {} WHERE {} = ?",
                schema::MERGED_TABLE,
                ROW_IDENTIFIER
            );
            let mut touched = 0u64;
            for update in updates {
                if update.cells.is_empty() {
                    continue;
                }
                let found: i64 = sqlx::query(&exists_sql)
                    .bind(update.row_identifier)
                    .fetch_one(&mut *tx)
                    .await
                    .and_then(|r| r.try_get("n"))
                    .map_err(|e| StorageError::UpdateRolledBack(e.to_string()))?;
                if found == 0 {
                    // `tx` rolls back on drop.
                    return Err(StorageError::UnknownRow(update.row_identifier));
                }
                let sets: Vec<String> = update
                    .cells
                    .iter()
                    .map(|(col, _)| format!("{} = ?", storage_column(*col)))
                    .collect();
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} = ?",
                    schema::MERGED_TABLE,
                    sets.join(", "),
                    ROW_IDENTIFIER
                );
                let mut query = sqlx::query(&sql);
                for (_, value) in &update.cells {
                    query = query.bind(value.as_str());
                }
                query
                    .bind(update.row_identifier)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StorageError::UpdateRolledBack(e.to_string()))?;
                touched += 1;
            }
            tx.commit()
                .await
                .map_err(|e| StorageError::UpdateRolledBack(e.to_string()))?;
            Ok(touched)
        })
    }

    fn reset(&mut self) -> Result<(), StorageError> {
        let mut tables = vec![schema::MERGED_TABLE.to_string()];
        tables.extend((1..=DEFAULT_PARTITIONS).map(|i| format!("{}{}", schema::PARTITION_PREFIX, i)));
        for table in tables {
            let sql = format!("TRUNCATE TABLE {table}");
            self.runtime
                .block_on(sqlx::query(&sql).execute(&mut *self.conn))
                .map_err(query_err)?;
        }
        Ok(())
    }
}

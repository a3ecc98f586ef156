//! Batch coordinators.
//!
//! - `distribute`: split a dataset, fan write workers out, aggregate rows affected
//! - `merge`: merge once, fan read workers out, reassemble and sort
//! - `update`: re-encrypt and persist only edited cells, in one transaction

use std::sync::Arc;

use crate::config::{CryptoConfig, PipelineConfig};
use crate::constants::kdf_defaults;
use crate::crypto::CellKey;
use crate::exchange::ExchangeDir;
use crate::pool::{CancellationToken, WorkerPool};
use crate::storage::Storage;
use crate::types::PipelineError;

pub mod distribute;
pub mod merge;
pub mod update;

pub use distribute::SaveSummary;
pub use merge::{LoadSummary, Page};
pub use update::{ModifiedCellMap, UpdateSummary};

/// Owns the pool, the storage handle and the key for a sequence of batches.
pub struct Coordinator {
    storage: Arc<dyn Storage>,
    pool: WorkerPool,
    key: Option<Arc<CellKey>>,
    engine_threads: usize,
    config: PipelineConfig,
}

impl Coordinator {
    pub fn new(storage: Arc<dyn Storage>, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let exchange = ExchangeDir::open(&config.exchange_dir)?
            .with_visibility_delays(config.faults.visibility_delays.clone());
        let pool = WorkerPool::new(exchange)
            .with_poll_timeout(config.poll_timeout)
            .with_retry(config.retry);
        log::info!(
            "[POOL] coordinator ready: store={}, exchange={:?}, concurrency={}",
            storage.name(),
            config.exchange_dir,
            config.concurrency
        );
        Ok(Self {
            storage,
            pool,
            key: None,
            engine_threads: kdf_defaults::ENGINE_THREADS,
            config,
        })
    }

    /// Derive the cell key from `crypto`.
    pub fn with_crypto(mut self, crypto: &CryptoConfig) -> Result<Self, PipelineError> {
        self.key = Some(Arc::new(crypto.derive()?));
        self.engine_threads = crypto.engine_threads.max(1);
        Ok(self)
    }

    /// Use an already derived key.
    pub fn with_key(mut self, key: CellKey) -> Self {
        self.key = Some(Arc::new(key));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.pool = self.pool.with_cancellation(token);
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn exchange(&self) -> &ExchangeDir {
        self.pool.exchange()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    fn require_key(&self, what: &str) -> Result<&Arc<CellKey>, PipelineError> {
        self.key
            .as_ref()
            .ok_or_else(|| PipelineError::config(format!("{what} requested but no key is configured")))
    }
}

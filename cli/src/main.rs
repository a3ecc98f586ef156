//! run-batch
//!
//! Usage:
//!   run-batch --rows=data.json --concurrency=4 --encrypt=true
//!
//! Prints one JSON summary on stdout. Exit 0 only when every chunk committed.

mod args;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use cellshard_core::parallelism::ParallelismProfile;
use cellshard_core::prelude::*;

use crate::args::{Args, StoreOpt};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportSummary {
    path: PathBuf,
    rows: usize,
    success: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSummary {
    success: bool,
    rows_affected: u64,
    input_row_count: usize,
    process_count: usize,
    elapsed_sec: f64,
    encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    encrypt_method: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<ChunkFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    export: Option<ExportSummary>,
}

#[derive(Serialize)]
struct FatalSummary {
    success: bool,
    error: String,
}

fn open_store(opt: StoreOpt, concurrency: usize) -> Result<Arc<dyn Storage>> {
    match opt {
        StoreOpt::Memory => Ok(Arc::new(ShardedMemoryStore::default())),
        #[cfg(feature = "mysql")]
        StoreOpt::Mysql => {
            let db = DatabaseConfig::from_env()?;
            let store = cellshard_core::storage::MySqlStore::connect(db, concurrency as u32)?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mysql"))]
        StoreOpt::Mysql => {
            let _ = concurrency;
            anyhow::bail!("this build has no MySQL support; rebuild with --features mysql")
        }
    }
}

fn run(args: Args) -> Result<BatchSummary> {
    let bytes = std::fs::read(&args.rows).with_context(|| format!("reading {:?}", args.rows))?;

    let mut config = PipelineConfig::from_env()?;
    config.shape_policy = args.shape.into();
    let profile = args.concurrency.is_none().then(|| {
        // payload, parsed rows and sealed output per in-flight chunk
        let chunk_bytes = (bytes.len() as u64 / config.concurrency.max(1) as u64) * 3;
        ParallelismProfile::dynamic(chunk_bytes, 0.5, config.concurrency)
    });
    config.concurrency = match (args.concurrency, profile) {
        (Some(n), _) => n,
        (None, Some(p)) => p.concurrency,
        (None, None) => config.concurrency,
    };
    if let Some(dir) = &args.exchange_dir {
        config.exchange_dir = dir.clone();
    }
    config.validate()?;

    let dataset = Dataset::from_json_slice(&bytes, config.shape_policy)?;
    log::info!(
        "[DATASET] {} rows, {} columns from {:?}",
        dataset.len(),
        dataset.schema.width(),
        args.rows
    );

    let concurrency = config.concurrency;
    let store = open_store(args.store, concurrency)?;
    let mut coordinator = Coordinator::new(store, config)?;
    if args.encrypt {
        let mut crypto = CryptoConfig::from_env().context("encryption needs a key")?;
        if let Some(p) = profile {
            if std::env::var_os("CELLSHARD_ENGINE_THREADS").is_none() {
                crypto = crypto.with_engine_threads(p.engine_threads);
            }
        }
        coordinator = coordinator.with_crypto(&crypto)?;
    }

    let saved = coordinator.save(&dataset, concurrency, args.encrypt)?;

    let export = match &args.export {
        Some(path) if saved.success => {
            let mut loaded = coordinator.load_all(args.encrypt)?;
            let rows = loaded.export(path, Some(&dataset.schema))?;
            Some(ExportSummary {
                path: path.clone(),
                rows,
                success: loaded.success,
            })
        }
        Some(path) => {
            log::warn!("[EXPORT] skipped {:?}: save did not fully succeed", path);
            None
        }
        None => None,
    };

    let success = saved.success && export.as_ref().map_or(true, |e| e.success);
    Ok(BatchSummary {
        success,
        rows_affected: saved.rows_affected,
        input_row_count: saved.input_row_count,
        process_count: saved.process_count,
        elapsed_sec: saved.elapsed.as_secs_f64(),
        encrypted: saved.encrypted,
        encrypt_method: saved.encrypt_method,
        errors: saved.failures,
        export,
    })
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("could not serialize summary: {e}"),
    }
}

fn main() -> ExitCode {
    logging::init_tracing_from_env();
    let args = Args::parse();

    match run(args) {
        Ok(summary) => {
            let ok = summary.success;
            print_json(&summary);
            if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            log::error!("run-batch failed: {:#}", e);
            print_json(&FatalSummary {
                success: false,
                error: format!("{:#}", e),
            });
            ExitCode::from(1)
        }
    }
}

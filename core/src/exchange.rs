//! exchange.rs
//! Task exchange directory and RAII artifact guards.
//!
//! Summary: every chunk gets a uniquely named input artifact written just
//! before dispatch, plus a reserved side artifact for bulk output. Each
//! artifact is owned by exactly one [`ExchangeArtifact`] guard, which deletes
//! the file when released or dropped, whatever happened to the task.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::RetryPolicy;
use crate::types::PipelineError;

static DIR_SEQ: AtomicU64 = AtomicU64::new(0);

/// Shared exchange namespace. Clones share the batch counter.
#[derive(Debug, Clone)]
pub struct ExchangeDir {
    root: PathBuf,
    prefix: String,
    batch_seq: Arc<AtomicU64>,
    visibility_delays: BTreeMap<usize, Duration>,
}

impl ExchangeDir {
    /// Open (creating if needed) an exchange directory.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let prefix = format!(
            "cs{}-{}-{}",
            std::process::id(),
            chrono::Utc::now().format("%Y%m%d%H%M%S%3f"),
            DIR_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        Ok(Self {
            root,
            prefix,
            batch_seq: Arc::new(AtomicU64::new(0)),
            visibility_delays: BTreeMap::new(),
        })
    }

    /// Hold back the input artifact of `chunk_index` for `delay` after it is written.
    pub fn with_visibility_delays(mut self, delays: BTreeMap<usize, Duration>) -> Self {
        self.visibility_delays = delays;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new batch namespace; artifact names never collide across batches.
    pub fn begin_batch(&self) -> BatchExchange<'_> {
        let seq = self.batch_seq.fetch_add(1, Ordering::Relaxed);
        BatchExchange { dir: self, seq }
    }

    /// Files in the directory that belong to this exchange namespace.
    pub fn leftovers(&self) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&self.prefix) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Artifact naming for one batch.
#[derive(Debug)]
pub struct BatchExchange<'a> {
    dir: &'a ExchangeDir,
    seq: u64,
}

impl BatchExchange<'_> {
    fn name(&self, chunk_index: usize, suffix: &str) -> PathBuf {
        self.dir.root.join(format!(
            "{}-b{}-chunk{}.{}",
            self.dir.prefix, self.seq, chunk_index, suffix
        ))
    }

    /// Write the input artifact of a chunk. Visible immediately unless a delay is configured.
    pub fn publish_input(&self, chunk_index: usize, bytes: &[u8]) -> io::Result<ExchangeArtifact> {
        let path = self.name(chunk_index, "in.json");
        match self.dir.visibility_delays.get(&chunk_index) {
            None => {
                fs::write(&path, bytes)?;
                Ok(ExchangeArtifact::owned(path))
            }
            Some(&delay) => {
                let staging = self.name(chunk_index, "in.staging");
                fs::write(&staging, bytes)?;
                log::debug!("[EXCHANGE] chunk {} input held back {:?}", chunk_index, delay);
                let (from, to) = (staging.clone(), path.clone());
                let publisher = thread::Builder::new()
                    .name(format!("exchange-publish-{chunk_index}"))
                    .spawn(move || {
                        thread::sleep(delay);
                        if let Err(e) = fs::rename(&from, &to) {
                            log::warn!("[EXCHANGE] delayed publish of {:?} failed: {}", to, e);
                        }
                    })?;
                Ok(ExchangeArtifact {
                    path,
                    staging: Some(staging),
                    publisher: Some(publisher),
                    released: false,
                })
            }
        }
    }

    /// Reserve the side artifact a worker writes its bulk output to.
    pub fn reserve_output(&self, chunk_index: usize) -> ExchangeArtifact {
        ExchangeArtifact::owned(self.name(chunk_index, "out.json"))
    }
}

/// Owner of one exchange file. Deleted exactly once: on `release` or on drop.
#[derive(Debug)]
pub struct ExchangeArtifact {
    path: PathBuf,
    staging: Option<PathBuf>,
    publisher: Option<JoinHandle<()>>,
    released: bool,
}

impl ExchangeArtifact {
    fn owned(path: PathBuf) -> Self {
        Self {
            path,
            staging: None,
            publisher: None,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Delete now and report the outcome.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        self.cleanup()
    }

    fn cleanup(&mut self) -> io::Result<()> {
        if let Some(publisher) = self.publisher.take() {
            let _ = publisher.join();
        }
        let mut first_err = None;
        for path in self.staging.iter().chain(std::iter::once(&self.path)) {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ExchangeArtifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.cleanup() {
            log::warn!("[EXCHANGE] failed to remove {:?}: {}", self.path, e);
        }
    }
}

/// Read an artifact, retrying while it is not yet visible.
pub fn read_with_retry(path: &Path, policy: RetryPolicy) -> Result<Vec<u8>, PipelineError> {
    let attempts = policy.attempts.max(1);
    let mut last_err = String::new();
    for attempt in 1..=attempts {
        match fs::read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                log::debug!("[EXCHANGE] read {:?} attempt {}/{} failed: {}", path, attempt, attempts, e);
                last_err = e.to_string();
            }
        }
        if attempt < attempts {
            thread::sleep(policy.interval);
        }
    }
    Err(PipelineError::ArtifactUnavailable {
        path: path.to_path_buf(),
        attempts,
        reason: last_err,
    })
}

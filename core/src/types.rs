use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::storage::StorageError;
use crate::wire::WireError;

/// Unified pipeline error covering exchange I/O, parsing, crypto, storage and batch outcomes.
/// - `From<T>` impls enable `?` from every layer.
/// - Each variant maps onto a stable [`ErrorKind`] carried in worker reports.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Plain I/O error (exchange directory, export files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Exchange artifact missing or unreadable after the bounded retry.
    #[error("exchange artifact {path:?} unreadable after {attempts} attempts: {reason}")]
    ArtifactUnavailable {
        path: PathBuf,
        attempts: u32,
        reason: String,
    },

    /// Malformed JSON or row shape, in either direction.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// A worker could not be started. Fatal to the batch.
    #[error("failed to spawn worker for chunk {chunk_index}: {source}")]
    Spawn {
        chunk_index: usize,
        #[source]
        source: io::Error,
    },

    /// Some chunks committed, some did not.
    #[error("{failed} of {total} chunks failed ({rows_affected} rows landed)")]
    PartialBatchFailure {
        failed: usize,
        total: usize,
        rows_affected: u64,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Partial update called with an empty change set.
    #[error("no changes")]
    NoChanges,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("batch cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn parse(msg: impl Into<String>) -> Self {
        PipelineError::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Config(msg.into())
    }

    /// Stable classification used on the wire between workers and the pool.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Io(_) | PipelineError::ArtifactUnavailable { .. } => ErrorKind::IoError,
            PipelineError::Parse(_) => ErrorKind::ParseError,
            PipelineError::EncryptionFailed(_) => ErrorKind::EncryptionFailed,
            PipelineError::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            PipelineError::Spawn { .. } => ErrorKind::SpawnError,
            PipelineError::PartialBatchFailure { .. } => ErrorKind::PartialBatchFailure,
            PipelineError::Storage(_) => ErrorKind::StorageError,
            PipelineError::NoChanges => ErrorKind::NoChanges,
            PipelineError::Config(_) => ErrorKind::ConfigError,
            PipelineError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Parse(e.to_string())
    }
}

impl From<WireError> for PipelineError {
    fn from(e: WireError) -> Self {
        PipelineError::DecryptionFailed(e.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => PipelineError::Io(io),
            other => PipelineError::Parse(format!("csv: {:?}", other)),
        }
    }
}

/// Crypto errors carry no direction, callers pick one with these helpers.
pub trait CryptoContext<T> {
    fn encrypting(self) -> Result<T, PipelineError>;
    fn decrypting(self) -> Result<T, PipelineError>;
}

impl<T> CryptoContext<T> for Result<T, CryptoError> {
    fn encrypting(self) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::EncryptionFailed(e.to_string()))
    }

    fn decrypting(self) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::DecryptionFailed(e.to_string()))
    }
}

/// Error taxonomy as serialized in worker reports and batch summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    IoError,
    ParseError,
    EncryptionFailed,
    DecryptionFailed,
    SpawnError,
    PartialBatchFailure,
    StorageError,
    NoChanges,
    ConfigError,
    Cancelled,
    /// Worker thread panicked before reporting.
    Panic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::IoError => "IOError",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::EncryptionFailed => "EncryptionFailed",
            ErrorKind::DecryptionFailed => "DecryptionFailed",
            ErrorKind::SpawnError => "SpawnError",
            ErrorKind::PartialBatchFailure => "PartialBatchFailure",
            ErrorKind::StorageError => "StorageError",
            ErrorKind::NoChanges => "NoChanges",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Panic => "Panic",
        };
        f.write_str(name)
    }
}

/// One chunk's failure as surfaced to batch callers, enough to retry just that chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub kind: ErrorKind,
    pub message: String,
}

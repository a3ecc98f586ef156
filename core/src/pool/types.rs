use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::RetryPolicy;
use crate::constants::RAW_PAYLOAD_LIMIT;
use crate::exchange::ExchangeArtifact;
use crate::telemetry::TelemetryCounters;
use crate::types::{ChunkFailure, ErrorKind, PipelineError};

/// Worker task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Spawned,
    Running,
    Draining,
    Completed,
    Failed,
}

/// Everything a worker needs to find its input and place its output.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub chunk_index: usize,
    /// Input artifact (JSON chunk payload).
    pub input: PathBuf,
    /// Reserved side artifact for bulk output.
    pub output: PathBuf,
    pub extra_arg: String,
    pub retry: RetryPolicy,
}

/// Primary-channel record. Common status fields plus a path-specific body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReport {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Raw primary payload, kept only when it could not be parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl WorkerReport {
    pub fn success<T: Serialize>(body: &T) -> Result<Self, PipelineError> {
        let body = match serde_json::to_value(body)? {
            Value::Object(map) => map,
            _ => return Err(PipelineError::parse("worker report body must be an object")),
        };
        Ok(Self {
            success: true,
            body,
            ..Self::default()
        })
    }

    pub fn failure(err: &PipelineError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            ..Self::default()
        }
    }

    /// Failure synthesized by the manager when the primary payload is unusable.
    pub fn unparseable(raw: &[u8], reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
            error_kind: Some(ErrorKind::ParseError),
            raw: Some(truncate_raw(raw)),
            ..Self::default()
        }
    }

    /// Decode the path-specific body into its typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PipelineError> {
        Ok(serde_json::from_value(Value::Object(self.body.clone()))?)
    }
}

fn truncate_raw(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut out: String = text.chars().take(RAW_PAYLOAD_LIMIT).collect();
    if text.chars().count() > RAW_PAYLOAD_LIMIT {
        out.push_str("...");
    }
    out
}

/// Outcome of one worker task, recorded under its chunk index.
#[derive(Debug)]
pub struct TaskResult {
    pub chunk_index: usize,
    pub state: TaskState,
    /// 0 on a clean return, 101 after a panic.
    pub exit_code: i32,
    pub report: WorkerReport,
    /// Secondary channel text.
    pub diagnostics: String,
    /// Reserved side artifact; deleted when this result (or the guard) is dropped.
    pub side_output: ExchangeArtifact,
    pub elapsed: Duration,
}

impl TaskResult {
    pub fn succeeded(&self) -> bool {
        self.state == TaskState::Completed
    }

    pub fn failure(&self) -> Option<ChunkFailure> {
        if self.succeeded() {
            return None;
        }
        Some(ChunkFailure {
            chunk_index: self.chunk_index,
            kind: self.report.error_kind.unwrap_or(ErrorKind::ParseError),
            message: self
                .report
                .error
                .clone()
                .unwrap_or_else(|| format!("worker exited with code {}", self.exit_code)),
        })
    }
}

/// Batch-level outcome of the pool.
#[derive(Debug)]
pub struct BatchRun {
    pub results: BTreeMap<usize, TaskResult>,
    pub stats: BatchStats,
}

/// Everything about a batch except the per-chunk results.
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub elapsed: Duration,
    /// Highest number of simultaneously active tasks observed.
    pub max_active: usize,
    /// Chunk indices in the order their tasks finished.
    pub completion_order: Vec<usize>,
    /// Chunks never dispatched because the batch was cancelled.
    pub skipped: Vec<usize>,
    pub cancelled: bool,
    pub counters: TelemetryCounters,
}

/// Cooperative cancellation observed by the manager between dispatch rounds.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_payload_is_truncated() {
        let raw = "x".repeat(1_000);
        let report = WorkerReport::unparseable(raw.as_bytes(), "bad");
        let kept = report.raw.unwrap();
        assert_eq!(kept.len(), RAW_PAYLOAD_LIMIT + 3);
        assert_eq!(report.error_kind, Some(ErrorKind::ParseError));
    }

    #[test]
    fn report_body_is_flattened() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body {
            rows_affected: u64,
        }
        let report = WorkerReport::success(&Body { rows_affected: 9 }).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "rowsAffected": 9}));
    }
}

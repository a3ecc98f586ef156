// ## 📂 File: `src/pool/manager.rs`
// ## Bounded worker pool with multiplexed output and independent liveness polling

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Select, TryRecvError};
use serde::Serialize;

use crate::config::RetryPolicy;
use crate::constants::{LIVENESS_TICK, PANIC_EXIT_CODE, POLL_TIMEOUT};
use crate::exchange::{BatchExchange, ExchangeArtifact, ExchangeDir};
use crate::pool::entry::WorkerEntry;
use crate::pool::output::{task_channels, TaskStreams};
use crate::pool::types::{
    BatchRun, BatchStats, CancellationToken, TaskResult, TaskState, WorkerContext, WorkerReport,
};
use crate::types::PipelineError;

/// One live task as seen by the manager loop. Never touched by the worker.
struct ActiveTask {
    chunk_index: usize,
    state: TaskState,
    handle: Option<JoinHandle<()>>,
    stdout_rx: Option<Receiver<Vec<u8>>>,
    stderr_rx: Option<Receiver<Vec<u8>>>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    input: Option<ExchangeArtifact>,
    output: ExchangeArtifact,
    started: Instant,
}

/// Pull whatever is buffered without blocking. Returns None once the stream hit EOF.
fn pump(rx: Option<Receiver<Vec<u8>>>, buf: &mut Vec<u8>) -> Option<Receiver<Vec<u8>>> {
    let rx = rx?;
    loop {
        match rx.try_recv() {
            Ok(bytes) => buf.extend_from_slice(&bytes),
            Err(TryRecvError::Empty) => return Some(rx),
            Err(TryRecvError::Disconnected) => return None,
        }
    }
}

impl ActiveTask {
    fn pump(&mut self) {
        self.stdout_rx = pump(self.stdout_rx.take(), &mut self.stdout);
        self.stderr_rx = pump(self.stderr_rx.take(), &mut self.stderr);
        if self.state == TaskState::Spawned && (!self.stdout.is_empty() || !self.stderr.is_empty()) {
            self.state = TaskState::Running;
        }
    }

    /// Liveness comes from the thread itself, never from stream EOF.
    fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Drain fully, close streams, collect exit status, then classify.
    fn finish(mut self) -> TaskResult {
        self.state = TaskState::Draining;

        // The worker has returned, so every sender is gone and these iterators end.
        if let Some(rx) = self.stdout_rx.take() {
            for bytes in rx.iter() {
                self.stdout.extend_from_slice(&bytes);
            }
        }
        if let Some(rx) = self.stderr_rx.take() {
            for bytes in rx.iter() {
                self.stderr.extend_from_slice(&bytes);
            }
        }

        let exit_code = match self.handle.take().map(|h| h.join()) {
            Some(Ok(())) | None => 0,
            Some(Err(panic)) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                self.stderr.extend_from_slice(format!("worker panicked: {msg}\n").as_bytes());
                PANIC_EXIT_CODE
            }
        };

        // Input is no longer needed by anyone.
        drop(self.input.take());

        let report = parse_primary(&self.stdout, exit_code);
        self.state = if exit_code == 0 && report.success {
            TaskState::Completed
        } else {
            TaskState::Failed
        };

        TaskResult {
            chunk_index: self.chunk_index,
            state: self.state,
            exit_code,
            report,
            diagnostics: String::from_utf8_lossy(&self.stderr).into_owned(),
            side_output: self.output,
            elapsed: self.started.elapsed(),
        }
    }
}

fn parse_primary(stdout: &[u8], exit_code: i32) -> WorkerReport {
    let trimmed = stdout.trim_ascii();
    if trimmed.is_empty() {
        let mut report = WorkerReport::unparseable(trimmed, "empty primary payload");
        if exit_code == PANIC_EXIT_CODE {
            report.error_kind = Some(crate::types::ErrorKind::Panic);
            report.error = Some("worker panicked before reporting".into());
        }
        return report;
    }
    // Last non-empty line wins; a well-behaved worker writes exactly one.
    let line = trimmed
        .split(|&b| b == b'\n')
        .filter(|l| !l.trim_ascii().is_empty())
        .last()
        .unwrap_or(trimmed);
    match serde_json::from_slice::<WorkerReport>(line) {
        Ok(mut report) => {
            if exit_code != 0 && report.success {
                report.success = false;
                report.error_kind = Some(crate::types::ErrorKind::Panic);
                report.error = Some(format!("worker exited with code {exit_code} after reporting"));
            }
            report
        }
        Err(e) => WorkerReport::unparseable(trimmed, format!("unparseable primary payload: {e}")),
    }
}

/// Bounded worker pool over OS threads.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    exchange: ExchangeDir,
    poll_timeout: Duration,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(exchange: ExchangeDir) -> Self {
        Self {
            exchange,
            poll_timeout: POLL_TIMEOUT,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn exchange(&self) -> &ExchangeDir {
        &self.exchange
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run every chunk and collect results keyed by chunk index.
    pub fn run_batch<C: Serialize>(
        &self,
        chunks: Vec<C>,
        entry: Arc<dyn WorkerEntry>,
        max_concurrency: usize,
        extra_arg: &str,
    ) -> Result<BatchRun, PipelineError> {
        let mut results = BTreeMap::new();
        let stats = self.run_batch_with(chunks, entry, max_concurrency, extra_arg, |result| {
            results.insert(result.chunk_index, result);
        })?;
        Ok(BatchRun { results, stats })
    }

    /// Run every chunk, handing each result to `on_done` as soon as its task finishes.
    pub fn run_batch_with<C, F>(
        &self,
        chunks: Vec<C>,
        entry: Arc<dyn WorkerEntry>,
        max_concurrency: usize,
        extra_arg: &str,
        mut on_done: F,
    ) -> Result<BatchStats, PipelineError>
    where
        C: Serialize,
        F: FnMut(TaskResult),
    {
        if max_concurrency == 0 {
            return Err(PipelineError::config("max concurrency must be >= 1"));
        }
        let started = Instant::now();
        let batch = self.exchange.begin_batch();
        let total = chunks.len();
        let mut stats = BatchStats::default();
        let mut pending = chunks.into_iter().enumerate();
        let mut active: Vec<ActiveTask> = Vec::with_capacity(max_concurrency);

        log::info!(
            "[POOL] batch start: {} chunks, max_concurrency={}, extra_arg='{}'",
            total,
            max_concurrency,
            extra_arg
        );

        loop {
            // ---- Dispatch round ----
            if !stats.cancelled && self.cancel.is_cancelled() {
                stats.cancelled = true;
                stats.skipped = pending.by_ref().map(|(i, _)| i).collect();
                log::warn!(
                    "[POOL] cancelled: {} chunks not dispatched, draining {} in flight",
                    stats.skipped.len(),
                    active.len()
                );
            }
            while !stats.cancelled && active.len() < max_concurrency {
                let Some((index, chunk)) = pending.next() else { break };
                match self.dispatch(&batch, index, &chunk, &entry, extra_arg, &mut stats) {
                    Ok(task) => active.push(task),
                    Err(e) => {
                        log::error!("[POOL] chunk {} dispatch failed: {}; aborting batch", index, e);
                        abort(active);
                        return Err(e);
                    }
                }
                stats.max_active = stats.max_active.max(active.len());
            }

            if active.is_empty() {
                break;
            }

            // ---- Multiplexed wait ----
            wait_ready(&active, self.poll_timeout);

            // ---- Drain + liveness ----
            let mut i = 0;
            while i < active.len() {
                active[i].pump();
                if active[i].is_finished() {
                    let result = active.swap_remove(i).finish();
                    let ok = result.succeeded();
                    stats.counters.add_outcome(ok);
                    stats.completion_order.push(result.chunk_index);
                    if ok {
                        log::debug!("[POOL] chunk {} completed in {:?}", result.chunk_index, result.elapsed);
                    } else {
                        log::warn!(
                            "[POOL] chunk {} failed (exit {}): {}",
                            result.chunk_index,
                            result.exit_code,
                            result.report.error.as_deref().unwrap_or("no message")
                        );
                    }
                    on_done(result);
                } else {
                    i += 1;
                }
            }
        }

        stats.elapsed = started.elapsed();
        log::info!(
            "[POOL] batch done: {} completed, {} failed, {} skipped, max_active={}, elapsed={:?}",
            stats.counters.chunks_completed,
            stats.counters.chunks_failed,
            stats.skipped.len(),
            stats.max_active,
            stats.elapsed
        );
        Ok(stats)
    }

    fn dispatch<C: Serialize>(
        &self,
        batch: &BatchExchange<'_>,
        index: usize,
        chunk: &C,
        entry: &Arc<dyn WorkerEntry>,
        extra_arg: &str,
        stats: &mut BatchStats,
    ) -> Result<ActiveTask, PipelineError> {
        let payload = serde_json::to_vec(chunk)?;
        let input = batch.publish_input(index, &payload)?;
        let output = batch.reserve_output(index);
        stats.counters.add_dispatch(payload.len());

        let ctx = WorkerContext {
            chunk_index: index,
            input: input.path().to_path_buf(),
            output: output.path().to_path_buf(),
            extra_arg: extra_arg.to_string(),
            retry: self.retry,
        };
        let (mut out, streams) = task_channels();
        let TaskStreams { stdout, stderr } = streams;
        let worker = Arc::clone(entry);

        let handle = thread::Builder::new()
            .name(format!("chunk-worker-{index}"))
            .spawn(move || worker.run(&ctx, &mut out))
            .map_err(|source| PipelineError::Spawn {
                chunk_index: index,
                source,
            })?;

        log::debug!("[POOL] chunk {} dispatched ({} bytes)", index, payload.len());
        Ok(ActiveTask {
            chunk_index: index,
            state: TaskState::Spawned,
            handle: Some(handle),
            stdout_rx: Some(stdout),
            stderr_rx: Some(stderr),
            stdout: Vec::new(),
            stderr: Vec::new(),
            input: Some(input),
            output,
            started: Instant::now(),
        })
    }
}

/// Block until any open stream has data or EOF, or until `timeout`.
fn wait_ready(active: &[ActiveTask], timeout: Duration) {
    let mut sel = Select::new();
    let mut registered = 0usize;
    for task in active {
        if let Some(rx) = &task.stdout_rx {
            sel.recv(rx);
            registered += 1;
        }
        if let Some(rx) = &task.stderr_rx {
            sel.recv(rx);
            registered += 1;
        }
    }
    if registered == 0 {
        // Streams closed but threads not yet joinable; poll liveness shortly.
        thread::sleep(LIVENESS_TICK.min(timeout));
        return;
    }
    let _ = sel.ready_timeout(timeout);
}

/// Join everything still in flight; guards release their artifacts as tasks drop.
fn abort(active: Vec<ActiveTask>) {
    for task in active {
        let index = task.chunk_index;
        let result = task.finish();
        log::warn!("[POOL] chunk {} drained during abort (state {:?})", index, result.state);
    }
}

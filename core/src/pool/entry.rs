//! pool/entry.rs
//! Worker entry points.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::pool::output::TaskOutput;
use crate::pool::types::WorkerContext;

/// The code a pool slot runs for one chunk.
///
/// Implementations must report through `out` rather than panic; a panic is
/// still contained to the task and recorded as a failed chunk.
pub trait WorkerEntry: Send + Sync {
    fn run(&self, ctx: &WorkerContext, out: &mut TaskOutput);
}

impl<F> WorkerEntry for F
where
    F: Fn(&WorkerContext, &mut TaskOutput) + Send + Sync,
{
    fn run(&self, ctx: &WorkerContext, out: &mut TaskOutput) {
        self(ctx, out)
    }
}

/// Wraps an entry point and sleeps before selected chunks start.
pub struct DelayedEntry {
    inner: Arc<dyn WorkerEntry>,
    delays: BTreeMap<usize, Duration>,
}

impl DelayedEntry {
    pub fn wrap(inner: Arc<dyn WorkerEntry>, delays: BTreeMap<usize, Duration>) -> Arc<dyn WorkerEntry> {
        if delays.is_empty() {
            return inner;
        }
        Arc::new(Self { inner, delays })
    }
}

impl WorkerEntry for DelayedEntry {
    fn run(&self, ctx: &WorkerContext, out: &mut TaskOutput) {
        if let Some(delay) = self.delays.get(&ctx.chunk_index) {
            out.diag(format!("delayed start by {:?}", delay));
            thread::sleep(*delay);
        }
        self.inner.run(ctx, out)
    }
}

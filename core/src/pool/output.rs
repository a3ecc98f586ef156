//! pool/output.rs
//! Per-task output streams.
//!
//! A worker writes its status record to `stdout` and diagnostics to `stderr`.
//! Both are byte streams over crossbeam channels; the manager multiplexes the
//! receiving ends. Dropping the writers (the worker returning) is the EOF.

use std::io::{self, Write};

use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::Serialize;

use crate::pool::types::WorkerReport;

#[derive(Debug)]
pub struct ChannelWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "task output closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writing halves handed to a worker.
#[derive(Debug)]
pub struct TaskOutput {
    pub stdout: ChannelWriter,
    pub stderr: ChannelWriter,
}

/// Reading halves kept by the manager.
#[derive(Debug)]
pub struct TaskStreams {
    pub stdout: Receiver<Vec<u8>>,
    pub stderr: Receiver<Vec<u8>>,
}

pub fn task_channels() -> (TaskOutput, TaskStreams) {
    let (out_tx, out_rx) = unbounded();
    let (err_tx, err_rx) = unbounded();
    (
        TaskOutput {
            stdout: ChannelWriter { tx: out_tx },
            stderr: ChannelWriter { tx: err_tx },
        },
        TaskStreams {
            stdout: out_rx,
            stderr: err_rx,
        },
    )
}

impl TaskOutput {
    /// Write the primary status record.
    pub fn emit(&mut self, report: &WorkerReport) {
        if let Err(e) = write_json(&mut self.stdout, report) {
            log::warn!("[POOL] could not emit worker report: {}", e);
        }
    }

    /// One diagnostic line on the secondary channel.
    pub fn diag(&mut self, line: impl AsRef<str>) {
        let _ = writeln!(self.stderr, "{}", line.as_ref());
    }
}

fn write_json<W: Write, T: Serialize>(w: &mut W, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec(value).map_err(io::Error::other)?;
    w.write_all(&bytes)?;
    w.write_all(b"\n")
}

// src/exec/process/child.rs

//! Worker half of the wire protocol.
//!
//! A wire worker binary is a one-liner around [`run_child`]: it receives
//! the same `FnOnce(&mut Updater)` contract as in-process tasks, while
//! progress frames, cancellation and the final acknowledgement travel
//! over the child's stdio. [`run_child_io`] is the same logic with the
//! two streams injectable, so tests can drive a worker without spawning a
//! process.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::exec::process::wire::{Frame, HostLine, WIRE_VERSION};
use crate::exec::run_task;
use crate::progress::{ProgressSink, ProgressSnapshot, Updater, UpdaterOptions};

/// Exit code of a worker whose task body returned `Ok`.
pub const EXIT_DONE: i32 = 0;
/// Exit code of a worker whose task body failed.
pub const EXIT_ERROR: i32 = 1;
/// Exit code of a worker that honoured a cancellation request.
pub const EXIT_CANCELLED: i32 = 130;

const ACK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Control bits fed by the stdin reader thread.
#[derive(Debug, Default)]
struct ChildControl {
    cancel: AtomicBool,
    acked: AtomicBool,
}

impl ChildControl {
    /// Bounded poll for the host's ack of the terminal state frame.
    fn wait_acked(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.acked.load(Ordering::Acquire) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(ACK_POLL_INTERVAL);
        }
    }
}

fn spawn_control_reader<R>(input: R, control: Arc<ChildControl>)
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("taskgauge-child-stdin".into())
        .spawn(move || {
            let reader = BufReader::new(input);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                match HostLine::parse(&line) {
                    Some(HostLine::Cancel) => {
                        debug!("host requested cancellation");
                        control.cancel.store(true, Ordering::Release);
                    }
                    Some(HostLine::Ack) => control.acked.store(true, Ordering::Release),
                    None => debug!(line = %line, "ignoring unknown host line"),
                }
            }
            // Host hung up; there is nobody left to report to, so stop at
            // the next refresh.
            control.cancel.store(true, Ordering::Release);
        })
        // The reader thread is plumbing; without it the worker still runs,
        // it just cannot be cancelled or acked.
        .map_err(|err| warn!(error = %err, "cannot spawn stdin reader; cancellation disabled"))
        .ok();
}

/// [`ProgressSink`] writing `state` frames to the host.
pub(crate) struct WireSink<W> {
    writer: Arc<Mutex<W>>,
    control: Arc<ChildControl>,
}

impl<W: Write + Send> ProgressSink for WireSink<W> {
    fn publish(&mut self, snap: &ProgressSnapshot) -> io::Result<()> {
        write_frame(&self.writer, &Frame::State(*snap))
    }

    fn cancel_requested(&self) -> bool {
        self.control.cancel.load(Ordering::Acquire)
    }

    fn wait_drained(&mut self, limit: Duration) -> bool {
        self.control.wait_acked(limit)
    }
}

fn write_frame<W: Write>(writer: &Mutex<W>, frame: &Frame) -> io::Result<()> {
    let mut guard = writer.lock().unwrap_or_else(|e| e.into_inner());
    writeln!(guard, "{frame}")?;
    guard.flush()
}

/// Run one task body as a wire worker over real stdio. Returns the
/// process exit code; a worker binary's `main` is
/// `std::process::exit(run_child(body))`.
pub fn run_child<T, F>(opts: UpdaterOptions, task: F) -> i32
where
    T: Serialize,
    F: FnOnce(&mut Updater) -> anyhow::Result<T>,
{
    run_child_io(io::stdin(), io::stdout(), opts, task)
}

/// [`run_child`] with the stdio streams injectable.
///
/// `input` carries host control lines (`cancel`, `ack`); `output` receives
/// frames. The sequence written is `hello`, the body's `state` frames (the
/// last one terminal), then exactly one `result`/`error`/`cancelled`
/// frame. Between the terminal state frame and the terminal frame the
/// worker blocks, bounded, until the host has acked; that wait is what
/// guarantees the final state landed before this worker's pool slot is
/// reused.
pub fn run_child_io<R, W, T, F>(input: R, output: W, opts: UpdaterOptions, task: F) -> i32
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
    T: Serialize,
    F: FnOnce(&mut Updater) -> anyhow::Result<T>,
{
    let control = Arc::new(ChildControl::default());
    spawn_control_reader(input, Arc::clone(&control));

    let writer = Arc::new(Mutex::new(output));
    if let Err(err) = write_frame(&writer, &Frame::Hello { version: WIRE_VERSION }) {
        warn!(error = %err, "cannot greet host");
        return EXIT_ERROR;
    }

    let sink = WireSink {
        writer: Arc::clone(&writer),
        control,
    };
    let outcome = run_task(Box::new(sink), opts, task);

    let (frame, code) = match &outcome {
        Ok(value) => match serde_json::to_string(value) {
            Ok(json) => (Frame::Result(json), EXIT_DONE),
            Err(err) => (
                Frame::Error(format!("cannot encode task result: {err}")),
                EXIT_ERROR,
            ),
        },
        Err(err) if err.is_cancelled() => (Frame::Cancelled, EXIT_CANCELLED),
        Err(err) => (Frame::Error(format!("{err:#}")), EXIT_ERROR),
    };
    if let Err(err) = write_frame(&writer, &frame) {
        warn!(error = %err, "cannot deliver terminal frame to host");
    }
    code
}

// src/exec/mod.rs

//! Execution backends.
//!
//! Three executors share one submission contract: allocate a fresh
//! progress cell, wrap the task body so it receives an
//! [`Updater`](crate::progress::Updater), and hand back a
//! [`TaskHandle`](crate::handle::TaskHandle) bound to the same cell.
//! They differ only in where the body runs:
//!
//! - [`thread_pool`] runs bodies on a fixed set of pool threads.
//! - [`process`] runs commands in worker processes, with progress crossing
//!   the boundary over a line framing on stdio.
//! - [`sync`] runs the body inline on the observing thread.

pub mod process;
pub mod sync;
pub mod thread_pool;

pub(crate) mod interrupt;

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::errors::{CancelRequested, Result, TaskgaugeError};
use crate::progress::{ProgressCell, ProgressSink, TaskState, Updater, UpdaterOptions};

pub use process::{CommandTask, ProcessPoolExecutor, ProgressPattern};
pub use sync::SyncExecutor;
pub use thread_pool::ThreadPoolExecutor;

/// Run one task body inside a worker context.
///
/// Owns the updater lifecycle around the body: the `running` transition
/// up front, panic containment, and the terminal flush on every exit
/// path. The caller decides what to do with the outcome (store it in a
/// completion slot, serialize it over a pipe).
pub(crate) fn run_task<T, F>(sink: Box<dyn ProgressSink>, opts: UpdaterOptions, task: F) -> Result<T>
where
    F: FnOnce(&mut Updater) -> anyhow::Result<T>,
{
    let mut updater = Updater::new(sink, opts);
    if updater.cancel_requested() {
        // Cancelled while queued; never start the body.
        debug!("task cancelled before start");
        updater.finish(TaskState::Cancelled);
        return Err(TaskgaugeError::Cancelled);
    }
    if let Err(CancelRequested) = updater.begin() {
        updater.finish(TaskState::Cancelled);
        return Err(TaskgaugeError::Cancelled);
    }
    let outcome = match catch_unwind(AssertUnwindSafe(|| task(&mut updater))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskgaugeError::from_task_error(err)),
        Err(panic) => Err(TaskgaugeError::Failed(anyhow::anyhow!(
            "task panicked: {}",
            panic_message(panic.as_ref())
        ))),
    };
    // A cancellation the body never observed is claimed here: an Ok value
    // from a cancelled task resolves as cancelled, not done.
    let outcome = if outcome.is_ok() && updater.cancel_requested() {
        debug!("task cancelled before completion");
        Err(TaskgaugeError::Cancelled)
    } else {
        outcome
    };
    updater.finish(terminal_state(&outcome));
    outcome
}

fn terminal_state<T>(outcome: &Result<T>) -> TaskState {
    match outcome {
        Ok(_) => TaskState::Done,
        Err(err) if err.is_cancelled() => TaskState::Cancelled,
        Err(_) => TaskState::Error,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Weak references to the cells of every task an executor handed out,
/// so `shutdown` can reach outstanding work without keeping it alive.
#[derive(Debug, Default)]
pub(crate) struct CellRegistry {
    cells: Mutex<Vec<Weak<ProgressCell>>>,
}

impl CellRegistry {
    pub(crate) fn register(&self, cell: &Arc<ProgressCell>) {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.retain(|weak| weak.strong_count() > 0);
        cells.push(Arc::downgrade(cell));
    }

    /// Raise the cancel flag on every cell still alive; returns how many
    /// flags this call newly raised.
    pub(crate) fn cancel_all(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|cell| cell.request_cancel())
            .count()
    }
}

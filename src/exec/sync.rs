// src/exec/sync.rs

//! Inline executor: the task body runs on the observing thread.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::errors::Result;
use crate::exec::interrupt::InterruptGuard;
use crate::exec::{CellRegistry, run_task};
use crate::handle::TaskHandle;
use crate::handle::dispatch::Dispatcher;
use crate::handle::slot::CompletionSlot;
use crate::progress::{ProgressCell, ProgressSink, ProgressSnapshot, Updater, UpdaterOptions};

/// Executor without workers: `submit` only packages the task, and the
/// first `observe`/`result` call on the returned handle runs it right
/// there on the calling thread.
///
/// Useful for debugging task bodies without concurrency and for
/// single-threaded environments. Callbacks fire inline from within the
/// task's own progress flushes, so the diff/callback contract matches the
/// pooled executors. While a body runs, ctrl-c is mapped to a
/// cancellation request instead of killing the process.
pub struct SyncExecutor {
    registry: CellRegistry,
    opts: UpdaterOptions,
}

impl SyncExecutor {
    pub fn new() -> Self {
        Self::with_options(UpdaterOptions::default())
    }

    pub fn with_options(opts: UpdaterOptions) -> Self {
        Self {
            registry: CellRegistry::default(),
            opts,
        }
    }

    pub fn submit<T, F>(&self, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Updater) -> anyhow::Result<T> + Send + 'static,
    {
        let cell = Arc::new(ProgressCell::new());
        let slot = Arc::new(CompletionSlot::new());
        self.registry.register(&cell);
        let mut handle = TaskHandle::new(Arc::clone(&cell), slot);
        let dispatcher = handle.dispatcher();
        let opts = self.opts;
        handle.set_deferred(Box::new(move || {
            let _guard = InterruptGuard::install(Arc::clone(&cell));
            let sink = SyncSink { cell, dispatcher };
            run_task(Box::new(sink), opts, task)
        }));
        Ok(handle)
    }

    /// Cancel every outstanding handle this executor created. Handles
    /// whose task already ran are unaffected.
    pub fn shutdown(&self) {
        let cancelled = self.registry.cancel_all();
        debug!(cancelled, "sync executor shut down");
    }
}

impl Default for SyncExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink that dispatches callbacks inline instead of signalling an observe
/// loop: there is no separate observer thread to signal.
struct SyncSink {
    cell: Arc<ProgressCell>,
    dispatcher: Arc<Mutex<Dispatcher>>,
}

impl ProgressSink for SyncSink {
    fn publish(&mut self, snap: &ProgressSnapshot) -> io::Result<()> {
        self.cell.store_silent(*snap);
        // Re-read: a terminal state already recorded (cancellation racing
        // in from another thread) must win over the worker's snapshot.
        let dispatched = self.cell.load();
        self.dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .advance(dispatched);
        Ok(())
    }

    fn cancel_requested(&self) -> bool {
        self.cell.cancel_requested()
    }

    fn wait_drained(&mut self, _limit: Duration) -> bool {
        true
    }
}

// src/handle/mod.rs

//! Caller-side view of a submitted task.
//!
//! A [`TaskHandle`] couples three shared pieces: the [`ProgressCell`] the
//! worker writes into, a completion slot holding the outcome, and a
//! callback dispatcher. [`TaskHandle::observe`] runs the polling loop that
//! diffs snapshots and fans them out to callbacks until the task
//! completes; [`TaskHandle::result`] waits for completion without
//! dispatching intermediate snapshots.

pub mod bar;
pub(crate) mod dispatch;
pub(crate) mod slot;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::errors::{Result, TaskgaugeError};
use crate::progress::{ProgressCell, ProgressSnapshot, TaskState};

pub use bar::{BarTrigger, IndicatifRender, ProgressRender};
pub use dispatch::CallbackId;

use bar::{BarAdapter, RenderFactory};
use dispatch::Dispatcher;
use slot::CompletionSlot;

/// Task body queued for lazy execution by the synchronous executor.
pub(crate) type Deferred<T> = Box<dyn FnOnce() -> Result<T> + Send>;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a task submitted on one of the executors.
///
/// The handle is the sole consumer of the task's dirty flag; run at most
/// one `observe` loop per handle.
pub struct TaskHandle<T> {
    cell: Arc<ProgressCell>,
    slot: Arc<CompletionSlot<T>>,
    dispatcher: Arc<Mutex<Dispatcher>>,
    deferred: Option<Deferred<T>>,
    poll_interval: Duration,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(cell: Arc<ProgressCell>, slot: Arc<CompletionSlot<T>>) -> Self {
        Self {
            cell,
            slot,
            dispatcher: Arc::new(Mutex::new(Dispatcher::new())),
            deferred: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Attach a task body to run lazily on the first `observe`/`result`
    /// call. Set once, at submission time.
    pub(crate) fn set_deferred(&mut self, deferred: Deferred<T>) {
        self.deferred = Some(deferred);
    }

    pub(crate) fn dispatcher(&self) -> Arc<Mutex<Dispatcher>> {
        Arc::clone(&self.dispatcher)
    }

    /// Whether the task has completed (in any terminal state).
    pub fn done(&self) -> bool {
        self.slot.is_done()
    }

    /// Copy of the latest progress triple the worker flushed.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.cell.load()
    }

    /// How long `observe` sleeps between polls (default 100ms). A fresh
    /// dirty signal cuts the sleep short, so this is an upper bound.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// Request cooperative cancellation.
    ///
    /// Raises the cancel flag, forces the status to `cancelled` unless the
    /// task already reached a terminal state, and dispatches the terminal
    /// snapshot to progress callbacks right away. Returns true on the call
    /// that initiated cancellation; false if the task was already finished
    /// or cancelled. A task still waiting for a worker resolves
    /// immediately; a running worker only stops at its next
    /// [`refresh`](crate::progress::Updater::refresh).
    pub fn cancel(&self) -> bool {
        let slot = Arc::clone(&self.slot);
        request_cancel(&self.cell, &self.dispatcher, move || {
            slot.set(Err(TaskgaugeError::Cancelled));
        })
    }

    /// Detached cancellation trigger for signal handlers and other code
    /// that must outlive borrows of the handle.
    pub fn canceller(&self) -> Canceller
    where
        T: Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        Canceller {
            cell: Arc::clone(&self.cell),
            dispatcher: Arc::clone(&self.dispatcher),
            resolve_queued: Arc::new(move || slot.set(Err(TaskgaugeError::Cancelled))),
        }
    }

    /// Register a progress callback invoked with `(old, new)` snapshots.
    ///
    /// Callbacks run inline on the observing thread and must not call back
    /// into the same handle.
    pub fn add_progress_callback<F>(&self, callback: F) -> CallbackId
    where
        F: FnMut(&ProgressSnapshot, &ProgressSnapshot) + Send + 'static,
    {
        self.lock_dispatcher().add(Box::new(callback))
    }

    /// Remove a previously registered progress callback.
    pub fn remove_progress_callback(&self, id: CallbackId) -> bool {
        self.lock_dispatcher().remove(id)
    }

    /// Register a completion callback; it receives the final snapshot.
    /// Fires immediately if the task already finished.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&ProgressSnapshot) + Send + 'static,
    {
        self.lock_dispatcher().add_done(Box::new(callback));
    }

    /// Attach the default terminal progress bar, built immediately.
    pub fn add_progress_bar(&self) -> CallbackId {
        self.add_progress_bar_with(|| Box::new(IndicatifRender::new()), &[BarTrigger::Now])
    }

    /// Attach a custom renderer. Construction is deferred until a snapshot
    /// matches one of `triggers` (see [`BarTrigger`]); the renderer is
    /// finished exactly once on the terminal snapshot.
    pub fn add_progress_bar_with<F>(&self, factory: F, triggers: &[BarTrigger]) -> CallbackId
    where
        F: FnOnce() -> Box<dyn ProgressRender> + Send + 'static,
    {
        let factory: RenderFactory = Box::new(factory);
        let mut adapter = BarAdapter::new(factory, triggers.to_vec());
        self.add_progress_callback(move |_, new| adapter.observe(new))
    }

    /// Drive callbacks until the task completes, then hand out the
    /// outcome.
    ///
    /// Each pass re-reads the cell when the dirty flag is set (plus one
    /// unconditional pass at the start) and dispatches the snapshot;
    /// emissions between two polls coalesce into the latest one.
    /// Completion is sampled before the dirty flag, so the worker's final
    /// flush is always delivered before the loop exits.
    pub async fn observe(&mut self) -> Result<T> {
        self.run_deferred_if_any();
        let mut first = true;
        loop {
            let done = self.slot.is_done();
            if self.cell.dirty_flag().take() || first {
                first = false;
                let snap = self.cell.load();
                self.lock_dispatcher().advance(snap);
            }
            if done {
                break;
            }
            self.cell.dirty_flag().wait_timeout(self.poll_interval).await;
        }
        self.finish_dispatch();
        self.claim()
    }

    /// [`observe`](Self::observe) with an explicit poll interval.
    pub async fn observe_with(&mut self, poll_interval: Duration) -> Result<T> {
        self.poll_interval = poll_interval;
        self.observe().await
    }

    /// Non-blocking check for the outcome: `None` while the task is still
    /// running, otherwise the same one-shot claim as
    /// [`result`](Self::result). Never starts a deferred task body.
    pub fn try_result(&self) -> Option<Result<T>> {
        if !self.slot.is_done() {
            return None;
        }
        self.finish_dispatch();
        Some(self.claim())
    }

    /// Wait for completion and hand out the outcome without running the
    /// observe loop. Completion callbacks still fire (once) with the final
    /// snapshot.
    pub async fn result(&mut self) -> Result<T> {
        self.run_deferred_if_any();
        self.slot.wait().await;
        self.finish_dispatch();
        self.claim()
    }

    fn run_deferred_if_any(&mut self) {
        if let Some(task) = self.deferred.take() {
            debug!("running deferred task on the observing thread");
            let outcome = task();
            self.slot.set(outcome);
        }
    }

    fn finish_dispatch(&self) {
        let snap = self.cell.load();
        let mut dispatcher = self.lock_dispatcher();
        dispatcher.advance(snap);
        dispatcher.finish(snap);
    }

    fn claim(&self) -> Result<T> {
        match self.slot.take() {
            Some(outcome) => outcome,
            None => Err(TaskgaugeError::StateSync(
                "task completed without a recorded outcome".into(),
            )),
        }
    }

    fn lock_dispatcher(&self) -> std::sync::MutexGuard<'_, Dispatcher> {
        // Callbacks are user code; recover the dispatcher if one panicked.
        self.dispatcher.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cancellation trigger detached from any [`TaskHandle`] borrow.
#[derive(Clone)]
pub struct Canceller {
    cell: Arc<ProgressCell>,
    dispatcher: Arc<Mutex<Dispatcher>>,
    resolve_queued: Arc<dyn Fn() + Send + Sync>,
}

impl Canceller {
    /// Same contract as [`TaskHandle::cancel`].
    pub fn cancel(&self) -> bool {
        request_cancel(&self.cell, &self.dispatcher, || (self.resolve_queued)())
    }
}

fn request_cancel(
    cell: &ProgressCell,
    dispatcher: &Mutex<Dispatcher>,
    resolve_queued: impl FnOnce(),
) -> bool {
    let before = cell.load().state;
    if before.is_terminal() {
        return false;
    }
    let first = cell.request_cancel();
    let snap = cell.force_state(TaskState::Cancelled);
    dispatcher
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .advance(snap);
    // A task that never started has no worker to observe the flag; its
    // outcome is recorded here and the body, if one ever runs, is skipped.
    if before == TaskState::Pending {
        resolve_queued();
    }
    first
}

// src/handle/slot.rs

//! One-shot storage for a finished task's outcome.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::errors::{Result, TaskgaugeError};

/// Shared slot the worker fills once and the handle drains once.
///
/// The first `set` wins; a worker racing a cancellation path cannot
/// overwrite the recorded outcome. `done` is stored with release ordering
/// after the value, so a reader that observes `done` also observes the
/// value (and, transitively, every progress store the worker made before
/// completing).
pub(crate) struct CompletionSlot<T> {
    value: Mutex<Option<Result<T>>>,
    done: AtomicBool,
    notify: Notify,
}

impl<T> CompletionSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: Mutex::new(None),
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Record the outcome. Later calls are dropped.
    pub(crate) fn set(&self, outcome: Result<T>) {
        {
            let mut guard = self.value.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_some() {
                return;
            }
            *guard = Some(outcome);
        }
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Move the outcome out. `None` while the task is still running;
    /// `ResultTaken` once the value has already been claimed.
    pub(crate) fn take(&self) -> Option<Result<T>> {
        if !self.is_done() {
            return None;
        }
        let mut guard = self.value.lock().unwrap_or_else(|e| e.into_inner());
        match guard.take() {
            Some(outcome) => Some(outcome),
            None => Some(Err(TaskgaugeError::ResultTaken)),
        }
    }

    /// Wait until `set` has run. The waiter is registered before the done
    /// check because `notify_waiters` only wakes already-registered
    /// waiters.
    pub(crate) async fn wait(&self) {
        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }
}

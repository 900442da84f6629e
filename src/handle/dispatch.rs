// src/handle/dispatch.rs

//! Snapshot diffing and callback dispatch for a single task handle.

use tracing::trace;

use crate::progress::ProgressSnapshot;

/// Progress callback: invoked with `(old, new)` snapshot pairs.
pub type ProgressCallback = Box<dyn FnMut(&ProgressSnapshot, &ProgressSnapshot) + Send>;

/// Completion callback: invoked once with the final snapshot.
pub type DoneCallback = Box<dyn FnOnce(&ProgressSnapshot) + Send>;

/// Token identifying a registered progress callback.
///
/// Boxed closures have no usable identity, so registration hands out a
/// token and removal takes it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Keeps the previous snapshot and fans new ones out to callbacks in
/// registration order.
///
/// Exactly one terminal snapshot is ever dispatched per handle: a second
/// terminal pass (the worker's own finish racing a `cancel`) is absorbed
/// here, which is what makes `cancel` idempotent from the callbacks'
/// point of view.
pub(crate) struct Dispatcher {
    previous: ProgressSnapshot,
    callbacks: Vec<(CallbackId, ProgressCallback)>,
    done_callbacks: Vec<DoneCallback>,
    next_id: u64,
    terminal_dispatched: bool,
    done_dispatched: bool,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            previous: ProgressSnapshot::pending(),
            callbacks: Vec::new(),
            done_callbacks: Vec::new(),
            next_id: 0,
            terminal_dispatched: false,
            done_dispatched: false,
        }
    }

    pub(crate) fn add(&mut self, callback: ProgressCallback) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, callback));
        id
    }

    /// Remove a progress callback; false if the token was already gone.
    pub(crate) fn remove(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }

    /// Register a completion callback. On an already-finished handle it
    /// fires immediately with the recorded final snapshot.
    pub(crate) fn add_done(&mut self, callback: DoneCallback) {
        if self.done_dispatched {
            callback(&self.previous);
        } else {
            self.done_callbacks.push(callback);
        }
    }

    /// Dispatch `snap` to every progress callback as the new half of an
    /// `(old, new)` pair, then make it the next `old`.
    pub(crate) fn advance(&mut self, snap: ProgressSnapshot) {
        if self.terminal_dispatched {
            trace!(snapshot = %snap, "terminal snapshot already dispatched; dropping");
            return;
        }
        for (_, callback) in &mut self.callbacks {
            callback(&self.previous, &snap);
        }
        if snap.state.is_terminal() {
            self.terminal_dispatched = true;
        }
        self.previous = snap;
    }

    /// Fire the completion callbacks exactly once with the final snapshot.
    pub(crate) fn finish(&mut self, snap: ProgressSnapshot) {
        if self.done_dispatched {
            return;
        }
        self.done_dispatched = true;
        self.previous = snap;
        for callback in self.done_callbacks.drain(..) {
            callback(&snap);
        }
    }
}

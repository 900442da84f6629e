// src/progress/cell.rs

//! The shared progress cell: snapshot storage plus the dirty/cancel flags.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::progress::flag::Flag;
use crate::progress::state::{ProgressSnapshot, TaskState};
use crate::progress::updater::ProgressSink;

/// Single source of truth for one task's progress, shared between the
/// worker side (writes snapshots) and the handle side (reads them,
/// requests cancellation, and writes the terminal value on `cancel()`).
///
/// Executors allocate a fresh cell per submission; cells are never reused
/// across tasks.
#[derive(Debug)]
pub struct ProgressCell {
    snapshot: Mutex<ProgressSnapshot>,
    dirty: Flag,
    cancel: Flag,
}

impl ProgressCell {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(ProgressSnapshot::pending()),
            dirty: Flag::new(),
            cancel: Flag::new(),
        }
    }

    /// Overwrite the triple and raise `dirty`.
    pub fn store(&self, snap: ProgressSnapshot) {
        self.store_silent(snap);
        self.dirty.raise();
    }

    /// Overwrite the triple without raising `dirty`. Used by the
    /// synchronous executor, which dispatches callbacks inline instead of
    /// going through an observe loop.
    ///
    /// A recorded terminal state is kept; only amount/total still change.
    pub fn store_silent(&self, mut snap: ProgressSnapshot) {
        let mut guard = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        if guard.state.is_terminal() && !snap.state.is_terminal() {
            snap.state = guard.state;
        }
        *guard = snap;
    }

    /// Copy the current triple. All three fields come from the same store;
    /// a mix of two stores is never observed.
    pub fn load(&self) -> ProgressSnapshot {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition to `state` from the handle side (first terminal state
    /// wins), returning the resulting snapshot. Does not raise `dirty`;
    /// callers dispatch the result themselves.
    pub fn force_state(&self, state: TaskState) -> ProgressSnapshot {
        let mut guard = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.state.is_terminal() {
            guard.state = state;
        }
        *guard
    }

    /// Raise the cancel flag; true if this call was the first to do so.
    pub fn request_cancel(&self) -> bool {
        self.cancel.raise_first()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_raised()
    }

    pub(crate) fn dirty_flag(&self) -> &Flag {
        &self.dirty
    }

    pub(crate) fn cancel_flag(&self) -> &Flag {
        &self.cancel
    }
}

impl Default for ProgressCell {
    fn default() -> Self {
        Self::new()
    }
}

/// In-process sink: snapshots land straight in a shared [`ProgressCell`]
/// and the observe loop picks them up through the dirty flag.
#[derive(Debug)]
pub struct CellSink {
    cell: Arc<ProgressCell>,
}

impl CellSink {
    pub fn new(cell: Arc<ProgressCell>) -> Self {
        Self { cell }
    }
}

impl ProgressSink for CellSink {
    fn publish(&mut self, snap: &ProgressSnapshot) -> io::Result<()> {
        self.cell.store(*snap);
        Ok(())
    }

    fn cancel_requested(&self) -> bool {
        self.cell.cancel_requested()
    }

    fn wait_drained(&mut self, _limit: Duration) -> bool {
        // The observe loop samples completion before consuming `dirty`, so
        // an in-process final snapshot can never be skipped. Nothing to
        // wait for.
        true
    }
}

// src/exec/interrupt.rs

//! Interrupt-to-cancellation bridge for inline execution.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::progress::ProgressCell;

/// While alive, translates the process interrupt signal (ctrl-c) into a
/// cancellation request on `cell` instead of terminating the process.
/// Dropping the guard stops the listener on every exit path, panics
/// included.
///
/// Note that tokio installs its process-level signal hook the first time
/// any listener registers and keeps it for the life of the process, so an
/// application that wants interrupts honoured outside task execution
/// should run its own `ctrl_c` listener (the bundled CLI does).
pub(crate) struct InterruptGuard {
    watcher: JoinHandle<()>,
}

impl InterruptGuard {
    pub(crate) fn install(cell: Arc<ProgressCell>) -> Self {
        let watcher = tokio::spawn(async move {
            loop {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        debug!("interrupt received; requesting task cancellation");
                        cell.request_cancel();
                    }
                    Err(err) => {
                        warn!(error = %err, "cannot listen for interrupt signals");
                        return;
                    }
                }
            }
        });
        Self { watcher }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

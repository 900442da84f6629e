// src/exec/thread_pool.rs

//! Fixed-size worker-thread executor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::errors::{Result, TaskgaugeError};
use crate::exec::run_task;
use crate::handle::TaskHandle;
use crate::handle::slot::CompletionSlot;
use crate::progress::{CellSink, ProgressCell, Updater, UpdaterOptions};

type Job = Box<dyn FnOnce(bool) + Send + 'static>;

/// Runs task bodies on a fixed set of worker threads fed from one shared
/// queue.
///
/// Closing the queue is the only shutdown signal: workers drain whatever
/// is left and exit. `shutdown(_, cancel_pending: true)` additionally
/// marks still-queued jobs so they resolve as cancelled instead of
/// running. A job a worker already picked up is not affected and keeps
/// running to completion (or to its next cancel check).
pub struct ThreadPoolExecutor {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    cancel_queued: Arc<AtomicBool>,
    opts: UpdaterOptions,
}

impl ThreadPoolExecutor {
    pub fn new(workers: usize) -> Result<Self> {
        Self::with_options(workers, UpdaterOptions::default())
    }

    pub fn with_options(workers: usize, opts: UpdaterOptions) -> Result<Self> {
        if workers == 0 {
            return Err(TaskgaugeError::ConfigError(
                "worker count must be at least 1".into(),
            ));
        }
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let cancel_queued = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let rx = rx.clone();
            let cancel_queued = Arc::clone(&cancel_queued);
            let handle = thread::Builder::new()
                .name(format!("taskgauge-worker-{i}"))
                .spawn(move || worker_loop(rx, cancel_queued))?;
            handles.push(handle);
        }
        debug!(workers, "thread pool started");
        Ok(Self {
            tx: Some(tx),
            workers: handles,
            cancel_queued,
            opts,
        })
    }

    /// Queue a task body and return its handle.
    pub fn submit<T, F>(&self, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Updater) -> anyhow::Result<T> + Send + 'static,
    {
        let tx = self.tx.as_ref().ok_or(TaskgaugeError::Shutdown)?;
        let cell = Arc::new(ProgressCell::new());
        let slot = Arc::new(CompletionSlot::new());
        let opts = self.opts;
        let job_cell = Arc::clone(&cell);
        let job_slot = Arc::clone(&slot);
        let job: Job = Box::new(move |queue_cancelled| {
            if queue_cancelled {
                job_cell.request_cancel();
            }
            let sink = CellSink::new(Arc::clone(&job_cell));
            let outcome = run_task(Box::new(sink), opts, task);
            job_slot.set(outcome);
        });
        tx.send(job).map_err(|_| TaskgaugeError::Shutdown)?;
        Ok(TaskHandle::new(cell, slot))
    }

    /// Close the queue. Later `submit` calls fail with `Shutdown`.
    ///
    /// `wait` joins the worker threads; `cancel_pending` resolves jobs
    /// that never started as cancelled while they drain.
    pub fn shutdown(&mut self, wait: bool, cancel_pending: bool) {
        if cancel_pending {
            self.cancel_queued.store(true, Ordering::Release);
        }
        if self.tx.take().is_some() {
            debug!(wait, cancel_pending, "thread pool shutting down");
        }
        if wait {
            for worker in self.workers.drain(..) {
                if worker.join().is_err() {
                    warn!("worker thread panicked");
                }
            }
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.shutdown(true, false);
    }
}

fn worker_loop(rx: Receiver<Job>, cancel_queued: Arc<AtomicBool>) {
    for job in rx {
        job(cancel_queued.load(Ordering::Acquire));
    }
    trace!("worker queue closed; exiting");
}

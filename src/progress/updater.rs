// src/progress/updater.rs

//! Worker-side progress reporting.
//!
//! The [`Updater`] is the one object a task body touches:
//! - it accumulates `amount` and rate-limits how often snapshots are
//!   flushed to the observer side,
//! - it is the sole point where cooperative cancellation takes effect
//!   ([`Updater::refresh`] returns [`CancelRequested`] once the observer
//!   has asked the task to stop),
//! - [`Updater::wrap`] turns any sized iterator into a self-reporting one.

use std::io;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::errors::CancelRequested;
use crate::progress::state::{ProgressSnapshot, TaskState};

/// Where flushed snapshots go and where cancellation requests come from.
///
/// Two implementations ship with the crate:
/// [`CellSink`](crate::progress::CellSink) for in-process workers and the
/// wire sink used inside process-pool children. The trait is deliberately
/// narrow so tests can record emissions with a fake.
pub trait ProgressSink: Send {
    /// Deliver one snapshot to the observer side.
    fn publish(&mut self, snap: &ProgressSnapshot) -> io::Result<()>;

    /// Whether the observer has requested cancellation.
    fn cancel_requested(&self) -> bool;

    /// Block (bounded by `limit`) until previously published snapshots
    /// have been consumed by the observer side. Returns false on timeout.
    fn wait_drained(&mut self, limit: Duration) -> bool;
}

/// Rate-limit knobs for [`Updater::update`].
#[derive(Debug, Clone, Copy)]
pub struct UpdaterOptions {
    /// Minimum wall-clock time between flushed updates.
    pub min_interval: Duration,
    /// Minimum fraction of `total` that must accumulate between flushed
    /// updates. Ignored while `total` is unknown (zero).
    pub min_fraction: f64,
}

impl Default for UpdaterOptions {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            min_fraction: 0.005,
        }
    }
}

/// Decides whether an `update` call is worth a flush.
///
/// Emit iff (total unknown OR the accumulated fraction delta reaches
/// `min_fraction`) AND `min_interval` has elapsed since the last emission.
/// Both watermarks advance only when an emission actually happens, so
/// skipped updates accumulate instead of resetting the clock. Setting a
/// knob to zero disables that half of the gate.
#[derive(Debug)]
struct EmitGate {
    opts: UpdaterOptions,
    last_emit: Instant,
    last_amount: f64,
}

impl EmitGate {
    fn new(opts: UpdaterOptions) -> Self {
        Self {
            opts,
            last_emit: Instant::now(),
            last_amount: 0.0,
        }
    }

    fn should_emit(&self, amount: f64, total: f64, now: Instant) -> bool {
        let fraction_ok =
            total <= 0.0 || (amount - self.last_amount) / total >= self.opts.min_fraction;
        fraction_ok && now.duration_since(self.last_emit) >= self.opts.min_interval
    }

    fn mark_emitted(&mut self, amount: f64, now: Instant) {
        self.last_emit = now;
        self.last_amount = amount;
    }
}

const FINISH_DRAIN_LIMIT: Duration = Duration::from_secs(5);

/// Worker-side handle for reporting progress and observing cancellation.
///
/// Normally constructed by an executor and passed into the task body;
/// [`Updater::new`] is public so custom backends and test harnesses can
/// drive one against their own [`ProgressSink`].
pub struct Updater {
    amount: f64,
    total: f64,
    state: TaskState,
    gate: EmitGate,
    sink: Box<dyn ProgressSink>,
    sink_broken: bool,
}

impl Updater {
    pub fn new(sink: Box<dyn ProgressSink>, opts: UpdaterOptions) -> Self {
        Self {
            amount: 0.0,
            total: 0.0,
            state: TaskState::Pending,
            gate: EmitGate::new(opts),
            sink,
            sink_broken: false,
        }
    }

    /// Transition to `running` and flush unconditionally. Called by the
    /// executor wrappers before the task body runs; a task cancelled before
    /// it ever started surfaces here.
    pub(crate) fn begin(&mut self) -> Result<(), CancelRequested> {
        self.state = TaskState::Running;
        self.refresh()
    }

    /// Add `delta` to `amount` and flush if the rate gate allows it.
    ///
    /// Returns [`CancelRequested`] when a flush happened and cancellation
    /// has been requested; propagate it with `?` to stop the task.
    pub fn update(&mut self, delta: f64) -> Result<(), CancelRequested> {
        self.amount += delta;
        let now = Instant::now();
        if self.gate.should_emit(self.amount, self.total, now) {
            self.refresh()?;
            self.gate.mark_emitted(self.amount, now);
        }
        Ok(())
    }

    /// Flush the current triple unconditionally, then check for
    /// cancellation. The only place where a cancellation request turns
    /// into an error inside the worker; tasks that go a long time between
    /// `update` calls should sprinkle `refresh()?` at natural stopping
    /// points.
    pub fn refresh(&mut self) -> Result<(), CancelRequested> {
        self.publish();
        if self.sink.cancel_requested() {
            return Err(CancelRequested);
        }
        Ok(())
    }

    /// Set the total amount of work (0 = unknown).
    pub fn set_total(&mut self, total: f64) {
        self.total = total;
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Whether cancellation has been requested. Unlike [`refresh`] this
    /// never flushes and never errors.
    ///
    /// [`refresh`]: Updater::refresh
    pub fn cancel_requested(&self) -> bool {
        self.sink.cancel_requested()
    }

    /// Wrap an iterator: `total` becomes the source length, the amount
    /// restarts at zero, and each consumed element counts one unit of
    /// progress. Once cancellation is requested the iterator yields a
    /// single `Err(CancelRequested)` and then stops.
    ///
    /// ```no_run
    /// # fn work(items: Vec<u32>, updater: &mut taskgauge::progress::Updater) -> anyhow::Result<u64> {
    /// let mut sum = 0u64;
    /// for item in updater.wrap(items) {
    ///     sum += u64::from(item?);
    /// }
    /// # Ok(sum)
    /// # }
    /// ```
    pub fn wrap<I>(&mut self, iter: I) -> Wrapped<'_, I::IntoIter>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = iter.into_iter();
        self.amount = 0.0;
        self.total = iter.len() as f64;
        Wrapped {
            updater: self,
            iter,
            ticked: false,
            failed: false,
        }
    }

    /// Terminal flush. Never errors on a pending cancellation (the
    /// terminal state is already decided by then) and, for cross-process
    /// sinks, waits until the host acknowledged delivery so the final
    /// state lands before the worker's pool slot is reclaimed.
    pub(crate) fn finish(&mut self, state: TaskState) {
        self.state = state;
        self.publish();
        if !self.sink_broken && !self.sink.wait_drained(FINISH_DRAIN_LIMIT) {
            warn!(state = %state, "final progress flush not acknowledged in time");
        }
    }

    fn publish(&mut self) {
        if self.sink_broken {
            return;
        }
        let snap = ProgressSnapshot::new(self.amount, self.total, self.state);
        if let Err(err) = self.sink.publish(&snap) {
            // Progress is best-effort; the result path reports real errors.
            warn!(error = %err, "progress sink unavailable; further updates dropped");
            self.sink_broken = true;
        }
    }
}

/// Iterator returned by [`Updater::wrap`].
pub struct Wrapped<'a, I> {
    updater: &'a mut Updater,
    iter: I,
    ticked: bool,
    failed: bool,
}

impl<I: Iterator> Iterator for Wrapped<'_, I> {
    type Item = Result<I::Item, CancelRequested>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        // The unit for element k is counted when the consumer comes back
        // for element k+1 (or for the end), i.e. once it is done with k.
        if self.ticked {
            self.ticked = false;
            if let Err(cancelled) = self.updater.update(1.0) {
                self.failed = true;
                return Some(Err(cancelled));
            }
        }
        match self.iter.next() {
            Some(item) => {
                self.ticked = true;
                Some(Ok(item))
            }
            None => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

#![allow(dead_code)]

//! Recording fakes for the seams the crate exposes: the worker-side
//! progress sink, the handle's progress callbacks, and the bar renderer.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskgauge::handle::ProgressRender;
use taskgauge::progress::{ProgressSink, ProgressSnapshot};

/// Shared record behind a [`RecordingSink`]: every published snapshot, in
/// order, plus a cancel bit the test can raise.
#[derive(Debug, Default)]
pub struct SinkRecord {
    published: Mutex<Vec<ProgressSnapshot>>,
    cancel: AtomicBool,
}

impl SinkRecord {
    pub fn published(&self) -> Vec<ProgressSnapshot> {
        self.published.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<ProgressSnapshot> {
        self.published.lock().unwrap().last().copied()
    }

    pub fn len(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the sink report cancellation from now on.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }
}

/// [`ProgressSink`] that appends every published snapshot to a shared
/// record instead of delivering it anywhere.
pub struct RecordingSink {
    record: Arc<SinkRecord>,
}

impl RecordingSink {
    /// The sink goes into an `Updater`; the record stays with the test.
    pub fn new() -> (Self, Arc<SinkRecord>) {
        let record = Arc::new(SinkRecord::default());
        (
            Self {
                record: Arc::clone(&record),
            },
            record,
        )
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&mut self, snap: &ProgressSnapshot) -> io::Result<()> {
        self.record.published.lock().unwrap().push(*snap);
        Ok(())
    }

    fn cancel_requested(&self) -> bool {
        self.record.cancel.load(Ordering::Acquire)
    }

    fn wait_drained(&mut self, _limit: Duration) -> bool {
        true
    }
}

/// Collects the `(old, new)` pairs a handle dispatches to a progress
/// callback. Clone it freely; all clones share one log.
#[derive(Debug, Clone, Default)]
pub struct CallbackRecorder {
    pairs: Arc<Mutex<Vec<(ProgressSnapshot, ProgressSnapshot)>>>,
}

impl CallbackRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closure to hand to `add_progress_callback`.
    pub fn callback(
        &self,
    ) -> impl FnMut(&ProgressSnapshot, &ProgressSnapshot) + Send + 'static {
        let pairs = Arc::clone(&self.pairs);
        move |old: &ProgressSnapshot, new: &ProgressSnapshot| {
            pairs.lock().unwrap().push((*old, *new));
        }
    }

    pub fn pairs(&self) -> Vec<(ProgressSnapshot, ProgressSnapshot)> {
        self.pairs.lock().unwrap().clone()
    }

    /// Just the `new` half of each dispatched pair.
    pub fn news(&self) -> Vec<ProgressSnapshot> {
        self.pairs.lock().unwrap().iter().map(|(_, new)| *new).collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared log behind a [`RecordingRender`].
#[derive(Debug, Clone, Default)]
pub struct RenderLog {
    rendered: Arc<Mutex<Vec<ProgressSnapshot>>>,
    finished: Arc<Mutex<Vec<ProgressSnapshot>>>,
}

impl RenderLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> Vec<ProgressSnapshot> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<ProgressSnapshot> {
        self.finished.lock().unwrap().clone()
    }

    pub fn finish_count(&self) -> usize {
        self.finished.lock().unwrap().len()
    }
}

/// [`ProgressRender`] that logs calls instead of drawing anything.
pub struct RecordingRender {
    log: RenderLog,
}

impl RecordingRender {
    pub fn new(log: RenderLog) -> Self {
        Self { log }
    }
}

impl ProgressRender for RecordingRender {
    fn render(&mut self, snap: &ProgressSnapshot) {
        self.log.rendered.lock().unwrap().push(*snap);
    }

    fn finish(&mut self, snap: &ProgressSnapshot) {
        self.log.finished.lock().unwrap().push(*snap);
    }
}

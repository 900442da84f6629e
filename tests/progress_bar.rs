// tests/progress_bar.rs

//! Bar-adapter behaviour through the public callback API, with a
//! recording renderer standing in for the real terminal bar.

mod common;
use crate::common::builders::{count_to, eager_options};
use crate::common::init_tracing;
use crate::common::recorders::{RecordingRender, RenderLog};
use crate::common::with_timeout;

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use taskgauge::handle::{BarTrigger, ProgressRender};
use taskgauge::{SyncExecutor, TaskState};

type TestResult = Result<(), Box<dyn Error>>;

/// Factory handed to `add_progress_bar_with`; counts how often it runs so
/// tests can pin down when the renderer materialises.
fn recording_factory(
    log: &RenderLog,
    built: &Arc<AtomicUsize>,
) -> impl FnOnce() -> Box<dyn ProgressRender> + Send + 'static {
    let log = log.clone();
    let built = Arc::clone(built);
    move || {
        built.fetch_add(1, Ordering::SeqCst);
        Box::new(RecordingRender::new(log))
    }
}

#[tokio::test]
async fn now_trigger_renders_every_snapshot() -> TestResult {
    init_tracing();

    let exec = SyncExecutor::with_options(eager_options());
    let mut handle = exec.submit(count_to(4))?;

    let log = RenderLog::new();
    let built = Arc::new(AtomicUsize::new(0));
    handle.add_progress_bar_with(recording_factory(&log, &built), &[BarTrigger::Now]);
    assert_eq!(built.load(Ordering::SeqCst), 1, "Now builds at registration");

    let value = with_timeout(handle.observe()).await?;
    assert_eq!(value, 4);

    // The running transition plus one render per step.
    let rendered = log.rendered();
    assert_eq!(rendered.len(), 5);
    assert!(rendered.iter().all(|snap| snap.state == TaskState::Running));
    assert_eq!(rendered.last().unwrap().amount, 4.0);

    let finished = log.finished();
    assert_eq!(finished.len(), 1, "finish must run exactly once");
    assert_eq!(finished[0].state, TaskState::Done);
    assert_eq!(finished[0].amount, 4.0);
    assert_eq!(finished[0].total, 4.0);
    Ok(())
}

#[tokio::test]
async fn running_trigger_defers_construction() -> TestResult {
    init_tracing();

    let exec = SyncExecutor::with_options(eager_options());
    let mut handle = exec.submit(count_to(3))?;

    let log = RenderLog::new();
    let built = Arc::new(AtomicUsize::new(0));
    handle.add_progress_bar_with(recording_factory(&log, &built), &[BarTrigger::Running]);
    assert_eq!(built.load(Ordering::SeqCst), 0, "nothing has run yet");

    with_timeout(handle.observe()).await?;

    // The first running snapshot both builds and feeds the renderer.
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(log.rendered().len(), 4);
    assert_eq!(log.finish_count(), 1);
    Ok(())
}

#[tokio::test]
async fn cancelled_trigger_stays_hidden_on_success() -> TestResult {
    init_tracing();

    let exec = SyncExecutor::with_options(eager_options());
    let mut handle = exec.submit(count_to(2))?;

    let log = RenderLog::new();
    let built = Arc::new(AtomicUsize::new(0));
    handle.add_progress_bar_with(recording_factory(&log, &built), &[BarTrigger::Cancelled]);

    let value = with_timeout(handle.observe()).await?;
    assert_eq!(value, 2);

    assert_eq!(built.load(Ordering::SeqCst), 0, "bar must never appear");
    assert!(log.rendered().is_empty());
    assert_eq!(log.finish_count(), 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_trigger_fires_on_a_cancelled_task() -> TestResult {
    init_tracing();

    let exec = SyncExecutor::with_options(eager_options());
    let mut handle = exec.submit(count_to(2))?;

    let log = RenderLog::new();
    let built = Arc::new(AtomicUsize::new(0));
    handle.add_progress_bar_with(recording_factory(&log, &built), &[BarTrigger::Cancelled]);

    // Cancellation dispatches the terminal snapshot straight away; that
    // one both triggers the build and finishes the renderer.
    assert!(handle.cancel());
    assert_eq!(built.load(Ordering::SeqCst), 1);

    let err = with_timeout(handle.observe()).await.unwrap_err();
    assert!(err.is_cancelled());

    assert!(log.rendered().is_empty(), "no live renders for a dead task");
    let finished = log.finished();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].state, TaskState::Cancelled);
    Ok(())
}

#[tokio::test]
async fn attaches_the_default_terminal_bar() -> TestResult {
    init_tracing();

    // Smoke test against the real indicatif renderer; it hides itself on
    // a non-tty, so only the outcome is asserted.
    let exec = SyncExecutor::with_options(eager_options());
    let mut handle = exec.submit(count_to(3))?;
    handle.add_progress_bar();

    assert_eq!(with_timeout(handle.observe()).await?, 3);
    Ok(())
}

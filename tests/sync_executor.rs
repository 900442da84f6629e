// tests/sync_executor.rs

mod common;
use crate::common::builders::{count_to, eager_options};
use crate::common::init_tracing;
use crate::common::recorders::CallbackRecorder;
use crate::common::with_timeout;

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use taskgauge::progress::Updater;
use taskgauge::{SyncExecutor, TaskState, TaskgaugeError};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn runs_the_body_on_first_observe() -> TestResult {
    init_tracing();

    let exec = SyncExecutor::with_options(eager_options());
    let mut handle = exec.submit(count_to(10))?;

    // Nothing runs at submission time.
    assert!(!handle.done());
    assert_eq!(handle.snapshot().state, TaskState::Pending);

    let recorder = CallbackRecorder::new();
    handle.add_progress_callback(recorder.callback());

    let value = with_timeout(handle.observe()).await?;
    assert_eq!(value, 10);
    assert!(handle.done());

    // Inline dispatch with an open gate is fully deterministic: the
    // running transition, one flush per step, and the terminal flush.
    let news = recorder.news();
    assert_eq!(news.len(), 12);
    assert_eq!(news[0].state, TaskState::Running);
    assert_eq!(news[0].amount, 0.0);
    for (i, snap) in news.iter().take(11).skip(1).enumerate() {
        assert_eq!(snap.amount, (i + 1) as f64);
        assert_eq!(snap.state, TaskState::Running);
    }
    let last = news.last().unwrap();
    assert_eq!(last.state, TaskState::Done);
    assert_eq!(last.amount, 10.0);
    assert_eq!(last.total, 10.0);
    Ok(())
}

#[tokio::test]
async fn result_runs_the_body_and_fires_done_callbacks() -> TestResult {
    init_tracing();

    let exec = SyncExecutor::with_options(eager_options());
    let mut handle = exec.submit(count_to(5))?;

    let done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&done);
    handle.add_done_callback(move |snap| {
        assert_eq!(snap.state, TaskState::Done);
        flag.store(true, Ordering::Release);
    });

    assert_eq!(with_timeout(handle.result()).await?, 5);
    assert!(done.load(Ordering::Acquire));
    Ok(())
}

#[tokio::test]
async fn removed_callbacks_stop_firing() -> TestResult {
    init_tracing();

    let exec = SyncExecutor::with_options(eager_options());
    let mut handle = exec.submit(count_to(4))?;

    let recorder = CallbackRecorder::new();
    let id = handle.add_progress_callback(recorder.callback());
    assert!(handle.remove_progress_callback(id));
    assert!(!handle.remove_progress_callback(id), "token already spent");

    with_timeout(handle.observe()).await?;
    assert!(recorder.is_empty(), "removed callback still fired");
    Ok(())
}

#[tokio::test]
async fn cancel_before_observe_skips_the_body() -> TestResult {
    init_tracing();

    let exec = SyncExecutor::with_options(eager_options());
    let ran = Arc::new(AtomicBool::new(false));
    let ran_flag = Arc::clone(&ran);
    let mut handle = exec.submit(move |_updater: &mut Updater| {
        ran_flag.store(true, Ordering::Release);
        Ok(0u32)
    })?;

    assert!(handle.cancel());
    let err = with_timeout(handle.observe()).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!ran.load(Ordering::Acquire));
    assert_eq!(handle.snapshot().state, TaskState::Cancelled);
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_outstanding_handles() -> TestResult {
    init_tracing();

    let exec = SyncExecutor::with_options(eager_options());
    let ran = Arc::new(AtomicBool::new(false));
    let ran_flag = Arc::clone(&ran);
    let mut pending = exec.submit(move |_updater: &mut Updater| {
        ran_flag.store(true, Ordering::Release);
        Ok(0u32)
    })?;

    // A handle whose body already ran is not affected.
    let mut finished = exec.submit(count_to(2))?;
    assert_eq!(with_timeout(finished.observe()).await?, 2);

    exec.shutdown();

    let err = with_timeout(pending.observe()).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!ran.load(Ordering::Acquire));
    assert_eq!(finished.snapshot().state, TaskState::Done);
    Ok(())
}

#[tokio::test]
async fn second_result_claim_errors() -> TestResult {
    init_tracing();

    let exec = SyncExecutor::with_options(eager_options());
    let mut handle = exec.submit(count_to(1))?;
    assert_eq!(with_timeout(handle.observe()).await?, 1);

    let err = with_timeout(handle.result()).await.unwrap_err();
    assert!(matches!(err, TaskgaugeError::ResultTaken));
    Ok(())
}

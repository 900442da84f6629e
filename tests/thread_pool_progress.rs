// tests/thread_pool_progress.rs

mod common;
use crate::common::builders::{
    count_to, count_to_paced, eager_options, fail_with, panic_with, poll_until_cancelled,
};
use crate::common::init_tracing;
use crate::common::recorders::CallbackRecorder;
use crate::common::with_timeout;

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskgauge::{TaskState, TaskgaugeError, ThreadPoolExecutor, UpdaterOptions};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn reports_progress_and_returns_the_result() -> TestResult {
    init_tracing();

    // 1000 steps against a 1% fraction gate: at most ~100 intermediate
    // flushes plus the terminal one, however fast the body runs.
    let pool = ThreadPoolExecutor::with_options(
        2,
        UpdaterOptions {
            min_interval: Duration::ZERO,
            min_fraction: 0.01,
        },
    )?;
    let mut handle = pool.submit(count_to(1000))?;

    let recorder = CallbackRecorder::new();
    handle.add_progress_callback(recorder.callback());

    let value = with_timeout(handle.observe_with(Duration::from_millis(5))).await?;
    assert_eq!(value, 1000);
    assert!(handle.done());

    let news = recorder.news();
    assert!(!news.is_empty());
    assert!(
        news.len() <= 110,
        "rate gate was bypassed: {} callbacks",
        news.len()
    );
    let last = news.last().unwrap();
    assert_eq!(last.state, TaskState::Done);
    assert_eq!(last.amount, 1000.0);
    assert_eq!(last.total, 1000.0);
    for pair in news.windows(2) {
        assert!(pair[1].amount >= pair[0].amount, "amounts went backwards");
    }
    Ok(())
}

#[tokio::test]
async fn paced_updates_all_reach_the_observer() -> TestResult {
    init_tracing();

    // Companion lower bound: the paced body leaves ~20ms between gated
    // flushes while the observe loop polls every 1ms, so coalescing
    // cannot eat emissions and the 1% gate's ~100 flushes all arrive.
    let pool = ThreadPoolExecutor::with_options(
        1,
        UpdaterOptions {
            min_interval: Duration::ZERO,
            min_fraction: 0.01,
        },
    )?;
    let mut handle = pool.submit(count_to_paced(1000, Duration::from_millis(2)))?;

    let recorder = CallbackRecorder::new();
    handle.add_progress_callback(recorder.callback());

    let value = with_timeout(handle.observe_with(Duration::from_millis(1))).await?;
    assert_eq!(value, 1000);

    let news = recorder.news();
    assert!(
        news.len() >= 100,
        "observer missed gated updates: {} callbacks",
        news.len()
    );
    let last = news.last().unwrap();
    assert_eq!(last.state, TaskState::Done);
    assert_eq!(last.amount, 1000.0);
    Ok(())
}

#[tokio::test]
async fn runs_many_tasks_across_the_pool() -> TestResult {
    init_tracing();

    let pool = ThreadPoolExecutor::with_options(4, eager_options())?;
    let mut handles = Vec::new();
    for steps in 1..=8u32 {
        handles.push((steps, pool.submit(count_to(steps))?));
    }
    // Exercise both completion paths.
    for (steps, handle) in &mut handles {
        let value = if *steps % 2 == 0 {
            with_timeout(handle.observe()).await?
        } else {
            with_timeout(handle.result()).await?
        };
        assert_eq!(value, *steps);
    }
    Ok(())
}

#[tokio::test]
async fn result_dispatches_only_the_terminal_snapshot() -> TestResult {
    init_tracing();

    let pool = ThreadPoolExecutor::with_options(1, eager_options())?;
    let mut handle = pool.submit(count_to(50))?;
    let recorder = CallbackRecorder::new();
    handle.add_progress_callback(recorder.callback());

    // result() skips the observe loop, so intermediate flushes are never
    // consumed; callbacks see exactly one terminal pair.
    let value = with_timeout(handle.result()).await?;
    assert_eq!(value, 50);

    let pairs = recorder.pairs();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].0.state, TaskState::Pending);
    assert_eq!(pairs[0].1.state, TaskState::Done);
    Ok(())
}

#[tokio::test]
async fn done_callbacks_fire_even_when_registered_late() -> TestResult {
    init_tracing();

    let pool = ThreadPoolExecutor::with_options(1, eager_options())?;
    let mut handle = pool.submit(count_to(3))?;

    let early = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&early);
    handle.add_done_callback(move |snap| {
        assert_eq!(snap.state, TaskState::Done);
        flag.store(true, Ordering::Release);
    });

    with_timeout(handle.observe()).await?;
    assert!(early.load(Ordering::Acquire));

    // Registration after completion fires immediately.
    let late = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&late);
    handle.add_done_callback(move |snap| {
        assert_eq!(snap.state, TaskState::Done);
        flag.store(true, Ordering::Release);
    });
    assert!(late.load(Ordering::Acquire));
    Ok(())
}

#[tokio::test]
async fn task_errors_propagate_with_the_error_state() -> TestResult {
    init_tracing();

    let pool = ThreadPoolExecutor::with_options(1, eager_options())?;
    let mut handle = pool.submit(fail_with("boom"))?;

    let err = with_timeout(handle.observe()).await.unwrap_err();
    match &err {
        TaskgaugeError::Failed(inner) => assert!(inner.to_string().contains("boom")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(handle.snapshot().state, TaskState::Error);
    Ok(())
}

#[tokio::test]
async fn panics_are_contained_and_the_worker_survives() -> TestResult {
    init_tracing();

    let pool = ThreadPoolExecutor::with_options(1, eager_options())?;
    let mut handle = pool.submit(panic_with("kaput"))?;

    let err = with_timeout(handle.observe()).await.unwrap_err();
    match &err {
        TaskgaugeError::Failed(inner) => {
            let message = inner.to_string();
            assert!(message.contains("panicked"), "got: {message}");
            assert!(message.contains("kaput"), "got: {message}");
        }
        other => panic!("expected Failed, got {other:?}"),
    }

    // The single worker thread must have survived the panic.
    let mut next = pool.submit(count_to(3))?;
    assert_eq!(with_timeout(next.observe()).await?, 3);
    Ok(())
}

#[tokio::test]
async fn taking_the_result_twice_errors() -> TestResult {
    init_tracing();

    let pool = ThreadPoolExecutor::with_options(1, eager_options())?;
    let mut handle = pool.submit(count_to(2))?;
    assert_eq!(with_timeout(handle.observe()).await?, 2);

    let err = with_timeout(handle.result()).await.unwrap_err();
    assert!(matches!(err, TaskgaugeError::ResultTaken));
    Ok(())
}

#[tokio::test]
async fn try_result_never_blocks_on_a_pending_task() -> TestResult {
    init_tracing();

    // One worker and a FIFO queue: the second submission cannot finish
    // before the blocker does.
    let pool = ThreadPoolExecutor::with_options(1, eager_options())?;
    let mut blocker = pool.submit(poll_until_cancelled(Duration::from_millis(2)))?;
    let queued = pool.submit(count_to(2))?;
    assert!(queued.try_result().is_none(), "queued task cannot be ready");

    blocker.cancel();
    let err = with_timeout(blocker.observe()).await.unwrap_err();
    assert!(err.is_cancelled());

    for _ in 0..500 {
        if queued.done() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(queued.try_result().expect("task finished")?, 2);
    let taken = queued.try_result().expect("outcome already claimed");
    assert!(matches!(taken, Err(TaskgaugeError::ResultTaken)));
    Ok(())
}

#[tokio::test]
async fn rejects_an_empty_pool() {
    init_tracing();

    let err = ThreadPoolExecutor::new(0).err().expect("0 workers must fail");
    assert!(matches!(err, TaskgaugeError::ConfigError(_)));
}

#[tokio::test]
async fn shutdown_rejects_new_submissions() -> TestResult {
    init_tracing();

    let mut pool = ThreadPoolExecutor::with_options(1, eager_options())?;
    pool.shutdown(true, false);

    let err = pool.submit(count_to(1)).err().expect("submit after shutdown");
    assert!(matches!(err, TaskgaugeError::Shutdown));
    Ok(())
}

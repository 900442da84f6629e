#![allow(dead_code)]

//! Ready-made task bodies for executor tests.
//!
//! Each builder returns a closure matching the executor submission
//! contract, `FnOnce(&mut Updater) -> anyhow::Result<T>`.

use std::time::Duration;

use anyhow::anyhow;
use taskgauge::progress::{Updater, UpdaterOptions};

/// Longest a looping body will run before giving up on its own. Keeps a
/// test that forgot to cancel from wedging a worker forever.
const BODY_DEADLINE: Duration = Duration::from_secs(20);

/// Updater options with the rate gate wide open: every update flushes.
pub fn eager_options() -> UpdaterOptions {
    UpdaterOptions {
        min_interval: Duration::ZERO,
        min_fraction: 0.0,
    }
}

/// Body that counts `steps` units and returns how many it counted.
///
/// Reports a known total up front, then one `update(1.0)` per step.
pub fn count_to(steps: u32) -> impl FnOnce(&mut Updater) -> anyhow::Result<u32> + Send + 'static {
    move |updater: &mut Updater| {
        updater.set_total(f64::from(steps));
        for _ in 0..steps {
            updater.update(1.0)?;
        }
        Ok(steps)
    }
}

/// Like [`count_to`], but sleeps `pace` between steps so rate limiting and
/// mid-flight cancellation have wall-clock time to act on.
pub fn count_to_paced(
    steps: u32,
    pace: Duration,
) -> impl FnOnce(&mut Updater) -> anyhow::Result<u32> + Send + 'static {
    move |updater: &mut Updater| {
        updater.set_total(f64::from(steps));
        for _ in 0..steps {
            std::thread::sleep(pace);
            updater.update(1.0)?;
        }
        Ok(steps)
    }
}

/// Body with no natural end: it refreshes, sleeps, and repeats until
/// cancelled. Errors out if nobody cancels it within [`BODY_DEADLINE`].
pub fn poll_until_cancelled(
    pace: Duration,
) -> impl FnOnce(&mut Updater) -> anyhow::Result<()> + Send + 'static {
    move |updater: &mut Updater| {
        let start = std::time::Instant::now();
        loop {
            updater.refresh()?;
            if start.elapsed() > BODY_DEADLINE {
                return Err(anyhow!("polling body was never cancelled"));
            }
            std::thread::sleep(pace);
        }
    }
}

/// Body that waits for a cancellation request through the non-erroring
/// check, then returns `value` as if nothing happened. Errors out if the
/// request never arrives within [`BODY_DEADLINE`].
pub fn finish_despite_cancel(
    value: u32,
) -> impl FnOnce(&mut Updater) -> anyhow::Result<u32> + Send + 'static {
    move |updater: &mut Updater| {
        let start = std::time::Instant::now();
        while !updater.cancel_requested() {
            if start.elapsed() > BODY_DEADLINE {
                return Err(anyhow!("stubborn body was never cancelled"));
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(value)
    }
}

/// Body that fails immediately with `message`.
pub fn fail_with(
    message: &'static str,
) -> impl FnOnce(&mut Updater) -> anyhow::Result<()> + Send + 'static {
    move |_updater: &mut Updater| Err(anyhow!(message))
}

/// Body that panics with `message`.
pub fn panic_with(
    message: &'static str,
) -> impl FnOnce(&mut Updater) -> anyhow::Result<()> + Send + 'static {
    move |_updater: &mut Updater| panic!("{message}")
}

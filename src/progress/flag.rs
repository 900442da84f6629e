// src/progress/flag.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// A raisable boolean with test-and-clear semantics and async waits.
///
/// Two of these drive every task: `dirty` (worker -> observer, "the shared
/// state changed, re-read it") and `cancel` (observer -> worker, "stop at
/// your next opportunity"). A raise is sticky until taken; wakeups are
/// lossy and waiters re-check the bit after every wakeup.
#[derive(Debug, Default)]
pub struct Flag {
    raised: AtomicBool,
    notify: Notify,
}

impl Flag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake a waiter.
    pub fn raise(&self) {
        self.raise_first();
    }

    /// Set the flag, reporting whether this call was the one that set it.
    pub fn raise_first(&self) -> bool {
        let first = !self.raised.swap(true, Ordering::AcqRel);
        self.notify.notify_one();
        first
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Test-and-clear.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    /// Wait until the flag is raised or `dur` elapses; returns whether the
    /// flag is raised on return. May return early after a stale wakeup.
    pub async fn wait_timeout(&self, dur: Duration) -> bool {
        if self.is_raised() {
            return true;
        }
        let _ = tokio::time::timeout(dur, self.notify.notified()).await;
        self.is_raised()
    }

    /// Wait until the flag is raised.
    pub async fn wait(&self) {
        loop {
            if self.is_raised() {
                return;
            }
            self.notify.notified().await;
        }
    }
}

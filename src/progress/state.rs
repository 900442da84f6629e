// src/progress/state.rs

//! The progress triple reported by workers: amount done, total, lifecycle
//! state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task, as carried in progress snapshots.
///
/// Transitions are monotone: `pending -> running -> {done, cancelled,
/// error}`. The shared cell refuses to leave a terminal state once one has
/// been recorded, so a worker that keeps reporting after an observer-side
/// cancel cannot resurrect `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Cancelled,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Done | TaskState::Cancelled | TaskState::Error
        )
    }

    /// Wire name, as used in `state` frames and config files.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Cancelled => "cancelled",
            TaskState::Error => "error",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskState::Pending),
            "running" => Ok(TaskState::Running),
            "done" => Ok(TaskState::Done),
            "cancelled" => Ok(TaskState::Cancelled),
            "error" => Ok(TaskState::Error),
            other => Err(format!("unknown task state '{other}'")),
        }
    }
}

/// One observation of a task's progress.
///
/// `total == 0.0` means the total is unknown; fraction-based reasoning
/// (rate limiting, percentage rendering) is disabled in that case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub amount: f64,
    pub total: f64,
    pub state: TaskState,
}

impl ProgressSnapshot {
    pub fn new(amount: f64, total: f64, state: TaskState) -> Self {
        Self {
            amount,
            total,
            state,
        }
    }

    /// Snapshot for a just-submitted task.
    pub fn pending() -> Self {
        Self::new(0.0, 0.0, TaskState::Pending)
    }

    /// Completed fraction in `0.0..=1.0`, or `None` while the total is
    /// unknown.
    pub fn fraction(&self) -> Option<f64> {
        if self.total > 0.0 {
            Some((self.amount / self.total).clamp(0.0, 1.0))
        } else {
            None
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.amount, self.total, self.state)
    }
}

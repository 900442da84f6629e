// src/errors.rs

//! Crate-wide error types and aliases.

use thiserror::Error;

/// Marker error raised inside a task body once cancellation has been
/// requested. [`Updater::refresh`](crate::progress::Updater::refresh)
/// returns it so `?` unwinds the body; the executor wrappers downcast it
/// back out of the task's error chain and classify the outcome as
/// cancelled rather than failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cancellation requested")]
pub struct CancelRequested;

#[derive(Error, Debug)]
pub enum TaskgaugeError {
    #[error("task was cancelled")]
    Cancelled,

    #[error("progress state lost: {0}")]
    StateSync(String),

    #[error("executor has been shut down")]
    Shutdown,

    #[error("result already taken from this handle")]
    ResultTaken,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl TaskgaugeError {
    /// Classify an error propagated out of a task body: a [`CancelRequested`]
    /// anywhere in the chain means the task honoured a cancellation request,
    /// anything else is a genuine failure.
    pub fn from_task_error(err: anyhow::Error) -> Self {
        if err.downcast_ref::<CancelRequested>().is_some() {
            TaskgaugeError::Cancelled
        } else {
            TaskgaugeError::Failed(err)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskgaugeError::Cancelled)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskgaugeError>;

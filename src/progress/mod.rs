// src/progress/mod.rs

//! Shared progress state and the worker-side reporting handle.

pub mod cell;
pub mod flag;
pub mod state;
pub mod updater;

pub use cell::{CellSink, ProgressCell};
pub use flag::Flag;
pub use state::{ProgressSnapshot, TaskState};
pub use updater::{ProgressSink, Updater, UpdaterOptions, Wrapped};

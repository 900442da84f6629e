// src/config/mod.rs

//! Configuration loading and validation for taskgauge.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate value ranges and parse duration strings
//!   (`TryFrom<RawOptionsFile>` in `model.rs`).

pub mod loader;
pub mod model;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{Options, RawOptionsFile, parse_duration};

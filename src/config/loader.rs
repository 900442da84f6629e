// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{Options, RawOptionsFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawOptionsFile`.
///
/// This only performs TOML deserialization; it does **not** perform
/// semantic validation (duration strings, value ranges). Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawOptionsFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawOptionsFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Parses duration strings and checks value ranges.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Options> {
    let raw_config = load_from_path(&path)?;
    let config = Options::try_from(raw_config)?;
    Ok(config)
}

/// Helper to resolve a default config path.
///
/// Currently this just returns `Taskgauge.toml` in the current working
/// directory; it exists so discovery can later respect an env var or
/// walk parent directories.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskgauge.toml")
}

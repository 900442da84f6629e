// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! NOTE: this expects `clap` to be built with the `derive` feature, e.g.:
//! `clap = { version = "4.5.53", features = ["derive"] }` in `Cargo.toml`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskgauge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskgauge",
    version,
    about = "Run a command in a worker pool with a live progress gauge and Ctrl-C cancellation.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If omitted, `Taskgauge.toml` in the current directory is used when
    /// present, otherwise built-in defaults apply.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// The command reports progress over the taskgauge wire protocol
    /// (its stdout carries `@tg` frames); its result is printed as JSON.
    #[arg(long)]
    pub wire: bool,

    /// Derive progress from stdout lines matching this regex.
    ///
    /// Named capture groups `amount` and `total` set absolute values;
    /// without them, each matching line counts one unit. The default
    /// (empty pattern) counts every line.
    #[arg(long, value_name = "REGEX", conflicts_with = "wire")]
    pub pattern: Option<String>,

    /// Worker processes in the pool; overrides `pool.workers` from the
    /// config file.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKGAUGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// The command to run, after `--`.
    #[arg(last = true, required = true, value_name = "CMD")]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

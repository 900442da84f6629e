// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::errors::TaskgaugeError;
use crate::progress::UpdaterOptions;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [updater]
/// min_interval = "100ms"
/// min_fraction = 0.005
///
/// [observer]
/// poll_interval = "100ms"
///
/// [pool]
/// workers = 4
/// ```
///
/// All sections are optional and have reasonable defaults. Durations are
/// written as strings with a unit suffix (`"250ms"`, `"2s"`, `"1m"`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOptionsFile {
    /// `[updater]`: emission rate limiting inside workers.
    #[serde(default)]
    pub updater: RawUpdaterSection,

    /// `[observer]`: the handle-side observe loop.
    #[serde(default)]
    pub observer: RawObserverSection,

    /// `[pool]`: executor pool sizing.
    #[serde(default)]
    pub pool: RawPoolSection,
}

/// `[updater]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUpdaterSection {
    /// Minimum wall-clock time between flushed updates.
    #[serde(default = "default_min_interval")]
    pub min_interval: String,

    /// Minimum fraction of the total that must accumulate between flushed
    /// updates; `0.0` disables the fraction half of the gate.
    #[serde(default = "default_min_fraction")]
    pub min_fraction: f64,
}

fn default_min_interval() -> String {
    "100ms".to_string()
}

fn default_min_fraction() -> f64 {
    0.005
}

impl Default for RawUpdaterSection {
    fn default() -> Self {
        Self {
            min_interval: default_min_interval(),
            min_fraction: default_min_fraction(),
        }
    }
}

/// `[observer]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawObserverSection {
    /// Upper bound on how long the observe loop sleeps between polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
}

fn default_poll_interval() -> String {
    "100ms".to_string()
}

impl Default for RawObserverSection {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
        }
    }
}

/// `[pool]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPoolSection {
    /// Worker threads / processes per executor.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

impl Default for RawPoolSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Validated configuration used by the executors.
#[derive(Debug, Clone)]
pub struct Options {
    pub updater: UpdaterOptions,
    pub poll_interval: Duration,
    pub workers: usize,
}

impl Default for Options {
    fn default() -> Self {
        // Must stay in sync with the Raw* serde defaults; the TryFrom
        // round trip on an empty file asserts this in the tests.
        Self {
            updater: UpdaterOptions::default(),
            poll_interval: Duration::from_millis(100),
            workers: default_workers(),
        }
    }
}

impl TryFrom<RawOptionsFile> for Options {
    type Error = TaskgaugeError;

    fn try_from(raw: RawOptionsFile) -> std::result::Result<Self, Self::Error> {
        let min_interval = parse_duration(&raw.updater.min_interval)
            .map_err(|e| TaskgaugeError::ConfigError(format!("updater.min_interval: {e}")))?;
        let poll_interval = parse_duration(&raw.observer.poll_interval)
            .map_err(|e| TaskgaugeError::ConfigError(format!("observer.poll_interval: {e}")))?;

        if !(0.0..1.0).contains(&raw.updater.min_fraction) {
            return Err(TaskgaugeError::ConfigError(format!(
                "updater.min_fraction must be in [0.0, 1.0), got {}",
                raw.updater.min_fraction
            )));
        }
        if poll_interval.is_zero() {
            return Err(TaskgaugeError::ConfigError(
                "observer.poll_interval must be non-zero".to_string(),
            ));
        }
        if raw.pool.workers == 0 {
            return Err(TaskgaugeError::ConfigError(
                "pool.workers must be at least 1".to_string(),
            ));
        }

        Ok(Options {
            updater: UpdaterOptions {
                min_interval,
                min_fraction: raw.updater.min_fraction,
            },
            poll_interval,
            workers: raw.pool.workers,
        })
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}

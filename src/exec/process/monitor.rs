// src/exec/process/monitor.rs

//! Stdout-scraped progress for commands that do not speak the wire
//! protocol.
//!
//! Most off-the-shelf tools print *something* per unit of work. A
//! [`ProgressPattern`] turns those lines into snapshots: every matching
//! line counts one unit, or, when the pattern names `amount`/`total`
//! capture groups, the captured numbers are taken as the task's absolute
//! position.

use regex::Regex;
use tracing::debug;

use crate::errors::{Result, TaskgaugeError};

/// Compiled stdout progress pattern.
#[derive(Debug, Clone)]
pub struct ProgressPattern {
    regex: Regex,
    has_amount: bool,
    has_total: bool,
}

/// What one matching line contributes.
///
/// `amount: None` means "one more unit done"; `Some(a)` sets the absolute
/// amount. `total`, when captured, updates the known total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternHit {
    pub amount: Option<f64>,
    pub total: Option<f64>,
}

impl ProgressPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|err| {
            TaskgaugeError::ConfigError(format!("invalid progress pattern '{pattern}': {err}"))
        })?;
        let names: Vec<_> = regex.capture_names().flatten().collect();
        Ok(Self {
            has_amount: names.contains(&"amount"),
            has_total: names.contains(&"total"),
            regex,
        })
    }

    /// Match one stdout line. `None` when the line does not match or a
    /// named capture fails to parse as a number (logged, line skipped).
    pub fn match_line(&self, line: &str) -> Option<PatternHit> {
        let captures = self.regex.captures(line)?;
        let mut hit = PatternHit {
            amount: None,
            total: None,
        };
        if self.has_amount {
            hit.amount = Some(parse_capture(&captures, "amount", line)?);
        }
        if self.has_total {
            hit.total = parse_capture(&captures, "total", line);
        }
        Some(hit)
    }
}

fn parse_capture(captures: &regex::Captures<'_>, name: &str, line: &str) -> Option<f64> {
    let raw = captures.name(name)?.as_str();
    match raw.parse::<f64>() {
        Ok(value) if value >= 0.0 => Some(value),
        _ => {
            debug!(capture = name, value = raw, line, "unparsable progress capture");
            None
        }
    }
}

// src/exec/process/wire.rs

//! Line framing between the process pool and its worker children.
//!
//! Progress crosses the process boundary as plain text lines on the
//! child's stdio. Worker-to-host lines carry the `@tg` prefix; anything
//! else on stdout is ordinary task output and passes through untouched.
//! The first frame announces the protocol version so host and worker
//! binaries can be upgraded independently.

use std::fmt;
use std::str::FromStr;

use crate::progress::{ProgressSnapshot, TaskState};

pub(crate) const WIRE_PREFIX: &str = "@tg";

/// Protocol version spoken by this crate. A child announcing any other
/// version is rejected before its frames are applied.
pub const WIRE_VERSION: u32 = 1;

/// Worker-to-host frame.
///
/// A run is `Hello`, any number of `State` frames, then exactly one
/// terminal frame (`Result`, `Error` or `Cancelled`). A child that exits
/// without a terminal frame is treated as lost state.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Hello { version: u32 },
    State(ProgressSnapshot),
    /// JSON-encoded return value of the task body.
    Result(String),
    Error(String),
    Cancelled,
}

impl Frame {
    /// Interpret one stdout line. `None` means the line is ordinary task
    /// output; `Some(Err(..))` means it claimed to be a frame but could
    /// not be decoded.
    pub fn parse(line: &str) -> Option<Result<Frame, String>> {
        let rest = line.strip_prefix(WIRE_PREFIX)?;
        let rest = match rest.strip_prefix(' ') {
            Some(rest) => rest,
            // A word that merely starts with the prefix ("@tga...") is
            // ordinary output, not a broken frame.
            None if rest.is_empty() => rest,
            None => return None,
        };
        Some(Self::parse_body(rest))
    }

    fn parse_body(body: &str) -> Result<Frame, String> {
        let (op, rest) = match body.split_once(' ') {
            Some((op, rest)) => (op, rest),
            None => (body, ""),
        };
        match op {
            "hello" => {
                let version = rest
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("bad hello version '{rest}'"))?;
                Ok(Frame::Hello { version })
            }
            "state" => {
                let mut fields = rest.split_whitespace();
                let amount = parse_field::<f64>(fields.next(), "amount")?;
                let total = parse_field::<f64>(fields.next(), "total")?;
                let state = parse_field::<TaskState>(fields.next(), "state")?;
                if fields.next().is_some() {
                    return Err(format!("trailing data in state frame '{rest}'"));
                }
                Ok(Frame::State(ProgressSnapshot::new(amount, total, state)))
            }
            "result" => Ok(Frame::Result(rest.to_string())),
            "error" => Ok(Frame::Error(rest.to_string())),
            "cancelled" => Ok(Frame::Cancelled),
            other => Err(format!("unknown frame op '{other}'")),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Hello { version } => write!(f, "{WIRE_PREFIX} hello {version}"),
            Frame::State(snap) => write!(
                f,
                "{WIRE_PREFIX} state {} {} {}",
                snap.amount, snap.total, snap.state
            ),
            Frame::Result(json) => write!(f, "{WIRE_PREFIX} result {json}"),
            Frame::Error(message) => {
                // Frames are line-oriented; a multi-line message would be
                // read back as ordinary output.
                let flat = message.replace('\n', " ");
                write!(f, "{WIRE_PREFIX} error {flat}")
            }
            Frame::Cancelled => write!(f, "{WIRE_PREFIX} cancelled"),
        }
    }
}

fn parse_field<T: FromStr>(field: Option<&str>, name: &str) -> Result<T, String> {
    let raw = field.ok_or_else(|| format!("state frame missing {name}"))?;
    raw.parse::<T>()
        .map_err(|_| format!("bad {name} '{raw}' in state frame"))
}

/// Host-to-worker control line, written to the child's stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostLine {
    /// Cooperative stop request; surfaces inside the child at its next
    /// refresh.
    Cancel,
    /// The terminal state frame has been applied on the host side. Releases
    /// the child's bounded drain wait so it can exit knowing the final
    /// state arrived.
    Ack,
}

impl HostLine {
    pub fn parse(line: &str) -> Option<HostLine> {
        match line.trim() {
            "cancel" => Some(HostLine::Cancel),
            "ack" => Some(HostLine::Ack),
            _ => None,
        }
    }
}

impl fmt::Display for HostLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostLine::Cancel => f.write_str("cancel"),
            HostLine::Ack => f.write_str("ack"),
        }
    }
}

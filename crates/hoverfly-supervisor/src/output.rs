// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decoding and forwarding of engine output lines.
//!
//! The engine writes one JSON object per line (`{"level":..,"msg":..,"time":..}`
//! plus arbitrary fields). Lines that do not parse are forwarded unchanged.

use std::io::{self, BufRead, BufReader, Read};
use std::thread::JoinHandle;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

/// Tracing target engine output is emitted under.
pub const LOG_TARGET: &str = "hoverfly";

/// Longest line forwarded in one piece; longer lines are split.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Severity of a structured engine log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// `panic`, `fatal` or `error`
    Error,
    /// `warning`
    Warn,
    /// `info` and anything unrecognised
    Info,
    /// `debug`
    Debug,
}

impl LogLevel {
    fn from_engine(level: &str) -> Self {
        match level {
            "panic" | "fatal" | "error" => Self::Error,
            "warning" => Self::Warn,
            "debug" => Self::Debug,
            _ => Self::Info,
        }
    }
}

/// One decoded output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    /// A JSON log record.
    Structured {
        /// Mapped severity.
        level: LogLevel,
        /// The `msg` field.
        message: String,
        /// Remaining fields as space-separated `key=value` pairs.
        details: String,
    },
    /// A line that is not a JSON object.
    Raw(String),
}

impl LogLine {
    /// Text as it is logged: message followed by details.
    pub fn text(&self) -> String {
        match self {
            Self::Structured {
                message, details, ..
            } if details.is_empty() => message.clone(),
            Self::Structured {
                message, details, ..
            } => format!("{} {}", message, details),
            Self::Raw(line) => line.clone(),
        }
    }
}

/// Decode a single output line.
pub fn decode_line(line: &str) -> LogLine {
    let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(line) else {
        return LogLine::Raw(line.to_string());
    };

    let message = fields.remove("msg").map(value_text).unwrap_or_default();
    let level = fields
        .remove("level")
        .map(value_text)
        .unwrap_or_default();
    fields.remove("time");

    LogLine::Structured {
        level: LogLevel::from_engine(&level),
        message,
        details: join_details(&fields),
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn join_details(fields: &Map<String, Value>) -> String {
    fields
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode `line` and emit it as a tracing event tagged with `logger`.
pub fn forward_line(logger: &str, line: &str) {
    let decoded = decode_line(line);
    let text = decoded.text();
    match decoded {
        LogLine::Structured {
            level: LogLevel::Error,
            ..
        } => error!(target: LOG_TARGET, logger = %logger, "{}", text),
        LogLine::Structured {
            level: LogLevel::Warn,
            ..
        } => warn!(target: LOG_TARGET, logger = %logger, "{}", text),
        LogLine::Structured {
            level: LogLevel::Debug,
            ..
        } => debug!(target: LOG_TARGET, logger = %logger, "{}", text),
        LogLine::Structured { .. } | LogLine::Raw(_) => {
            info!(target: LOG_TARGET, logger = %logger, "{}", text)
        }
    }
}

/// Read one line into `buf`, stopping after `max` bytes if no newline came first.
///
/// Returns the number of bytes read; 0 at end of stream.
pub fn read_capped_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> io::Result<usize> {
    reader.take(max as u64).read_until(b'\n', buf)
}

/// Read `reader` line by line on a background thread, forwarding every line.
///
/// The thread ends when the stream closes, which may be after the engine
/// itself exited if a descendant still holds the pipe. Nobody joins it.
/// Invalid UTF-8 is replaced rather than dropped, and lines longer than
/// [`MAX_LINE_BYTES`] are forwarded in pieces.
pub fn pump<R>(reader: R, logger: String) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match read_capped_line(&mut reader, &mut buf, MAX_LINE_BYTES) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    if !line.is_empty() {
                        forward_line(&logger, line);
                    }
                }
                Err(e) => {
                    debug!(logger = %logger, error = %e, "Engine output stream closed");
                    break;
                }
            }
        }
    })
}

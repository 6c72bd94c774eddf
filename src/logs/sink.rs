//! Log Sink Contract
//!
//! An append-only stream of newline-terminated lines addressed by byte
//! offset. Writers append whole lines; readers ask for "everything since
//! position P" and get back the complete lines plus the position to use
//! next time. Reads are never destructive and never wait for data.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte offset into a log sink. Zero is the beginning of the log.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LogPosition(u64);

impl LogPosition {
    /// The beginning of the log.
    pub const START: LogPosition = LogPosition(0);

    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Position `bytes` further along.
    pub fn advance(self, bytes: usize) -> Self {
        Self(self.0 + bytes as u64)
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lines read from a sink and the position following the last of them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogChunk {
    pub lines: Vec<String>,
    pub position: LogPosition,
}

impl LogChunk {
    /// A caught-up read: nothing new since `position`.
    pub fn empty(position: LogPosition) -> Self {
        Self {
            lines: Vec::new(),
            position,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Errors raised by log sinks.
#[derive(Debug, Error)]
pub enum LogError {
    /// The position no longer matches the log contents, typically because
    /// the log was truncated or rotated underneath the reader.
    #[error("log position {position} is no longer valid: {reason}")]
    Rotated { position: LogPosition, reason: String },

    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogError {
    pub(crate) fn rotated(position: LogPosition, reason: impl Into<String>) -> Self {
        Self::Rotated {
            position,
            reason: reason.into(),
        }
    }

    pub fn is_rotated(&self) -> bool {
        matches!(self, Self::Rotated { .. })
    }
}

/// A position-addressable, append-only line log shared by concurrent runs.
///
/// Implementations serialize appends so a reader never observes a partial
/// line written through `append`, and let any number of readers track
/// their own positions independently.
pub trait LogSink: Send + Sync {
    /// Appends `text` as one or more lines and returns the new end position.
    fn append(&self, text: &str) -> Result<LogPosition, LogError>;

    /// Returns the current end of the log.
    fn end_position(&self) -> Result<LogPosition, LogError>;

    /// Returns the complete lines written at or after `position`.
    ///
    /// A caught-up reader gets an empty chunk carrying the same position.
    fn read_from(&self, position: LogPosition) -> Result<LogChunk, LogError>;
}

/// Normalizes appended text into newline-terminated lines.
pub(crate) fn encode_lines(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len() + 1);
    for line in text.lines() {
        encoded.push_str(line);
        encoded.push('\n');
    }
    encoded
}

/// Splits `bytes` into complete lines.
///
/// Returns the lines and the number of bytes they span; a trailing
/// partial line is left for the next read.
pub(crate) fn complete_lines(bytes: &[u8]) -> (Vec<String>, usize) {
    let Some(last_newline) = bytes.iter().rposition(|b| *b == b'\n') else {
        return (Vec::new(), 0);
    };
    let consumed = last_newline + 1;

    let lines = bytes[..last_newline]
        .split(|b| *b == b'\n')
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            String::from_utf8_lossy(line).into_owned()
        })
        .collect();

    (lines, consumed)
}

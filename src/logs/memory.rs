//! In-Memory Log Sink
//!
//! Keeps the log in a string buffer behind a read/write lock. Positions
//! stay monotonic across `rotate()`: the discarded bytes move the base
//! offset forward, and readers still pointing into discarded data get a
//! rotation error instead of someone else's lines.

use std::sync::{PoisonError, RwLock};

use super::sink::{complete_lines, encode_lines, LogChunk, LogError, LogPosition, LogSink};

#[derive(Debug, Default)]
struct Buffer {
    /// Bytes discarded by earlier rotations
    base: u64,
    data: String,
}

impl Buffer {
    fn end(&self) -> LogPosition {
        LogPosition::new(self.base).advance(self.data.len())
    }
}

/// Log sink held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    buffer: RwLock<Buffer>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards everything written so far.
    ///
    /// The end position is unchanged; reads from earlier positions fail
    /// with [`LogError::Rotated`].
    pub fn rotate(&self) {
        let mut buffer = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
        buffer.base += buffer.data.len() as u64;
        buffer.data.clear();
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, text: &str) -> Result<LogPosition, LogError> {
        let encoded = encode_lines(text);
        let mut buffer = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
        buffer.data.push_str(&encoded);
        Ok(buffer.end())
    }

    fn end_position(&self) -> Result<LogPosition, LogError> {
        let buffer = self.buffer.read().unwrap_or_else(PoisonError::into_inner);
        Ok(buffer.end())
    }

    fn read_from(&self, position: LogPosition) -> Result<LogChunk, LogError> {
        let buffer = self.buffer.read().unwrap_or_else(PoisonError::into_inner);

        if position.as_u64() < buffer.base {
            return Err(LogError::rotated(position, "data was discarded by rotation"));
        }
        if position > buffer.end() {
            return Err(LogError::rotated(
                position,
                format!("log ends at {}", buffer.end()),
            ));
        }

        let offset = (position.as_u64() - buffer.base) as usize;
        let bytes = buffer.data.as_bytes();

        if offset > 0 && bytes[offset - 1] != b'\n' {
            return Err(LogError::rotated(position, "not on a line boundary"));
        }

        let (lines, consumed) = complete_lines(&bytes[offset..]);
        Ok(LogChunk {
            lines,
            position: position.advance(consumed),
        })
    }
}

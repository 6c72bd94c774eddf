//! Shared Run Log
//!
//! One append-only log per process, written by every run and read by
//! pollers from positions they track themselves.
//!
//! - [`sink`]: The `LogSink` contract, positions and errors
//! - [`memory`]: In-memory sink
//! - [`file`]: File-backed sink
//! - [`writer`]: Task-tagged writer handed to runs
//! - [`tail`]: Incremental reader for pollers

pub mod file;
pub mod memory;
pub mod sink;
pub mod tail;
pub mod writer;

pub use file::FileLogSink;
pub use memory::MemoryLogSink;
pub use sink::{LogChunk, LogError, LogPosition, LogSink};
pub use tail::LogTail;
pub use writer::{task_tag, TaskLogger};

//! Per-Run Log Writer
//!
//! All runs share one sink, so every line a run writes is tagged with a
//! timestamp and the short form of its task id:
//!
//! ```text
//! [2026-10-18 14:02:11] [3f2a9c1e] Step 1/3: fetch
//! ```

use std::sync::Arc;

use chrono::Utc;
use log::warn;

use crate::task::TaskId;

use super::sink::LogSink;

/// Tag identifying a task's lines in the shared log.
pub fn task_tag(task_id: &TaskId) -> String {
    format!("[{}]", task_id.short())
}

/// Returns true if `line` was written by the logger carrying `tag`.
///
/// The tag sits right after the timestamp; the same text elsewhere in the
/// message does not count.
pub(crate) fn has_tag(line: &str, tag: &str) -> bool {
    line.split_once("] ")
        .map_or(false, |(_, rest)| rest.starts_with(tag))
}

/// Writes a run's progress into the shared sink.
#[derive(Clone)]
pub struct TaskLogger {
    sink: Arc<dyn LogSink>,
    task_id: TaskId,
    tag: String,
}

impl TaskLogger {
    pub fn new(sink: Arc<dyn LogSink>, task_id: TaskId) -> Self {
        let tag = task_tag(&task_id);
        Self { sink, task_id, tag }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Appends one tagged line per line of `message`.
    ///
    /// A failed append is reported through `log` and does not fail the run.
    pub fn info(&self, message: impl AsRef<str>) {
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let text: String = message
            .as_ref()
            .lines()
            .map(|line| format!("[{}] {} {}\n", stamp, self.tag, line))
            .collect();

        if text.is_empty() {
            return;
        }

        if let Err(e) = self.sink.append(&text) {
            warn!("Failed to write log line for task {}: {}", self.task_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{LogPosition, MemoryLogSink};

    #[test]
    fn test_task_tag_uses_short_id() {
        let id = TaskId::from("0123456789abcdef");
        assert_eq!(task_tag(&id), "[01234567]");
    }

    #[test]
    fn test_lines_are_tagged() {
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());
        let logger = TaskLogger::new(Arc::clone(&sink), TaskId::from("abcdefgh-ijkl"));

        logger.info("hello");

        let chunk = sink.read_from(LogPosition::START).unwrap();
        assert_eq!(chunk.lines.len(), 1);
        assert!(chunk.lines[0].starts_with('['));
        assert!(chunk.lines[0].contains("[abcdefgh] hello"));
    }

    #[test]
    fn test_multiline_message_tags_every_line() {
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());
        let logger = TaskLogger::new(Arc::clone(&sink), TaskId::from("abcdefgh"));

        logger.info("first\nsecond");

        let chunk = sink.read_from(LogPosition::START).unwrap();
        assert_eq!(chunk.lines.len(), 2);
        assert!(chunk.lines.iter().all(|l| l.contains("[abcdefgh]")));
    }

    #[test]
    fn test_empty_message_writes_nothing() {
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());
        let logger = TaskLogger::new(Arc::clone(&sink), TaskId::from("abcdefgh"));

        logger.info("");
        assert_eq!(sink.end_position().unwrap(), LogPosition::START);
    }
}

//! Log Tailing
//!
//! Poller-side cursor over a shared sink. Each call to [`LogTail::poll`]
//! returns whatever was appended since the previous call and advances
//! the cursor; nothing is ever returned twice.

use std::sync::Arc;

use crate::task::TaskId;

use super::sink::{LogError, LogPosition, LogSink};
use super::writer::{has_tag, task_tag};

/// Incremental reader with its own position.
pub struct LogTail {
    sink: Arc<dyn LogSink>,
    position: LogPosition,
    tag: Option<String>,
}

impl LogTail {
    /// Starts tailing at `position`.
    pub fn new(sink: Arc<dyn LogSink>, position: LogPosition) -> Self {
        Self {
            sink,
            position,
            tag: None,
        }
    }

    /// Keeps only lines written by the given task's logger.
    pub fn only_task(mut self, task_id: &TaskId) -> Self {
        self.tag = Some(task_tag(task_id));
        self
    }

    pub fn position(&self) -> LogPosition {
        self.position
    }

    /// Returns new lines since the last poll.
    pub fn poll(&mut self) -> Result<Vec<String>, LogError> {
        let chunk = self.sink.read_from(self.position)?;
        self.position = chunk.position;

        let lines = match &self.tag {
            Some(tag) => chunk
                .lines
                .into_iter()
                .filter(|line| has_tag(line, tag))
                .collect(),
            None => chunk.lines,
        };

        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{MemoryLogSink, TaskLogger};

    #[test]
    fn test_poll_advances() {
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());
        let mut tail = LogTail::new(Arc::clone(&sink), LogPosition::START);

        sink.append("one").unwrap();
        assert_eq!(tail.poll().unwrap(), vec!["one"]);
        assert!(tail.poll().unwrap().is_empty());

        sink.append("two").unwrap();
        assert_eq!(tail.poll().unwrap(), vec!["two"]);
        assert_eq!(tail.position(), sink.end_position().unwrap());
    }

    #[test]
    fn test_tail_from_captured_position() {
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());
        sink.append("before").unwrap();

        let mut tail = LogTail::new(Arc::clone(&sink), sink.end_position().unwrap());
        sink.append("after").unwrap();

        assert_eq!(tail.poll().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_only_task_filters_interleaved_output() {
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());
        let a = TaskId::from("aaaaaaaa-1111");
        let b = TaskId::from("bbbbbbbb-2222");

        let log_a = TaskLogger::new(Arc::clone(&sink), a.clone());
        let log_b = TaskLogger::new(Arc::clone(&sink), b);

        log_a.info("from a");
        log_b.info("from b");
        log_a.info("again a");

        let mut tail = LogTail::new(Arc::clone(&sink), LogPosition::START).only_task(&a);
        let lines = tail.poll().unwrap();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("from a"));
        assert!(lines[1].ends_with("again a"));
        assert_eq!(tail.position(), sink.end_position().unwrap());
    }

    #[test]
    fn test_only_task_ignores_tag_inside_other_messages() {
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());
        let a = TaskId::from("aaaaaaaa-1111");
        let b = TaskId::from("bbbbbbbb-2222");

        let log_a = TaskLogger::new(Arc::clone(&sink), a.clone());
        let log_b = TaskLogger::new(Arc::clone(&sink), b);

        log_b.info("waiting on [aaaaaaaa] to finish");
        log_a.info("own line");
        sink.append("[aaaaaaaa] untagged external line").unwrap();

        let mut tail = LogTail::new(Arc::clone(&sink), LogPosition::START).only_task(&a);
        let lines = tail.poll().unwrap();

        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("own line"));
    }

    #[test]
    fn test_poll_surfaces_rotation() {
        let memory = Arc::new(MemoryLogSink::new());
        let sink: Arc<dyn LogSink> = memory.clone();
        sink.append("x").unwrap();

        let mut tail = LogTail::new(Arc::clone(&sink), LogPosition::START);
        memory.rotate();

        assert!(tail.poll().unwrap_err().is_rotated());
    }
}

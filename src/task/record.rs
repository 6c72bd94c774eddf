//! Task Records
//!
//! The tracked state of one run: status, result or error, and the
//! timestamps of its lifecycle. Status only moves forward
//! (`Pending -> Running -> terminal`) and the first terminal write wins.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::logs::LogPosition;

/// Length of the abbreviated id used to tag log lines.
const SHORT_ID_LEN: usize = 8;

/// Opaque identifier of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used as the per-line tag in the shared log.
    pub fn short(&self) -> &str {
        self.0.get(..SHORT_ID_LEN).unwrap_or(&self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, not yet picked up by the runtime
    Pending,
    /// The workflow runner is executing
    Running,
    /// Finished normally with a result
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped at a checkpoint after a cancel request
    Cancelled,
}

impl TaskStatus {
    /// Returns the lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true when no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a task, as returned by status queries.
///
/// `result` is present only for `Completed`, `error` only for `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub task_id: TaskId,
    pub workflow: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub log_position: LogPosition,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Mutable state of a single run.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    task_id: TaskId,
    workflow: String,
    status: TaskStatus,
    result: Option<Value>,
    error: Option<String>,
    log_position: LogPosition,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Creates a pending record.
    pub fn new(task_id: TaskId, workflow: impl Into<String>, log_position: LogPosition) -> Self {
        Self {
            task_id,
            workflow: workflow.into(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            log_position,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Moves a pending record to `Running`. Returns false otherwise.
    pub fn mark_running(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Records a successful result. Dropped if already terminal.
    pub fn complete(&mut self, result: Value) -> bool {
        if !self.finish(TaskStatus::Completed) {
            return false;
        }
        self.result = Some(result);
        true
    }

    /// Records a failure. Dropped if already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.finish(TaskStatus::Failed) {
            return false;
        }
        let error = error.into();
        self.error = Some(if error.trim().is_empty() {
            "unknown error".to_string()
        } else {
            error
        });
        true
    }

    /// Records a cancellation. Dropped if already terminal.
    pub fn mark_cancelled(&mut self) -> bool {
        self.finish(TaskStatus::Cancelled)
    }

    fn finish(&mut self, status: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Returns a copy of the externally visible state.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            task_id: self.task_id.clone(),
            workflow: self.workflow.clone(),
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            log_position: self.log_position,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Shared handle to a record owned by the registry.
#[derive(Debug, Clone)]
pub struct TaskRecordHandle(Arc<Mutex<TaskRecord>>);

impl TaskRecordHandle {
    pub fn new(record: TaskRecord) -> Self {
        Self(Arc::new(Mutex::new(record)))
    }

    fn lock(&self) -> MutexGuard<'_, TaskRecord> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with exclusive access to the record.
    pub fn with<R>(&self, f: impl FnOnce(&mut TaskRecord) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn status(&self) -> TaskStatus {
        self.lock().status()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().snapshot()
    }
}

//! Task Registry
//!
//! Process-wide table of runs, keyed by task id. Every run owns a
//! record (kept after the run finishes, until pruned) and, while it is
//! active, a cancellation handle and the join handle of its tokio task.
//!
//! Lock order is registry first, then record. The registry lock is never
//! requested while a record lock is held, and never held across `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use log::debug;
use tokio::task::JoinHandle;

use crate::error::ServiceError;
use crate::logs::LogPosition;

use super::cancel::CancellationHandle;
use super::record::{StatusSnapshot, TaskId, TaskRecord, TaskRecordHandle};

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The signal was set; the run stops at its next checkpoint
    Accepted,
    /// The run had already finished; nothing changed
    AlreadyTerminal,
    /// No run with this id is known
    NotFound,
}

impl CancelOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::AlreadyTerminal => "already_terminal",
            Self::NotFound => "not_found",
        }
    }
}

/// Bookkeeping for a run that has not reached a terminal state.
struct ActiveRun {
    cancel: CancellationHandle,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct RegistryInner {
    records: HashMap<TaskId, TaskRecordHandle>,
    active: HashMap<TaskId, ActiveRun>,
}

/// Shared table of task records and cancellation handles.
#[derive(Default)]
pub struct TaskRegistry {
    inner: Mutex<RegistryInner>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the record and cancellation handle for a new run.
    pub fn register(
        &self,
        task_id: TaskId,
        workflow: &str,
        log_position: LogPosition,
    ) -> Result<(TaskRecordHandle, CancellationHandle), ServiceError> {
        let mut inner = self.lock();

        if inner.records.contains_key(&task_id) {
            return Err(ServiceError::DuplicateTask(task_id));
        }

        let record = TaskRecordHandle::new(TaskRecord::new(task_id.clone(), workflow, log_position));
        let cancel = CancellationHandle::new();

        inner.records.insert(task_id.clone(), record.clone());
        inner.active.insert(
            task_id,
            ActiveRun {
                cancel: cancel.clone(),
                handle: None,
            },
        );

        Ok((record, cancel))
    }

    /// Stores the join handle of a scheduled run.
    ///
    /// Returns false when the run already finished, in which case the
    /// handle is simply dropped (detaching the completed task).
    pub fn attach(&self, task_id: &TaskId, handle: JoinHandle<()>) -> bool {
        match self.lock().active.get_mut(task_id) {
            Some(active) => {
                active.handle = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Returns the record handle for a task.
    pub fn lookup(&self, task_id: &TaskId) -> Option<TaskRecordHandle> {
        self.lock().records.get(task_id).cloned()
    }

    /// Returns the current snapshot of a task.
    pub fn snapshot(&self, task_id: &TaskId) -> Result<StatusSnapshot, ServiceError> {
        self.lookup(task_id)
            .map(|record| record.snapshot())
            .ok_or_else(|| ServiceError::NotFound(task_id.clone()))
    }

    /// Signals cancellation to an active run.
    pub fn cancel(&self, task_id: &TaskId) -> CancelOutcome {
        let inner = self.lock();

        let Some(active) = inner.active.get(task_id) else {
            return if inner.records.contains_key(task_id) {
                CancelOutcome::AlreadyTerminal
            } else {
                CancelOutcome::NotFound
            };
        };

        // The run may have written its terminal status but not yet
        // called on_terminal.
        let terminal = inner
            .records
            .get(task_id)
            .map(|record| record.status().is_terminal())
            .unwrap_or(false);

        if terminal {
            return CancelOutcome::AlreadyTerminal;
        }

        active.cancel.cancel();
        CancelOutcome::Accepted
    }

    /// Drops the cancellation handle and join handle of a finished run,
    /// keeping its record. Returns false if the run was not active.
    pub fn on_terminal(&self, task_id: &TaskId) -> bool {
        let removed = self.lock().active.remove(task_id);
        if removed.is_none() {
            debug!("on_terminal for inactive task {}", task_id);
        }
        removed.is_some()
    }

    /// Returns snapshots of every known task, oldest first.
    pub fn list(&self) -> Vec<StatusSnapshot> {
        let records: Vec<TaskRecordHandle> = self.lock().records.values().cloned().collect();
        let mut snapshots: Vec<StatusSnapshot> =
            records.iter().map(|record| record.snapshot()).collect();
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    /// Number of runs that have not reached a terminal state.
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Number of records held, active or finished.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts finished records whose run ended more than `older_than` ago.
    ///
    /// Evicted ids report `NotFound` afterwards. Returns the number of
    /// records removed.
    pub fn prune_finished(&self, older_than: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(older_than) else {
            return 0;
        };
        let cutoff = Utc::now() - age;

        let mut inner = self.lock();
        let RegistryInner { records, active } = &mut *inner;
        let before = records.len();

        records.retain(|task_id, record| {
            if active.contains_key(task_id) {
                return true;
            }
            record.with(|r| r.finished_at().map_or(true, |at| at > cutoff))
        });

        before - records.len()
    }

    /// Signals every active run and takes their join handles.
    ///
    /// Entries stay registered; each run still removes itself through
    /// `on_terminal` when it observes the signal.
    pub fn cancel_all(&self) -> Vec<JoinHandle<()>> {
        let mut inner = self.lock();
        inner
            .active
            .values_mut()
            .filter_map(|active| {
                active.cancel.cancel();
                active.handle.take()
            })
            .collect()
    }
}

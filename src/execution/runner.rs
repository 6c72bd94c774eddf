//! Workflow Runner Contract
//!
//! The executor does not know how a workflow is performed. It hands an
//! opaque reference, the caller's inputs and a [`RunContext`] to a
//! [`WorkflowRunner`] and turns the returned value or error into the
//! task's terminal status.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::logs::TaskLogger;
use crate::task::{CancellationHandle, TaskId};

/// Inputs supplied when starting a run.
pub type WorkflowInputs = Map<String, Value>;

/// How a run ended, if not successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// The run observed a cancel request at a checkpoint and stopped
    #[error("run cancelled")]
    Cancelled,

    /// The run failed; the message is stored as the task's error
    #[error("{0}")]
    Failed(String),
}

impl RunError {
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}

/// Everything a runner gets from the executor for one run.
#[derive(Clone)]
pub struct RunContext {
    task_id: TaskId,
    cancel: CancellationHandle,
    log: TaskLogger,
}

impl RunContext {
    pub fn new(task_id: TaskId, cancel: CancellationHandle, log: TaskLogger) -> Self {
        Self {
            task_id,
            cancel,
            log,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Writes a line to the shared run log.
    pub fn log(&self, message: impl AsRef<str>) {
        self.log.info(message);
    }

    pub fn logger(&self) -> &TaskLogger {
        &self.log
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancel
    }

    /// Checkpoint; call between steps and return the error with `?`.
    pub fn checkpoint(&self) -> Result<(), RunError> {
        self.cancel.checkpoint()
    }
}

/// Something that can perform workflows.
///
/// Implementations must call [`RunContext::checkpoint`] at least once per
/// discrete step so cancel requests are honoured, and should report
/// progress through [`RunContext::log`].
#[async_trait]
pub trait WorkflowRunner: Send + Sync + 'static {
    /// Accepts or rejects a workflow reference before a run is scheduled.
    fn check_reference(&self, workflow_ref: &str) -> Result<(), String>;

    /// Performs the workflow and returns its result.
    async fn run(
        &self,
        workflow_ref: &str,
        inputs: WorkflowInputs,
        ctx: RunContext,
    ) -> Result<Value, RunError>;
}

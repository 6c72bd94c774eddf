//! Workflow Executor
//!
//! Starts workflow runs as independent tokio tasks and publishes their
//! outcome into the task registry:
//! - `start` returns immediately with the task id and the log position
//!   captured before the run was scheduled
//! - the run checks for cancellation before it starts, then hands control
//!   to the workflow runner
//! - the runner's value, error or cancellation becomes the terminal status
//! - a completion guard records a terminal status and releases the
//!   registry entry exactly once, even if the run panics or is dropped

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::error::ServiceError;
use crate::logs::{LogChunk, LogPosition, LogSink, TaskLogger};
use crate::task::{
    CancelOutcome, CancellationHandle, StatusSnapshot, TaskId, TaskRecordHandle, TaskRegistry,
    TaskStatus,
};

use super::runner::{RunContext, RunError, WorkflowInputs, WorkflowRunner};

/// Executor tuning.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// How long finished task records stay queryable. `None` keeps them
    /// for the life of the process, so the registry only grows unless
    /// [`Executor::prune`] is called.
    pub retention: Option<Duration>,
}

/// Returned by [`Executor::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedRun {
    pub task_id: TaskId,
    pub workflow: String,
    /// End of the shared log when the run was accepted; tail from here to
    /// see only output produced after the start.
    pub log_position: LogPosition,
}

/// Combined log and status poll result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskProgress {
    pub lines: Vec<String>,
    pub position: LogPosition,
    /// `None` when the task id is unknown
    pub status: Option<StatusSnapshot>,
}

/// Launches and tracks workflow runs.
///
/// Cloning is cheap; clones share the registry, sink and runner.
///
/// # Example
///
/// ```rust,ignore
/// let executor = Executor::new(runner, sink);
/// let started = executor.start("greet", inputs)?;
///
/// let snapshot = executor.status(&started.task_id)?;
/// let chunk = executor.read_logs(started.log_position)?;
/// executor.cancel(&started.task_id);
/// ```
#[derive(Clone)]
pub struct Executor {
    registry: Arc<TaskRegistry>,
    sink: Arc<dyn LogSink>,
    runner: Arc<dyn WorkflowRunner>,
    config: ExecutorConfig,
}

impl Executor {
    /// Creates an executor with an empty registry and no retention.
    ///
    /// Finished records are kept until pruned. A long-lived executor should
    /// set [`ExecutorConfig::retention`] or call [`Executor::prune`].
    pub fn new(runner: Arc<dyn WorkflowRunner>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::new()),
            sink,
            runner,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Schedules a run of `workflow_ref` and returns without waiting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        workflow_ref: &str,
        inputs: WorkflowInputs,
    ) -> Result<StartedRun, ServiceError> {
        self.runner
            .check_reference(workflow_ref)
            .map_err(|reason| ServiceError::InvalidReference {
                workflow: workflow_ref.to_string(),
                reason,
            })?;

        if let Some(retention) = self.config.retention {
            let pruned = self.registry.prune_finished(retention);
            if pruned > 0 {
                debug!("Pruned {} finished task records", pruned);
            }
        }

        let log_position = self.sink.end_position()?;
        let task_id = TaskId::generate();
        let (record, cancel) = self
            .registry
            .register(task_id.clone(), workflow_ref, log_position)?;

        let run = ScheduledRun {
            task_id: task_id.clone(),
            workflow: workflow_ref.to_string(),
            inputs,
            record,
            cancel,
            registry: Arc::clone(&self.registry),
            sink: Arc::clone(&self.sink),
            runner: Arc::clone(&self.runner),
        };

        let handle = tokio::spawn(run.execute());
        self.registry.attach(&task_id, handle);

        info!(
            "Workflow '{}' accepted as task {} (log position {})",
            workflow_ref, task_id, log_position
        );

        Ok(StartedRun {
            task_id,
            workflow: workflow_ref.to_string(),
            log_position,
        })
    }

    /// Returns the current state of a task.
    pub fn status(&self, task_id: &TaskId) -> Result<StatusSnapshot, ServiceError> {
        self.registry.snapshot(task_id)
    }

    /// Asks a run to stop at its next checkpoint.
    pub fn cancel(&self, task_id: &TaskId) -> CancelOutcome {
        let outcome = self.registry.cancel(task_id);
        match outcome {
            CancelOutcome::Accepted => info!("Cancellation requested for task {}", task_id),
            CancelOutcome::AlreadyTerminal => {
                info!("Task {} already finished; cancel ignored", task_id)
            }
            CancelOutcome::NotFound => debug!("Cancel for unknown task {}", task_id),
        }
        outcome
    }

    /// Reads the shared log from `position`.
    pub fn read_logs(&self, position: LogPosition) -> Result<LogChunk, ServiceError> {
        Ok(self.sink.read_from(position)?)
    }

    /// Reads the shared log and the task's status in one call.
    ///
    /// Status is taken first, so once it reports a terminal state the
    /// returned lines include the run's final log line.
    pub fn poll(&self, task_id: &TaskId, position: LogPosition) -> Result<TaskProgress, ServiceError> {
        let status = self.registry.lookup(task_id).map(|record| record.snapshot());
        let chunk = self.sink.read_from(position)?;

        Ok(TaskProgress {
            lines: chunk.lines,
            position: chunk.position,
            status,
        })
    }

    /// Snapshots of all known tasks, oldest first.
    pub fn list(&self) -> Vec<StatusSnapshot> {
        self.registry.list()
    }

    /// Evicts finished records older than `older_than`.
    pub fn prune(&self, older_than: Duration) -> usize {
        self.registry.prune_finished(older_than)
    }

    /// Cancels every active run and waits for their tasks to finish.
    ///
    /// Runs that never reach another checkpoint keep this waiting.
    pub async fn shutdown(&self) {
        let handles = self.registry.cancel_all();
        info!("Shutting down: waiting for {} runs", handles.len());

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Run task ended abnormally: {}", e);
            }
        }
    }
}

/// A run that has been registered and is about to be spawned.
struct ScheduledRun {
    task_id: TaskId,
    workflow: String,
    inputs: WorkflowInputs,
    record: TaskRecordHandle,
    cancel: CancellationHandle,
    registry: Arc<TaskRegistry>,
    sink: Arc<dyn LogSink>,
    runner: Arc<dyn WorkflowRunner>,
}

impl ScheduledRun {
    async fn execute(self) {
        let ScheduledRun {
            task_id,
            workflow,
            inputs,
            record,
            cancel,
            registry,
            sink,
            runner,
        } = self;

        let logger = TaskLogger::new(sink, task_id.clone());
        let guard = RunGuard {
            task_id: task_id.clone(),
            workflow: workflow.clone(),
            record: record.clone(),
            registry,
            logger: logger.clone(),
            settled: false,
        };

        // Checkpoint before any work: a cancel that arrived while the run
        // was pending stops it here.
        if cancel.is_cancelled() {
            guard.finish(Err(RunError::Cancelled));
            return;
        }

        record.with(|r| r.mark_running());
        logger.info(format!("Workflow '{}' started", workflow));
        info!("Task {} running workflow '{}'", task_id, workflow);

        let ctx = RunContext::new(task_id, cancel, logger);
        let outcome = runner.run(&workflow, inputs, ctx).await;

        guard.finish(outcome);
    }
}

/// Completion hook tied to the lifetime of a spawned run.
///
/// `finish` records the outcome. If the guard is dropped without it (the
/// run panicked or its task was dropped) the run is recorded as failed.
/// Either way the registry entry is released exactly once.
struct RunGuard {
    task_id: TaskId,
    workflow: String,
    record: TaskRecordHandle,
    registry: Arc<TaskRegistry>,
    logger: TaskLogger,
    settled: bool,
}

impl RunGuard {
    fn finish(mut self, outcome: Result<Value, RunError>) {
        self.settle(outcome);
    }

    fn settle(&mut self, outcome: Result<Value, RunError>) {
        self.settled = true;

        let current = self.record.status();
        if current.is_terminal() {
            debug!(
                "Dropping outcome for task {}: already {}",
                self.task_id, current
            );
        } else {
            self.publish(outcome);
        }

        self.registry.on_terminal(&self.task_id);
    }

    fn publish(&self, outcome: Result<Value, RunError>) {
        // The log line goes out before the status so a poller that sees
        // the terminal status also finds the line.
        let written = match outcome {
            Ok(result) => {
                self.logger
                    .info(format!("Workflow '{}' completed", self.workflow));
                info!("Task {} completed", self.task_id);
                self.record.with(|r| r.complete(result))
            }
            Err(RunError::Cancelled) => {
                self.logger
                    .info(format!("Workflow '{}' cancelled", self.workflow));
                info!("Task {} cancelled", self.task_id);
                self.record.with(|r| r.mark_cancelled())
            }
            Err(RunError::Failed(message)) => {
                self.logger
                    .info(format!("Workflow '{}' failed: {}", self.workflow, message));
                error!("Task {} failed: {}", self.task_id, message);
                self.record.with(|r| r.fail(message))
            }
        };

        if !written {
            debug!("Terminal write for task {} lost a race", self.task_id);
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let reason = if std::thread::panicking() {
            "workflow run panicked"
        } else {
            "workflow run was aborted before completion"
        };
        error!("Task {}: {}", self.task_id, reason);
        self.settle(Err(RunError::Failed(reason.to_string())));
    }
}

/// Convenience for callers that only care whether a run succeeded.
pub fn is_success(snapshot: &StatusSnapshot) -> bool {
    snapshot.status == TaskStatus::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::MemoryLogSink;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio::time::{sleep, timeout};

    /// Scripted runner; behaviour is chosen by the workflow reference.
    #[derive(Default)]
    struct FakeRunner {
        gate: Notify,
        invocations: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowRunner for FakeRunner {
        fn check_reference(&self, workflow_ref: &str) -> Result<(), String> {
            if workflow_ref == "unknown" {
                Err("no such workflow".to_string())
            } else {
                Ok(())
            }
        }

        async fn run(
            &self,
            workflow_ref: &str,
            inputs: WorkflowInputs,
            ctx: RunContext,
        ) -> Result<Value, RunError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);

            match workflow_ref {
                "ok" => {
                    ctx.log("doing work");
                    Ok(json!({ "value": 42, "inputs": inputs }))
                }
                "fail" => {
                    ctx.log("about to fail");
                    Err(RunError::failed("boom"))
                }
                "gated" => {
                    self.gate.notified().await;
                    ctx.checkpoint()?;
                    Ok(json!("gate passed"))
                }
                "slow" => {
                    for i in 0..500 {
                        ctx.checkpoint()?;
                        ctx.log(format!("step {}", i));
                        sleep(Duration::from_millis(5)).await;
                    }
                    Ok(json!("slow done"))
                }
                "stubborn" => {
                    // No checkpoint: cancellation is never observed.
                    sleep(Duration::from_millis(50)).await;
                    Ok(json!("finished anyway"))
                }
                "panic" => panic!("kaboom"),
                other => Err(RunError::failed(format!("unexpected workflow {}", other))),
            }
        }
    }

    fn executor() -> (Executor, Arc<FakeRunner>) {
        let runner = Arc::new(FakeRunner::default());
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());
        (Executor::new(runner.clone(), sink), runner)
    }

    async fn wait_terminal(executor: &Executor, task_id: &TaskId) -> StatusSnapshot {
        timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = executor.status(task_id).unwrap();
                if snapshot.status.is_terminal() {
                    return snapshot;
                }
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("task should reach a terminal status")
    }

    async fn wait_idle(executor: &Executor) {
        timeout(Duration::from_secs(5), async {
            while executor.registry().active_count() > 0 {
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("registry should release all runs");
    }

    async fn wait_running(executor: &Executor, task_id: &TaskId) {
        timeout(Duration::from_secs(5), async {
            while executor.status(task_id).unwrap().status != TaskStatus::Running {
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("task should start running");
    }

    #[tokio::test]
    async fn test_start_returns_pending_task_and_position() {
        let (executor, _) = executor();
        executor.sink().append("earlier output").unwrap();
        let before = executor.sink().end_position().unwrap();

        let started = executor.start("ok", WorkflowInputs::new()).unwrap();

        assert_eq!(started.log_position, before);
        assert_eq!(started.workflow, "ok");
        let snapshot = executor.status(&started.task_id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Pending);
        assert_eq!(snapshot.log_position, before);
    }

    #[tokio::test]
    async fn test_successful_run_completes() {
        let (executor, _) = executor();
        let mut inputs = WorkflowInputs::new();
        inputs.insert("who".to_string(), json!("Ada"));

        let started = executor.start("ok", inputs).unwrap();
        let snapshot = wait_terminal(&executor, &started.task_id).await;

        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(snapshot.result.as_ref().unwrap()["value"], 42);
        assert_eq!(snapshot.result.as_ref().unwrap()["inputs"]["who"], "Ada");
        assert!(snapshot.error.is_none());
        assert!(snapshot.started_at.is_some());
        assert!(snapshot.finished_at.is_some());
        assert!(is_success(&snapshot));

        wait_idle(&executor).await;
    }

    #[tokio::test]
    async fn test_failing_run_records_error() {
        let (executor, _) = executor();
        let started = executor.start("fail", WorkflowInputs::new()).unwrap();
        let snapshot = wait_terminal(&executor, &started.task_id).await;

        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("boom"));
        assert!(snapshot.result.is_none());
        assert!(!is_success(&snapshot));
    }

    #[tokio::test]
    async fn test_invalid_reference_is_rejected() {
        let (executor, runner) = executor();
        let err = executor.start("unknown", WorkflowInputs::new()).unwrap_err();

        assert!(matches!(err, ServiceError::InvalidReference { .. }));
        assert!(executor.registry().is_empty());
        assert_eq!(runner.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let (executor, _) = executor();
        let err = executor.status(&TaskId::from("nonexistent-id")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            executor.cancel(&TaskId::from("nonexistent-id")),
            CancelOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_terminal_snapshot_is_stable() {
        let (executor, _) = executor();
        let started = executor.start("ok", WorkflowInputs::new()).unwrap();
        let first = wait_terminal(&executor, &started.task_id).await;

        sleep(Duration::from_millis(10)).await;
        let second = executor.status(&started.task_id).unwrap();
        let third = executor.status(&started.task_id).unwrap();

        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[tokio::test]
    async fn test_cancel_after_terminal_changes_nothing() {
        let (executor, _) = executor();
        let started = executor.start("fail", WorkflowInputs::new()).unwrap();
        let before = wait_terminal(&executor, &started.task_id).await;
        wait_idle(&executor).await;

        assert_eq!(
            executor.cancel(&started.task_id),
            CancelOutcome::AlreadyTerminal
        );
        assert_eq!(executor.status(&started.task_id).unwrap(), before);
    }

    #[tokio::test]
    async fn test_cancel_while_pending_skips_runner() {
        let (executor, runner) = executor();
        let started = executor.start("ok", WorkflowInputs::new()).unwrap();

        // The current-thread runtime has not polled the run yet.
        assert_eq!(executor.cancel(&started.task_id), CancelOutcome::Accepted);

        let snapshot = wait_terminal(&executor, &started.task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Cancelled);
        assert!(snapshot.error.is_none());
        assert!(snapshot.result.is_none());
        assert!(snapshot.started_at.is_none());
        assert_eq!(runner.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_one_run_leaves_other_untouched() {
        let (executor, runner) = executor();

        let a = executor.start("gated", WorkflowInputs::new()).unwrap();
        let b = executor.start("ok", WorkflowInputs::new()).unwrap();

        wait_running(&executor, &a.task_id).await;
        assert_eq!(executor.cancel(&a.task_id), CancelOutcome::Accepted);
        runner.gate.notify_one();

        let a_done = wait_terminal(&executor, &a.task_id).await;
        let b_done = wait_terminal(&executor, &b.task_id).await;

        assert_eq!(a_done.status, TaskStatus::Cancelled);
        assert!(a_done.error.is_none());
        assert_eq!(b_done.status, TaskStatus::Completed);
        assert_ne!(a.task_id, b.task_id);
        assert_eq!(executor.list().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_mid_run_stops_at_checkpoint() {
        let (executor, _) = executor();
        let started = executor.start("slow", WorkflowInputs::new()).unwrap();

        wait_running(&executor, &started.task_id).await;
        sleep(Duration::from_millis(20)).await;
        assert_eq!(executor.cancel(&started.task_id), CancelOutcome::Accepted);

        let snapshot = wait_terminal(&executor, &started.task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Cancelled);

        let logs = executor.read_logs(started.log_position).unwrap();
        assert!(logs.lines.iter().any(|l| l.contains("step 0")));
        assert!(!logs.lines.iter().any(|l| l.contains("step 499")));
        assert!(logs.lines.last().unwrap().ends_with("Workflow 'slow' cancelled"));
    }

    #[tokio::test]
    async fn test_cancel_is_best_effort_without_checkpoints() {
        let (executor, _) = executor();
        let started = executor.start("stubborn", WorkflowInputs::new()).unwrap();
        wait_running(&executor, &started.task_id).await;

        assert_eq!(executor.cancel(&started.task_id), CancelOutcome::Accepted);

        let snapshot = wait_terminal(&executor, &started.task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_panicking_run_is_failed() {
        let (executor, _) = executor();
        let started = executor.start("panic", WorkflowInputs::new()).unwrap();

        let snapshot = wait_terminal(&executor, &started.task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert!(snapshot.error.unwrap().contains("panicked"));
        wait_idle(&executor).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_run_reaches_terminal_status() {
        let (executor, _) = executor();

        let started: Vec<StartedRun> = (0..30)
            .map(|i| {
                let workflow = if i % 3 == 0 { "fail" } else { "ok" };
                executor.start(workflow, WorkflowInputs::new()).unwrap()
            })
            .collect();

        for run in &started {
            let snapshot = wait_terminal(&executor, &run.task_id).await;
            let expected = if run.workflow == "fail" {
                TaskStatus::Failed
            } else {
                TaskStatus::Completed
            };
            assert_eq!(snapshot.status, expected);
        }

        wait_idle(&executor).await;
        assert_eq!(executor.registry().len(), 30);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_incremental_reads_during_run_match_full_read() {
        let (executor, _) = executor();
        let started = executor.start("slow", WorkflowInputs::new()).unwrap();

        let mut position = LogPosition::START;
        let mut collected = Vec::new();

        for _ in 0..10 {
            let chunk = executor.read_logs(position).unwrap();
            assert!(chunk.position >= position);
            collected.extend(chunk.lines);
            position = chunk.position;
            sleep(Duration::from_millis(7)).await;
        }

        executor.cancel(&started.task_id);
        wait_terminal(&executor, &started.task_id).await;

        let rest = executor.read_logs(position).unwrap();
        collected.extend(rest.lines);

        let full = executor.read_logs(LogPosition::START).unwrap();
        assert_eq!(collected, full.lines);
        assert_eq!(rest.position, full.position);

        let again = executor.read_logs(full.position).unwrap();
        assert!(again.is_empty());
        assert_eq!(again.position, full.position);
    }

    #[tokio::test]
    async fn test_poll_reports_status_with_lines() {
        let (executor, _) = executor();
        let started = executor.start("ok", WorkflowInputs::new()).unwrap();
        wait_terminal(&executor, &started.task_id).await;

        let progress = executor.poll(&started.task_id, started.log_position).unwrap();
        let status = progress.status.unwrap();
        assert_eq!(status.status, TaskStatus::Completed);
        assert!(progress.lines.iter().any(|l| l.ends_with("doing work")));
        assert!(progress.lines.last().unwrap().ends_with("Workflow 'ok' completed"));

        let unknown = executor.poll(&TaskId::from("nope"), LogPosition::START).unwrap();
        assert!(unknown.status.is_none());
        assert!(!unknown.lines.is_empty());
    }

    #[tokio::test]
    async fn test_read_logs_after_rotation_fails() {
        let runner = Arc::new(FakeRunner::default());
        let memory = Arc::new(MemoryLogSink::new());
        let executor = Executor::new(runner, memory.clone());

        let started = executor.start("ok", WorkflowInputs::new()).unwrap();
        wait_terminal(&executor, &started.task_id).await;
        memory.rotate();

        let err = executor.read_logs(LogPosition::START).unwrap_err();
        assert!(matches!(err, ServiceError::Log(ref e) if e.is_rotated()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_cancels_active_runs() {
        let (executor, _) = executor();
        let first = executor.start("slow", WorkflowInputs::new()).unwrap();
        let second = executor.start("slow", WorkflowInputs::new()).unwrap();
        wait_running(&executor, &first.task_id).await;
        wait_running(&executor, &second.task_id).await;

        timeout(Duration::from_secs(5), executor.shutdown())
            .await
            .expect("shutdown should finish");

        assert_eq!(executor.status(&first.task_id).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(executor.status(&second.task_id).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(executor.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_retention_prunes_old_records_on_start() {
        let (executor, _) = executor();
        let executor = executor.with_config(ExecutorConfig {
            retention: Some(Duration::from_millis(5)),
        });

        let old = executor.start("ok", WorkflowInputs::new()).unwrap();
        wait_terminal(&executor, &old.task_id).await;
        wait_idle(&executor).await;
        sleep(Duration::from_millis(20)).await;

        let fresh = executor.start("ok", WorkflowInputs::new()).unwrap();

        assert!(executor.status(&old.task_id).unwrap_err().is_not_found());
        assert!(executor.status(&fresh.task_id).is_ok());
    }

    #[tokio::test]
    async fn test_finished_records_kept_until_pruned() {
        let (executor, _) = executor();
        assert!(executor.config.retention.is_none());

        let first = executor.start("ok", WorkflowInputs::new()).unwrap();
        wait_terminal(&executor, &first.task_id).await;
        wait_idle(&executor).await;
        sleep(Duration::from_millis(10)).await;

        let second = executor.start("ok", WorkflowInputs::new()).unwrap();
        wait_terminal(&executor, &second.task_id).await;
        wait_idle(&executor).await;
        assert!(executor.status(&first.task_id).is_ok());
        assert_eq!(executor.registry().len(), 2);

        assert_eq!(executor.prune(Duration::ZERO), 2);
        assert!(executor.registry().is_empty());
        assert!(executor.status(&second.task_id).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_dropped_guard_fails_run_once() {
        let registry = Arc::new(TaskRegistry::new());
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());
        let task_id = TaskId::from("guarded");
        let (record, _) = registry
            .register(task_id.clone(), "wf", LogPosition::START)
            .unwrap();

        {
            let _guard = RunGuard {
                task_id: task_id.clone(),
                workflow: "wf".to_string(),
                record: record.clone(),
                registry: Arc::clone(&registry),
                logger: TaskLogger::new(Arc::clone(&sink), task_id.clone()),
                settled: false,
            };
        }

        let snapshot = record.snapshot();
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert!(snapshot.error.unwrap().contains("aborted"));
        assert_eq!(registry.active_count(), 0);
    }
}

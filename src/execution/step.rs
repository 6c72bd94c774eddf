//! Command Runner
//!
//! Performs workflow definitions from a [`WorkflowCatalog`] as a sequence of
//! shell commands:
//! - Input placeholder substitution (`{name}`)
//! - One `bash -c` process per step, optionally in a working directory
//! - stdout and stderr streamed line by line into the run log
//! - A cancellation checkpoint before each step; a cancel that arrives
//!   while a step is running kills its process

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::logs::TaskLogger;
use crate::workflow::{Step, WorkflowCatalog};

use super::runner::{RunContext, RunError, WorkflowInputs, WorkflowRunner};

/// Runs catalog workflows as shell commands.
pub struct CommandRunner {
    catalog: Arc<WorkflowCatalog>,
    working_dir: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(catalog: Arc<WorkflowCatalog>) -> Self {
        Self {
            catalog,
            working_dir: None,
        }
    }

    /// Runs every step from `dir` instead of the process's current directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    /// Executes one step and returns its last non-empty stdout line.
    async fn run_step(
        &self,
        step: &Step,
        command_text: &str,
        ctx: &RunContext,
    ) -> Result<Option<String>, RunError> {
        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(command_text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
            debug!("Executing in directory: {}", dir.display());
        }

        let mut child = cmd.spawn().map_err(|e| {
            RunError::failed(format!("Step '{}' could not be started: {}", step.id, e))
        })?;

        let mut stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, ctx.logger().clone(), None)));
        let mut stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, ctx.logger().clone(), Some("stderr"))));

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| {
                RunError::failed(format!("Step '{}' could not be awaited: {}", step.id, e))
            })?,
            _ = ctx.cancellation().cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill step '{}': {}", step.id, e);
                }
                abort_readers([&stdout, &stderr]);
                return Err(RunError::Cancelled);
            }
        };

        // A process the step left in the background can hold the pipes
        // open after the shell exits.
        let drained = async {
            let last_line = match stdout.as_mut() {
                Some(reader) => reader.await.unwrap_or_default(),
                None => None,
            };
            if let Some(reader) = stderr.as_mut() {
                let _ = reader.await;
            }
            last_line
        };
        let last_line = tokio::select! {
            last_line = drained => Some(last_line),
            _ = ctx.cancellation().cancelled() => None,
        };
        let Some(last_line) = last_line else {
            debug!("Step '{}' cancelled while its output was still open", step.id);
            abort_readers([&stdout, &stderr]);
            return Err(RunError::Cancelled);
        };

        if status.success() {
            debug!("Step '{}' completed successfully", step.id);
            return Ok(last_line);
        }

        let reason = match status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        error!("Step '{}' failed with {}", step.id, reason);
        Err(RunError::failed(format!("Step '{}' failed with {}", step.id, reason)))
    }
}

#[async_trait]
impl WorkflowRunner for CommandRunner {
    fn check_reference(&self, workflow_ref: &str) -> Result<(), String> {
        if self.catalog.contains(workflow_ref) {
            Ok(())
        } else {
            Err(format!("Workflow '{}' not found", workflow_ref))
        }
    }

    async fn run(
        &self,
        workflow_ref: &str,
        inputs: WorkflowInputs,
        ctx: RunContext,
    ) -> Result<Value, RunError> {
        let workflow = self
            .catalog
            .get(workflow_ref)
            .ok_or_else(|| RunError::failed(format!("Workflow '{}' not found", workflow_ref)))?;

        let inputs = workflow.resolve_inputs(&inputs).map_err(RunError::Failed)?;
        let total = workflow.steps.len();
        let mut outputs = Map::new();

        for (index, step) in workflow.steps.iter().enumerate() {
            ctx.checkpoint()?;

            match &step.description {
                Some(description) => {
                    ctx.log(format!("Step {}/{}: {} ({})", index + 1, total, step.id, description))
                }
                None => ctx.log(format!("Step {}/{}: {}", index + 1, total, step.id)),
            }

            let command_text = render_command(&step.command, &inputs);
            debug!("Task {} step '{}': {}", ctx.task_id(), step.id, command_text);

            let last_line = self.run_step(step, &command_text, &ctx).await?;
            outputs.insert(
                step.id.clone(),
                last_line.map(Value::String).unwrap_or(Value::Null),
            );
        }

        // A cancel accepted during the last step must not end as completed.
        ctx.checkpoint()?;

        Ok(json!({
            "workflow": workflow.name,
            "steps": outputs,
        }))
    }
}

/// Replaces `{name}` with the input's value in a single pass.
///
/// Strings are inserted as-is, other values in their JSON form. Unknown
/// placeholders are left untouched, and inserted values are never
/// expanded again.
fn render_command(command: &str, inputs: &Map<String, Value>) -> String {
    let mut rendered = String::with_capacity(command.len());
    let mut rest = command;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find(|c| c == '{' || c == '}') {
            Some(close) if after[close..].starts_with('}') => {
                let name = &after[..close];
                match inputs.get(name) {
                    Some(Value::String(s)) => rendered.push_str(s),
                    Some(other) => rendered.push_str(&other.to_string()),
                    None => {
                        rendered.push('{');
                        rendered.push_str(name);
                        rendered.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                rendered.push('{');
                rest = after;
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

fn abort_readers(readers: [&Option<JoinHandle<Option<String>>>; 2]) {
    for reader in readers.into_iter().flatten() {
        reader.abort();
    }
}

/// Copies lines from a child pipe into the run log.
async fn forward_lines<R>(reader: R, logger: TaskLogger, label: Option<&'static str>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut last = None;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                match label {
                    Some(label) => logger.info(format!("{}: {}", label, line)),
                    None => logger.info(&line),
                }
                if !line.trim().is_empty() {
                    last = Some(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read step output for task {}: {}", logger.task_id(), e);
                break;
            }
        }
    }

    last
}

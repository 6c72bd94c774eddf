//! Workflow Execution Module
//!
//! Runs workflows in the background and tracks them until they finish.
//!
//! # Architecture
//!
//! - [`executor`]: Schedules runs, publishes outcomes, answers status and log queries
//! - [`runner`]: The contract between the executor and whatever performs a workflow
//! - [`step`]: Shell-command runner for catalog workflows

pub mod executor;
pub mod runner;
pub mod step;

pub use executor::{is_success, Executor, ExecutorConfig, StartedRun, TaskProgress};
pub use runner::{RunContext, RunError, WorkflowInputs, WorkflowRunner};
pub use step::CommandRunner;

//! FlowRunner - Background Workflow Execution Service
//!
//! Starts workflow runs without blocking the caller, lets callers poll
//! status and a shared run log by task id, and cancels runs cooperatively.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`task`]: Task records, the registry of runs, cancellation handles
//! - [`execution`]: The executor, the runner contract and the shell-command runner
//! - [`logs`]: The shared, position-addressed run log
//! - [`workflow`]: Workflow definitions and the catalog they are loaded into
//! - [`config`]: Service configuration
//! - [`error`]: Errors returned by the service surface
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use flowrunner::execution::{CommandRunner, Executor, WorkflowInputs};
//! use flowrunner::workflow::WorkflowCatalog;
//! use flowrunner::ServiceConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::from_env();
//!     let catalog = WorkflowCatalog::load_dir(&config.workflows_dir)?;
//!     let runner = Arc::new(CommandRunner::new(Arc::new(catalog)));
//!
//!     let executor = Executor::new(runner, config.open_sink()?)
//!         .with_config(config.executor_config());
//!
//!     let started = executor.start("greet", WorkflowInputs::new())?;
//!     println!("{}", executor.status(&started.task_id)?.status);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod logs;
pub mod task;
pub mod workflow;

// Re-export commonly used types
pub use config::ServiceConfig;
pub use error::ServiceError;
pub use execution::{Executor, StartedRun, WorkflowRunner};
pub use logs::{LogPosition, LogSink};
pub use task::{CancelOutcome, StatusSnapshot, TaskId, TaskStatus};
pub use workflow::parser::load_workflow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "FlowRunner";

//! Task Tracking Module
//!
//! State shared between the executor, pollers and cancel callers.
//!
//! - [`cancel`]: Cooperative cancellation handle
//! - [`record`]: Per-run status, result, error and timestamps
//! - [`registry`]: Table of records and active runs

pub mod cancel;
pub mod record;
pub mod registry;

pub use cancel::CancellationHandle;
pub use record::{StatusSnapshot, TaskId, TaskRecord, TaskRecordHandle, TaskStatus};
pub use registry::{CancelOutcome, TaskRegistry};

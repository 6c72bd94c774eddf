//! Workflow Definition Module
//!
//! Definitions executed by the bundled command runner.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Step, InputField, WorkflowDefinition)
//! - [`parser`]: YAML/JSON loading and validation
//! - [`catalog`]: Directory of definitions indexed by name

pub mod catalog;
pub mod model;
pub mod parser;

pub use catalog::WorkflowCatalog;
pub use model::{InputField, InputKind, Step, WorkflowDefinition};
pub use parser::{load_workflow, validate_workflow, WorkflowError};

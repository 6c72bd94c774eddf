//! Workflow Parser
//!
//! Loads workflow definitions from YAML or JSON files and checks that
//! they are runnable. JSON is accepted through the YAML parser.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use super::model::WorkflowDefinition;

/// Errors raised while loading workflow definitions.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid workflow '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Loads and validates a workflow definition file.
///
/// # Example
///
/// ```rust,no_run
/// use flowrunner::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("workflows/greet.yaml")?;
///     println!("Loaded {} steps", workflow.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: impl AsRef<Path>) -> Result<WorkflowDefinition, WorkflowError> {
    let path = path.as_ref();
    debug!("Loading workflow from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| WorkflowError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let workflow: WorkflowDefinition =
        serde_yaml::from_str(&content).map_err(|source| WorkflowError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    validate_workflow(&workflow)?;

    info!(
        "Loaded workflow '{}' ({} steps) from {}",
        workflow.name,
        workflow.steps.len(),
        path.display()
    );
    Ok(workflow)
}

/// Checks that a definition can be executed.
///
/// Collects every problem rather than stopping at the first one:
/// 1. The name is not empty
/// 2. There is at least one step
/// 3. Step ids are non-empty and unique
/// 4. Commands are non-empty
/// 5. Input names are non-empty and unique
pub fn validate_workflow(workflow: &WorkflowDefinition) -> Result<(), WorkflowError> {
    let mut problems = Vec::new();

    if workflow.name.trim().is_empty() {
        problems.push("workflow has no name".to_string());
    }

    if workflow.steps.is_empty() {
        problems.push("workflow has no steps".to_string());
    }

    let mut seen_steps = HashSet::new();
    for step in &workflow.steps {
        if step.id.trim().is_empty() {
            problems.push("step has empty id".to_string());
            continue;
        }
        if !seen_steps.insert(step.id.as_str()) {
            problems.push(format!("duplicate step id '{}'", step.id));
        }
        if step.command.trim().is_empty() {
            problems.push(format!("step '{}' has no command", step.id));
        }
    }

    let mut seen_inputs = HashSet::new();
    for field in &workflow.inputs {
        if field.name.trim().is_empty() {
            problems.push("input has empty name".to_string());
        } else if !seen_inputs.insert(field.name.as_str()) {
            problems.push(format!("duplicate input '{}'", field.name));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::Invalid {
            name: workflow.name.clone(),
            reason: problems.join("; "),
        })
    }
}

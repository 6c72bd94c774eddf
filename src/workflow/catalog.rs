//! Workflow Catalog
//!
//! The set of workflow definitions available to the command runner,
//! loaded from a directory and looked up by the `name` declared inside
//! each file (not by file name).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::model::WorkflowDefinition;
use super::parser::{load_workflow, WorkflowError};

/// File extensions considered workflow definitions.
const WORKFLOW_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Scratch files left behind by the recorder; never workflows.
const TEMP_RECORDING_PREFIX: &str = "temp_recording";

/// Workflow definitions indexed by name.
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    workflows: BTreeMap<String, WorkflowDefinition>,
}

impl WorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every workflow file in `dir`.
    ///
    /// Files that fail to parse or validate are skipped with a warning.
    /// When two files declare the same name, the first in file-name order
    /// wins.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| WorkflowError::Read {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_workflow_file(path))
            .collect();
        paths.sort();

        let mut catalog = Self::new();
        for path in paths {
            match load_workflow(&path) {
                Ok(workflow) => {
                    if catalog.contains(&workflow.name) {
                        warn!(
                            "Skipping {}: workflow '{}' already defined",
                            path.display(),
                            workflow.name
                        );
                        continue;
                    }
                    catalog.insert(workflow);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} workflows from {}", catalog.len(), dir.display());
        Ok(catalog)
    }

    /// Adds or replaces a definition.
    pub fn insert(&mut self, workflow: WorkflowDefinition) {
        self.workflows.insert(workflow.name.clone(), workflow);
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Workflow names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

impl FromIterator<WorkflowDefinition> for WorkflowCatalog {
    fn from_iter<I: IntoIterator<Item = WorkflowDefinition>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for workflow in iter {
            catalog.insert(workflow);
        }
        catalog
    }
}

fn is_workflow_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    let recording = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with(TEMP_RECORDING_PREFIX));

    let extension_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| WORKFLOW_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));

    extension_ok && !recording
}

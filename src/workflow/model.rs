//! Workflow Data Model
//!
//! Definitions consumed by the command runner: named inputs and an
//! ordered list of shell steps.
//!
//! # Example YAML Format
//!
//! ```yaml
//! name: greet
//! description: Say hello, then wait a bit
//! inputs:
//!   - name: who
//!     type: string
//!     required: true
//!   - name: pause
//!     type: number
//!     default: 1
//! steps:
//!   - id: hello
//!     command: echo "hello {who}"
//!   - id: wait
//!     command: sleep {pause}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default version for definitions that don't specify one.
fn default_version() -> String {
    "1.0".to_string()
}

/// One shell step of a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Step {
    /// Unique identifier within the workflow
    pub id: String,

    /// Human readable summary, shown in the run log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Command template; `{name}` is replaced by the input `name`
    pub command: String,
}

impl Step {
    /// Creates a step.
    ///
    /// # Example
    ///
    /// ```
    /// use flowrunner::workflow::Step;
    ///
    /// let step = Step::new("hello", "echo hello {who}")
    ///     .with_description("Greets someone");
    /// assert_eq!(step.id, "hello");
    /// ```
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            description: None,
            command: command.into().trim().to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Accepted value type of an input.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    String,
    Number,
    Boolean,
}

impl InputKind {
    /// Returns true if `value` has this type.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// A named input a workflow accepts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InputField {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: InputKind,

    #[serde(default)]
    pub required: bool,

    /// Used when the caller doesn't provide a value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl InputField {
    /// A required input of the given type.
    pub fn required(name: impl Into<String>, kind: InputKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    /// An optional input with a default value.
    pub fn optional(name: impl Into<String>, kind: InputKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: Some(default),
        }
    }
}

/// A complete workflow definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    /// Name used to start the workflow
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub inputs: Vec<InputField>,

    /// Steps, executed in order
    pub steps: Vec<Step>,
}

impl WorkflowDefinition {
    /// Creates an empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: default_version(),
            inputs: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Adds a step, rejecting duplicate ids.
    pub fn add_step(&mut self, step: Step) -> Result<(), String> {
        if self.steps.iter().any(|s| s.id == step.id) {
            return Err(format!("Step '{}' already exists", step.id));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Declares an input.
    pub fn with_input(mut self, field: InputField) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Checks `provided` against the declared inputs.
    ///
    /// Applies defaults, rejects missing required inputs and values of the
    /// wrong type. Undeclared inputs are passed through unchanged.
    pub fn resolve_inputs(&self, provided: &Map<String, Value>) -> Result<Map<String, Value>, String> {
        let mut resolved = provided.clone();

        for field in &self.inputs {
            match provided.get(&field.name) {
                Some(value) if !field.kind.matches(value) => {
                    return Err(format!(
                        "Input '{}' must be a {}, got {}",
                        field.name,
                        field.kind.as_str(),
                        value
                    ));
                }
                Some(_) => {}
                None => match &field.default {
                    Some(default) => {
                        resolved.insert(field.name.clone(), default.clone());
                    }
                    None if field.required => {
                        return Err(format!("Missing required input '{}'", field.name));
                    }
                    None => {}
                },
            }
        }

        Ok(resolved)
    }
}

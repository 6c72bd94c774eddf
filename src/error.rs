//! Service Errors
//!
//! Error types returned by the synchronous boundary operations of the
//! service (start, status, cancel, log reads). Failures that happen
//! inside a scheduled run never surface here; they are captured into
//! the task record and reported through status queries.

use thiserror::Error;

use crate::logs::LogError;
use crate::task::TaskId;

/// Errors reported directly to callers of the executor API.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No task with this identifier is known (never started, or pruned).
    #[error("task '{0}' not found")]
    NotFound(TaskId),

    /// The workflow runner refused the workflow reference at start time.
    #[error("invalid workflow reference '{workflow}': {reason}")]
    InvalidReference { workflow: String, reason: String },

    /// A task identifier was registered twice.
    #[error("task '{0}' is already registered")]
    DuplicateTask(TaskId),

    /// The shared log could not be read or written.
    #[error(transparent)]
    Log(#[from] LogError),
}

impl ServiceError {
    /// Returns true for the "unknown task" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogPosition;

    #[test]
    fn test_not_found_message() {
        let err = ServiceError::NotFound(TaskId::from("abc"));
        assert_eq!(err.to_string(), "task 'abc' not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_invalid_reference_message() {
        let err = ServiceError::InvalidReference {
            workflow: "missing".to_string(),
            reason: "no such workflow".to_string(),
        };
        assert!(err.to_string().contains("missing"));
        assert!(err.to_string().contains("no such workflow"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_log_error_is_transparent() {
        let log_err = LogError::Rotated {
            position: LogPosition::new(42),
            reason: "log shrank".to_string(),
        };
        let expected = log_err.to_string();
        let err: ServiceError = log_err.into();
        assert_eq!(err.to_string(), expected);
    }
}

//! Cooperative Cancellation
//!
//! A run is never interrupted forcibly. Cancelling a task sets a one-way
//! flag that the run observes at its next checkpoint: before it starts,
//! and between the discrete steps of the workflow.
//!
//! A step that blocks inside a non-interruptible operation delays
//! cancellation until that operation returns. Runners that can abandon
//! a wait safely (the command runner kills its child process) select on
//! [`CancellationHandle::cancelled`] instead.

use tokio_util::sync::CancellationToken;

use crate::execution::RunError;

/// Shared, one-way cancellation signal for a single run.
///
/// Cloning is cheap; all clones observe the same flag. Setting it more
/// than once has no further effect.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    token: CancellationToken,
}

impl CancellationHandle {
    /// Creates an unset handle.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Checkpoint: returns `Err(RunError::Cancelled)` if cancellation has
    /// been requested, so runners can bail out with `?`.
    pub fn checkpoint(&self) -> Result<(), RunError> {
        if self.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation has been requested.
    ///
    /// Intended for `tokio::select!` in runners that wait on something
    /// which is safe to abandon (timers, idle waits).
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

//! Lifecycle status shared by task and project records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a task or project.
///
/// Transitions only move forward: `pending -> processing -> {completed|failed}`.
/// Skipping `processing` is allowed, moving backwards or out of a terminal
/// state is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Accepted, not yet started
    #[default]
    Pending,

    /// Currently running
    Processing,

    /// Finished successfully
    Completed,

    /// Finished with an error
    Failed,
}

/// Attempted a status move that would break monotonicity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid status transition: {from} → {to}")]
pub struct TransitionError {
    pub from: Status,
    pub to: Status,
}

impl Status {
    fn rank(self) -> u8 {
        match self {
            Status::Pending => 0,
            Status::Processing => 1,
            Status::Completed | Status::Failed => 2,
        }
    }

    /// Whether this status is final
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    /// Whether a record in this status still counts as active
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Check that moving from `self` to `next` is legal.
    ///
    /// Re-asserting the current status is accepted as a no-op.
    pub fn check_transition(self, next: Status) -> Result<(), TransitionError> {
        if self == next || next.rank() > self.rank() {
            Ok(())
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Processing => write!(f, "processing"),
            Status::Completed => write!(f, "completed"),
            Status::Failed => write!(f, "failed"),
        }
    }
}

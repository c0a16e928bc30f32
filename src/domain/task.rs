//! Task records tracked by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::{Status, TransitionError};

/// Scheduler-side state of one submitted job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task id for the registry's lifetime
    pub id: String,

    /// Current lifecycle status
    pub status: Status,

    /// When the task was submitted
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,

    /// Value returned by the job (on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error message (on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskRecord {
    /// Create a new pending record
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: Status::Pending,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    /// Move to `next`, stamping `updated_at`
    pub fn transition(&mut self, next: Status) -> Result<(), TransitionError> {
        self.status.check_transition(next)?;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the task has finished
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_pending() {
        let record = TaskRecord::new("t-1");
        assert_eq!(record.id, "t-1");
        assert_eq!(record.status, Status::Pending);
        assert!(record.result.is_none());
        assert!(!record.is_finished());
    }

    #[test]
    fn test_transition_stamps_updated_at() {
        let mut record = TaskRecord::new("t-2");
        let before = record.updated_at;
        record.transition(Status::Processing).unwrap();
        assert_eq!(record.status, Status::Processing);
        assert!(record.updated_at >= before);

        record.transition(Status::Completed).unwrap();
        assert!(record.is_finished());
        assert!(record.transition(Status::Processing).is_err());
        assert_eq!(record.status, Status::Completed);
    }
}

//! In-memory task registry.
//!
//! Shared between the scheduler worker (writer) and any number of callers
//! (readers). One mutex guards the map; it is only ever held for a single
//! insert/update/copy-out and never across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::domain::{Status, TaskRecord};

/// Thread-safe map from task id to task record
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<String, TaskRecord>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending record and return the id actually used.
    ///
    /// A requested id that is already taken gets a `-{n}` suffix so ids stay
    /// unique for the registry's lifetime.
    pub fn register(&self, requested: &str) -> String {
        let mut tasks = self.tasks.lock();

        let mut id = requested.to_string();
        let mut n = 1u32;
        while tasks.contains_key(&id) {
            id = format!("{}-{}", requested, n);
            n += 1;
        }

        tasks.insert(id.clone(), TaskRecord::new(id.clone()));
        id
    }

    /// Mark a task as started
    pub fn mark_processing(&self, id: &str) {
        self.apply(id, Status::Processing, |_| {});
    }

    /// Record a successful result
    pub fn complete(&self, id: &str, result: Value) {
        self.apply(id, Status::Completed, |record| record.result = Some(result));
    }

    /// Record a failure message
    pub fn fail(&self, id: &str, error: String) {
        self.apply(id, Status::Failed, |record| record.error = Some(error));
    }

    /// Fail every task that has not finished yet; returns how many
    pub fn fail_active(&self, error: &str) -> usize {
        let mut tasks = self.tasks.lock();
        let mut failed = 0;

        for record in tasks.values_mut() {
            if record.status.is_active() && record.transition(Status::Failed).is_ok() {
                record.error = Some(error.to_string());
                failed += 1;
            }
        }

        failed
    }

    fn apply(&self, id: &str, next: Status, fill: impl FnOnce(&mut TaskRecord)) {
        let mut tasks = self.tasks.lock();
        let Some(record) = tasks.get_mut(id) else {
            warn!(task_id = %id, "Status update for unknown task");
            return;
        };

        match record.transition(next) {
            Ok(()) => fill(record),
            Err(e) => warn!(task_id = %id, error = %e, "Ignoring task status update"),
        }
    }

    /// Snapshot of one task
    pub fn get(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.lock().get(id).cloned()
    }

    /// Snapshot of every task not yet in a terminal state
    pub fn active(&self) -> Vec<TaskRecord> {
        let mut active: Vec<TaskRecord> = self
            .tasks
            .lock()
            .values()
            .filter(|record| record.status.is_active())
            .cloned()
            .collect();

        // Oldest first
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        active
    }

    /// Number of tracked tasks (any status)
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

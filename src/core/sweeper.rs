//! Retention sweeper: deletes projects older than the retention window.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::scheduler::SchedulerHandle;
use super::store::ProjectStore;

/// Task id prefix for periodic sweeps
pub const SWEEP_ID_PREFIX: &str = "cleanup";

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Project directories looked at
    pub scanned: usize,
    pub deleted: usize,
    /// Unreadable metadata or failed deletions
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    store: ProjectStore,
    retention: chrono::Duration,
}

impl RetentionSweeper {
    pub fn new(store: ProjectStore, retention: chrono::Duration) -> Self {
        Self { store, retention }
    }

    pub fn retention(&self) -> chrono::Duration {
        self.retention
    }

    /// Delete every project whose age has reached the retention window.
    ///
    /// Best-effort: a project that cannot be read or deleted is counted in
    /// `failed` and the sweep moves on. Deletion is not transactional.
    #[instrument(skip(self), fields(retention_hours = self.retention.num_hours()))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        for id in self.store.project_ids().await? {
            report.scanned += 1;

            let record = match self.store.read_metadata(&id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(project_id = %id, "No metadata, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(project_id = %id, error = %format!("{:#}", e), "Unreadable project metadata");
                    report.failed += 1;
                    continue;
                }
            };

            let age = record.age(now);
            if age < self.retention {
                continue;
            }

            match self.store.delete(&id).await {
                Ok(()) => {
                    info!(project_id = %id, created_at = %record.created_at, "Deleted expired project");
                    report.deleted += 1;
                }
                Err(e) => {
                    error!(project_id = %id, error = %format!("{:#}", e), "Failed to delete expired project");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failed,
            "Retention sweep finished"
        );
        Ok(report)
    }

    /// Run [`sweep`](Self::sweep) on the scheduler every `interval`
    pub fn schedule(&self, scheduler: &SchedulerHandle, interval: Duration) -> CancellationToken {
        let sweeper = self.clone();
        scheduler.schedule_periodic(
            move || {
                let sweeper = sweeper.clone();
                Ok(async move { sweeper.sweep().await })
            },
            interval,
            SWEEP_ID_PREFIX,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProjectParams;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fresh_projects_survive() {
        let temp = TempDir::new().unwrap();
        let store = ProjectStore::open(temp.path()).await.unwrap();
        store
            .create("t", "topic", ProjectParams::default())
            .await
            .unwrap();

        let sweeper = RetentionSweeper::new(store.clone(), chrono::Duration::hours(24));
        let report = sweeper.sweep().await.unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(store.project_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_directory_without_metadata_is_left_alone() {
        let temp = TempDir::new().unwrap();
        let store = ProjectStore::open(temp.path()).await.unwrap();
        std::fs::create_dir_all(store.projects_dir().join("stray")).unwrap();

        let sweeper = RetentionSweeper::new(store.clone(), chrono::Duration::zero());
        let report = sweeper.sweep().await.unwrap();

        assert_eq!(report, SweepReport { scanned: 1, deleted: 0, failed: 0 });
        assert!(store.projects_dir().join("stray").exists());
    }
}

//! Request layer facade.
//!
//! Ties the store, the scheduler and the orchestrator together behind the
//! handful of operations a front end needs. Nothing here blocks on pipeline
//! work: `create_project` returns as soon as the run is queued.

use std::ops::RangeInclusive;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::Capabilities;
use crate::config::{ResolvedConfig, RetentionSettings};
use crate::domain::{
    DocumentItem, FileEntry, FileKind, ProjectRecord, ProjectRequest, ProjectUpdate, Status,
    TaskRecord,
};

use super::orchestrator::Orchestrator;
use super::scheduler::SchedulerHandle;
use super::store::ProjectStore;
use super::sweeper::RetentionSweeper;

/// Allowed page size for [`ProposalService::projects`]
pub const LIST_LIMIT_RANGE: RangeInclusive<usize> = 1..=100;

/// Ids handed back when a project is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub project_id: String,
    pub task_id: String,
}

/// A stored upload plus the text read from it, when it has any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    #[serde(flatten)]
    pub entry: FileEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProposalService {
    scheduler: SchedulerHandle,
    store: ProjectStore,
    orchestrator: Arc<Orchestrator>,
    retention: RetentionSettings,
}

impl ProposalService {
    pub fn new(
        scheduler: SchedulerHandle,
        orchestrator: Arc<Orchestrator>,
        retention: RetentionSettings,
    ) -> Self {
        Self {
            scheduler,
            store: orchestrator.store().clone(),
            orchestrator,
            retention,
        }
    }

    /// Build the production service from resolved configuration
    pub async fn from_config(config: &ResolvedConfig, scheduler: SchedulerHandle) -> Result<Self> {
        let store = ProjectStore::open(&config.home).await?;
        let capabilities =
            Capabilities::from_config(config).context("Failed to set up capabilities")?;
        let orchestrator = Orchestrator::new(store, capabilities, config.pipeline.clone());

        Ok(Self::new(scheduler, Arc::new(orchestrator), config.retention))
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    /// Create a project and queue its pipeline run.
    ///
    /// The project is marked processing, with its task id, before the job is
    /// handed to the scheduler, so the run's own status writes always land
    /// after it.
    pub async fn create_project(&self, request: ProjectRequest) -> Result<Submission> {
        let project_id = self
            .store
            .create(&request.title, &request.topic, request.params.clone())
            .await?;

        let reserved = Uuid::new_v4().to_string();
        self.store
            .update(
                &project_id,
                ProjectUpdate::new()
                    .status(Status::Processing)
                    .task_id(reserved.clone())
                    .status_message("Queued"),
            )
            .await?;

        let orchestrator = self.orchestrator.clone();
        let run_id = project_id.clone();
        let task_id = self.scheduler.submit(
            async move { orchestrator.run(&run_id, &request).await },
            Some(reserved.clone()),
        );

        if task_id != reserved {
            warn!(%project_id, %reserved, %task_id, "Task id was reassigned");
            self.store
                .update(&project_id, ProjectUpdate::new().task_id(task_id.clone()))
                .await?;
        }

        // A stopped scheduler fails the task on submission
        if let Some(task) = self.task(&task_id).filter(|t| t.status == Status::Failed) {
            self.fail_project_for_task(&project_id, &task).await?;
        }

        info!(%project_id, %task_id, "Project accepted");
        Ok(Submission {
            project_id,
            task_id,
        })
    }

    pub async fn project(&self, id: &str) -> Result<Option<ProjectRecord>> {
        self.store.get(id).await
    }

    /// Most recent projects; `limit` is clamped to [`LIST_LIMIT_RANGE`]
    pub async fn projects(&self, limit: usize) -> Result<Vec<ProjectRecord>> {
        let limit = limit.clamp(*LIST_LIMIT_RANGE.start(), *LIST_LIMIT_RANGE.end());
        self.store.list(limit).await
    }

    pub fn task(&self, id: &str) -> Option<TaskRecord> {
        self.scheduler.get_status(id)
    }

    pub fn active_tasks(&self) -> Vec<TaskRecord> {
        self.scheduler.list_active()
    }

    /// Mark every unfinished project whose task has failed as failed.
    ///
    /// Covers runs cut short by a scheduler shutdown; returns how many
    /// projects were settled.
    pub async fn settle_interrupted(&self) -> Result<usize> {
        let mut settled = 0;

        for id in self.store.project_ids().await? {
            let record = match self.store.read_metadata(&id).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(project_id = %id, error = %format!("{:#}", e), "Skipping unreadable project");
                    continue;
                }
            };
            if record.status.is_terminal() {
                continue;
            }

            let failed_task = record
                .task_id
                .as_deref()
                .and_then(|task_id| self.task(task_id))
                .filter(|task| task.status == Status::Failed);
            if let Some(task) = failed_task {
                match self.fail_project_for_task(&id, &task).await {
                    Ok(()) => settled += 1,
                    Err(e) => {
                        warn!(project_id = %id, error = %format!("{:#}", e), "Failed to settle project")
                    }
                }
            }
        }

        if settled > 0 {
            info!(settled, "Marked interrupted projects as failed");
        }
        Ok(settled)
    }

    async fn fail_project_for_task(&self, project_id: &str, task: &TaskRecord) -> Result<()> {
        let error = task
            .error
            .clone()
            .unwrap_or_else(|| "task failed".to_string());
        let bounded = self.orchestrator.limits().bound_error(&error);
        warn!(%project_id, task_id = %task.id, error = %bounded, "Task failed before the run finished");

        self.store
            .update(
                project_id,
                ProjectUpdate::new()
                    .status(Status::Failed)
                    .error(bounded.clone())
                    .status_message(format!("Processing failed: {}", bounded)),
            )
            .await
    }

    /// Store an uploaded file, list it on the project and read its text.
    ///
    /// Text comes from PDF extraction or, for `.txt`/`.md`, the bytes
    /// themselves. Extraction is best-effort: a failure leaves `text` unset
    /// but keeps the upload.
    pub async fn upload(
        &self,
        project_id: &str,
        filename: &str,
        content: &[u8],
        content_type: Option<String>,
    ) -> Result<UploadedFile> {
        if self.store.read_metadata(project_id).await?.is_none() {
            anyhow::bail!("Project not found: {}", project_id);
        }

        let entry = self
            .store
            .attach_file(project_id, filename, content, content_type)
            .await?;
        info!(%project_id, filename = %entry.filename, bytes = content.len(), "File uploaded");

        let text = self.read_upload_text(project_id, &entry, content).await;
        Ok(UploadedFile { entry, text })
    }

    async fn read_upload_text(
        &self,
        project_id: &str,
        entry: &FileEntry,
        content: &[u8],
    ) -> Option<String> {
        match entry.kind() {
            FileKind::Text => Some(String::from_utf8_lossy(content).into_owned()),
            FileKind::Other => {
                debug!(filename = %entry.filename, "No text reader for this file type");
                None
            }
            FileKind::Pdf => {
                let local = match self.store.project_dir(project_id) {
                    Ok(dir) => dir.join(&entry.path),
                    Err(e) => {
                        warn!(%project_id, error = %e, "Cannot locate uploaded file");
                        return None;
                    }
                };
                let item = DocumentItem::uploaded(&entry.filename, local.clone());
                let limits = self.orchestrator.limits();
                let extraction = self.orchestrator.capabilities().extractor.extract(
                    &item,
                    &local,
                    limits.extract_max_pages,
                );

                match tokio::time::timeout(limits.extract_timeout(), extraction).await {
                    Ok(Ok(text)) => Some(text),
                    Ok(Err(e)) => {
                        warn!(filename = %entry.filename, error = %format!("{:#}", e), "Upload text extraction failed");
                        None
                    }
                    Err(_) => {
                        warn!(filename = %entry.filename, "Upload text extraction timed out");
                        None
                    }
                }
            }
        }
    }

    /// A sweeper over this service's store with the configured window
    pub fn sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(self.store.clone(), self.retention.window())
    }

    /// Install the periodic retention sweep
    pub fn start_retention(&self) -> CancellationToken {
        info!(
            retention_hours = self.retention.hours,
            interval_hours = self.retention.sweep_interval_hours,
            "Scheduling retention sweeps"
        );
        self.sweeper()
            .schedule(&self.scheduler, self.retention.interval())
    }
}

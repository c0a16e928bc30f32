//! File-backed project store.
//!
//! Layout under the store root:
//!
//! ```text
//! projects/{id}/metadata.json   project document (without result)
//! projects/{id}/result.json     proposal, present once completed
//! projects/{id}/files/{name}    uploaded artifacts
//! ```
//!
//! There is no cross-writer locking. `update` is a read-modify-write of the
//! whole metadata file, so two concurrent writers to the same id race and the
//! last full write wins.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    FileEntry, ProjectParams, ProjectRecord, ProjectUpdate, ProposalResult, Status,
};

const METADATA_FILE: &str = "metadata.json";
const RESULT_FILE: &str = "result.json";
const FILES_DIR: &str = "files";

/// Errors specific to store input validation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid project id: {0:?}")]
    InvalidId(String),

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),
}

/// Durable mapping from project id to project document
#[derive(Debug, Clone)]
pub struct ProjectStore {
    /// Directory holding one subdirectory per project
    projects_dir: PathBuf,
}

impl ProjectStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let projects_dir = root.as_ref().join("projects");

        fs::create_dir_all(&projects_dir).await.with_context(|| {
            format!(
                "Failed to create projects directory: {}",
                projects_dir.display()
            )
        })?;

        Ok(Self { projects_dir })
    }

    /// Open the store under the configured home directory
    pub async fn open_default() -> Result<Self> {
        Self::open(crate::config::papertrail_home()?).await
    }

    /// Directory containing all projects
    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Directory of one project
    pub fn project_dir(&self, id: &str) -> Result<PathBuf> {
        if !is_plain_component(id) {
            return Err(StoreError::InvalidId(id.to_string()).into());
        }
        Ok(self.projects_dir.join(id))
    }

    /// Create a new pending project and return its id
    pub async fn create(&self, title: &str, topic: &str, params: ProjectParams) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let record = ProjectRecord::new(id.clone(), title.to_string(), topic.to_string(), params);

        self.write_metadata(&record).await?;
        debug!(project_id = %id, "Project created");

        Ok(id)
    }

    /// Shallow-merge `update` into the stored document.
    ///
    /// Creates a bare document if the id does not exist yet. A status that
    /// would move backwards is dropped with a warning; the rest still lands.
    pub async fn update(&self, id: &str, update: ProjectUpdate) -> Result<()> {
        let mut record = match self.read_metadata(id).await? {
            Some(record) => record,
            None => ProjectRecord::empty(id.to_string()),
        };

        if let Err(e) = record.merge(update) {
            warn!(project_id = %id, error = %e, "Ignoring project status change");
        }

        self.write_metadata(&record).await
    }

    /// Persist the proposal and mark the project completed
    pub async fn save_result(&self, id: &str, result: &ProposalResult) -> Result<()> {
        let dir = self.ensure_project_dir(id).await?;
        let path = dir.join(RESULT_FILE);

        let content = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write result: {}", path.display()))?;

        // Completion and the cleared progress message land in one write
        self.update(
            id,
            ProjectUpdate::new()
                .status(Status::Completed)
                .clear_status_message(),
        )
        .await
    }

    /// Read a project, attaching its result document when present
    pub async fn get(&self, id: &str) -> Result<Option<ProjectRecord>> {
        let Some(mut record) = self.read_metadata(id).await? else {
            return Ok(None);
        };

        let result_path = self.project_dir(id)?.join(RESULT_FILE);
        if result_path.exists() {
            let content = fs::read_to_string(&result_path)
                .await
                .with_context(|| format!("Failed to read result: {}", result_path.display()))?;
            let result = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse result: {}", result_path.display()))?;
            record.result = Some(result);
        }

        Ok(Some(record))
    }

    /// Most recent projects first, at most `limit`.
    ///
    /// Reads every project's metadata, so cost grows with the project count.
    /// Unreadable entries are skipped.
    pub async fn list(&self, limit: usize) -> Result<Vec<ProjectRecord>> {
        let mut projects = Vec::new();

        for id in self.project_ids().await? {
            match self.read_metadata(&id).await {
                Ok(Some(record)) => projects.push(record),
                Ok(None) => {}
                Err(e) => warn!(project_id = %id, error = %e, "Skipping unreadable project"),
            }
        }

        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        projects.truncate(limit);

        Ok(projects)
    }

    /// Write an uploaded file; the same filename overwrites silently.
    ///
    /// Returns the path relative to the project directory.
    pub async fn save_file(&self, id: &str, filename: &str, content: &[u8]) -> Result<String> {
        if !is_plain_component(filename) {
            return Err(StoreError::InvalidFilename(filename.to_string()).into());
        }

        let files_dir = self.project_dir(id)?.join(FILES_DIR);
        fs::create_dir_all(&files_dir)
            .await
            .with_context(|| format!("Failed to create files directory: {}", files_dir.display()))?;

        let path = files_dir.join(filename);
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write file: {}", path.display()))?;

        Ok(format!("{}/{}", FILES_DIR, filename))
    }

    /// Save a file and record it in the project's `files` list
    pub async fn attach_file(
        &self,
        id: &str,
        filename: &str,
        content: &[u8],
        content_type: Option<String>,
    ) -> Result<FileEntry> {
        let path = self.save_file(id, filename, content).await?;
        let entry = FileEntry {
            filename: filename.to_string(),
            path,
            content_type,
        };

        let mut files = self
            .read_metadata(id)
            .await?
            .and_then(|record| record.files)
            .unwrap_or_default();
        files.retain(|existing| existing.filename != entry.filename);
        files.push(entry.clone());

        self.update(id, ProjectUpdate::new().files(files)).await?;
        Ok(entry)
    }

    /// Remove a project entirely (metadata, result and files)
    pub async fn delete(&self, id: &str) -> Result<()> {
        let dir = self.project_dir(id)?;
        fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to delete project: {}", dir.display()))
    }

    /// Ids of every project directory
    pub async fn project_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();

        if !self.projects_dir.exists() {
            return Ok(ids);
        }

        let mut entries = fs::read_dir(&self.projects_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }

        Ok(ids)
    }

    /// Read metadata only (no result attached)
    pub async fn read_metadata(&self, id: &str) -> Result<Option<ProjectRecord>> {
        let path = self.project_dir(id)?.join(METADATA_FILE);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read metadata: {}", path.display()))?;

        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse metadata: {}", path.display()))?;

        Ok(Some(record))
    }

    async fn write_metadata(&self, record: &ProjectRecord) -> Result<()> {
        let dir = self.ensure_project_dir(&record.id).await?;
        let path = dir.join(METADATA_FILE);

        // The result lives in its own document
        let content = if record.result.is_some() {
            let mut stripped = record.clone();
            stripped.result = None;
            serde_json::to_string_pretty(&stripped)
        } else {
            serde_json::to_string_pretty(record)
        }
        .context("Failed to serialize metadata")?;

        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write metadata: {}", path.display()))
    }

    async fn ensure_project_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.project_dir(id)?;
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create project directory: {}", dir.display()))?;
        Ok(dir)
    }
}

/// A single, non-traversing path component
fn is_plain_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentItem;
    use tempfile::TempDir;

    async fn create_test_store() -> (ProjectStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = ProjectStore::open(temp_dir.path()).await.unwrap();
        (store, temp_dir)
    }

    fn sample_result() -> ProposalResult {
        ProposalResult {
            proposal_text: "# Proposal".to_string(),
            diagram: None,
            steps: Vec::new(),
            resources: Vec::new(),
            references: vec![DocumentItem::placeholder("x")],
            translated_topic: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_get_is_pending() {
        let (store, _temp) = create_test_store().await;
        let id = store
            .create("My title", "rust schedulers", ProjectParams::default())
            .await
            .unwrap();

        let project = store.get(&id).await.unwrap().unwrap();
        assert_eq!(project.id, id);
        assert_eq!(project.status, Status::Pending);
        assert_eq!(project.title, "My title");
        assert_eq!(project.topic, "rust schedulers");
        assert!(project.result.is_none());
    }

    #[tokio::test]
    async fn test_update_preserves_other_fields() {
        let (store, _temp) = create_test_store().await;
        let id = store
            .create("t", "topic kept", ProjectParams::default())
            .await
            .unwrap();

        store
            .update(&id, ProjectUpdate::new().status(Status::Processing))
            .await
            .unwrap();

        let project = store.get(&id).await.unwrap().unwrap();
        assert_eq!(project.status, Status::Processing);
        assert_eq!(project.topic, "topic kept");
        assert!(project.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_project_creates_it() {
        let (store, _temp) = create_test_store().await;
        store
            .update("ghost", ProjectUpdate::new().status_message("hello"))
            .await
            .unwrap();

        let project = store.get("ghost").await.unwrap().unwrap();
        assert_eq!(project.id, "ghost");
        assert_eq!(project.status_message.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_save_result_attaches_and_completes() {
        let (store, temp) = create_test_store().await;
        let id = store.create("t", "x", ProjectParams::default()).await.unwrap();
        store
            .update(&id, ProjectUpdate::new().status_message("Generating technical proposal"))
            .await
            .unwrap();

        let result = sample_result();
        store.save_result(&id, &result).await.unwrap();

        let project = store.get(&id).await.unwrap().unwrap();
        assert_eq!(project.status, Status::Completed);
        assert!(project.status_message.is_none());
        assert_eq!(project.result, Some(result));

        // Metadata on disk does not embed the result
        let raw = std::fs::read_to_string(
            temp.path().join("projects").join(&id).join(METADATA_FILE),
        )
        .unwrap();
        assert!(!raw.contains("proposal_text"));
    }

    #[tokio::test]
    async fn test_terminal_status_survives_late_update() {
        let (store, _temp) = create_test_store().await;
        let id = store.create("t", "x", ProjectParams::default()).await.unwrap();

        store
            .update(&id, ProjectUpdate::new().status(Status::Failed).error("e"))
            .await
            .unwrap();
        store
            .update(&id, ProjectUpdate::new().status(Status::Processing))
            .await
            .unwrap();

        let project = store.get(&id).await.unwrap().unwrap();
        assert_eq!(project.status, Status::Failed);
        assert_eq!(project.error.as_deref(), Some("e"));
    }

    #[tokio::test]
    async fn test_list_sorted_newest_first_and_limited() {
        let (store, _temp) = create_test_store().await;
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                store
                    .create(&format!("p{}", i), "x", ProjectParams::default())
                    .await
                    .unwrap(),
            );
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let listed = store.list(2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[2]);
        assert_eq!(listed[1].id, ids[1]);

        assert_eq!(store.list(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_save_file_last_write_wins() {
        let (store, temp) = create_test_store().await;
        let id = store.create("t", "x", ProjectParams::default()).await.unwrap();

        let path = store.save_file(&id, "notes.txt", b"first").await.unwrap();
        assert_eq!(path, "files/notes.txt");
        store.save_file(&id, "notes.txt", b"second").await.unwrap();

        let on_disk = std::fs::read(temp.path().join("projects").join(&id).join(&path)).unwrap();
        assert_eq!(on_disk, b"second");
    }

    #[tokio::test]
    async fn test_attach_file_records_entry_once() {
        let (store, _temp) = create_test_store().await;
        let id = store.create("t", "x", ProjectParams::default()).await.unwrap();

        store
            .attach_file(&id, "a.pdf", b"1", Some("application/pdf".to_string()))
            .await
            .unwrap();
        store.attach_file(&id, "a.pdf", b"2", None).await.unwrap();
        store.attach_file(&id, "b.txt", b"3", None).await.unwrap();

        let files = store.get(&id).await.unwrap().unwrap().files.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.txt"]);
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let (store, _temp) = create_test_store().await;
        let id = store.create("t", "x", ProjectParams::default()).await.unwrap();

        assert!(store.save_file(&id, "../escape", b"x").await.is_err());
        assert!(store.save_file(&id, "..", b"x").await.is_err());
        assert!(store.get("../other").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let (store, _temp) = create_test_store().await;
        let id = store.create("t", "x", ProjectParams::default()).await.unwrap();
        store.save_result(&id, &sample_result()).await.unwrap();
        store.save_file(&id, "f.bin", b"data").await.unwrap();

        store.delete(&id).await.unwrap();

        assert!(store.get(&id).await.unwrap().is_none());
        assert!(store.project_ids().await.unwrap().is_empty());
    }
}

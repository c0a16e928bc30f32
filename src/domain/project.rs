//! Project records owned by the project store.
//!
//! A project is one user-initiated pipeline run. Its metadata is stored as a
//! single document and updated through [`ProjectUpdate`] patches: each set
//! field replaces the stored value wholesale, unset fields are left alone.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::{DocumentItem, ProposalResult};
use super::status::{Status, TransitionError};

/// Default number of documents to retrieve
pub const DEFAULT_MAX_PAPERS: u32 = 5;

/// Bounds on the retrieval count
pub const MAX_PAPERS_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Generation model tier requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    #[default]
    Default,
    Lite,
    Pro,
    Reader,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::Default => write!(f, "default"),
            ModelType::Lite => write!(f, "lite"),
            ModelType::Pro => write!(f, "pro"),
            ModelType::Reader => write!(f, "reader"),
        }
    }
}

/// Caller-supplied parameters for a run, persisted as `params`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub model_type: ModelType,

    #[serde(default = "default_max_papers")]
    pub max_papers: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_keywords: Option<Vec<String>>,

    /// Anything else the caller attached
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

fn default_max_papers() -> u32 {
    DEFAULT_MAX_PAPERS
}

impl Default for ProjectParams {
    fn default() -> Self {
        Self {
            description: None,
            model_type: ModelType::default(),
            max_papers: DEFAULT_MAX_PAPERS,
            custom_keywords: None,
            extra: BTreeMap::new(),
        }
    }
}

impl ProjectParams {
    /// Retrieval count clamped into the supported range
    pub fn bounded_max_papers(&self) -> u32 {
        self.max_papers
            .clamp(*MAX_PAPERS_RANGE.start(), *MAX_PAPERS_RANGE.end())
    }
}

/// Inbound request to start a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRequest {
    pub title: String,
    pub topic: String,
    #[serde(default)]
    pub params: ProjectParams,
}

impl ProjectRequest {
    pub fn new(title: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            topic: topic.into(),
            params: ProjectParams::default(),
        }
    }

    pub fn with_params(mut self, params: ProjectParams) -> Self {
        self.params = params;
        self
    }
}

/// An uploaded artifact attached to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    /// Path relative to the project directory
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl FileEntry {
    pub fn kind(&self) -> FileKind {
        FileKind::from_filename(&self.filename)
    }
}

/// How an uploaded file's text can be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Needs PDF text extraction
    Pdf,
    /// Plain text or Markdown, read as-is
    Text,
    Other,
}

impl FileKind {
    /// Classify by extension, case-insensitively
    pub fn from_filename(filename: &str) -> Self {
        let ext = std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("pdf") => FileKind::Pdf,
            Some("txt") | Some("md") => FileKind::Text,
            _ => FileKind::Other,
        }
    }
}

/// Stored project document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub topic: String,

    #[serde(default)]
    pub status: Status,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Human-readable progress note, cleared on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    #[serde(default)]
    pub params: ProjectParams,

    /// Scheduler task running this project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub papers: Option<Vec<DocumentItem>>,

    /// Attached on read from the separate result document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProposalResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileEntry>>,
}

impl ProjectRecord {
    /// Fresh pending record
    pub fn new(id: String, title: String, topic: String, params: ProjectParams) -> Self {
        Self {
            id,
            title,
            topic,
            status: Status::Pending,
            created_at: Utc::now(),
            updated_at: None,
            status_message: None,
            params,
            task_id: None,
            translated_topic: None,
            papers: None,
            result: None,
            error: None,
            files: None,
        }
    }

    /// Bare record for an update that targets a missing id
    pub fn empty(id: String) -> Self {
        Self::new(id, String::new(), String::new(), ProjectParams::default())
    }

    /// Shallow-merge `update` into this record and stamp `updated_at`.
    ///
    /// Every set field replaces the stored value. A status that would move
    /// backwards is skipped and reported; the remaining fields still merge.
    pub fn merge(&mut self, update: ProjectUpdate) -> Result<(), TransitionError> {
        let ProjectUpdate {
            title,
            topic,
            status,
            status_message,
            params,
            task_id,
            translated_topic,
            papers,
            error,
            files,
        } = update;

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(topic) = topic {
            self.topic = topic;
        }
        if let Some(message) = status_message {
            self.status_message = message;
        }
        if let Some(params) = params {
            self.params = params;
        }
        if let Some(task_id) = task_id {
            self.task_id = Some(task_id);
        }
        if let Some(translated) = translated_topic {
            self.translated_topic = Some(translated);
        }
        if let Some(papers) = papers {
            self.papers = Some(papers);
        }
        if let Some(error) = error {
            self.error = error;
        }
        if let Some(files) = files {
            self.files = Some(files);
        }
        self.updated_at = Some(Utc::now());

        if let Some(next) = status {
            self.status.check_transition(next)?;
            self.status = next;
        }
        Ok(())
    }

    /// Age relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Named-field patch for a project record.
///
/// `status_message` and `error` are tri-state: `None` leaves the field alone,
/// `Some(None)` clears it, `Some(Some(_))` sets it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectUpdate {
    pub title: Option<String>,
    pub topic: Option<String>,
    pub status: Option<Status>,
    pub status_message: Option<Option<String>>,
    pub params: Option<ProjectParams>,
    pub task_id: Option<String>,
    pub translated_topic: Option<String>,
    pub papers: Option<Vec<DocumentItem>>,
    pub error: Option<Option<String>>,
    pub files: Option<Vec<FileEntry>>,
}

impl ProjectUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(Some(message.into()));
        self
    }

    pub fn clear_status_message(mut self) -> Self {
        self.status_message = Some(None);
        self
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn translated_topic(mut self, topic: impl Into<String>) -> Self {
        self.translated_topic = Some(topic.into());
        self
    }

    pub fn papers(mut self, papers: Vec<DocumentItem>) -> Self {
        self.papers = Some(papers);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Some(error.into()));
        self
    }

    pub fn files(mut self, files: Vec<FileEntry>) -> Self {
        self.files = Some(files);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ProjectRecord {
        ProjectRecord::new(
            "p-1".to_string(),
            "Title".to_string(),
            "vector search".to_string(),
            ProjectParams::default(),
        )
    }

    #[test]
    fn test_merge_preserves_unrelated_fields() {
        let mut project = record();
        project
            .merge(ProjectUpdate::new().status(Status::Processing))
            .unwrap();

        assert_eq!(project.status, Status::Processing);
        assert_eq!(project.topic, "vector search");
        assert_eq!(project.title, "Title");
        assert!(project.updated_at.is_some());
    }

    #[test]
    fn test_merge_replaces_whole_field() {
        let mut project = record();
        let first = vec![
            DocumentItem::placeholder("a"),
            DocumentItem::placeholder("b"),
        ];
        project.merge(ProjectUpdate::new().papers(first)).unwrap();

        let second = vec![DocumentItem::placeholder("c")];
        project
            .merge(ProjectUpdate::new().papers(second.clone()))
            .unwrap();

        assert_eq!(project.papers, Some(second));
    }

    #[test]
    fn test_status_message_tri_state() {
        let mut project = record();
        project
            .merge(ProjectUpdate::new().status_message("searching"))
            .unwrap();
        assert_eq!(project.status_message.as_deref(), Some("searching"));

        // Untouched
        project.merge(ProjectUpdate::new().task_id("t")).unwrap();
        assert_eq!(project.status_message.as_deref(), Some("searching"));

        project
            .merge(ProjectUpdate::new().clear_status_message())
            .unwrap();
        assert!(project.status_message.is_none());
    }

    #[test]
    fn test_backwards_status_is_rejected_but_fields_merge() {
        let mut project = record();
        project
            .merge(ProjectUpdate::new().status(Status::Completed))
            .unwrap();

        let result = project.merge(
            ProjectUpdate::new()
                .status(Status::Processing)
                .status_message("late write"),
        );

        assert!(result.is_err());
        assert_eq!(project.status, Status::Completed);
        assert_eq!(project.status_message.as_deref(), Some("late write"));
    }

    #[test]
    fn test_max_papers_is_clamped() {
        let mut params = ProjectParams::default();
        assert_eq!(params.bounded_max_papers(), 5);

        params.max_papers = 0;
        assert_eq!(params.bounded_max_papers(), 1);

        params.max_papers = 50;
        assert_eq!(params.bounded_max_papers(), 10);
    }

    #[test]
    fn test_params_defaults_on_deserialize() {
        let params: ProjectParams = serde_json::from_str(r#"{"model_type":"pro"}"#).unwrap();
        assert_eq!(params.model_type, ModelType::Pro);
        assert_eq!(params.max_papers, DEFAULT_MAX_PAPERS);
        assert!(params.extra.is_empty());
    }

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_filename("paper.PDF"), FileKind::Pdf);
        assert_eq!(FileKind::from_filename("notes.md"), FileKind::Text);
        assert_eq!(FileKind::from_filename("notes.txt"), FileKind::Text);
        assert_eq!(FileKind::from_filename("report.docx"), FileKind::Other);
        assert_eq!(FileKind::from_filename("README"), FileKind::Other);
    }
}

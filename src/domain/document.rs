//! Pipeline payloads: retrieved documents and generated proposals.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Id of the synthetic document used when retrieval finds nothing
pub const PLACEHOLDER_DOCUMENT_ID: &str = "default_paper";

/// A source document moving through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub published: String,

    /// Where the full content can be downloaded from
    #[serde(default)]
    pub source_url: Option<String>,

    /// Local copy, set only after a successful fetch
    #[serde(default)]
    pub local_handle: Option<PathBuf>,

    /// True only when text was genuinely extracted from the local copy
    #[serde(default)]
    pub content_extracted: bool,
}

impl DocumentItem {
    /// Synthetic stand-in so later stages always have one item to work on
    pub fn placeholder(topic: &str) -> Self {
        Self {
            id: PLACEHOLDER_DOCUMENT_ID.to_string(),
            title: format!("Technical proposal for {}", topic),
            authors: vec!["system".to_string()],
            summary: format!(
                "No related literature was found; the proposal for '{}' is based on the topic alone.",
                topic
            ),
            published: Utc::now().to_rfc3339(),
            source_url: None,
            local_handle: None,
            content_extracted: false,
        }
    }

    /// A user-uploaded file presented as a document for text extraction
    pub fn uploaded(filename: &str, local: PathBuf) -> Self {
        Self {
            id: filename.to_string(),
            title: filename.to_string(),
            authors: Vec::new(),
            summary: String::new(),
            published: Utc::now().to_rfc3339(),
            source_url: None,
            local_handle: Some(local),
            content_extracted: false,
        }
    }

    /// Whether this is the synthetic placeholder
    pub fn is_placeholder(&self) -> bool {
        self.id == PLACEHOLDER_DOCUMENT_ID
    }
}

/// One ordered implementation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationStep {
    pub step: u32,
    pub description: String,
}

/// A resource the proposal calls for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// Final output of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalResult {
    /// Full generated proposal (markdown)
    pub proposal_text: String,

    /// Architecture diagram source, if the proposal contained one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<String>,

    #[serde(default)]
    pub steps: Vec<ImplementationStep>,

    #[serde(default)]
    pub resources: Vec<Resource>,

    #[serde(default)]
    pub references: Vec<DocumentItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_topic: Option<String>,
}

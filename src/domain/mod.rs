//! Domain types for papertrail.
//!
//! This module contains the core data structures:
//! - Status: Lifecycle shared by tasks and projects
//! - TaskRecord: Scheduler-side job state
//! - ProjectRecord: Stored project document and its merge patch
//! - DocumentItem / ProposalResult: Pipeline payloads

pub mod document;
pub mod project;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use document::{
    DocumentItem, ImplementationStep, ProposalResult, Resource, PLACEHOLDER_DOCUMENT_ID,
};
pub use project::{
    FileEntry, FileKind, ModelType, ProjectParams, ProjectRecord, ProjectRequest, ProjectUpdate,
    DEFAULT_MAX_PAPERS, MAX_PAPERS_RANGE,
};
pub use status::{Status, TransitionError};
pub use task::TaskRecord;

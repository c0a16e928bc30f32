//! papertrail - research topic to technical proposal pipeline
//!
//! Takes a research topic, finds related papers, reads them and asks a
//! language model for a technical proposal, all off the request path.
//!
//! # Architecture
//!
//! The system is built around a single background worker:
//! - Jobs are submitted to a scheduler that owns one dedicated thread
//! - Each project run walks five stages: translate, retrieve, fetch,
//!   extract, generate
//! - Progress and results are persisted per project on disk
//! - A periodic sweeper removes projects past their retention window
//!
//! # Modules
//!
//! - `adapters`: External capabilities (chat completions, arXiv, pdftotext)
//! - `core`: Scheduler, store, orchestrator, sweeper
//! - `domain`: Data structures (TaskRecord, ProjectRecord, DocumentItem)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Submit a topic and follow it
//! papertrail run --title "Recs" --topic "基于图神经网络的推荐系统"
//!
//! # Inspect a project
//! papertrail status <project-id>
//!
//! # Keep the retention sweeper running
//! papertrail serve
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{Capabilities, GenerationError};
pub use core::{
    Orchestrator, PipelineLimits, ProjectStore, ProposalService, RetentionSweeper, RunOutcome,
    Scheduler, SchedulerHandle, Submission, SweepReport,
};
pub use domain::{
    DocumentItem, ProjectRecord, ProjectRequest, ProjectUpdate, ProposalResult, Status,
    TaskRecord,
};

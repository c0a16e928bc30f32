//! Core execution engine.
//!
//! This module contains:
//! - TaskRegistry: In-memory task status records
//! - Scheduler: Single background worker for jobs and periodic cycles
//! - ProjectStore: File-backed project documents
//! - Orchestrator: The five-stage pipeline
//! - RetentionSweeper: Periodic removal of expired projects
//! - ProposalService: Request-layer facade over all of the above

pub mod limits;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod sweeper;

// Re-export commonly used types
pub use limits::{truncate_chars, PipelineLimits};
pub use orchestrator::{contains_cjk, Orchestrator, RunOutcome};
pub use registry::TaskRegistry;
pub use scheduler::{
    Scheduler, SchedulerHandle, MIN_PERIODIC_INTERVAL, SHUTDOWN_ERROR, WORKER_THREAD_NAME,
};
pub use service::{ProposalService, Submission, UploadedFile, LIST_LIMIT_RANGE};
pub use store::{ProjectStore, StoreError};
pub use sweeper::{RetentionSweeper, SweepReport, SWEEP_ID_PREFIX};

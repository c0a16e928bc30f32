//! Background task scheduler.
//!
//! Owns exactly one worker: a dedicated OS thread driving a current-thread
//! tokio runtime. Every submitted job (and every periodic cycle) is a task on
//! that runtime, so jobs are cooperative peers: a job that never yields
//! stalls all the others. Capability calls made from jobs carry their own
//! timeouts; there is no per-task cancellation.
//!
//! Submission only pushes onto an unbounded channel and never waits on the
//! worker, so its latency does not depend on what the worker is doing.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::TaskRecord;

use super::registry::TaskRegistry;

/// Name of the worker thread
pub const WORKER_THREAD_NAME: &str = "papertrail-scheduler";

/// Error recorded on tasks that never finished because the worker stopped
pub const SHUTDOWN_ERROR: &str = "scheduler shut down";

/// Shortest accepted periodic interval
pub const MIN_PERIODIC_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on the pause after a periodic factory error
const PERIODIC_ERROR_BACKOFF: Duration = Duration::from_secs(10);

type WorkerTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Cloneable submission handle.
///
/// Exposes the same operations as [`Scheduler`] without owning the worker,
/// so it can be moved into jobs.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    registry: TaskRegistry,
    inbox: mpsc::UnboundedSender<WorkerTask>,
    shutdown: CancellationToken,
}

impl SchedulerHandle {
    /// Register a pending task and hand `job` to the worker.
    ///
    /// Returns the task id immediately. Failures raised by the job (errors
    /// or panics) are recorded on the task and never reach the caller.
    pub fn submit<F, T>(&self, job: F, id: Option<String>) -> String
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let requested = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let task_id = self.registry.register(&requested);

        let registry = self.registry.clone();
        let job_id = task_id.clone();
        let task: WorkerTask = Box::pin(async move { run_job(registry, job_id, job).await });

        if self.inbox.send(task).is_err() {
            warn!(%task_id, "Scheduler is shut down, rejecting task");
            self.registry.fail(&task_id, SHUTDOWN_ERROR.to_string());
        } else {
            debug!(%task_id, "Task submitted");
        }

        task_id
    }

    /// Snapshot of one task
    pub fn get_status(&self, id: &str) -> Option<TaskRecord> {
        self.registry.get(id)
    }

    /// All tasks not yet completed or failed
    pub fn list_active(&self) -> Vec<TaskRecord> {
        self.registry.active()
    }

    /// Install a perpetual duty cycle on the worker.
    ///
    /// Every `interval` a fresh job is obtained from `factory` and submitted
    /// under `{prefix}_{unix_seconds}`. Intervals below
    /// [`MIN_PERIODIC_INTERVAL`] are raised to it. A factory error is logged
    /// and the cycle retries after a short backoff. The returned token stops the
    /// cycle; jobs it already submitted run to completion.
    pub fn schedule_periodic<F, Fut, T>(
        &self,
        factory: F,
        interval: Duration,
        prefix: &str,
    ) -> CancellationToken
    where
        F: Fn() -> Result<Fut> + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let cycle = self.shutdown.child_token();
        let stop = cycle.clone();
        let handle = self.clone();
        let label = prefix.to_string();

        if interval < MIN_PERIODIC_INTERVAL {
            warn!(
                prefix,
                requested_ms = interval.as_millis() as u64,
                "Periodic interval raised to the minimum"
            );
        }
        let interval = interval.max(MIN_PERIODIC_INTERVAL);
        let backoff = error_backoff(interval);

        let runner: WorkerTask = Box::pin(async move {
            info!(prefix = %label, interval_secs = interval.as_secs(), "Periodic cycle started");

            loop {
                let pause = match factory() {
                    Ok(job) => {
                        let id = format!("{}_{}", label, Utc::now().timestamp());
                        let task_id = handle.submit(job, Some(id));
                        debug!(%task_id, "Periodic job submitted");
                        interval
                    }
                    Err(e) => {
                        error!(prefix = %label, error = %e, "Periodic job factory failed");
                        backoff
                    }
                };

                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }

            info!(prefix = %label, "Periodic cycle stopped");
        });

        if self.inbox.send(runner).is_err() {
            warn!(prefix, "Scheduler is shut down, periodic cycle not installed");
            cycle.cancel();
        }

        cycle
    }
}

/// The scheduler service: worker thread plus task registry.
pub struct Scheduler {
    handle: SchedulerHandle,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.handle.registry.len())
            .field("running", &!self.handle.shutdown.is_cancelled())
            .finish()
    }
}

impl Scheduler {
    /// Start the worker thread
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build scheduler runtime")?;

        let (inbox, jobs) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let worker_shutdown = shutdown.clone();
        let registry = TaskRegistry::new();
        let worker_registry = registry.clone();

        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(worker_loop(jobs, worker_shutdown));
                // Unfinished jobs are dropped with the runtime
                drop(runtime);

                let stranded = worker_registry.fail_active(SHUTDOWN_ERROR);
                if stranded > 0 {
                    warn!(stranded, "Failed tasks left unfinished at shutdown");
                }
                debug!("Scheduler worker exiting");
            })
            .context("Failed to spawn scheduler worker thread")?;

        info!("Scheduler started");

        Ok(Self {
            handle: SchedulerHandle {
                registry,
                inbox,
                shutdown,
            },
            worker: Some(worker),
        })
    }

    /// Cloneable handle for submitting from other contexts
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// See [`SchedulerHandle::submit`]
    pub fn submit<F, T>(&self, job: F, id: Option<String>) -> String
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.handle.submit(job, id)
    }

    /// See [`SchedulerHandle::get_status`]
    pub fn get_status(&self, id: &str) -> Option<TaskRecord> {
        self.handle.get_status(id)
    }

    /// See [`SchedulerHandle::list_active`]
    pub fn list_active(&self) -> Vec<TaskRecord> {
        self.handle.list_active()
    }

    /// See [`SchedulerHandle::schedule_periodic`]
    pub fn schedule_periodic<F, Fut, T>(
        &self,
        factory: F,
        interval: Duration,
        prefix: &str,
    ) -> CancellationToken
    where
        F: Fn() -> Result<Fut> + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.handle.schedule_periodic(factory, interval, prefix)
    }

    /// Stop the worker and wait for its thread to exit.
    ///
    /// Jobs still in flight are dropped at their current suspension point
    /// and their tasks recorded as failed before this returns.
    pub fn shutdown(mut self) {
        self.handle.shutdown.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Scheduler worker thread panicked");
            }
        }
        info!("Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.handle.shutdown.cancel();
    }
}

async fn worker_loop(mut jobs: mpsc::UnboundedReceiver<WorkerTask>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = jobs.recv() => match next {
                Some(task) => {
                    tokio::spawn(task);
                }
                None => break,
            },
        }
    }
}

/// Drive one job and record its outcome.
///
/// The job runs as its own task so that a panic surfaces as a `JoinError`
/// here instead of tearing down the worker.
async fn run_job<F, T>(registry: TaskRegistry, id: String, job: F)
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    registry.mark_processing(&id);
    debug!(task_id = %id, "Task started");

    match tokio::spawn(job).await {
        Ok(Ok(value)) => match serde_json::to_value(value) {
            Ok(result) => {
                debug!(task_id = %id, "Task completed");
                registry.complete(&id, result);
            }
            Err(e) => {
                error!(task_id = %id, error = %e, "Task result is not serializable");
                registry.fail(&id, format!("Failed to serialize task result: {}", e));
            }
        },
        Ok(Err(e)) => {
            error!(task_id = %id, error = %e, "Task failed");
            registry.fail(&id, format!("{:#}", e));
        }
        Err(join_error) if join_error.is_panic() => {
            let message = panic_message(join_error.into_panic());
            error!(task_id = %id, %message, "Task panicked");
            registry.fail(&id, format!("job panicked: {}", message));
        }
        Err(_) => {
            registry.fail(&id, "job was cancelled".to_string());
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Pause after a factory error: short, and always below the interval
fn error_backoff(interval: Duration) -> Duration {
    PERIODIC_ERROR_BACKOFF.min(interval / 2)
}

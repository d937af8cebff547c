//! Job Manager - queue ownership and worker concurrency
//!
//! A fixed-size pool of tokio workers drains a single FIFO queue. Jobs
//! are started in enqueue order; with more than one worker, completion
//! order is unspecified. `add_job` never blocks and never executes the
//! action inline on the caller's path.
//!
//! A failing or panicking action is converted into the job's structured
//! terminal error; workers never die with a job.
//!
//! The manager does not serialize jobs that touch overlapping physical
//! devices - composing callers must not enqueue two mutating jobs
//! against the same device (the default single-worker configuration
//! makes this moot).

use crate::domain::ExecutionContext;
use crate::error::{Error, Result};
use crate::jobs::job::{Job, JobError, JobState, ReturnValue};
use dashmap::DashMap;
use futures::FutureExt;
use indexmap::IndexMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the job manager
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Number of worker tasks; fixed for the lifetime of the manager
    pub workers: usize,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        // One worker keeps jobs fully serialized, which is what the
        // single-threaded storage subsystem underneath expects.
        Self { workers: 1 }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters for job throughput
#[derive(Debug, Default)]
pub struct JobManagerStats {
    /// Jobs accepted by `add_job`
    pub submitted: AtomicU64,
    /// Jobs finished with `FinishedOk`
    pub completed: AtomicU64,
    /// Jobs finished with `FinishedError`
    pub failed: AtomicU64,
}

impl JobManagerStats {
    /// Create a snapshot of current stats
    pub fn snapshot(&self) -> JobManagerStatsSnapshot {
        JobManagerStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of job manager statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobManagerStatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

// =============================================================================
// Job Manager
// =============================================================================

type QueueReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<Job>>>>;

/// Owns the job queue, the registry and the worker pool
pub struct JobManager {
    context: Arc<ExecutionContext>,
    /// Registered jobs by name
    jobs: DashMap<String, Arc<Job>>,
    /// FIFO queue; `None` after shutdown
    queue_tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<Arc<Job>>>>,
    /// Counter for generating job names
    job_counter: AtomicU64,
    stats: JobManagerStats,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl JobManager {
    /// Create a manager and spawn its workers.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: JobManagerConfig, context: Arc<ExecutionContext>) -> Arc<Self> {
        assert!(config.workers >= 1, "job manager needs at least one worker");

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue_rx: QueueReceiver = Arc::new(tokio::sync::Mutex::new(queue_rx));

        let manager = Arc::new(Self {
            context,
            jobs: DashMap::new(),
            queue_tx: parking_lot::Mutex::new(Some(queue_tx)),
            job_counter: AtomicU64::new(0),
            stats: JobManagerStats::default(),
            workers: parking_lot::Mutex::new(Vec::with_capacity(config.workers)),
        });

        let mut handles = manager.workers.lock();
        for worker_id in 0..config.workers {
            let queue = queue_rx.clone();
            let worker = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                worker.worker_loop(worker_id, queue).await;
            }));
        }
        drop(handles);

        info!(workers = config.workers, "job manager started");
        manager
    }

    /// Generate a unique job name
    pub fn next_job_name(&self) -> String {
        let counter = self.job_counter.fetch_add(1, Ordering::SeqCst);
        format!("job-{counter:016x}")
    }

    /// Register and enqueue a `Created` job; returns its shared handle
    /// without blocking.
    ///
    /// # Panics
    ///
    /// Panics when the job is not in the `Created` state or has no bound
    /// action; both indicate a bug in the enqueuing code.
    pub fn add_job(&self, job: Job) -> Result<Arc<Job>> {
        assert!(
            job.state() == JobState::Created,
            "job {}: only created jobs can be enqueued",
            job.name()
        );
        assert!(
            job.has_action(),
            "job {}: the deferred action must be bound before enqueue",
            job.name()
        );

        let job = Arc::new(job);
        self.jobs.insert(job.name().to_string(), job.clone());

        let queue = self.queue_tx.lock();
        let tx = queue
            .as_ref()
            .ok_or_else(|| Error::Internal("job manager is shut down".into()))?;
        tx.send(job.clone())
            .map_err(|_| Error::Internal("job queue is closed".into()))?;
        drop(queue);

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        info!(job = job.name(), method = job.method_name(), "job enqueued");
        Ok(job)
    }

    /// Look up a job by name
    pub fn get_job(&self, name: &str) -> Option<Arc<Job>> {
        self.jobs.get(name).map(|entry| entry.value().clone())
    }

    /// All jobs currently held by the manager
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.jobs.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Drop a job from the registry, returning its handle.
    ///
    /// Retention policy belongs to the protocol collaborator; the engine
    /// holds every job until someone removes it.
    pub fn remove_job(&self, name: &str) -> Option<Arc<Job>> {
        self.jobs.remove(name).map(|(_, job)| job)
    }

    /// Execution context handed to deferred actions
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Current throughput counters
    pub fn stats(&self) -> JobManagerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting jobs, drain the queue and wait for the workers.
    pub async fn shutdown(&self) {
        // Dropping the sender lets each worker run out of queued jobs.
        self.queue_tx.lock().take();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.await;
        }
        info!("job manager stopped");
    }

    async fn worker_loop(&self, worker_id: usize, queue: QueueReceiver) {
        debug!(worker_id, "worker started");
        loop {
            // Hold the queue lock only while waiting, never while running
            // a job, so other workers keep draining the queue.
            let job = {
                let mut rx = queue.lock().await;
                rx.recv().await
            };
            let Some(job) = job else { break };
            self.execute_job(worker_id, &job).await;
        }
        debug!(worker_id, "worker stopped");
    }

    async fn execute_job(&self, worker_id: usize, job: &Arc<Job>) {
        info!(worker_id, job = job.name(), description = job.description(), "job started");
        job.mark_running();

        let action = job
            .take_action()
            .expect("enqueued job lost its action before execution");
        let outcome = AssertUnwindSafe(action(self.context.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(outcome)) => {
                job.finish(
                    JobState::FinishedOk,
                    outcome.return_value,
                    outcome.output_arguments,
                    outcome.affected_elements,
                    None,
                );
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                info!(worker_id, job = job.name(), "job finished");
            }
            Ok(Err(err)) => {
                let job_error = JobError::from(&err);
                warn!(worker_id, job = job.name(), error = %err, "job failed");
                job.finish(
                    JobState::FinishedError,
                    ReturnValue::Uint32(u32::from(job_error.code)),
                    IndexMap::new(),
                    Vec::new(),
                    Some(job_error),
                );
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(panic) => {
                let message = panic_message(panic);
                error!(worker_id, job = job.name(), %message, "job action panicked");
                let job_error = JobError::from(&Error::Internal(format!(
                    "job action panicked: {message}"
                )));
                job.finish(
                    JobState::FinishedError,
                    ReturnValue::Uint32(u32::from(job_error.code)),
                    IndexMap::new(),
                    Vec::new(),
                    Some(job_error),
                );
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

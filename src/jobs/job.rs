//! Job - a single schedulable unit of configuration work
//!
//! A job carries an immutable snapshot of the request that created it, a
//! deferred action bound before enqueue, and a terminal result slot. The
//! lifecycle is a strict state machine:
//!
//! ```text
//! Created ──▶ Running ──▶ FinishedOk
//!                    └──▶ FinishedError
//! ```
//!
//! `Terminated` exists for collaborators that own termination policy; the
//! engine itself never produces it. Terminal fields are published under a
//! single lock together with the state change, so a concurrent reader
//! observes either no result at all or the complete one.

use crate::domain::{ElementRef, ExecutionContext};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;

// =============================================================================
// Job State
// =============================================================================

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Built and possibly queued, not yet picked up by a worker
    Created,
    /// A worker is executing the deferred action
    Running,
    /// The action completed successfully
    FinishedOk,
    /// The action returned or raised an error
    FinishedError,
    /// Externally terminated before completion
    Terminated,
}

impl JobState {
    /// Whether no further transition can leave this state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::FinishedOk | JobState::FinishedError | JobState::Terminated
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(f, "created"),
            JobState::Running => write!(f, "running"),
            JobState::FinishedOk => write!(f, "finished-ok"),
            JobState::FinishedError => write!(f, "finished-error"),
            JobState::Terminated => write!(f, "terminated"),
        }
    }
}

// =============================================================================
// Return Values and Errors
// =============================================================================

/// Typed return value of a completed job.
///
/// The protocol binding renders the value according to its type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ReturnValue {
    Uint32(u32),
    Uint64(u64),
    String(String),
    Boolean(bool),
}

impl ReturnValue {
    /// Protocol name of the carried type
    pub fn type_name(&self) -> &'static str {
        match self {
            ReturnValue::Uint32(_) => "uint32",
            ReturnValue::Uint64(_) => "uint64",
            ReturnValue::String(_) => "string",
            ReturnValue::Boolean(_) => "boolean",
        }
    }
}

/// Structured error stored on a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct JobError {
    /// Protocol error code
    pub code: u16,
    pub message: String,
}

impl From<&Error> for JobError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().as_u16(),
            message: err.to_string(),
        }
    }
}

/// What a successful deferred action produced
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub return_value: ReturnValue,
    pub output_arguments: IndexMap<String, Value>,
    pub affected_elements: Vec<ElementRef>,
}

impl JobOutcome {
    pub fn new(return_value: ReturnValue) -> Self {
        Self {
            return_value,
            output_arguments: IndexMap::new(),
            affected_elements: Vec::new(),
        }
    }

    pub fn with_output(mut self, name: impl Into<String>, value: Value) -> Self {
        self.output_arguments.insert(name.into(), value);
        self
    }

    pub fn with_affected(mut self, element: ElementRef) -> Self {
        self.affected_elements.push(element);
        self
    }
}

/// Terminal result of a job, published atomically with the state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub return_value: ReturnValue,
    pub output_arguments: IndexMap<String, Value>,
    pub error: Option<JobError>,
}

// =============================================================================
// Deferred Action
// =============================================================================

/// Future produced by a deferred action
pub type ActionFuture = BoxFuture<'static, Result<JobOutcome>>;

/// The deferred action itself: a one-shot command capturing only plain
/// request data, handed the execution context when a worker runs it.
pub type JobAction = Box<dyn FnOnce(Arc<ExecutionContext>) -> ActionFuture + Send>;

// =============================================================================
// Job
// =============================================================================

/// Creation-time parameters of a job
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Human-readable label, e.g. `CREATE VG vg0 FROM /dev/sda+/dev/sdb`
    pub description: String,
    /// Operation that created the job
    pub method_name: String,
    /// Request-time snapshot of the input arguments
    pub input_arguments: IndexMap<String, Value>,
    /// Elements the job is expected to touch, in order
    pub affected_elements: Vec<ElementRef>,
    /// Element (service) that owns the job
    pub owning_element: ElementRef,
}

struct JobInner {
    state: JobState,
    affected_elements: Vec<ElementRef>,
    time_started: Option<DateTime<Utc>>,
    time_completed: Option<DateTime<Utc>>,
    result: Option<JobResult>,
}

/// An asynchronously executed, observable unit of configuration work
pub struct Job {
    name: String,
    description: String,
    method_name: String,
    input_arguments: IndexMap<String, Value>,
    owning_element: ElementRef,
    time_submitted: DateTime<Utc>,
    inner: Mutex<JobInner>,
    action: Mutex<Option<JobAction>>,
    finished: Notify,
}

impl Job {
    /// Build a job in the `Created` state.
    ///
    /// `name` must be unique per engine instance; use
    /// [`JobManager::next_job_name`](crate::jobs::JobManager::next_job_name).
    pub fn new(name: impl Into<String>, spec: JobSpec) -> Job {
        Job {
            name: name.into(),
            description: spec.description,
            method_name: spec.method_name,
            input_arguments: spec.input_arguments,
            owning_element: spec.owning_element,
            time_submitted: Utc::now(),
            inner: Mutex::new(JobInner {
                state: JobState::Created,
                affected_elements: spec.affected_elements,
                time_started: None,
                time_completed: None,
                result: None,
            }),
            action: Mutex::new(None),
            finished: Notify::new(),
        }
    }

    /// Bind the deferred action.
    ///
    /// Takes `&mut self`, so the action can only be bound while the
    /// creator still owns the job exclusively - before it is enqueued.
    pub fn set_action(&mut self, action: JobAction) {
        *self.action.get_mut() = Some(action);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn input_arguments(&self) -> &IndexMap<String, Value> {
        &self.input_arguments
    }

    pub fn owning_element(&self) -> &ElementRef {
        &self.owning_element
    }

    pub fn time_submitted(&self) -> DateTime<Utc> {
        self.time_submitted
    }

    /// Current lifecycle state
    pub fn state(&self) -> JobState {
        self.inner.lock().state
    }

    /// Terminal result, or `None` while the job is still in flight
    pub fn result(&self) -> Option<JobResult> {
        self.inner.lock().result.clone()
    }

    /// Complete, consistent copy of the job's observable state
    pub fn snapshot(&self) -> JobSnapshot {
        let inner = self.inner.lock();
        JobSnapshot {
            name: self.name.clone(),
            description: self.description.clone(),
            method_name: self.method_name.clone(),
            state: inner.state,
            input_arguments: self.input_arguments.clone(),
            affected_elements: inner.affected_elements.clone(),
            owning_element: self.owning_element.clone(),
            time_submitted: self.time_submitted,
            time_started: inner.time_started,
            time_completed: inner.time_completed,
            result: inner.result.clone(),
        }
    }

    /// Wait until the job reaches a terminal state
    pub async fn wait(&self) {
        loop {
            let notified = self.finished.notified();
            if self.state().is_terminal() {
                return;
            }
            notified.await;
        }
    }

    /// Record the terminal outcome of the job.
    ///
    /// The only terminal transition. `state` must be terminal and the job
    /// must be `Running`; anything else is an engine bug.
    ///
    /// # Panics
    ///
    /// Panics on a non-terminal `state`, on finishing a job that is not
    /// running, and on a second finish.
    pub fn finish(
        &self,
        state: JobState,
        return_value: ReturnValue,
        output_arguments: IndexMap<String, Value>,
        affected_elements: Vec<ElementRef>,
        error: Option<JobError>,
    ) {
        assert!(
            state.is_terminal(),
            "job {}: finish called with non-terminal state {state}",
            self.name
        );
        {
            let mut inner = self.inner.lock();
            assert!(
                inner.state == JobState::Running,
                "job {}: cannot finish from state {}",
                self.name,
                inner.state
            );
            inner.state = state;
            inner.time_completed = Some(Utc::now());
            inner.affected_elements = affected_elements;
            inner.result = Some(JobResult {
                return_value,
                output_arguments,
                error,
            });
        }
        self.finished.notify_waiters();
    }

    /// Transition `Created -> Running`; called exactly once by the worker
    /// that dequeued the job.
    pub(crate) fn mark_running(&self) {
        let mut inner = self.inner.lock();
        assert!(
            inner.state == JobState::Created,
            "job {}: cannot start from state {}",
            self.name,
            inner.state
        );
        inner.state = JobState::Running;
        inner.time_started = Some(Utc::now());
    }

    pub(crate) fn take_action(&self) -> Option<JobAction> {
        self.action.lock().take()
    }

    pub(crate) fn has_action(&self) -> bool {
        self.action.lock().is_some()
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("state", &self.state())
            .finish()
    }
}

/// Serializable point-in-time view of a job for the protocol binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub name: String,
    pub description: String,
    pub method_name: String,
    pub state: JobState,
    pub input_arguments: IndexMap<String, Value>,
    pub affected_elements: Vec<ElementRef>,
    pub owning_element: ElementRef,
    pub time_submitted: DateTime<Utc>,
    pub time_started: Option<DateTime<Utc>>,
    pub time_completed: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> JobSpec {
        JobSpec {
            description: "CREATE VG vg0 FROM /dev/sda+/dev/sdb".into(),
            method_name: "CreateOrModifyVG".into(),
            input_arguments: IndexMap::from([
                ("ElementName".to_string(), json!("vg0")),
                ("InExtents".to_string(), json!(["/dev/sda", "/dev/sdb"])),
            ]),
            affected_elements: vec![ElementRef::from("device:/dev/sda")],
            owning_element: ElementRef::from("service:storage"),
        }
    }

    fn finish_ok(job: &Job) {
        job.finish(
            JobState::FinishedOk,
            ReturnValue::Uint32(0),
            IndexMap::new(),
            vec![ElementRef::from("pool:vg0")],
            None,
        );
    }

    #[test]
    fn test_new_job_is_created() {
        let job = Job::new("job-0000000000000001", spec());
        assert_eq!(job.state(), JobState::Created);
        assert!(job.result().is_none());
        assert_eq!(job.method_name(), "CreateOrModifyVG");
        assert_eq!(job.input_arguments()["ElementName"], json!("vg0"));
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let job = Job::new("job-1", spec());
        job.mark_running();
        assert_eq!(job.state(), JobState::Running);

        finish_ok(&job);
        assert_eq!(job.state(), JobState::FinishedOk);

        let result = job.result().unwrap();
        assert_eq!(result.return_value, ReturnValue::Uint32(0));
        assert!(result.error.is_none());

        let snapshot = job.snapshot();
        assert!(snapshot.time_started.is_some());
        assert!(snapshot.time_completed.is_some());
        assert_eq!(snapshot.affected_elements, vec![ElementRef::from("pool:vg0")]);
    }

    #[test]
    fn test_snapshot_is_all_or_nothing() {
        let job = Job::new("job-1", spec());
        let snapshot = job.snapshot();
        assert_eq!(snapshot.state, JobState::Created);
        assert!(snapshot.result.is_none());
        assert!(snapshot.time_completed.is_none());

        job.mark_running();
        finish_ok(&job);
        let snapshot = job.snapshot();
        assert!(snapshot.state.is_terminal());
        assert!(snapshot.result.is_some());
        assert!(snapshot.time_completed.is_some());
    }

    #[test]
    #[should_panic(expected = "cannot finish from state created")]
    fn test_finish_before_running_panics() {
        let job = Job::new("job-1", spec());
        finish_ok(&job);
    }

    #[test]
    #[should_panic(expected = "cannot finish from state finished-ok")]
    fn test_double_finish_panics() {
        let job = Job::new("job-1", spec());
        job.mark_running();
        finish_ok(&job);
        finish_ok(&job);
    }

    #[test]
    #[should_panic(expected = "non-terminal state")]
    fn test_finish_with_non_terminal_state_panics() {
        let job = Job::new("job-1", spec());
        job.mark_running();
        job.finish(
            JobState::Running,
            ReturnValue::Uint32(0),
            IndexMap::new(),
            vec![],
            None,
        );
    }

    #[test]
    #[should_panic(expected = "cannot start from state running")]
    fn test_double_start_panics() {
        let job = Job::new("job-1", spec());
        job.mark_running();
        job.mark_running();
    }

    #[test]
    fn test_failed_job_carries_structured_error() {
        let job = Job::new("job-1", spec());
        job.mark_running();

        let err = Error::DeviceDisappeared {
            path: "/dev/sda".into(),
        };
        let job_error = JobError::from(&err);
        job.finish(
            JobState::FinishedError,
            ReturnValue::Uint32(u32::from(job_error.code)),
            IndexMap::new(),
            vec![],
            Some(job_error),
        );

        let result = job.result().unwrap();
        let error = result.error.unwrap();
        assert_eq!(error.code, 1);
        assert_eq!(error.message, "device /dev/sda disappeared");
    }

    #[tokio::test]
    async fn test_wait_returns_after_finish() {
        let job = Arc::new(Job::new("job-1", spec()));
        let waiter = {
            let job = job.clone();
            tokio::spawn(async move { job.wait().await })
        };
        job.mark_running();
        finish_ok(&job);
        waiter.await.unwrap();
        assert_eq!(job.state(), JobState::FinishedOk);
    }

    #[test]
    fn test_return_value_serialization() {
        let value = ReturnValue::Uint32(4096);
        assert_eq!(value.type_name(), "uint32");
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"type": "uint32", "value": 4096})
        );
    }
}

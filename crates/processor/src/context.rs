//! Task context handed to handlers
//!
//! A [`TaskContext`] wraps one locked task and reports its outcome to the
//! engine on behalf of the worker that holds the lock.

use std::sync::Arc;
use std::time::Duration;

use camunda_client::{
    BpmnErrorRequest, ClientError, CompleteRequest, ExtendLockRequest, ExternalTaskService,
    FailureRequest, LockedExternalTask, Variable, Variables,
};
use parking_lot::Mutex;
use tracing::{debug, instrument};

/// Outcome reported for a task
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed,
    Failed {
        retries: Option<u32>,
        retry_timeout: Option<Duration>,
    },
    BpmnErrorRaised {
        code: String,
        message: Option<String>,
    },
    LockExtended {
        duration: Duration,
    },
}

impl Outcome {
    /// Whether the task left the worker's hands; only a lock extension keeps it
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::LockExtended { .. })
    }
}

/// Variables to send when completing a task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskCompletion {
    pub variables: Option<Variables>,
    pub local_variables: Option<Variables>,
}

impl TaskCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process variable
    pub fn with_variable(mut self, name: impl Into<String>, variable: Variable) -> Self {
        self.variables
            .get_or_insert_with(Variables::new)
            .insert(name.into(), variable);
        self
    }

    /// Add a variable local to the task's scope
    pub fn with_local_variable(mut self, name: impl Into<String>, variable: Variable) -> Self {
        self.local_variables
            .get_or_insert_with(Variables::new)
            .insert(name.into(), variable);
        self
    }
}

/// A technical failure to report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFailure {
    pub message: Option<String>,
    pub details: Option<String>,
    /// Retries left; `None` leaves the choice to the engine
    pub retries: Option<u32>,
    /// Delay before the task can be fetched again
    pub retry_timeout: Option<Duration>,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_retry_timeout(mut self, timeout: Duration) -> Self {
        self.retry_timeout = Some(timeout);
        self
    }
}

/// A business error raised by a handler
///
/// Handlers can either report it through [`TaskContext::handle_bpmn_error`]
/// or return it as their error; the worker then reports it for them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("bpmn error {code}")]
pub struct BpmnError {
    pub code: String,
    pub message: Option<String>,
    pub variables: Option<Variables>,
}

impl BpmnError {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: None,
            variables: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, variable: Variable) -> Self {
        self.variables
            .get_or_insert_with(Variables::new)
            .insert(name.into(), variable);
        self
    }
}

struct ContextInner {
    task: LockedExternalTask,
    service: Arc<dyn ExternalTaskService>,
    outcome: Mutex<Option<Outcome>>,
}

/// Per-task facade over the engine
///
/// Cheap to clone; clones share the recorded outcome.
#[derive(Clone)]
pub struct TaskContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id())
            .field("worker_id", &self.worker_id())
            .field("outcome", &self.outcome())
            .finish_non_exhaustive()
    }
}

impl TaskContext {
    /// Wrap a locked task
    pub fn new(task: LockedExternalTask, service: Arc<dyn ExternalTaskService>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                task,
                service,
                outcome: Mutex::new(None),
            }),
        }
    }

    pub fn task(&self) -> &LockedExternalTask {
        &self.inner.task
    }

    pub fn task_id(&self) -> &str {
        &self.inner.task.id
    }

    pub fn worker_id(&self) -> &str {
        &self.inner.task.worker_id
    }

    pub fn topic_name(&self) -> &str {
        &self.inner.task.topic_name
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.inner.task.variable(name)
    }

    /// Last outcome reported successfully through this context
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.outcome.lock().clone()
    }

    fn record(&self, outcome: Outcome) {
        debug!(task_id = %self.task_id(), ?outcome, "Reported task outcome");
        *self.inner.outcome.lock() = Some(outcome);
    }

    /// Complete the task
    #[instrument(skip(self, completion), fields(task_id = %self.task_id()))]
    pub async fn complete(&self, completion: TaskCompletion) -> Result<(), ClientError> {
        let request = CompleteRequest {
            worker_id: self.worker_id().to_string(),
            variables: completion.variables,
            local_variables: completion.local_variables,
        };
        self.inner
            .service
            .complete(self.task_id(), &request)
            .await?;
        self.record(Outcome::Completed);
        Ok(())
    }

    /// Extend the lock by `new_duration`, counted from now
    #[instrument(skip(self), fields(task_id = %self.task_id()))]
    pub async fn extend_lock(&self, new_duration: Duration) -> Result<(), ClientError> {
        let request = ExtendLockRequest {
            worker_id: self.worker_id().to_string(),
            new_duration: new_duration.as_millis() as u64,
        };
        self.inner
            .service
            .extend_lock(self.task_id(), &request)
            .await?;
        self.record(Outcome::LockExtended {
            duration: new_duration,
        });
        Ok(())
    }

    /// Report a business error
    #[instrument(skip(self, error), fields(task_id = %self.task_id(), code = %error.code))]
    pub async fn handle_bpmn_error(&self, error: BpmnError) -> Result<(), ClientError> {
        let request = BpmnErrorRequest {
            worker_id: self.worker_id().to_string(),
            error_code: error.code,
            error_message: error.message,
            variables: error.variables,
        };
        self.inner
            .service
            .handle_bpmn_error(self.task_id(), &request)
            .await?;
        self.record(Outcome::BpmnErrorRaised {
            code: request.error_code,
            message: request.error_message,
        });
        Ok(())
    }

    /// Report a technical failure
    #[instrument(skip(self, failure), fields(task_id = %self.task_id()))]
    pub async fn handle_failure(&self, failure: TaskFailure) -> Result<(), ClientError> {
        let request = FailureRequest {
            worker_id: self.worker_id().to_string(),
            error_message: failure.message,
            error_details: failure.details,
            retries: failure.retries,
            retry_timeout: failure.retry_timeout.map(|t| t.as_millis() as u64),
        };
        self.inner
            .service
            .handle_failure(self.task_id(), &request)
            .await?;
        self.record(Outcome::Failed {
            retries: failure.retries,
            retry_timeout: failure.retry_timeout,
        });
        Ok(())
    }
}

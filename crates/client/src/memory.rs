//! In-memory implementation of ExternalTaskService for testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::ClientError;
use crate::external_task::{
    BpmnErrorRequest, CompleteRequest, ExtendLockRequest, ExternalTaskService, FailureRequest,
    FetchAndLock, FetchAndLockTopic, LockedExternalTask,
};
use crate::variable::{Variable, Variables};

/// Task status inside the in-memory engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Can be fetched (once `available_at` has passed)
    Available,
    /// Locked by a worker
    Locked,
    Completed,
    /// Ended through a BPMN error
    BpmnError,
    /// Retries exhausted; not fetchable until retries are reset
    Incident,
}

/// Every call made against the service, in order
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Complete {
        task_id: String,
        request: CompleteRequest,
    },
    Failure {
        task_id: String,
        request: FailureRequest,
    },
    BpmnError {
        task_id: String,
        request: BpmnErrorRequest,
    },
    ExtendLock {
        task_id: String,
        request: ExtendLockRequest,
    },
    Unlock {
        task_id: String,
    },
}

impl RecordedCall {
    /// Id of the task the call targeted
    pub fn task_id(&self) -> &str {
        match self {
            Self::Complete { task_id, .. }
            | Self::Failure { task_id, .. }
            | Self::BpmnError { task_id, .. }
            | Self::ExtendLock { task_id, .. }
            | Self::Unlock { task_id } => task_id,
        }
    }
}

/// A task to create in the in-memory engine
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub topic_name: String,
    pub variables: Variables,
    pub retries: Option<u32>,
    pub priority: i64,
    pub business_key: Option<String>,
}

impl NewTask {
    pub fn new(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            ..Default::default()
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, variable: Variable) -> Self {
        self.variables.insert(name.into(), variable);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_business_key(mut self, key: impl Into<String>) -> Self {
        self.business_key = Some(key.into());
        self
    }
}

/// Point-in-time view of a task
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: String,
    pub topic_name: String,
    pub status: TaskStatus,
    pub worker_id: Option<String>,
    pub retries: Option<u32>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub variables: Variables,
    pub local_variables: Variables,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
}

/// Internal task state
struct TaskState {
    sequence: u64,
    snapshot: TaskSnapshot,
    priority: i64,
    business_key: Option<String>,
    available_at: Option<DateTime<Utc>>,
}

impl TaskState {
    fn is_fetchable(&self, now: DateTime<Utc>) -> bool {
        match self.snapshot.status {
            TaskStatus::Available => self.available_at.map_or(true, |at| at <= now),
            // An expired lock makes the task fetchable again
            TaskStatus::Locked => self.snapshot.lock_expires_at.map_or(true, |at| at <= now),
            _ => false,
        }
    }

    fn matches(&self, topic: &FetchAndLockTopic) -> bool {
        if self.snapshot.topic_name != topic.topic_name {
            return false;
        }
        if let Some(key) = &topic.business_key {
            if self.business_key.as_ref() != Some(key) {
                return false;
            }
        }
        if let Some(filters) = &topic.process_variables {
            for (name, expected) in filters {
                match self.snapshot.variables.get(name) {
                    Some(variable) if variable.value() == expected => {}
                    _ => return false,
                }
            }
        }
        true
    }

    /// Check the lock is currently held by `worker_id`
    fn check_lock(&self, worker_id: &str, now: DateTime<Utc>) -> Result<(), ClientError> {
        let id = &self.snapshot.id;
        if self.snapshot.status != TaskStatus::Locked {
            return Err(ClientError::engine(
                "BadUserRequestException",
                format!("External task {id} is not locked"),
            ));
        }
        let owner = self.snapshot.worker_id.as_deref().unwrap_or_default();
        if owner != worker_id {
            return Err(ClientError::engine(
                "BadUserRequestException",
                format!(
                    "External task {id} cannot be processed by worker '{worker_id}'. It is locked by worker '{owner}'."
                ),
            ));
        }
        if self.snapshot.lock_expires_at.map_or(true, |at| at <= now) {
            return Err(ClientError::engine(
                "BadUserRequestException",
                format!("Lock of external task {id} has expired"),
            ));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.snapshot.worker_id = None;
        self.snapshot.lock_expires_at = None;
    }
}

/// In-memory implementation of ExternalTaskService
///
/// This is primarily for testing. It keeps tasks, locks and retries in
/// memory with the same observable semantics as the engine, records
/// every call, and can inject failures.
///
/// # Example
///
/// ```
/// use camunda_client::memory::{InMemoryExternalTaskService, NewTask};
///
/// let service = InMemoryExternalTaskService::new();
/// let task_id = service.add_task(NewTask::new("PrintHello"));
/// assert!(service.task(&task_id).is_some());
/// ```
pub struct InMemoryExternalTaskService {
    tasks: RwLock<HashMap<String, TaskState>>,
    calls: Mutex<Vec<RecordedCall>>,
    fetch_requests: Mutex<Vec<FetchAndLock>>,
    fetch_failures: AtomicUsize,
    report_failures: AtomicUsize,
    sequence: AtomicU64,
    task_added: Notify,
}

impl InMemoryExternalTaskService {
    /// Create a new in-memory engine
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fetch_requests: Mutex::new(Vec::new()),
            fetch_failures: AtomicUsize::new(0),
            report_failures: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
            task_added: Notify::new(),
        }
    }

    /// Create a task and wake long-polling fetches
    pub fn add_task(&self, task: NewTask) -> String {
        let id = Uuid::now_v7().to_string();
        let state = TaskState {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            snapshot: TaskSnapshot {
                id: id.clone(),
                topic_name: task.topic_name,
                status: TaskStatus::Available,
                worker_id: None,
                retries: task.retries,
                lock_expires_at: None,
                variables: task.variables,
                local_variables: Variables::new(),
                error_message: None,
                error_details: None,
            },
            priority: task.priority,
            business_key: task.business_key,
            available_at: None,
        };
        self.tasks.write().insert(id.clone(), state);
        self.task_added.notify_waiters();
        id
    }

    /// Get a snapshot of a task
    pub fn task(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks.read().get(task_id).map(|t| t.snapshot.clone())
    }

    /// Count tasks in the given status
    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .read()
            .values()
            .filter(|t| t.snapshot.status == status)
            .count()
    }

    /// All calls recorded so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// All fetch-and-lock queries received so far
    pub fn fetch_requests(&self) -> Vec<FetchAndLock> {
        self.fetch_requests.lock().clone()
    }

    /// Number of fetch-and-lock calls received so far
    pub fn fetch_count(&self) -> usize {
        self.fetch_requests.lock().len()
    }

    /// Make the next `count` fetches fail
    pub fn fail_next_fetches(&self, count: usize) {
        self.fetch_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` outcome reports fail
    pub fn fail_next_reports(&self, count: usize) {
        self.report_failures.store(count, Ordering::SeqCst);
    }

    /// Expire the lock of a task immediately
    pub fn expire_lock(&self, task_id: &str) {
        if let Some(task) = self.tasks.write().get_mut(task_id) {
            task.snapshot.lock_expires_at = Some(Utc::now() - chrono::Duration::milliseconds(1));
        }
    }

    /// Reset retries of a task, resolving its incident
    pub fn set_retries(&self, task_id: &str, retries: u32) -> Result<(), ClientError> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(task_id).ok_or_else(ClientError::not_found)?;
        task.snapshot.retries = Some(retries);
        if task.snapshot.status == TaskStatus::Incident && retries > 0 {
            task.snapshot.status = TaskStatus::Available;
        }
        drop(tasks);
        self.task_added.notify_waiters();
        Ok(())
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().push(call);
    }

    fn take_injected(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_report(&self) -> Result<(), ClientError> {
        if Self::take_injected(&self.report_failures) {
            return Err(ClientError::Status {
                status: 500,
                body: "injected report failure".to_string(),
            });
        }
        Ok(())
    }

    /// Lock and return up to `query.max_tasks` fetchable tasks
    fn lock_available(&self, query: &FetchAndLock) -> Vec<LockedExternalTask> {
        let now = Utc::now();
        let mut tasks = self.tasks.write();

        let mut candidates: Vec<(&String, &TaskState, &FetchAndLockTopic)> = tasks
            .iter()
            .filter(|(_, t)| t.is_fetchable(now))
            .filter_map(|(id, t)| {
                query
                    .topics
                    .iter()
                    .find(|topic| t.matches(topic))
                    .map(|topic| (id, t, topic))
            })
            .collect();

        if query.use_priority == Some(true) {
            candidates.sort_by(|a, b| b.1.priority.cmp(&a.1.priority).then(a.1.sequence.cmp(&b.1.sequence)));
        } else {
            candidates.sort_by_key(|(_, t, _)| t.sequence);
        }

        let selected: Vec<(String, FetchAndLockTopic)> = candidates
            .into_iter()
            .take(query.max_tasks as usize)
            .map(|(id, _, topic)| (id.clone(), topic.clone()))
            .collect();

        let mut locked = Vec::with_capacity(selected.len());
        for (id, topic) in selected {
            let Some(task) = tasks.get_mut(&id) else {
                continue;
            };
            let lock_duration = chrono::Duration::milliseconds(topic.lock_duration.unwrap_or(0) as i64);
            let expires_at = now + lock_duration;

            task.snapshot.status = TaskStatus::Locked;
            task.snapshot.worker_id = Some(query.worker_id.clone());
            task.snapshot.lock_expires_at = Some(expires_at);
            task.available_at = None;

            let variables = match &topic.variables {
                Some(names) => task
                    .snapshot
                    .variables
                    .iter()
                    .filter(|(name, _)| names.contains(name))
                    .map(|(name, v)| (name.clone(), v.clone()))
                    .collect(),
                None => task.snapshot.variables.clone(),
            };

            locked.push(LockedExternalTask {
                id: id.clone(),
                worker_id: query.worker_id.clone(),
                topic_name: task.snapshot.topic_name.clone(),
                lock_expiration_time: Some(expires_at.into()),
                retries: task.snapshot.retries,
                variables,
                activity_id: task.snapshot.topic_name.clone(),
                activity_instance_id: format!("{}:{}", task.snapshot.topic_name, task.sequence),
                execution_id: format!("execution-{}", task.sequence),
                process_definition_id: String::new(),
                process_definition_key: String::new(),
                process_instance_id: format!("instance-{}", task.sequence),
                tenant_id: None,
                priority: task.priority,
                business_key: task.business_key.clone(),
                error_message: task.snapshot.error_message.clone(),
                error_details: task.snapshot.error_details.clone(),
            });
        }

        locked
    }
}

impl Default for InMemoryExternalTaskService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExternalTaskService for InMemoryExternalTaskService {
    async fn fetch_and_lock(
        &self,
        query: &FetchAndLock,
    ) -> Result<Vec<LockedExternalTask>, ClientError> {
        self.fetch_requests.lock().push(query.clone());

        if Self::take_injected(&self.fetch_failures) {
            return Err(ClientError::Status {
                status: 503,
                body: "injected fetch failure".to_string(),
            });
        }

        // Registered before the scan so a task added in between still wakes us
        let task_added = self.task_added.notified();

        let locked = self.lock_available(query);
        if !locked.is_empty() {
            return Ok(locked);
        }

        match query.async_response_timeout {
            Some(millis) if millis > 0 => {
                let _ = tokio::time::timeout(Duration::from_millis(millis), task_added).await;
                Ok(self.lock_available(query))
            }
            _ => {
                tokio::task::yield_now().await;
                Ok(Vec::new())
            }
        }
    }

    async fn complete(&self, task_id: &str, request: &CompleteRequest) -> Result<(), ClientError> {
        self.record(RecordedCall::Complete {
            task_id: task_id.to_string(),
            request: request.clone(),
        });
        self.check_report()?;

        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(task_id).ok_or_else(ClientError::not_found)?;
        task.check_lock(&request.worker_id, Utc::now())?;

        if let Some(variables) = &request.variables {
            task.snapshot.variables.extend(variables.clone());
        }
        if let Some(local) = &request.local_variables {
            task.snapshot.local_variables.extend(local.clone());
        }
        task.snapshot.status = TaskStatus::Completed;
        task.release();
        Ok(())
    }

    async fn handle_failure(
        &self,
        task_id: &str,
        request: &FailureRequest,
    ) -> Result<(), ClientError> {
        self.record(RecordedCall::Failure {
            task_id: task_id.to_string(),
            request: request.clone(),
        });
        self.check_report()?;

        let now = Utc::now();
        {
            let mut tasks = self.tasks.write();
            let task = tasks.get_mut(task_id).ok_or_else(ClientError::not_found)?;
            task.check_lock(&request.worker_id, now)?;

            task.snapshot.error_message = request.error_message.clone();
            task.snapshot.error_details = request.error_details.clone();
            // An omitted retry count is taken as 0, like the engine does
            let retries = request.retries.unwrap_or(0);
            task.snapshot.retries = Some(retries);
            task.release();

            if retries == 0 {
                task.snapshot.status = TaskStatus::Incident;
            } else {
                task.snapshot.status = TaskStatus::Available;
                task.available_at = request
                    .retry_timeout
                    .map(|millis| now + chrono::Duration::milliseconds(millis as i64));
            }
        }
        self.task_added.notify_waiters();
        Ok(())
    }

    async fn handle_bpmn_error(
        &self,
        task_id: &str,
        request: &BpmnErrorRequest,
    ) -> Result<(), ClientError> {
        self.record(RecordedCall::BpmnError {
            task_id: task_id.to_string(),
            request: request.clone(),
        });
        self.check_report()?;

        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(task_id).ok_or_else(ClientError::not_found)?;
        task.check_lock(&request.worker_id, Utc::now())?;

        if let Some(variables) = &request.variables {
            task.snapshot.variables.extend(variables.clone());
        }
        task.snapshot.error_message = request.error_message.clone();
        task.snapshot.status = TaskStatus::BpmnError;
        task.release();
        Ok(())
    }

    async fn extend_lock(
        &self,
        task_id: &str,
        request: &ExtendLockRequest,
    ) -> Result<(), ClientError> {
        self.record(RecordedCall::ExtendLock {
            task_id: task_id.to_string(),
            request: request.clone(),
        });
        self.check_report()?;

        let now = Utc::now();
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(task_id).ok_or_else(ClientError::not_found)?;
        task.check_lock(&request.worker_id, now)?;

        task.snapshot.lock_expires_at =
            Some(now + chrono::Duration::milliseconds(request.new_duration as i64));
        Ok(())
    }

    async fn unlock(&self, task_id: &str) -> Result<(), ClientError> {
        self.record(RecordedCall::Unlock {
            task_id: task_id.to_string(),
        });
        self.check_report()?;

        {
            let mut tasks = self.tasks.write();
            let task = tasks.get_mut(task_id).ok_or_else(ClientError::not_found)?;
            if task.snapshot.status == TaskStatus::Locked {
                task.snapshot.status = TaskStatus::Available;
                task.release();
            }
        }
        self.task_added.notify_waiters();
        Ok(())
    }
}

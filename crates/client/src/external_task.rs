//! External task resource: request/response types and the service trait

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::time::engine_time_opt;
use crate::variable::{Variable, Variables};

/// Remote service exposing the external task operations a worker needs
///
/// Implemented over HTTP by [`ExternalTaskClient`](crate::ExternalTaskClient)
/// and in memory by [`InMemoryExternalTaskService`](crate::InMemoryExternalTaskService).
#[async_trait]
pub trait ExternalTaskService: Send + Sync {
    /// Fetch and lock up to `query.max_tasks` tasks for the given topics
    async fn fetch_and_lock(
        &self,
        query: &FetchAndLock,
    ) -> Result<Vec<LockedExternalTask>, ClientError>;

    /// Complete a locked task
    async fn complete(&self, task_id: &str, request: &CompleteRequest) -> Result<(), ClientError>;

    /// Report a technical failure for a locked task
    async fn handle_failure(
        &self,
        task_id: &str,
        request: &FailureRequest,
    ) -> Result<(), ClientError>;

    /// Report a business (BPMN) error for a locked task
    async fn handle_bpmn_error(
        &self,
        task_id: &str,
        request: &BpmnErrorRequest,
    ) -> Result<(), ClientError>;

    /// Extend the lock of a task held by the requesting worker
    async fn extend_lock(
        &self,
        task_id: &str,
        request: &ExtendLockRequest,
    ) -> Result<(), ClientError>;

    /// Release a lock so the task can be fetched again
    async fn unlock(&self, task_id: &str) -> Result<(), ClientError>;
}

/// Fetch-and-lock request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchAndLock {
    /// Id of the worker the tasks are locked for
    pub worker_id: String,

    /// Maximum number of tasks to return
    pub max_tasks: u32,

    /// Fetch tasks in descending priority order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_priority: Option<bool>,

    /// Long-polling timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_response_timeout: Option<u64>,

    /// Topics to fetch from
    pub topics: Vec<FetchAndLockTopic>,
}

/// A topic subscription inside a fetch-and-lock request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchAndLockTopic {
    /// Topic name
    pub topic_name: String,

    /// Lock duration in milliseconds
    ///
    /// `None` (or 0) lets the processor fill in its default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_duration: Option<u64>,

    /// Only fetch these variables (all when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,

    /// Only fetch local variables of the task's execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_variables: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_id_in: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_key_in: Option<Vec<String>>,

    /// Only tasks that belong to no tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub without_tenant_id: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id_in: Option<Vec<String>>,

    /// Only tasks whose process has a variable with exactly this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_variables: Option<BTreeMap<String, serde_json::Value>>,

    /// Return serializable variables in their deserialized form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deserialize_values: Option<bool>,
}

impl FetchAndLockTopic {
    /// Subscribe to a topic
    pub fn new(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            ..Default::default()
        }
    }

    /// Set an explicit lock duration in milliseconds
    pub fn with_lock_duration(mut self, millis: u64) -> Self {
        self.lock_duration = Some(millis);
        self
    }

    /// Restrict the fetched variables
    pub fn with_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_local_variables(mut self, local: bool) -> Self {
        self.local_variables = Some(local);
        self
    }

    pub fn with_business_key(mut self, key: impl Into<String>) -> Self {
        self.business_key = Some(key.into());
        self
    }

    pub fn with_process_definition_key(mut self, key: impl Into<String>) -> Self {
        self.process_definition_key = Some(key.into());
        self
    }

    pub fn with_tenant_ids<I, S>(mut self, tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tenant_id_in = Some(tenants.into_iter().map(Into::into).collect());
        self
    }

    pub fn without_tenant_id(mut self) -> Self {
        self.without_tenant_id = Some(true);
        self
    }

    /// Add a process variable equality filter
    pub fn with_process_variable(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.process_variables
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_deserialize_values(mut self, deserialize: bool) -> Self {
        self.deserialize_values = Some(deserialize);
        self
    }
}

/// A task locked for a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedExternalTask {
    /// Task id
    pub id: String,

    /// Worker holding the lock
    #[serde(default)]
    pub worker_id: String,

    #[serde(default)]
    pub topic_name: String,

    /// When the current lock expires
    #[serde(default, with = "engine_time_opt")]
    pub lock_expiration_time: Option<DateTime<FixedOffset>>,

    /// Retries left; absent until the first failure is reported
    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub variables: Variables,

    #[serde(default)]
    pub activity_id: String,

    #[serde(default)]
    pub activity_instance_id: String,

    #[serde(default)]
    pub execution_id: String,

    #[serde(default)]
    pub process_definition_id: String,

    #[serde(default)]
    pub process_definition_key: String,

    #[serde(default)]
    pub process_instance_id: String,

    #[serde(default)]
    pub tenant_id: Option<String>,

    #[serde(default)]
    pub priority: i64,

    #[serde(default)]
    pub business_key: Option<String>,

    /// Message of the latest reported failure
    #[serde(default)]
    pub error_message: Option<String>,

    /// Details of the latest reported failure
    #[serde(default)]
    pub error_details: Option<String>,
}

impl LockedExternalTask {
    /// Look up a variable by name
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }
}

/// An external task as returned by the task query endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTask {
    pub id: String,

    #[serde(default)]
    pub topic_name: String,

    #[serde(default)]
    pub worker_id: Option<String>,

    #[serde(default, with = "engine_time_opt")]
    pub lock_expiration_time: Option<DateTime<FixedOffset>>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub suspended: bool,

    #[serde(default)]
    pub priority: i64,

    #[serde(default)]
    pub activity_id: String,

    #[serde(default)]
    pub activity_instance_id: String,

    #[serde(default)]
    pub execution_id: String,

    #[serde(default)]
    pub process_definition_id: String,

    #[serde(default)]
    pub process_definition_key: String,

    #[serde(default)]
    pub process_instance_id: String,

    #[serde(default)]
    pub tenant_id: Option<String>,

    #[serde(default)]
    pub business_key: Option<String>,

    #[serde(default)]
    pub error_message: Option<String>,

    #[serde(default)]
    pub error_details: Option<String>,
}

/// Complete request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub worker_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Variables>,

    /// Variables set only in the scope of the external task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_variables: Option<Variables>,
}

/// Failure request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRequest {
    pub worker_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,

    /// Retries left; 0 creates an incident
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Milliseconds before the task can be fetched again
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_timeout: Option<u64>,
}

/// BPMN error request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BpmnErrorRequest {
    pub worker_id: String,

    /// Code used to select the BPMN error boundary
    pub error_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Variables>,
}

/// Extend-lock request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendLockRequest {
    pub worker_id: String,

    /// New lock duration in milliseconds, counted from now
    pub new_duration: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fetch_and_lock_wire_format() {
        let query = FetchAndLock {
            worker_id: "worker-1".to_string(),
            max_tasks: 5,
            use_priority: Some(true),
            async_response_timeout: Some(5000),
            topics: vec![FetchAndLockTopic::new("invoice")
                .with_lock_duration(10_000)
                .with_variables(["amount"])
                .with_process_variable("region", "emea")],
        };

        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(
            json,
            json!({
                "workerId": "worker-1",
                "maxTasks": 5,
                "usePriority": true,
                "asyncResponseTimeout": 5000,
                "topics": [{
                    "topicName": "invoice",
                    "lockDuration": 10000,
                    "variables": ["amount"],
                    "processVariables": {"region": "emea"}
                }]
            })
        );
    }

    #[test]
    fn test_locked_task_from_engine_json() {
        let task: LockedExternalTask = serde_json::from_value(json!({
            "activityId": "PrintHello",
            "activityInstanceId": "PrintHello:1",
            "errorMessage": null,
            "errorDetails": null,
            "executionId": "exec-1",
            "id": "task-1",
            "lockExpirationTime": "2024-03-01T10:15:30.000+0100",
            "processDefinitionId": "hello:1:abc",
            "processDefinitionKey": "hello",
            "processInstanceId": "pi-1",
            "tenantId": null,
            "retries": null,
            "workerId": "worker-1",
            "priority": 0,
            "topicName": "PrintHello",
            "businessKey": "order-42",
            "variables": {
                "isWorld": {"type": "Boolean", "value": false, "valueInfo": {}}
            }
        }))
        .unwrap();

        assert_eq!(task.id, "task-1");
        assert_eq!(task.retries, None);
        assert!(task.lock_expiration_time.is_some());
        assert_eq!(task.business_key.as_deref(), Some("order-42"));
        assert_eq!(task.variable("isWorld").and_then(|v| v.as_bool()), Some(false));
    }

    #[test]
    fn test_failure_request_omits_unset_fields() {
        let request = FailureRequest {
            worker_id: "worker-1".to_string(),
            error_message: Some("boom".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, json!({"workerId": "worker-1", "errorMessage": "boom"}));
    }
}

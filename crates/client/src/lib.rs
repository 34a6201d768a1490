//! Camunda Client - typed access to the external-task REST resource
//!
//! This crate talks to the `/external-task` endpoints of a BPMN engine:
//!
//! - **Fetch and lock**: claim tasks for one or more topics, with long polling
//! - **Outcomes**: complete, report a failure, report a BPMN error
//! - **Locks**: extend or release the lock on a claimed task
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐        ┌─────────────────────────────┐
//! │ camunda-processor    │        │ BPMN engine                 │
//! │                      │        │                             │
//! │ Arc<dyn              │  HTTP  │ POST /external-task/        │
//! │  ExternalTaskService>├───────►│   fetchAndLock              │
//! │                      │        │   {id}/complete             │
//! └──────────┬───────────┘        │   {id}/failure              │
//!            │                    │   {id}/bpmnError            │
//!            │ tests              │   {id}/extendLock           │
//!            ▼                    │   {id}/unlock               │
//! ┌──────────────────────┐        └─────────────────────────────┘
//! │ InMemoryExternal-    │
//! │ TaskService          │
//! └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use camunda_client::{Client, ClientConfig, ExternalTaskService, FetchAndLock, FetchAndLockTopic};
//!
//! # async fn example() -> Result<(), camunda_client::ClientError> {
//! let client = Client::new(ClientConfig::new("http://localhost:8080/engine-rest"))?;
//! let tasks = client
//!     .external_task()
//!     .fetch_and_lock(&FetchAndLock {
//!         worker_id: "worker-1".to_string(),
//!         max_tasks: 10,
//!         use_priority: None,
//!         async_response_timeout: Some(30_000),
//!         topics: vec![FetchAndLockTopic::new("PrintHello").with_lock_duration(60_000)],
//!     })
//!     .await?;
//! # let _ = tasks;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod external_task;
pub mod memory;
pub mod time;
pub mod variable;

pub use client::{Client, ClientConfig, ExternalTaskClient, DEFAULT_ENDPOINT_URL, DEFAULT_TIMEOUT};
pub use error::ClientError;
pub use external_task::{
    BpmnErrorRequest, CompleteRequest, ExtendLockRequest, ExternalTask, ExternalTaskService,
    FailureRequest, FetchAndLock, FetchAndLockTopic, LockedExternalTask,
};
pub use memory::{InMemoryExternalTaskService, NewTask, RecordedCall, TaskSnapshot, TaskStatus};
pub use variable::{ValueInfo, ValueType, Variable, Variables};

//! # Camunda Processor
//!
//! A concurrent external task processor for a BPMN engine REST API.
//!
//! ## Features
//!
//! - **Handler registration**: one poller and a bounded worker pool per registration
//! - **Backpressure**: a capacity-1 channel between poller and workers
//! - **Linear backoff**: failed fetches back off 1s, 2s, ... up to 60s
//! - **Crash isolation**: handler panics are reported as task failures with a stack trace
//! - **Graceful shutdown**: buffered and in-flight tasks are finished before shutdown returns
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Processor                            │
//! │  (options, worker id, shutdown token, task tracker)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ add_handler
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Poller ──► Task Channel ──► Workers            │
//! │  (fetchAndLock, backoff)           (TaskContext, handler)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ExternalTaskService                        │
//! │  (engine REST client or in-memory engine)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod error;
pub mod options;
pub mod processor;
pub mod worker;

pub use context::{BpmnError, Outcome, TaskCompletion, TaskContext, TaskFailure};
pub use error::{tracing_error_logger, ConfigError, ErrorLogger, ProcessorError};
pub use options::ProcessorOptions;
pub use processor::{Processor, ProcessorBuilder};
pub use worker::{invoke, Invocation, LinearBackoff, TaskHandler};

/// Prelude for common imports
pub mod prelude {
    pub use crate::context::{BpmnError, Outcome, TaskCompletion, TaskContext, TaskFailure};
    pub use crate::error::{ConfigError, ProcessorError};
    pub use crate::options::ProcessorOptions;
    pub use crate::processor::Processor;
    pub use camunda_client::{FetchAndLockTopic, Variable, Variables};
}

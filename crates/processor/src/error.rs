//! Processor errors and the error logger hook

use std::sync::Arc;
use std::time::Duration;

use camunda_client::ClientError;
use tracing::error;

/// Invalid processor options
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max parallel tasks per handler must be at least 1, got {0}")]
    InvalidParallelism(usize),

    #[error("lock duration must be at least 1ms")]
    ZeroLockDuration,

    #[error("long polling timeout must be at least 1ms when set")]
    ZeroLongPollingTimeout,

    #[error("max tasks must be at least 1")]
    ZeroMaxTasks,
}

/// Runtime errors observed by the processor
///
/// None of these stop the processor; they are handed to the [`ErrorLogger`].
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// Fetch-and-lock failed; the poller sleeps for `delay` and tries again
    #[error("failed pull: {source}, sleeping: {} seconds", .delay.as_secs())]
    Fetch {
        #[source]
        source: ClientError,
        delay: Duration,
    },

    /// A handler returned an error
    #[error("task error: {message}")]
    Task { task_id: String, message: String },

    /// A handler panicked
    #[error("{message}")]
    Fault {
        task_id: String,
        message: String,
        backtrace: String,
    },

    /// Reporting an outcome to the engine failed
    #[error("error send {operation}: {source}")]
    Report {
        task_id: String,
        operation: &'static str,
        #[source]
        source: ClientError,
    },

    /// The processor no longer accepts handlers
    #[error("processor is shut down")]
    ShutDown,
}

impl ProcessorError {
    /// Id of the task the error relates to, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Task { task_id, .. }
            | Self::Fault { task_id, .. }
            | Self::Report { task_id, .. } => Some(task_id),
            Self::Fetch { .. } | Self::ShutDown => None,
        }
    }
}

/// Callback receiving every runtime error
pub type ErrorLogger = Arc<dyn Fn(&ProcessorError) + Send + Sync>;

/// Error logger that emits a `tracing` error event
pub fn tracing_error_logger() -> ErrorLogger {
    Arc::new(|err: &ProcessorError| match err.task_id() {
        Some(task_id) => error!(task_id, "{err}"),
        None => error!("{err}"),
    })
}

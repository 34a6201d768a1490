//! Worker configuration from the environment

use std::time::Duration;

use camunda_client::{ClientConfig, DEFAULT_ENDPOINT_URL};
use camunda_processor::ProcessorOptions;
use tracing::warn;

/// Client and processor settings for the worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub client: ClientConfig,
    pub processor: ProcessorOptions,
}

impl WorkerConfig {
    /// Read configuration from environment variables
    ///
    /// - `CAMUNDA_URL`: engine REST endpoint (default: `http://localhost:8080/engine-rest`)
    /// - `CAMUNDA_USER` / `CAMUNDA_PASSWORD`: basic auth credentials
    /// - `CAMUNDA_TIMEOUT_MS`: HTTP request timeout
    /// - `WORKER_ID`: worker id (generated when unset)
    /// - `LOCK_DURATION_MS`, `MAX_TASKS`, `MAX_PARALLEL_TASKS`,
    ///   `LONG_POLLING_TIMEOUT_MS`, `USE_PRIORITY`: processor options
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unparsable values fall back to defaults
    ///
    /// A long-polling timeout that is not below the request timeout is
    /// clamped to half the request timeout.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse_u64 = |key: &str| lookup(key).and_then(|s| s.parse::<u64>().ok());

        let mut client =
            ClientConfig::new(lookup("CAMUNDA_URL").unwrap_or_else(|| DEFAULT_ENDPOINT_URL.to_string()));
        if let Some(user) = lookup("CAMUNDA_USER") {
            client = client.with_auth(user, lookup("CAMUNDA_PASSWORD").unwrap_or_default());
        }
        if let Some(millis) = parse_u64("CAMUNDA_TIMEOUT_MS") {
            client = client.with_timeout(Duration::from_millis(millis));
        }

        let defaults = ProcessorOptions::default();
        let mut processor = ProcessorOptions {
            worker_id: lookup("WORKER_ID").filter(|id| !id.is_empty()),
            lock_duration: parse_u64("LOCK_DURATION_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_duration),
            max_tasks: lookup("MAX_TASKS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tasks),
            max_parallel_task_per_handler: lookup("MAX_PARALLEL_TASKS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_parallel_task_per_handler),
            use_priority: lookup("USE_PRIORITY")
                .and_then(|s| s.parse().ok())
                .or(defaults.use_priority),
            long_polling_timeout: parse_u64("LONG_POLLING_TIMEOUT_MS")
                .map(Duration::from_millis)
                .or(defaults.long_polling_timeout),
        };

        if let Some(long_poll) = processor.long_polling_timeout {
            if long_poll >= client.timeout {
                let clamped = client.timeout / 2;
                warn!(
                    long_polling_timeout_ms = long_poll.as_millis() as u64,
                    request_timeout_ms = client.timeout.as_millis() as u64,
                    clamped_ms = clamped.as_millis() as u64,
                    "Long-polling timeout must stay below the request timeout, clamping"
                );
                processor.long_polling_timeout = Some(clamped);
            }
        }

        Self { client, processor }
    }
}

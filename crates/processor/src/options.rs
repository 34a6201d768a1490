//! Processor options

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Processor configuration
///
/// Validated once when the processor is built and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorOptions {
    /// Worker id sent with every request (generated if absent or empty)
    #[serde(default)]
    pub worker_id: Option<String>,

    /// Lock duration for topics that do not set their own
    #[serde(with = "duration_millis")]
    pub lock_duration: Duration,

    /// Maximum number of tasks per fetch
    pub max_tasks: u32,

    /// Number of workers per registered handler
    pub max_parallel_task_per_handler: usize,

    /// Fetch tasks in descending priority order
    #[serde(default)]
    pub use_priority: Option<bool>,

    /// How long a fetch may wait on the engine for tasks to appear
    #[serde(default, with = "option_duration_millis")]
    pub long_polling_timeout: Option<Duration>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            worker_id: None,
            lock_duration: Duration::from_secs(30),
            max_tasks: 10,
            max_parallel_task_per_handler: 10,
            use_priority: None,
            long_polling_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ProcessorOptions {
    /// Set the worker id
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = Some(id.into());
        self
    }

    /// Set the default lock duration
    pub fn with_lock_duration(mut self, duration: Duration) -> Self {
        self.lock_duration = duration;
        self
    }

    /// Set maximum tasks per fetch
    pub fn with_max_tasks(mut self, max: u32) -> Self {
        self.max_tasks = max;
        self
    }

    /// Set the number of workers per handler
    pub fn with_max_parallel_task_per_handler(mut self, max: usize) -> Self {
        self.max_parallel_task_per_handler = max;
        self
    }

    pub fn with_use_priority(mut self, use_priority: bool) -> Self {
        self.use_priority = Some(use_priority);
        self
    }

    /// Set the long-polling timeout (`None` disables long polling)
    pub fn with_long_polling_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.long_polling_timeout = timeout;
        self
    }

    /// Check the options can drive a processor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_task_per_handler < 1 {
            return Err(ConfigError::InvalidParallelism(
                self.max_parallel_task_per_handler,
            ));
        }
        if self.lock_duration.as_millis() == 0 {
            return Err(ConfigError::ZeroLockDuration);
        }
        if matches!(self.long_polling_timeout, Some(t) if t.as_millis() == 0) {
            return Err(ConfigError::ZeroLongPollingTimeout);
        }
        if self.max_tasks == 0 {
            return Err(ConfigError::ZeroMaxTasks);
        }
        Ok(())
    }

    pub(crate) fn lock_duration_millis(&self) -> u64 {
        self.lock_duration.as_millis() as u64
    }

    pub(crate) fn long_polling_timeout_millis(&self) -> Option<u64> {
        self.long_polling_timeout.map(|t| t.as_millis() as u64)
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ProcessorOptions::default();
        assert_eq!(options.max_tasks, 10);
        assert_eq!(options.max_parallel_task_per_handler, 10);
        assert_eq!(options.lock_duration, Duration::from_secs(30));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_builder() {
        let options = ProcessorOptions::default()
            .with_worker_id("worker-a")
            .with_lock_duration(Duration::from_secs(5))
            .with_max_tasks(3)
            .with_max_parallel_task_per_handler(2)
            .with_use_priority(true)
            .with_long_polling_timeout(None);

        assert_eq!(options.worker_id.as_deref(), Some("worker-a"));
        assert_eq!(options.lock_duration_millis(), 5000);
        assert_eq!(options.max_tasks, 3);
        assert_eq!(options.max_parallel_task_per_handler, 2);
        assert_eq!(options.use_priority, Some(true));
        assert_eq!(options.long_polling_timeout_millis(), None);
    }

    #[test]
    fn test_validate_rejects_zero_parallelism() {
        let options = ProcessorOptions::default().with_max_parallel_task_per_handler(0);
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidParallelism(0))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let options = ProcessorOptions::default().with_lock_duration(Duration::ZERO);
        assert!(matches!(options.validate(), Err(ConfigError::ZeroLockDuration)));

        // Sub-millisecond durations round down to zero on the wire
        let options = ProcessorOptions::default().with_lock_duration(Duration::from_micros(500));
        assert!(matches!(options.validate(), Err(ConfigError::ZeroLockDuration)));

        let options = ProcessorOptions::default().with_long_polling_timeout(Some(Duration::ZERO));
        assert!(matches!(
            options.validate(),
            Err(ConfigError::ZeroLongPollingTimeout)
        ));
    }

    #[test]
    fn test_validate_rejects_zero_max_tasks() {
        let options = ProcessorOptions::default().with_max_tasks(0);
        assert!(matches!(options.validate(), Err(ConfigError::ZeroMaxTasks)));
    }

    #[test]
    fn test_serde_durations_as_millis() {
        let options = ProcessorOptions::default()
            .with_lock_duration(Duration::from_millis(1500))
            .with_long_polling_timeout(Some(Duration::from_secs(2)));

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["lock_duration"], 1500);
        assert_eq!(json["long_polling_timeout"], 2000);

        let parsed: ProcessorOptions = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, options);
    }
}

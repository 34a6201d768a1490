//! Processor lifecycle: handler registration and shutdown

use std::future::Future;
use std::sync::Arc;

use camunda_client::{ExternalTaskService, FetchAndLock, FetchAndLockTopic};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, instrument};

use crate::context::TaskContext;
use crate::error::{tracing_error_logger, ConfigError, ErrorLogger, ProcessorError};
use crate::options::ProcessorOptions;
use crate::worker::{boxed_handler, spawn_workers, Poller};

/// Capacity of the channel between a poller and its workers
const TASK_CHANNEL_CAPACITY: usize = 1;

/// External task processor
///
/// Every [`add_handler`](Processor::add_handler) call starts one poller and
/// its own pool of workers. [`shutdown`](Processor::shutdown) stops all
/// pollers and waits for every worker to finish.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use camunda_client::{Client, ClientConfig, FetchAndLockTopic, Variable};
/// use camunda_processor::{Processor, ProcessorOptions, TaskCompletion};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = Client::new(ClientConfig::default())?;
/// let processor = Processor::new(Arc::new(client.external_task()), ProcessorOptions::default())?;
///
/// processor.add_handler(vec![FetchAndLockTopic::new("PrintHello")], |ctx| async move {
///     ctx.complete(TaskCompletion::new().with_variable("status", Variable::boolean(true)))
///         .await?;
///     Ok(())
/// })?;
///
/// tokio::signal::ctrl_c().await?;
/// processor.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Processor {
    service: Arc<dyn ExternalTaskService>,
    options: ProcessorOptions,
    worker_id: String,
    error_logger: ErrorLogger,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("worker_id", &self.worker_id)
            .field("options", &self.options)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Processor`]
pub struct ProcessorBuilder {
    service: Arc<dyn ExternalTaskService>,
    options: ProcessorOptions,
    error_logger: Option<ErrorLogger>,
    rng: Option<StdRng>,
}

impl ProcessorBuilder {
    /// Receive every runtime error instead of the default `tracing` logger
    pub fn error_logger<F>(mut self, logger: F) -> Self
    where
        F: Fn(&ProcessorError) + Send + Sync + 'static,
    {
        self.error_logger = Some(Arc::new(logger));
        self
    }

    /// Random source for the generated worker id
    pub fn worker_id_rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Validate the options and build the processor
    pub fn build(self) -> Result<Processor, ConfigError> {
        self.options.validate()?;

        let worker_id = match self.options.worker_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let mut rng = self.rng.unwrap_or_else(StdRng::from_entropy);
                format!("worker-{}", rng.gen::<u64>())
            }
        };

        info!(worker_id = %worker_id, "Processor created");

        Ok(Processor {
            service: self.service,
            options: self.options,
            worker_id,
            error_logger: self.error_logger.unwrap_or_else(tracing_error_logger),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }
}

impl Processor {
    /// Create a processor with the default error logger
    pub fn new(
        service: Arc<dyn ExternalTaskService>,
        options: ProcessorOptions,
    ) -> Result<Self, ConfigError> {
        Self::builder(service, options).build()
    }

    pub fn builder(service: Arc<dyn ExternalTaskService>, options: ProcessorOptions) -> ProcessorBuilder {
        ProcessorBuilder {
            service,
            options,
            error_logger: None,
            rng: None,
        }
    }

    /// Worker id sent with every engine request
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Check if shutdown has been requested
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Register a handler for the given topics
    ///
    /// Starts a poller and `max_parallel_task_per_handler` workers. Topics
    /// without a positive lock duration get the processor's lock duration.
    /// Must be called from within a tokio runtime.
    #[instrument(skip(self, topics, handler), fields(worker_id = %self.worker_id))]
    pub fn add_handler<F, Fut>(
        &self,
        topics: Vec<FetchAndLockTopic>,
        handler: F,
    ) -> Result<(), ProcessorError>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(ProcessorError::ShutDown);
        }

        let query = self.fetch_query(topics);
        let topic_names: Vec<&str> = query.topics.iter().map(|t| t.topic_name.as_str()).collect();
        info!(topics = ?topic_names, "Registering handler");

        let (sender, receiver) = mpsc::channel(TASK_CHANNEL_CAPACITY);

        let workers = spawn_workers(
            &self.tracker,
            self.options.max_parallel_task_per_handler,
            Arc::new(Mutex::new(receiver)),
            boxed_handler(handler),
            self.service.clone(),
            self.error_logger.clone(),
        );

        let poller = Poller::new(
            self.service.clone(),
            query,
            sender,
            self.shutdown.clone(),
            self.error_logger.clone(),
        );
        self.tracker.spawn(poller.run());

        info!(workers, "Handler registered");
        Ok(())
    }

    /// Stop all pollers and wait for every worker to drain
    ///
    /// Tasks already fetched are still handled. Safe to call more than once.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn shutdown(&self) {
        info!("Shutting down processor");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Processor stopped");
    }

    fn fetch_query(&self, topics: Vec<FetchAndLockTopic>) -> FetchAndLock {
        let default_lock = self.options.lock_duration_millis();
        let topics = topics
            .into_iter()
            .map(|mut topic| {
                if !matches!(topic.lock_duration, Some(d) if d > 0) {
                    topic.lock_duration = Some(default_lock);
                }
                topic
            })
            .collect();

        FetchAndLock {
            worker_id: self.worker_id.clone(),
            max_tasks: self.options.max_tasks,
            use_priority: self.options.use_priority,
            async_response_timeout: self.options.long_polling_timeout_millis(),
            topics,
        }
    }
}

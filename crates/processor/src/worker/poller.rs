//! Task polling with linear backoff
//!
//! One poller runs per handler registration. It fetches and locks tasks and
//! hands them to the worker pool through a bounded channel.

use std::sync::Arc;
use std::time::Duration;

use camunda_client::{ExternalTaskService, FetchAndLock, LockedExternalTask};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{ErrorLogger, ProcessorError};

/// Linear backoff for failed fetches: 1s, 2s, ... capped at 60s
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearBackoff {
    retries: u32,
}

impl LinearBackoff {
    /// Retry count (and delay in seconds) at which the backoff stops growing
    pub const MAX_RETRIES: u32 = 60;

    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return how long to sleep before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.retries = (self.retries + 1).min(Self::MAX_RETRIES);
        Duration::from_secs(u64::from(self.retries))
    }

    /// Record a success
    pub fn reset(&mut self) {
        self.retries = 0;
    }

    /// Consecutive failures so far (saturating)
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

/// Fetch loop feeding one worker pool
pub(crate) struct Poller {
    service: Arc<dyn ExternalTaskService>,
    query: FetchAndLock,
    sender: mpsc::Sender<LockedExternalTask>,
    shutdown: CancellationToken,
    error_logger: ErrorLogger,
    backoff: LinearBackoff,
}

impl Poller {
    pub(crate) fn new(
        service: Arc<dyn ExternalTaskService>,
        query: FetchAndLock,
        sender: mpsc::Sender<LockedExternalTask>,
        shutdown: CancellationToken,
        error_logger: ErrorLogger,
    ) -> Self {
        Self {
            service,
            query,
            sender,
            shutdown,
            error_logger,
            backoff: LinearBackoff::new(),
        }
    }

    /// Poll until shutdown; dropping the sender on return closes the channel
    #[instrument(skip(self), fields(worker_id = %self.query.worker_id))]
    pub(crate) async fn run(mut self) {
        while !self.shutdown.is_cancelled() {
            match self.service.fetch_and_lock(&self.query).await {
                Ok(tasks) => {
                    self.backoff.reset();
                    if !tasks.is_empty() {
                        debug!(count = tasks.len(), "Fetched tasks");
                    }
                    // Tasks are already locked for us, so hand off the whole batch
                    for task in tasks {
                        if self.sender.send(task).await.is_err() {
                            return;
                        }
                    }
                }
                Err(source) => {
                    let delay = self.backoff.next_delay();
                    (self.error_logger)(&ProcessorError::Fetch { source, delay });
                    if self.wait(delay).await {
                        break;
                    }
                }
            }
        }
        info!("Poller stopped");
    }

    /// Sleep for `delay`; returns true if shutdown was requested meanwhile
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.shutdown.cancelled() => {
                debug!("Shutdown signal received during backoff");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let mut backoff = LinearBackoff::new();
        let delays: Vec<u64> = (0..62).map(|_| backoff.next_delay().as_secs()).collect();

        assert_eq!(&delays[..3], &[1, 2, 3]);
        assert_eq!(delays[59], 60);
        assert_eq!(delays[60], 60);
        assert_eq!(delays[61], 60);
        assert_eq!(backoff.retries(), LinearBackoff::MAX_RETRIES);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = LinearBackoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.retries(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}

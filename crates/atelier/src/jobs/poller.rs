//! Client side of the polling protocol.

use std::time::Duration;

use super::orchestrator::Orchestrator;
use super::types::{JobClass, JobStatus};
use crate::error::{AtelierError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polls a job class until its record settles.
#[derive(Clone)]
pub struct StatusPoller {
    orchestrator: Orchestrator,
    interval: Duration,
    timeout: Option<Duration>,
}

impl StatusPoller {
    /// Polls at the orchestrator's configured interval.
    pub fn new(orchestrator: Orchestrator) -> Self {
        let interval = orchestrator.poll_interval();
        Self {
            orchestrator,
            interval,
            timeout: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the first `complete` or `error` record. An idle record also
    /// ends the wait: the job was cancelled or its result already consumed.
    pub async fn wait_for_terminal(&self, class: JobClass) -> Result<JobStatus> {
        let poll = self.poll(class);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, poll)
                .await
                .map_err(|_| AtelierError::Timeout(class.to_string()))?,
            None => poll.await,
        }
    }

    async fn poll(&self, class: JobClass) -> Result<JobStatus> {
        loop {
            let status = self.orchestrator.get_status(class).await?;
            if status.is_terminal() || status.is_idle() {
                return Ok(status);
            }
            log::debug!(
                "{} job still analyzing ({:?})",
                class,
                status.progress
            );
            tokio::time::sleep(self.interval).await;
        }
    }
}

//! Push channel for job status changes.
//!
//! Every status write the store accepts is re-published here. Polling the
//! store stays the primary protocol; subscribers get the same snapshots
//! without waiting for the next poll.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::jobs::{JobClass, JobStatus};

/// Default channel capacity; slow subscribers see `Lagged` past this.
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusEvent {
    pub job_class: JobClass,
    /// The record as written. Idle after a cancel or clear.
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
}

impl JobStatusEvent {
    pub fn new(job_class: JobClass, status: JobStatus) -> Self {
        Self {
            job_class,
            status,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct JobStatusBroadcaster {
    sender: Arc<broadcast::Sender<JobStatusEvent>>,
}

impl JobStatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobStatusEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobStatusEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobStatusBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobState;

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = JobStatusBroadcaster::default();
        broadcaster.send(JobStatusEvent::new(JobClass::Board, JobStatus::idle()));
        assert_eq!(broadcaster.receiver_count(), 0);
    }

    #[test]
    fn test_send_receive() {
        let broadcaster = JobStatusBroadcaster::new(4);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(JobStatusEvent::new(JobClass::SingleImage, JobStatus::idle()));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_class, JobClass::SingleImage);
        assert_eq!(received.status.state, JobState::Idle);
    }

    #[test]
    fn test_event_wire_format() {
        let event = JobStatusEvent::new(JobClass::Board, JobStatus::idle());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobClass"], "board");
        assert_eq!(json["status"]["state"], "idle");
    }
}

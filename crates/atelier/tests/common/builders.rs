//! Fixtures for orchestrator tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use atelier::analysis::{AnalysisInvoker, StaticCredential};
use atelier::board::BoardItem;
use atelier::jobs::{BoardJobSettings, JobClass, JobStatus, StatusPoller};
use atelier::Orchestrator;

use super::fakes::{RecordingStore, ScriptedService};

pub struct Fixture {
    pub store: Arc<RecordingStore>,
    pub service: Arc<ScriptedService>,
    pub orchestrator: Orchestrator,
}

impl Fixture {
    pub fn new(service: ScriptedService) -> Self {
        Self::with_settings(service, fast_settings())
    }

    pub fn with_settings(service: ScriptedService, settings: BoardJobSettings) -> Self {
        let store = Arc::new(RecordingStore::new());
        let service = Arc::new(service);
        let invoker = AnalysisInvoker::new(
            service.clone(),
            Arc::new(StaticCredential::new("test-token")),
        );
        let orchestrator = Orchestrator::builder(store.clone(), invoker)
            .board_settings(settings)
            .rng(StdRng::seed_from_u64(42))
            .build();

        Self {
            store,
            service,
            orchestrator,
        }
    }

    /// Polls `class` until it settles, failing the test after 5 seconds.
    pub async fn wait_for_terminal(&self, class: JobClass) -> JobStatus {
        poller(&self.orchestrator)
            .wait_for_terminal(class)
            .await
            .unwrap()
    }
}

/// Default board settings without the inter-batch delay.
pub fn fast_settings() -> BoardJobSettings {
    BoardJobSettings {
        sample_cap: 8,
        batch_size: 3,
        batch_delay: Duration::ZERO,
    }
}

pub fn poller(orchestrator: &Orchestrator) -> StatusPoller {
    StatusPoller::new(orchestrator.clone())
        .with_interval(Duration::from_millis(5))
        .with_timeout(Duration::from_secs(5))
}

pub fn image_url(i: usize) -> String {
    format!("https://img.test/{}.jpg", i)
}

/// `n` items, each with a `600x` variant at `image_url(i)`.
pub fn board_items(n: usize) -> Vec<BoardItem> {
    (0..n)
        .map(|i| BoardItem::new(&format!("pin-{}", i)).with_variant("600x", &image_url(i), Some(600)))
        .collect()
}

/// Polls `condition` every few milliseconds, panicking after 5 seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Gives spawned job tasks a chance to run to their next await point.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

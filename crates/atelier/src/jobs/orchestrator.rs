//! Entry point for starting, querying and cancelling jobs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use super::board_job::{self, BoardJobSettings};
use super::image_job;
use super::poller::DEFAULT_POLL_INTERVAL;
use super::status_store::JobStatusStore;
use super::token::CancellationToken;
use super::types::{JobClass, JobState, JobStatus, JobSubject};
use crate::analysis::{AnalysisInvoker, ImageReference, ServiceStatus};
use crate::board::{
    collect_board_items, sample, BoardItem, BoardSource, ImageReferenceResolver, VariantResolver,
};
use crate::broadcast::{JobStatusBroadcaster, JobStatusEvent};
use crate::error::{AtelierError, Result};
use crate::store::StateStore;

/// Upper bound on items pulled from a board source for one job.
pub const DEFAULT_MAX_FETCH_ITEMS: usize = 100;

/// A request to start a job of either class.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobRequest {
    #[serde(rename_all = "camelCase")]
    Image { image_reference: ImageReference },
    #[serde(rename_all = "camelCase")]
    Board {
        board_id: String,
        #[serde(default)]
        display_name: String,
        #[serde(default)]
        declared_total: Option<usize>,
        #[serde(default, alias = "pins")]
        items: Vec<BoardItem>,
    },
}

/// Acknowledgement returned once the initial record is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTicket {
    pub job_class: JobClass,
    pub job_id: String,
    pub generation: u64,
    /// How often callers should poll for status.
    pub poll_interval_ms: u64,
}

struct Inner {
    statuses: Arc<JobStatusStore>,
    invoker: AnalysisInvoker,
    resolver: Arc<dyn ImageReferenceResolver>,
    board_settings: BoardJobSettings,
    board_source: Option<Arc<dyn BoardSource>>,
    max_fetch_items: usize,
    poll_interval: Duration,
    rng: Mutex<StdRng>,
}

/// Owns the token slots and spawns job work. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

pub struct OrchestratorBuilder {
    store: Arc<dyn StateStore>,
    invoker: AnalysisInvoker,
    resolver: Arc<dyn ImageReferenceResolver>,
    board_settings: BoardJobSettings,
    board_source: Option<Arc<dyn BoardSource>>,
    max_fetch_items: usize,
    poll_interval: Duration,
    rng: Option<StdRng>,
    broadcaster: JobStatusBroadcaster,
}

impl OrchestratorBuilder {
    pub fn resolver(mut self, resolver: Arc<dyn ImageReferenceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn board_settings(mut self, settings: BoardJobSettings) -> Self {
        self.board_settings = settings;
        self
    }

    /// Source used when a board job is requested without candidate items.
    pub fn board_source(mut self, source: Arc<dyn BoardSource>, max_fetch_items: usize) -> Self {
        self.board_source = Some(source);
        self.max_fetch_items = max_fetch_items;
        self
    }

    /// Poll interval advertised to callers in every ticket.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Fixes the sampling RNG, e.g. `StdRng::seed_from_u64(..)` in tests.
    pub fn rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn broadcaster(mut self, broadcaster: JobStatusBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            inner: Arc::new(Inner {
                statuses: Arc::new(JobStatusStore::new(self.store, self.broadcaster)),
                invoker: self.invoker,
                resolver: self.resolver,
                board_settings: self.board_settings,
                board_source: self.board_source,
                max_fetch_items: self.max_fetch_items,
                poll_interval: self.poll_interval,
                rng: Mutex::new(self.rng.unwrap_or_else(StdRng::from_entropy)),
            }),
        }
    }
}

impl Orchestrator {
    pub fn builder(store: Arc<dyn StateStore>, invoker: AnalysisInvoker) -> OrchestratorBuilder {
        OrchestratorBuilder {
            store,
            invoker,
            resolver: Arc::new(VariantResolver::default()),
            board_settings: BoardJobSettings::default(),
            board_source: None,
            max_fetch_items: DEFAULT_MAX_FETCH_ITEMS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            rng: None,
            broadcaster: JobStatusBroadcaster::default(),
        }
    }

    pub fn new(store: Arc<dyn StateStore>, invoker: AnalysisInvoker) -> Self {
        Self::builder(store, invoker).build()
    }

    pub fn board_settings(&self) -> BoardJobSettings {
        self.inner.board_settings
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    fn ticket(&self, job_class: JobClass, job_id: &str, token: &CancellationToken) -> JobTicket {
        JobTicket {
            job_class,
            job_id: job_id.to_string(),
            generation: token.generation(),
            poll_interval_ms: u64::try_from(self.inner.poll_interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub async fn start_job(&self, request: JobRequest) -> Result<JobTicket> {
        match request {
            JobRequest::Image { image_reference } => self.start_image_job(image_reference).await,
            JobRequest::Board {
                board_id,
                display_name,
                declared_total,
                items,
            } => match &self.inner.board_source {
                Some(source) if items.is_empty() => {
                    self.start_fetched_board_job(
                        &board_id,
                        &display_name,
                        declared_total,
                        Arc::clone(source),
                    )
                    .await
                }
                _ => {
                    self.start_board_job(&board_id, &display_name, declared_total, items)
                        .await
                }
            },
        }
    }

    /// Starts a single-image job, superseding any running one.
    pub async fn start_image_job(&self, image: ImageReference) -> Result<JobTicket> {
        if image.as_str().trim().is_empty() {
            return Err(AtelierError::Validation(
                "No image reference provided".to_string(),
            ));
        }

        let job_id = Uuid::new_v4().to_string();
        let subject = JobSubject::Image {
            image_reference: image.clone(),
        };

        let (token, initial) = self
            .inner
            .statuses
            .begin(JobClass::SingleImage, |generation| {
                JobStatus::started(&job_id, generation, subject, 1)
            })
            .await?;

        let ticket = self.ticket(JobClass::SingleImage, &job_id, &token);
        log::info!(
            "Started image job {} (generation {}) for {}",
            job_id,
            ticket.generation,
            image.preview()
        );

        let span = tracing::info_span!("jobs.image", job_id = %job_id, generation = ticket.generation);
        tokio::spawn(
            image_job::run(
                Arc::clone(&self.inner.statuses),
                self.inner.invoker.clone(),
                token,
                initial,
                image,
            )
            .instrument(span),
        );

        Ok(ticket)
    }

    /// Starts a board job over `items`, superseding any running one.
    ///
    /// `declared_total` is the board's own item count for display; when
    /// absent or zero the number of candidates is used.
    pub async fn start_board_job(
        &self,
        board_id: &str,
        display_name: &str,
        declared_total: Option<usize>,
        items: Vec<BoardItem>,
    ) -> Result<JobTicket> {
        if board_id.trim().is_empty() {
            return Err(AtelierError::Validation("No board id provided".to_string()));
        }

        let sampled = self.sample_items(&items);

        let job_id = Uuid::new_v4().to_string();
        let subject = JobSubject::Board {
            board_id: board_id.to_string(),
            display_name: display_name.to_string(),
            declared_total: declared_total
                .filter(|n| *n > 0)
                .unwrap_or(items.len()),
        };
        let total = sampled.len();

        let (token, initial) = self
            .inner
            .statuses
            .begin(JobClass::Board, |generation| {
                JobStatus::started(&job_id, generation, subject, total)
            })
            .await?;

        let ticket = self.ticket(JobClass::Board, &job_id, &token);
        log::info!(
            "Started board job {} (generation {}) for board {}: {} of {} items sampled",
            job_id,
            ticket.generation,
            board_id,
            total,
            items.len()
        );

        let span = tracing::info_span!(
            "jobs.board",
            job_id = %job_id,
            generation = ticket.generation,
            items = total
        );
        tokio::spawn(self.run_board(token, initial, sampled).instrument(span));

        Ok(ticket)
    }

    /// Starts a board job whose items come from the board source. Returns
    /// once the initial record is written; the fetch runs in the job task,
    /// so the record carries no progress until the sample is drawn.
    async fn start_fetched_board_job(
        &self,
        board_id: &str,
        display_name: &str,
        declared_total: Option<usize>,
        source: Arc<dyn BoardSource>,
    ) -> Result<JobTicket> {
        if board_id.trim().is_empty() {
            return Err(AtelierError::Validation("No board id provided".to_string()));
        }

        let job_id = Uuid::new_v4().to_string();
        let subject = JobSubject::Board {
            board_id: board_id.to_string(),
            display_name: display_name.to_string(),
            declared_total: declared_total.unwrap_or(0),
        };

        let (token, initial) = self
            .inner
            .statuses
            .begin(JobClass::Board, |generation| {
                JobStatus::fetching(&job_id, generation, subject)
            })
            .await?;

        let ticket = self.ticket(JobClass::Board, &job_id, &token);
        log::info!(
            "Started board job {} (generation {}) for board {}, fetching items",
            job_id,
            ticket.generation,
            board_id
        );

        let span = tracing::info_span!(
            "jobs.board",
            job_id = %job_id,
            generation = ticket.generation
        );
        let orchestrator = self.clone();
        let board_id = board_id.to_string();
        tokio::spawn(
            async move {
                orchestrator
                    .fetch_and_run_board(source, board_id, token, initial)
                    .await
            }
            .instrument(span),
        );

        Ok(ticket)
    }

    async fn fetch_and_run_board(
        self,
        source: Arc<dyn BoardSource>,
        board_id: String,
        token: CancellationToken,
        initial: JobStatus,
    ) {
        let statuses = &self.inner.statuses;
        let fetched =
            collect_board_items(source.as_ref(), &board_id, self.inner.max_fetch_items).await;

        let candidates: Vec<BoardItem> = match fetched {
            Ok(items) => items
                .into_iter()
                .filter(|item| self.inner.resolver.resolve(item).is_some())
                .collect(),
            Err(e) => {
                log::warn!("Failed to fetch items for board {}: {}", board_id, e);
                if let Err(e) = statuses
                    .write_if_current(JobClass::Board, &token, &initial.failed(&e.to_string()))
                    .await
                {
                    log::error!("Failed to persist board fetch failure: {}", e);
                }
                statuses.finish(JobClass::Board, &token);
                return;
            }
        };

        let sampled = self.sample_items(&candidates);
        let initial = initial.with_sample(sampled.len(), candidates.len());
        match statuses
            .write_if_current(JobClass::Board, &token, &initial)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("Board job superseded while fetching items");
                statuses.finish(JobClass::Board, &token);
                return;
            }
            Err(e) => log::error!("Failed to persist board sample: {}", e),
        }

        log::info!(
            "Board {}: {} of {} fetched items sampled",
            board_id,
            sampled.len(),
            candidates.len()
        );
        self.run_board(token, initial, sampled).await;
    }

    fn run_board(
        &self,
        token: CancellationToken,
        initial: JobStatus,
        sampled: Vec<BoardItem>,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        board_job::run(
            Arc::clone(&self.inner.statuses),
            self.inner.invoker.clone(),
            Arc::clone(&self.inner.resolver),
            self.inner.board_settings,
            token,
            initial,
            sampled,
        )
    }

    fn sample_items(&self, items: &[BoardItem]) -> Vec<BoardItem> {
        let mut rng = match self.inner.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Sampling RNG lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        sample(items, self.inner.board_settings.sample_cap, &mut *rng)
    }

    /// Current record for `class`, or the idle sentinel. Never waits on a
    /// running job.
    pub async fn get_status(&self, class: JobClass) -> Result<JobStatus> {
        self.inner.statuses.status(class).await.map_err(|e| {
            log::error!("Failed to read {} status: {}", class, e);
            AtelierError::from(e)
        })
    }

    /// Cancels the running job of `class` and deletes its record.
    /// Idempotent; returns whether a running job was cancelled.
    pub async fn cancel(&self, class: JobClass) -> Result<bool> {
        let cancelled = self.inner.statuses.cancel(class).await?;
        if cancelled {
            log::info!("Cancelled {} job", class);
        }
        Ok(cancelled)
    }

    /// Deletes a finished record. Returns `false` while the job is still
    /// analyzing.
    pub async fn clear(&self, class: JobClass) -> Result<bool> {
        Ok(self.inner.statuses.clear(class).await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobStatusEvent> {
        self.inner.statuses.broadcaster().subscribe()
    }

    pub async fn service_status(&self) -> ServiceStatus {
        self.inner.invoker.service_status().await
    }

    /// Records left `analyzing` with no job running in this process, e.g.
    /// after a restart.
    pub async fn orphaned_jobs(&self) -> Result<Vec<JobStatus>> {
        let mut orphans = Vec::new();
        for class in JobClass::ALL {
            let status = self.inner.statuses.status(class).await?;
            let running = self.inner.statuses.active_generation(class).is_some();
            if status.state == JobState::Analyzing && !running {
                orphans.push(status);
            }
        }
        Ok(orphans)
    }
}

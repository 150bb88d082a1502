//! Board job: a bounded sample analyzed in small concurrent batches, with a
//! progress snapshot after each batch and an aggregate at the end.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use super::status_store::JobStatusStore;
use super::token::CancellationToken;
use super::types::{JobClass, JobStatus};
use crate::aggregate::aggregate;
use crate::analysis::{AnalysisInvoker, AnalysisRecord};
use crate::board::{BoardItem, ImageReferenceResolver};

/// Tunables for board jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardJobSettings {
    pub sample_cap: usize,
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for BoardJobSettings {
    fn default() -> Self {
        Self {
            sample_cap: 8,
            batch_size: 3,
            batch_delay: Duration::from_millis(200),
        }
    }
}

/// Resolves and analyzes one item. Any failure drops the item.
async fn analyze_item(
    invoker: &AnalysisInvoker,
    resolver: &dyn ImageReferenceResolver,
    item: &BoardItem,
) -> Option<AnalysisRecord> {
    let Some(image) = resolver.resolve(item) else {
        log::debug!("Skipping board item {}: no usable image", item.id);
        return None;
    };

    match invoker.invoke(&image).await {
        Ok(analysis) => Some(AnalysisRecord {
            item_id: item.id.clone(),
            image_reference: image,
            analysis,
        }),
        Err(e) => {
            log::warn!("Dropping board item {}: {}", item.id, e);
            None
        }
    }
}

/// Writes `status`; returns `false` when the job should stop writing.
async fn persist(
    statuses: &JobStatusStore,
    token: &CancellationToken,
    status: &JobStatus,
) -> bool {
    match statuses.write_if_current(JobClass::Board, token, status).await {
        Ok(written) => written,
        Err(e) => {
            // Keep going; the next snapshot replaces this one.
            log::error!("Failed to persist board job status: {}", e);
            true
        }
    }
}

/// Runs an already-started board job over the sampled `items`, then
/// releases the job's token slot.
pub(crate) async fn run(
    statuses: Arc<JobStatusStore>,
    invoker: AnalysisInvoker,
    resolver: Arc<dyn ImageReferenceResolver>,
    settings: BoardJobSettings,
    token: CancellationToken,
    initial: JobStatus,
    items: Vec<BoardItem>,
) {
    analyze_batches(
        &statuses,
        &invoker,
        resolver.as_ref(),
        settings,
        &token,
        &initial,
        &items,
    )
    .await;
    statuses.finish(JobClass::Board, &token);
}

async fn analyze_batches(
    statuses: &JobStatusStore,
    invoker: &AnalysisInvoker,
    resolver: &dyn ImageReferenceResolver,
    settings: BoardJobSettings,
    token: &CancellationToken,
    initial: &JobStatus,
    items: &[BoardItem],
) {
    let batch_size = settings.batch_size.max(1);
    let batch_count = items.len().div_ceil(batch_size);
    let mut records: Vec<AnalysisRecord> = Vec::new();
    let mut attempted = 0;

    for (index, batch) in items.chunks(batch_size).enumerate() {
        if token.is_cancelled() {
            log::info!("Board job cancelled before batch {}", index + 1);
            return;
        }

        let outcomes = join_all(
            batch
                .iter()
                .map(|item| analyze_item(invoker, resolver, item)),
        )
        .await;

        attempted += batch.len();
        records.extend(outcomes.into_iter().flatten());

        if token.is_cancelled() {
            log::info!("Board job cancelled after batch {}", index + 1);
            return;
        }

        log::info!(
            "Board batch {}/{} done: {}/{} attempted, {} analyzed",
            index + 1,
            batch_count,
            attempted,
            items.len(),
            records.len()
        );

        if !persist(statuses, token, &initial.with_progress(attempted, &records)).await {
            log::debug!("Board job superseded, stopping");
            return;
        }

        if index + 1 < batch_count && !settings.batch_delay.is_zero() {
            tokio::time::sleep(settings.batch_delay).await;
        }
    }

    let summary = aggregate(&records);
    if let Some(summary) = &summary {
        log::info!(
            "Board job complete: {} analyzed, dominant label {}",
            summary.total_analyzed,
            summary.dominant_label
        );
    } else {
        log::warn!("Board job complete with no successful analyses");
    }

    persist(statuses, token, &initial.completed(records, summary)).await;
}

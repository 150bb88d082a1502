//! Single-image job: one analysis, one terminal record.

use std::sync::Arc;

use super::status_store::JobStatusStore;
use super::token::CancellationToken;
use super::types::{JobClass, JobStatus};
use crate::analysis::{AnalysisInvoker, AnalysisRecord, ImageReference};

/// Runs the analysis for an already-started single-image job, then
/// releases the job's token slot.
///
/// `initial` is the record `begin` wrote; every later write is derived from
/// it. Nothing is written once `token` is cancelled.
pub(crate) async fn run(
    statuses: Arc<JobStatusStore>,
    invoker: AnalysisInvoker,
    token: CancellationToken,
    initial: JobStatus,
    image: ImageReference,
) {
    analyze(&statuses, &invoker, &token, &initial, image).await;
    statuses.finish(JobClass::SingleImage, &token);
}

async fn analyze(
    statuses: &JobStatusStore,
    invoker: &AnalysisInvoker,
    token: &CancellationToken,
    initial: &JobStatus,
    image: ImageReference,
) {
    if token.is_cancelled() {
        log::debug!("Image job cancelled before analysis");
        return;
    }

    let outcome = invoker.invoke(&image).await;

    if token.is_cancelled() {
        log::info!("Image job cancelled during analysis, discarding result");
        return;
    }

    let terminal = match outcome {
        Ok(analysis) => {
            let record = AnalysisRecord {
                item_id: initial.job_id.clone().unwrap_or_default(),
                image_reference: image,
                analysis,
            };
            log::info!(
                "Image analysis complete: {}",
                record.analysis.primary_label
            );
            initial.completed(vec![record], None)
        }
        Err(e) => {
            log::warn!("Image analysis failed: {}", e);
            initial.failed(&e.to_string())
        }
    };

    match statuses
        .write_if_current(JobClass::SingleImage, token, &terminal)
        .await
    {
        Ok(true) => {}
        Ok(false) => log::debug!("Image job superseded before terminal write"),
        Err(e) => log::error!("Failed to persist image job result: {}", e),
    }
}

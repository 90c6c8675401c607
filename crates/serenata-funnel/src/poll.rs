//! Fixed-interval status polling for one generation job.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use serenata_core::model::{GenerationJob, JobStatus};

use crate::api::GenerationApi;

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEnd {
    Terminal(JobStatus),
    Cancelled,
}

/// Poll `job` every `interval` until it reaches a terminal status or
/// `cancel` fires.
///
/// The first check happens one interval after the call. A failed status
/// check is logged and retried on the next tick; reports that would move the
/// job backwards are ignored. The loop has no deadline of its own, callers
/// bound it with a timeout or the cancellation token.
pub async fn poll_job(
    api: &dyn GenerationApi,
    job: &mut GenerationJob,
    interval: Duration,
    cancel: &CancellationToken,
) -> PollEnd {
    let Some(id) = job.id.clone() else {
        log::warn!("Song version {} has no id to poll", job.version);
        return PollEnd::Terminal(JobStatus::Failed);
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => return PollEnd::Cancelled,
            () = tokio::time::sleep(interval) => {}
        }

        let report = tokio::select! {
            () = cancel.cancelled() => return PollEnd::Cancelled,
            report = api.check_status(&id) => report,
        };

        match report {
            Ok(report) => {
                let payload = report.song.map(|song| song.payload());
                match job.advance(report.status, payload) {
                    Ok(true) => log::info!("Song {} (version {}) is {}", id, job.version, job.status),
                    Ok(false) => log::debug!("Song {} still {}", id, job.status),
                    Err(e) => log::warn!("Ignoring status report for song {}: {}", id, e),
                }
            }
            Err(e) => log::warn!("Status check for song {} failed: {}", id, e),
        }

        if job.is_terminal() {
            return PollEnd::Terminal(job.status);
        }
    }
}

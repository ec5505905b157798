//! Job driver - submit one generator job and poll it to a terminal state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Span};

use super::state::NodeStateStore;
use crate::backend::{GenerationBackend, JobStatus};
use crate::error::{Error, Result};
use crate::metrics;
use crate::workflow::GeneratorKind;

/// Highest progress reported while a job is still polling.
pub const MAX_POLLING_PROGRESS: u8 = 90;

/// Progress shown once the job is accepted but before the first poll.
const SUBMITTED_PROGRESS: u8 = 10;

/// Drives generator jobs against a back-end.
#[derive(Clone)]
pub struct JobDriver {
    backend: Arc<dyn GenerationBackend>,
    poll_interval: Duration,
}

impl JobDriver {
    pub fn new(backend: Arc<dyn GenerationBackend>, poll_interval: Duration) -> Self {
        Self {
            backend,
            poll_interval,
        }
    }

    /// Run a job to completion and return its output reference.
    ///
    /// Node state in `store` is the live progress channel: the node enters
    /// `is_running` on entry and leaves it with exactly one of `output_ref`
    /// or `last_error` set.
    ///
    /// # Errors
    /// `Submission`, `JobFailed`, `Timeout`, or `Cancelled` when `token`
    /// fires during a sleep or request.
    #[instrument(
        name = "node.job",
        skip(self, params, store, token),
        fields(
            node_id = %node_id,
            kind = %kind,
            external_job_id = tracing::field::Empty,
        )
    )]
    pub async fn run_job(
        &self,
        node_id: &str,
        kind: GeneratorKind,
        params: &Value,
        max_attempts: u32,
        store: &NodeStateStore,
        token: &CancellationToken,
    ) -> Result<String> {
        let started = Instant::now();
        store.begin(node_id);

        let result = self.drive(node_id, kind, params, max_attempts, store, token).await;

        let status = match &result {
            Ok(output_ref) => {
                store.succeed(node_id, output_ref);
                info!("Job for node '{}' succeeded: {}", node_id, output_ref);
                "success"
            }
            Err(Error::Cancelled) => {
                store.fail(node_id, &Error::Cancelled.to_string());
                info!("Job for node '{}' cancelled", node_id);
                "cancelled"
            }
            Err(e) => {
                store.fail(node_id, &e.to_string());
                warn!("Job for node '{}' failed: {}", node_id, e);
                "failed"
            }
        };
        metrics::record_node_job(kind.as_str(), status);
        metrics::record_job_duration(started.elapsed(), kind.as_str());

        result
    }

    async fn drive(
        &self,
        node_id: &str,
        kind: GeneratorKind,
        params: &Value,
        max_attempts: u32,
        store: &NodeStateStore,
        token: &CancellationToken,
    ) -> Result<String> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let job = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            submitted = self.backend.submit_job(kind, params) => submitted?,
        };
        store.set_job_id(node_id, &job.external_job_id);
        store.advance(node_id, SUBMITTED_PROGRESS);
        Span::current().record("external_job_id", job.external_job_id.as_str());
        debug!("Submitted {} job {} for node '{}'", kind, job.external_job_id, node_id);

        for attempt in 1..=max_attempts {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled),
                _ = sleep(self.poll_interval) => {}
            }

            let poll = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled),
                polled = self.backend.poll_job(&job.external_job_id) => polled?,
            };
            metrics::record_poll_attempt(kind.as_str());

            match poll.status {
                JobStatus::Succeeded => {
                    return poll.output_ref.ok_or_else(|| {
                        Error::JobFailed("job succeeded without an output".to_string())
                    });
                }
                JobStatus::Failed => {
                    return Err(Error::JobFailed(
                        poll.error_message
                            .unwrap_or_else(|| "unknown error".to_string()),
                    ));
                }
                JobStatus::Starting | JobStatus::Processing => {
                    store.advance(node_id, progress_estimate(attempt, max_attempts));
                }
            }
        }

        Err(Error::Timeout {
            attempts: max_attempts,
        })
    }
}

/// Progress after `attempt` of `max_attempts` polls, within
/// `[SUBMITTED_PROGRESS, MAX_POLLING_PROGRESS]`.
pub fn progress_estimate(attempt: u32, max_attempts: u32) -> u8 {
    let max_attempts = max_attempts.max(1) as u64;
    let attempt = (attempt as u64).min(max_attempts);
    let span = (MAX_POLLING_PROGRESS - SUBMITTED_PROGRESS) as u64;
    let estimate = SUBMITTED_PROGRESS as u64 + attempt * span / max_attempts;
    estimate.min(MAX_POLLING_PROGRESS as u64) as u8
}

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::job::{JobRecord, JobStatus, JobUpdate};
use crate::services::job_store::{JobStore, StoreError};
use crate::services::pipeline::{Pipeline, RetryPolicy};
use crate::services::queue::{Delivery, JobQueue, QueueError};

const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Retries for the terminal status write of a job that already ran.
const TERMINAL_UPDATE_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 6,
    base_backoff: Duration::from_millis(200),
    max_backoff: Duration::from_secs(5),
};

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    /// Duplicate or stale delivery; the record was left untouched.
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pulls jobs off the queue and drives them through the pipeline.
///
/// Several workers may share one queue and store; the `queued → processing`
/// claim in the store decides which of them runs a job.
pub struct Worker {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    pipeline: Arc<Pipeline>,
    job_timeout: Duration,
    dequeue_timeout: Duration,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        pipeline: Arc<Pipeline>,
        job_timeout: Duration,
        dequeue_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            pipeline,
            job_timeout,
            dequeue_timeout,
        }
    }

    /// Process jobs until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between jobs, so a job in flight always
    /// reaches its terminal update. An idle worker notices it within one
    /// dequeue timeout.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!("Worker ready, starting job processing loop");

        while !shutdown.is_cancelled() {
            match self.process_next().await {
                Ok(Some(outcome)) => {
                    tracing::debug!(?outcome, "Job handled, checking for next job");
                    self.record_queue_depth().await;
                }
                Ok(None) => {
                    tracing::trace!("No jobs available");
                    self.record_queue_depth().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Error processing job, will retry");
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!("Worker stopped");
    }

    /// Wait for the next delivery and process it.
    /// Returns `Ok(None)` if nothing arrived within the dequeue timeout.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>, WorkerError> {
        let Some(delivery) = self.queue.dequeue(self.dequeue_timeout).await? else {
            return Ok(None);
        };
        self.process(delivery).await.map(Some)
    }

    /// Handle one delivery and acknowledge it.
    ///
    /// A store error before the claim hands the delivery back to the queue.
    /// A delivery left unacknowledged by any other error stays in flight
    /// until [`JobQueue::recover`] runs at the next worker start.
    pub async fn process(&self, delivery: Delivery) -> Result<JobOutcome, WorkerError> {
        let outcome = self.handle(&delivery).await?;
        self.queue.ack(&delivery).await?;
        Ok(outcome)
    }

    /// Give a delivery back after an error that left its record untouched.
    async fn release(&self, delivery: &Delivery) {
        match self.queue.nack(delivery).await {
            Ok(()) => tracing::info!(job_id = %delivery.job.job_id, "Returned job to the queue"),
            Err(e) => tracing::error!(
                job_id = %delivery.job.job_id,
                error = %e,
                "Failed to return job to the queue, it stays in flight until recovery"
            ),
        }
    }

    async fn handle(&self, delivery: &Delivery) -> Result<JobOutcome, WorkerError> {
        let job = &delivery.job;

        let record = match self.store.get(job.job_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(job_id = %job.job_id, "Delivery for unknown job, dropping");
                return Ok(JobOutcome::Skipped);
            }
            Err(e) => {
                self.release(delivery).await;
                return Err(e.into());
            }
        };

        if record.status != JobStatus::Queued {
            tracing::info!(
                job_id = %job.job_id,
                status = %record.status,
                "Job is not queued, skipping duplicate delivery"
            );
            return Ok(JobOutcome::Skipped);
        }

        match self.store.update(job.job_id, JobUpdate::Start).await {
            Ok(_) => {}
            Err(StoreError::IllegalTransition(e)) => {
                tracing::info!(job_id = %job.job_id, error = %e, "Lost claim to another worker");
                return Ok(JobOutcome::Skipped);
            }
            Err(e) => {
                self.release(delivery).await;
                return Err(e.into());
            }
        }

        tracing::info!(
            job_id = %job.job_id,
            employee_id = %job.employee.employee_id,
            "Processing onboarding video job"
        );

        let started = Instant::now();
        let update = match tokio::time::timeout(self.job_timeout, self.pipeline.run(job)).await {
            Ok(Ok(output)) => JobUpdate::Complete {
                result_location: output.result_location,
            },
            Ok(Err(failure)) => JobUpdate::Fail {
                error_message: failure.to_string(),
                retry_count: i32::try_from(failure.retries).unwrap_or(i32::MAX),
            },
            Err(_) => JobUpdate::Fail {
                error_message: format!(
                    "job timed out after {} seconds",
                    self.job_timeout.as_secs()
                ),
                retry_count: 0,
            },
        };

        let terminal = self.record_terminal(job.job_id, update).await;
        self.pipeline.cleanup(job.job_id).await;
        let record = terminal?;

        let elapsed = started.elapsed();
        metrics::histogram!("video_processing_seconds").record(elapsed.as_secs_f64());

        Ok(Self::report(job.job_id, record.status, record.error_message.as_deref(), elapsed))
    }

    /// Write the terminal status, retrying while the store is unreachable.
    async fn record_terminal(
        &self,
        job_id: Uuid,
        update: JobUpdate,
    ) -> Result<JobRecord, StoreError> {
        let mut attempt = 1;
        loop {
            match self.store.update(job_id, update.clone()).await {
                Err(e) if e.is_infrastructure() && attempt < TERMINAL_UPDATE_RETRY.max_attempts => {
                    let delay = TERMINAL_UPDATE_RETRY.backoff(attempt);
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Failed to record job result, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to record job result");
                    return Err(e);
                }
                Ok(record) => return Ok(record),
            }
        }
    }

    fn report(job_id: Uuid, status: JobStatus, error: Option<&str>, elapsed: Duration) -> JobOutcome {
        match status {
            JobStatus::Completed => {
                metrics::counter!("onboarding_jobs_completed").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    duration_ms = elapsed.as_millis() as u64,
                    "Job completed successfully"
                );
                JobOutcome::Completed
            }
            _ => {
                metrics::counter!("onboarding_jobs_failed").increment(1);
                tracing::warn!(
                    job_id = %job_id,
                    duration_ms = elapsed.as_millis() as u64,
                    error = error.unwrap_or_default(),
                    "Job failed"
                );
                JobOutcome::Failed
            }
        }
    }

    async fn record_queue_depth(&self) {
        match self.queue.depth().await {
            Ok(depth) => metrics::gauge!("onboarding_queue_depth").set(depth as f64),
            Err(e) => tracing::debug!(error = %e, "Could not read queue depth"),
        }
    }
}

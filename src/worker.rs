//! Per-family job processing: fetch, normalize, publish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classify::classify;
use crate::error::{ErrorKind, JobError};
use crate::models::{CollectorJobData, ErrorData, ResultJobData, ResultJobMetadata, SourceType};
use crate::normalize::normalize;
use crate::publish::{MediaPublisher, ResultPublisher};
use crate::queue::{FailOutcome, Queue, QueuedJob};
use crate::sources::SourceClient;

/// Runs collector jobs of one source family.
pub struct Collector {
    family: SourceType,
    client: Arc<dyn SourceClient>,
    results: Arc<dyn ResultPublisher>,
    media: Arc<dyn MediaPublisher>,
}

impl Collector {
    pub fn new(client: Arc<dyn SourceClient>, results: Arc<dyn ResultPublisher>, media: Arc<dyn MediaPublisher>) -> Self {
        Self {
            family: client.source_type(),
            client,
            results,
            media,
        }
    }

    pub fn family(&self) -> SourceType {
        self.family
    }

    /// Process one job. The outcome is published before this returns; an
    /// `Err` tells the queue to retry.
    pub async fn process(
        &self,
        job_id: &str,
        payload: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(), JobError> {
        let started = Instant::now();

        match self.collect(job_id, payload, cancel, started).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::Cancelled => {
                debug!(job_id = %job_id, "job cancelled, no result published");
                Err(err)
            }
            Err(err) => {
                self.report_failure(job_id, payload, &err, started).await;
                Err(err)
            }
        }
    }

    async fn collect(
        &self,
        job_id: &str,
        payload: &serde_json::Value,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<(), JobError> {
        let job = CollectorJobData::parse(payload)?;
        if job.source_type != self.family.as_str() {
            return Err(JobError::SourceTypeMismatch {
                expected: self.family.to_string(),
                actual: job.source_type.clone(),
            });
        }

        info!(
            job_id = %job_id,
            source_id = %job.source_id,
            external_id = %job.external_id,
            cursor = ?job.cursor,
            limit = ?job.limit,
            "processing collector job"
        );

        let page = self
            .client
            .fetch_items(
                &job.external_id,
                job.limit.map(|l| l as usize),
                job.cursor.as_deref(),
                cancel,
            )
            .await?;

        let mut posts = Vec::with_capacity(page.items.len());
        let mut media_jobs = Vec::new();
        for item in &page.items {
            let (post, jobs) = normalize(item, &job.source_id);
            posts.push(post);
            media_jobs.extend(jobs);
        }

        if !media_jobs.is_empty() {
            match self.media.publish_bulk(&media_jobs).await {
                Ok(ids) => debug!(job_id = %job_id, count = ids.len(), "media upload jobs published"),
                Err(e) => error!(job_id = %job_id, error = %e, "failed to publish media upload jobs"),
            }
        }

        let count = posts.len();
        let result = ResultJobData::success(
            self.family,
            &job,
            result_metadata(job_id, &job),
            posts,
            page.next_cursor,
            elapsed_ms(started),
        );
        self.results
            .publish_success(&result, job.priority)
            .await
            .map_err(JobError::Publish)?;

        info!(
            job_id = %job_id,
            source_id = %job.source_id,
            posts = count,
            media = media_jobs.len(),
            next_cursor = ?result.next_cursor,
            processing_ms = result.processing_time,
            "collector job completed"
        );
        Ok(())
    }

    async fn report_failure(&self, job_id: &str, payload: &serde_json::Value, err: &JobError, started: Instant) {
        let message = err.to_string();
        let classification = classify(self.family, err.kind(), &message);
        error!(
            job_id = %job_id,
            family = %self.family,
            code = classification.code,
            retryable = classification.retryable,
            url = err.url(),
            error = %message,
            "collector job failed"
        );

        let job = match CollectorJobData::parse(payload) {
            Ok(job) => job,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "cannot report failure for unparseable job payload");
                return;
            }
        };

        let result = ResultJobData::error(
            self.family,
            &job,
            result_metadata(job_id, &job),
            ErrorData {
                code: classification.code.to_string(),
                message,
                retryable: classification.retryable,
            },
            elapsed_ms(started),
        );
        if let Err(e) = self.results.publish_error(&result, job.priority).await {
            error!(job_id = %job_id, error = %e, "failed to publish error result");
        }
    }
}

fn result_metadata(job_id: &str, job: &CollectorJobData) -> ResultJobMetadata {
    ResultJobMetadata {
        collector_job_id: job_id.to_string(),
        orchestrator_job_id: job.metadata.orchestrator_job_id.clone(),
        fetched_at: Utc::now(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u64::MAX as u128) as u64
}

/// Pulls jobs from one queue and runs them on a [`Collector`] with bounded
/// concurrency.
pub struct Worker {
    pub collector: Arc<Collector>,
    pub queue: Queue,
    pub queue_name: String,
    pub concurrency: usize,
    pub poll_interval: Duration,
}

impl Worker {
    /// Run until `cancel` fires, then wait up to `shutdown_timeout` for
    /// in-flight jobs.
    pub async fn run(self, cancel: CancellationToken, shutdown_timeout: Duration) {
        let family = self.collector.family();
        let concurrency = self.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        info!(family = %family, queue = %self.queue_name, concurrency, "worker started");

        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let job = match self.queue.claim_next(&self.queue_name).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => continue,
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(queue = %self.queue_name, error = %e, "failed to claim job");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => continue,
                    }
                }
            };

            let collector = self.collector.clone();
            let queue = self.queue.clone();
            let job_cancel = cancel.child_token();
            tokio::spawn(async move {
                let _permit = permit;
                run_job(&collector, &queue, job, &job_cancel).await;
            });
        }

        info!(family = %family, "worker stopping, draining in-flight jobs");
        match tokio::time::timeout(shutdown_timeout, semaphore.acquire_many(concurrency as u32)).await {
            Ok(_) => info!(family = %family, "worker stopped"),
            Err(_) => warn!(family = %family, "shutdown timeout reached with jobs still running"),
        }
    }
}

async fn run_job(collector: &Collector, queue: &Queue, job: QueuedJob, cancel: &CancellationToken) {
    let payload = match job.payload() {
        Ok(payload) => payload,
        Err(e) => {
            error!(job_id = %job.id, error = %e, "job payload is not valid JSON");
            serde_json::Value::Null
        }
    };

    let outcome = collector.process(&job.id, &payload, cancel).await;
    let recorded = match outcome {
        Ok(()) => queue.complete(&job).await,
        Err(err) => match queue.fail(&job, &err.to_string()).await {
            Ok(FailOutcome::Retrying { attempt, delay }) => {
                warn!(job_id = %job.id, attempt, delay_ms = delay.as_millis() as u64, "job will be retried");
                Ok(())
            }
            Ok(FailOutcome::Failed) => Ok(()),
            Err(e) => Err(e),
        },
    };

    if let Err(e) = recorded {
        error!(job_id = %job.id, error = %e, "failed to record job outcome");
    }
}

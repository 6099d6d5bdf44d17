use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{DeliveryConfig, parse_duration};
use crate::models::{MediaUploadJob, ResultJobData};
use crate::queue::{JobOptions, Queue};

/// Job name used for every envelope on the results queue.
pub const RESULT_JOB_NAME: &str = "fetch-result";

/// Publishes outcome envelopes to the results queue.
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    async fn publish_success(&self, result: &ResultJobData, priority: i64) -> Result<()>;
    async fn publish_error(&self, result: &ResultJobData, priority: i64) -> Result<()>;
    /// Release resources. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Publishes media upload jobs to the media queue.
#[async_trait]
pub trait MediaPublisher: Send + Sync {
    /// Publish all jobs at once and return their queue ids in order.
    async fn publish_bulk(&self, jobs: &[MediaUploadJob]) -> Result<Vec<String>>;
    async fn close(&self) -> Result<()>;
}

/// Delivery options for published jobs, built from `[delivery]`.
pub fn delivery_options(delivery: &DeliveryConfig) -> Result<JobOptions> {
    Ok(JobOptions {
        priority: 0,
        attempts: delivery.attempts,
        backoff: parse_duration("delivery.backoff", &delivery.backoff)?,
        remove_on_complete: Some(delivery.remove_on_complete),
        remove_on_fail: Some(delivery.remove_on_fail),
    })
}

pub struct QueueResultPublisher {
    queue: Queue,
    name: String,
    options: JobOptions,
    closed: AtomicBool,
}

impl QueueResultPublisher {
    pub fn new(queue: Queue, name: impl Into<String>, options: JobOptions) -> Self {
        Self {
            queue,
            name: name.into(),
            options,
            closed: AtomicBool::new(false),
        }
    }

    async fn publish(&self, result: &ResultJobData, priority: i64) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!("result publisher for '{}' is closed", self.name);
        }

        let payload = serde_json::to_value(result).context("encoding result envelope")?;
        let options = JobOptions {
            priority,
            ..self.options.clone()
        };
        let job_id = self
            .queue
            .enqueue(&self.name, RESULT_JOB_NAME, &payload, &options)
            .await
            .with_context(|| format!("publishing to '{}'", self.name))?;

        debug!(
            queue = %self.name,
            job_id = %job_id,
            source_id = %result.source_id,
            status = ?result.status,
            "published fetch result"
        );
        Ok(())
    }
}

#[async_trait]
impl ResultPublisher for QueueResultPublisher {
    async fn publish_success(&self, result: &ResultJobData, priority: i64) -> Result<()> {
        self.publish(result, priority).await
    }

    async fn publish_error(&self, result: &ResultJobData, priority: i64) -> Result<()> {
        self.publish(result, priority).await
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(queue = %self.name, "result publisher closed");
        }
        Ok(())
    }
}

pub struct QueueMediaPublisher {
    queue: Queue,
    name: String,
    options: JobOptions,
    closed: AtomicBool,
}

impl QueueMediaPublisher {
    pub fn new(queue: Queue, name: impl Into<String>, options: JobOptions) -> Self {
        Self {
            queue,
            name: name.into(),
            options,
            closed: AtomicBool::new(false),
        }
    }
}

/// Job name for one media upload, e.g. `instagram-ABC123-1`.
fn media_job_name(job: &MediaUploadJob) -> String {
    format!("{}-{}-{}", job.source_type, job.post_external_id, job.media_index)
}

#[async_trait]
impl MediaPublisher for QueueMediaPublisher {
    async fn publish_bulk(&self, jobs: &[MediaUploadJob]) -> Result<Vec<String>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        if self.closed.load(Ordering::Acquire) {
            bail!("media publisher for '{}' is closed", self.name);
        }

        let entries = jobs
            .iter()
            .map(|job| Ok((media_job_name(job), serde_json::to_value(job)?)))
            .collect::<Result<Vec<_>, serde_json::Error>>()
            .context("encoding media upload jobs")?;

        let ids = self
            .queue
            .enqueue_bulk(&self.name, &entries, &self.options)
            .await
            .with_context(|| format!("publishing media jobs to '{}'", self.name))?;

        debug!(queue = %self.name, count = ids.len(), "published media upload jobs");
        Ok(ids)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(queue = %self.name, "media publisher closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db;
    use crate::models::{MediaSource, ResultJobMetadata, ResultStatus, SourceType};

    async fn queue() -> (tempfile::TempDir, Queue) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_at(&dir.path().join("publish.db")).await.unwrap();
        (dir, Queue::new(pool))
    }

    fn options() -> JobOptions {
        delivery_options(&DeliveryConfig::default()).unwrap()
    }

    fn result() -> ResultJobData {
        ResultJobData {
            source_id: "src-1".to_string(),
            source_type: SourceType::Rss,
            status: ResultStatus::Success,
            posts: Some(vec![]),
            next_cursor: None,
            error: None,
            processing_time: 12,
            metadata: ResultJobMetadata {
                collector_job_id: "job-1".to_string(),
                orchestrator_job_id: "orch-1".to_string(),
                fetched_at: Utc::now(),
            },
        }
    }

    fn media_job(index: u32) -> MediaUploadJob {
        MediaUploadJob {
            source_type: SourceType::Instagram,
            source_id: "src-1".to_string(),
            post_external_id: "ABC".to_string(),
            media_index: index,
            target_path: format!("instagram/src-1/ABC/{index}.jpg"),
            content_type: "image/jpeg".to_string(),
            source: MediaSource::Url,
            source_url: Some(format!("https://cdn.test/{index}.jpg")),
            buffer: None,
        }
    }

    #[test]
    fn default_delivery_options() {
        let options = options();
        assert_eq!(options.attempts, 5);
        assert_eq!(options.backoff, std::time::Duration::from_secs(2));
        assert_eq!(options.remove_on_complete, Some(100));
        assert_eq!(options.remove_on_fail, Some(1000));
    }

    #[tokio::test]
    async fn result_carries_job_priority() {
        let (_dir, q) = queue().await;
        let publisher = QueueResultPublisher::new(q.clone(), "sources.fetch-results", options());
        publisher.publish_success(&result(), 7).await.unwrap();

        let job = q.claim_next("sources.fetch-results").await.unwrap().unwrap();
        assert_eq!(job.name, RESULT_JOB_NAME);
        assert_eq!(job.priority, 7);
        assert_eq!(job.max_attempts, 5);
        assert_eq!(job.payload().unwrap()["sourceId"], "src-1");
    }

    #[tokio::test]
    async fn media_jobs_are_published_in_order() {
        let (_dir, q) = queue().await;
        let publisher = QueueMediaPublisher::new(q.clone(), "media.upload", options());
        let ids = publisher.publish_bulk(&[media_job(1), media_job(2)]).await.unwrap();
        assert_eq!(ids.len(), 2);

        let first = q.claim_next("media.upload").await.unwrap().unwrap();
        assert_eq!(first.name, "instagram-ABC-1");
        assert_eq!(first.payload().unwrap()["targetPath"], "instagram/src-1/ABC/1.jpg");
        assert!(publisher.publish_bulk(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_publishing() {
        let (_dir, q) = queue().await;
        let publisher = QueueResultPublisher::new(q, "sources.fetch-results", options());
        publisher.close().await.unwrap();
        publisher.close().await.unwrap();
        assert!(publisher.publish_error(&result(), 0).await.is_err());
    }
}

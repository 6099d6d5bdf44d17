//! SQLite-backed job queue.
//!
//! Jobs move `waiting -> active -> completed | failed`. A failed attempt goes
//! back to `waiting` with exponential backoff until `max_attempts` is spent.
//! Lower `priority` values are claimed first, FIFO within a priority.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::QueueError;

/// Per-job delivery options.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOptions {
    pub priority: i64,
    pub attempts: u32,
    /// Base delay; attempt `n` waits `backoff * 2^(n-1)`.
    pub backoff: Duration,
    /// Keep at most this many completed jobs per queue. `None` keeps all.
    pub remove_on_complete: Option<u32>,
    /// Keep at most this many failed jobs per queue. `None` keeps all.
    pub remove_on_fail: Option<u32>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            attempts: 1,
            backoff: Duration::ZERO,
            remove_on_complete: None,
            remove_on_fail: None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct QueuedJob {
    pub id: String,
    pub queue: String,
    pub name: String,
    pub payload: String,
    pub priority: i64,
    pub attempts_made: i64,
    pub max_attempts: i64,
    pub backoff_ms: i64,
    pub remove_on_complete: Option<i64>,
    pub remove_on_fail: Option<i64>,
}

impl QueuedJob {
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Scheduled for another attempt after `delay`.
    Retrying { attempt: i64, delay: Duration },
    /// Out of attempts.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueCounts {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

const JOB_COLUMNS: &str = "id, queue, name, payload, priority, attempts_made, max_attempts, backoff_ms,
    remove_on_complete, remove_on_fail";

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn retry_delay_ms(backoff_ms: i64, attempt: i64) -> i64 {
    let exponent = (attempt - 1).clamp(0, 30) as u32;
    backoff_ms.saturating_mul(1i64 << exponent)
}

#[derive(Debug, Clone)]
pub struct Queue {
    pool: SqlitePool,
}

impl Queue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Add one job and return its id.
    pub async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        payload: &serde_json::Value,
        options: &JobOptions,
    ) -> Result<String, QueueError> {
        let mut conn = self.pool.acquire().await?;
        insert_job(&mut conn, queue, name, payload, options).await
    }

    /// Add several jobs in one transaction. Either all are stored or none.
    pub async fn enqueue_bulk(
        &self,
        queue: &str,
        jobs: &[(String, serde_json::Value)],
        options: &JobOptions,
    ) -> Result<Vec<String>, QueueError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(jobs.len());
        for (name, payload) in jobs {
            ids.push(insert_job(&mut tx, queue, name, payload, options).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// Atomically move the next ready job of `queue` to `active`.
    pub async fn claim_next(&self, queue: &str) -> Result<Option<QueuedJob>, QueueError> {
        let now = now_ms();
        let sql = format!(
            "UPDATE queue_jobs SET state = 'active', locked_at = ?
             WHERE seq = (
                 SELECT seq FROM queue_jobs
                 WHERE queue = ? AND state = 'waiting' AND available_at <= ?
                 ORDER BY priority ASC, seq ASC
                 LIMIT 1
             )
             RETURNING {JOB_COLUMNS}"
        );
        let job = sqlx::query_as::<_, QueuedJob>(&sql)
            .bind(now)
            .bind(queue)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    pub async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE queue_jobs SET state = 'completed', locked_at = NULL, finished_at = ?
             WHERE id = ? AND state = 'active'",
        )
        .bind(now_ms())
        .bind(&job.id)
        .execute(&self.pool)
        .await?;

        if let Some(keep) = job.remove_on_complete {
            self.trim(&job.queue, "completed", keep).await?;
        }
        Ok(())
    }

    /// Record a failed attempt; retries while attempts remain.
    pub async fn fail(&self, job: &QueuedJob, error: &str) -> Result<FailOutcome, QueueError> {
        let attempt = job.attempts_made + 1;
        let now = now_ms();

        if attempt < job.max_attempts {
            let delay_ms = retry_delay_ms(job.backoff_ms, attempt);
            sqlx::query(
                "UPDATE queue_jobs
                 SET state = 'waiting', locked_at = NULL, attempts_made = ?, available_at = ?, last_error = ?
                 WHERE id = ? AND state = 'active'",
            )
            .bind(attempt)
            .bind(now.saturating_add(delay_ms))
            .bind(error)
            .bind(&job.id)
            .execute(&self.pool)
            .await?;

            debug!(job_id = %job.id, queue = %job.queue, attempt, delay_ms, "job scheduled for retry");
            return Ok(FailOutcome::Retrying {
                attempt,
                delay: Duration::from_millis(delay_ms.max(0) as u64),
            });
        }

        sqlx::query(
            "UPDATE queue_jobs
             SET state = 'failed', locked_at = NULL, attempts_made = ?, finished_at = ?, last_error = ?
             WHERE id = ? AND state = 'active'",
        )
        .bind(attempt)
        .bind(now)
        .bind(error)
        .bind(&job.id)
        .execute(&self.pool)
        .await?;

        warn!(job_id = %job.id, queue = %job.queue, attempts = attempt, "job failed permanently");

        if let Some(keep) = job.remove_on_fail {
            self.trim(&job.queue, "failed", keep).await?;
        }
        Ok(FailOutcome::Failed)
    }

    /// Return active jobs locked before `now - older_than` to `waiting`.
    pub async fn requeue_stalled(&self, older_than: Duration) -> Result<u64, QueueError> {
        let cutoff = now_ms() - older_than.as_millis().min(i64::MAX as u128) as i64;
        let result = sqlx::query(
            "UPDATE queue_jobs SET state = 'waiting', locked_at = NULL
             WHERE state = 'active' AND locked_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Job counts per queue and state.
    pub async fn counts(&self) -> Result<BTreeMap<String, QueueCounts>, QueueError> {
        let rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT queue, state, COUNT(*) FROM queue_jobs GROUP BY queue, state")
                .fetch_all(&self.pool)
                .await?;

        let mut counts: BTreeMap<String, QueueCounts> = BTreeMap::new();
        for (queue, state, count) in rows {
            let entry = counts.entry(queue).or_default();
            match state.as_str() {
                "waiting" => entry.waiting = count,
                "active" => entry.active = count,
                "completed" => entry.completed = count,
                "failed" => entry.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn trim(&self, queue: &str, state: &str, keep: i64) -> Result<(), QueueError> {
        let result = sqlx::query(
            "DELETE FROM queue_jobs
             WHERE queue = ? AND state = ? AND seq NOT IN (
                 SELECT seq FROM queue_jobs
                 WHERE queue = ? AND state = ?
                 ORDER BY finished_at DESC, seq DESC
                 LIMIT ?
             )",
        )
        .bind(queue)
        .bind(state)
        .bind(queue)
        .bind(state)
        .bind(keep)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(queue = %queue, state = %state, removed = result.rows_affected(), "trimmed finished jobs");
        }
        Ok(())
    }
}

async fn insert_job(
    conn: &mut sqlx::SqliteConnection,
    queue: &str,
    name: &str,
    payload: &serde_json::Value,
    options: &JobOptions,
) -> Result<String, QueueError> {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    let payload = serde_json::to_string(payload)?;

    sqlx::query(
        "INSERT INTO queue_jobs (id, queue, name, payload, priority, max_attempts, backoff_ms,
         remove_on_complete, remove_on_fail, available_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(queue)
    .bind(name)
    .bind(&payload)
    .bind(options.priority)
    .bind(options.attempts.max(1) as i64)
    .bind(options.backoff.as_millis().min(i64::MAX as u128) as i64)
    .bind(options.remove_on_complete.map(i64::from))
    .bind(options.remove_on_fail.map(i64::from))
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

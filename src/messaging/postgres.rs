//! # PostgreSQL Job Queue
//!
//! Durable [`JobQueue`] over the `kpi_jobs` table, sharing the repository's
//! connection pool. Jobs survive process restarts and can be received by
//! workers in any number of processes.
//!
//! - **Claiming**: `FOR UPDATE SKIP LOCKED` hands each visible job to exactly
//!   one receiver; the claim stamps a fresh `delivery_id` that acts as the
//!   receipt
//! - **Visibility Timeout**: a claimed job stays hidden until `visible_at`;
//!   an unsettled job becomes deliverable again afterwards
//! - **Dedup**: a partial unique index allows one unfinished job per key
//! - **Attempt Cap**: a job abandoned after `max_attempts` deliveries is
//!   parked as failed instead of redelivered
//!
//! All timestamps are taken from the database clock.

use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, warn};
use uuid::Uuid;

use super::errors::{QueueError, QueueResult};
use super::jobs::{EnqueueOutcome, JobEnvelope, MonitoringJob, ReceiptHandle, ReceivedJob};
use super::queue::{JobQueue, QueueCounters, QueueStats};
use crate::config::RetentionConfig;

const JOB_COLUMNS: &str = r#"
    job_id, job, dedup_key, state, enqueued_at, attempts,
    visible_at, last_error, finished_at
"#;

/// Insert retries when the job holding a dedup key finishes mid-enqueue
const ENQUEUE_ATTEMPTS: usize = 3;

#[derive(Debug, FromRow)]
struct JobRow {
    job_id: Uuid,
    job: Json<MonitoringJob>,
    dedup_key: Option<String>,
    state: String,
    enqueued_at: DateTime<Utc>,
    attempts: i32,
    visible_at: DateTime<Utc>,
    last_error: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_envelope(self, operation: &'static str) -> QueueResult<JobEnvelope> {
        let state = self.state.parse().map_err(|reason| QueueError::QueryFailed {
            operation,
            reason,
        })?;
        Ok(JobEnvelope {
            job_id: self.job_id,
            job: self.job.0,
            dedup_key: self.dedup_key,
            state,
            enqueued_at: self.enqueued_at,
            attempts: u32::try_from(self.attempts).unwrap_or_default(),
            visible_at: self.visible_at,
            last_error: self.last_error,
            finished_at: self.finished_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StateCounts {
    pending: i64,
    in_flight: i64,
    completed: i64,
    failed: i64,
}

#[derive(Debug, FromRow)]
struct ParkedJob {
    job_id: Uuid,
    attempts: i32,
}

fn count(value: i64) -> usize {
    usize::try_from(value).unwrap_or_default()
}

fn is_dedup_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                && db_err.constraint() == Some("idx_kpi_jobs_active_dedup_key")
        }
        _ => false,
    }
}

/// Job queue persisted in PostgreSQL
#[derive(Debug)]
pub struct PgJobQueue {
    pool: PgPool,
    max_attempts: u32,
    retention: RetentionConfig,
    counters: QueueCounters,
}

impl PgJobQueue {
    /// Queue over an existing pool (BYOP - Bring Your Own Pool)
    pub fn new(pool: PgPool, max_attempts: u32, retention: RetentionConfig) -> Self {
        Self {
            pool,
            max_attempts: max_attempts.max(1),
            retention,
            counters: QueueCounters::default(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn max_attempts_param(&self) -> i32 {
        i32::try_from(self.max_attempts).unwrap_or(i32::MAX)
    }

    /// Park jobs whose last delivery expired with no attempts left
    async fn park_abandoned(&self) -> QueueResult<usize> {
        let parked: Vec<ParkedJob> = sqlx::query_as(
            r#"
            UPDATE kpi_jobs
            SET state = 'failed',
                delivery_id = NULL,
                finished_at = NOW(),
                last_error = COALESCE(
                    last_error,
                    'visibility timeout expired after ' || attempts || ' attempts'
                )
            WHERE state IN ('pending', 'in_flight')
              AND visible_at <= NOW()
              AND attempts >= $1
            RETURNING job_id, attempts
            "#,
        )
        .bind(self.max_attempts_param())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::from_sqlx("receive", e))?;

        for job in &parked {
            warn!(
                job_id = %job.job_id,
                attempts = job.attempts,
                "Job exceeded max attempts after visibility timeout, parking as failed"
            );
        }
        if !parked.is_empty() {
            self.counters
                .failed
                .fetch_add(parked.len() as u64, Ordering::Relaxed);
            self.purge().await?;
        }
        Ok(parked.len())
    }

    /// Settle an owned in-flight delivery; zero rows means the receipt is stale
    fn check_owned(receipt: &ReceiptHandle, rows_affected: u64) -> QueueResult<()> {
        if rows_affected == 0 {
            return Err(QueueError::StaleReceipt {
                job_id: receipt.job_id,
            });
        }
        Ok(())
    }

    async fn finished(&self, state: &'static str) -> QueueResult<Vec<JobEnvelope>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM kpi_jobs WHERE state = $1 ORDER BY finished_at, job_id"
        );
        let rows: Vec<JobRow> = sqlx::query_as(&sql)
            .bind(state)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueueError::from_sqlx("finished_jobs", e))?;
        rows.into_iter()
            .map(|row| row.into_envelope("finished_jobs"))
            .collect()
    }

    async fn purge(&self) -> QueueResult<usize> {
        let result = sqlx::query(
            r#"
            WITH ranked AS (
                SELECT job_id, state, finished_at,
                       ROW_NUMBER() OVER (PARTITION BY state ORDER BY finished_at DESC, job_id DESC) AS rank_in_state
                FROM kpi_jobs
                WHERE state IN ('completed', 'failed')
            )
            DELETE FROM kpi_jobs AS j
            USING ranked AS r
            WHERE j.job_id = r.job_id
              AND (
                (r.state = 'completed'
                    AND (r.finished_at <= NOW() - make_interval(secs => $1) OR r.rank_in_state > $2))
                OR (r.state = 'failed'
                    AND (r.finished_at <= NOW() - make_interval(secs => $3) OR r.rank_in_state > $4))
              )
            "#,
        )
        .bind(self.retention.completed_max_age().as_secs_f64())
        .bind(i64::try_from(self.retention.completed_max_count).unwrap_or(i64::MAX))
        .bind(self.retention.failed_max_age().as_secs_f64())
        .bind(i64::try_from(self.retention.failed_max_count).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::from_sqlx("purge_expired", e))?;

        let purged = result.rows_affected();
        if purged > 0 {
            self.counters.purged.fetch_add(purged, Ordering::Relaxed);
            debug!(purged, "Purged finished jobs past retention");
        }
        Ok(usize::try_from(purged).unwrap_or(usize::MAX))
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        job: MonitoringJob,
        dedup_key: Option<String>,
    ) -> QueueResult<EnqueueOutcome> {
        const OP: &str = "enqueue";

        for _ in 0..ENQUEUE_ATTEMPTS {
            let job_id = Uuid::now_v7();
            let inserted = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO kpi_jobs (job_id, job, dedup_key, state)
                VALUES ($1, $2, $3, 'pending')
                ON CONFLICT DO NOTHING
                RETURNING job_id
                "#,
            )
            .bind(job_id)
            .bind(Json(&job))
            .bind(dedup_key.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::from_sqlx(OP, e))?;

            if let Some(job_id) = inserted {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                return Ok(EnqueueOutcome::Enqueued(job_id));
            }

            let Some(key) = dedup_key.as_deref() else {
                return Err(QueueError::QueryFailed {
                    operation: OP,
                    reason: format!("insert of job {job_id} was rejected"),
                });
            };

            let existing = sqlx::query_scalar::<_, Uuid>(
                r#"
                SELECT job_id FROM kpi_jobs
                WHERE dedup_key = $1 AND state IN ('pending', 'in_flight')
                "#,
            )
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::from_sqlx(OP, e))?;

            if let Some(existing) = existing {
                self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
                debug!(
                    dedup_key = %key,
                    existing_job_id = %existing,
                    "Active job with the same dedup key exists, not enqueuing"
                );
                return Ok(EnqueueOutcome::Deduplicated(existing));
            }
        }

        Err(QueueError::Unavailable(format!(
            "{OP}: dedup key kept conflicting after {ENQUEUE_ATTEMPTS} attempts"
        )))
    }

    async fn receive(&self, visibility_timeout: Duration) -> QueueResult<Option<ReceivedJob>> {
        const OP: &str = "receive";
        self.park_abandoned().await?;

        let delivery_id = Uuid::now_v7();
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            WITH next AS (
                SELECT job_id FROM kpi_jobs
                WHERE state IN ('pending', 'in_flight')
                  AND visible_at <= NOW()
                  AND attempts < $3
                ORDER BY enqueued_at, job_id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE kpi_jobs AS j
            SET state = 'in_flight',
                delivery_id = $1,
                attempts = j.attempts + 1,
                visible_at = NOW() + make_interval(secs => $2)
            FROM next
            WHERE j.job_id = next.job_id
            RETURNING j.job_id, j.job, j.dedup_key, j.state, j.enqueued_at, j.attempts,
                      j.visible_at, j.last_error, j.finished_at
            "#,
        )
        .bind(delivery_id)
        .bind(visibility_timeout.as_secs_f64())
        .bind(self.max_attempts_param())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::from_sqlx(OP, e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let envelope = row.into_envelope(OP)?;
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        Ok(Some(ReceivedJob {
            receipt: ReceiptHandle {
                job_id: envelope.job_id,
                delivery_id,
            },
            envelope,
        }))
    }

    async fn complete(&self, receipt: &ReceiptHandle) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE kpi_jobs
            SET state = 'completed', delivery_id = NULL, finished_at = NOW()
            WHERE job_id = $1 AND delivery_id = $2 AND state = 'in_flight'
            "#,
        )
        .bind(receipt.job_id)
        .bind(receipt.delivery_id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::from_sqlx("complete", e))?;
        Self::check_owned(receipt, result.rows_affected())?;

        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        self.purge().await?;
        Ok(())
    }

    async fn retry(
        &self,
        receipt: &ReceiptHandle,
        delay: Duration,
        reason: String,
    ) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE kpi_jobs
            SET state = 'pending',
                delivery_id = NULL,
                visible_at = NOW() + make_interval(secs => $3),
                last_error = $4
            WHERE job_id = $1 AND delivery_id = $2 AND state = 'in_flight'
            "#,
        )
        .bind(receipt.job_id)
        .bind(receipt.delivery_id)
        .bind(delay.as_secs_f64())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::from_sqlx("retry", e))?;
        Self::check_owned(receipt, result.rows_affected())?;

        self.counters.retried.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn fail(&self, receipt: &ReceiptHandle, reason: String) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE kpi_jobs
            SET state = 'failed', delivery_id = NULL, finished_at = NOW(), last_error = $3
            WHERE job_id = $1 AND delivery_id = $2 AND state = 'in_flight'
            "#,
        )
        .bind(receipt.job_id)
        .bind(receipt.delivery_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::from_sqlx("fail", e))?;
        Self::check_owned(receipt, result.rows_affected())?;

        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        self.purge().await?;
        Ok(())
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let counts: StateCounts = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE state = 'pending') AS pending,
                COUNT(*) FILTER (WHERE state = 'in_flight') AS in_flight,
                COUNT(*) FILTER (WHERE state = 'completed') AS completed,
                COUNT(*) FILTER (WHERE state = 'failed') AS failed
            FROM kpi_jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::from_sqlx("stats", e))?;

        Ok(self.counters.snapshot(
            count(counts.pending),
            count(counts.in_flight),
            count(counts.completed),
            count(counts.failed),
        ))
    }

    async fn failed_jobs(&self) -> QueueResult<Vec<JobEnvelope>> {
        self.finished("failed").await
    }

    async fn completed_jobs(&self) -> QueueResult<Vec<JobEnvelope>> {
        self.finished("completed").await
    }

    async fn requeue_failed(&self, job_id: Uuid) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE kpi_jobs
            SET state = 'pending', attempts = 0, visible_at = NOW(),
                delivery_id = NULL, finished_at = NULL
            WHERE job_id = $1 AND state = 'failed'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(QueueError::JobNotFound { job_id }),
            Ok(_) => Ok(()),
            Err(e) if is_dedup_violation(&e) => Err(QueueError::InvalidState {
                job_id,
                state: "failed".to_string(),
                expected: "no active job with the same dedup key",
            }),
            Err(e) => Err(QueueError::from_sqlx("requeue_failed", e)),
        }
    }

    async fn purge_expired(&self) -> QueueResult<usize> {
        self.purge().await
    }
}

//! # In-Memory Job Queue
//!
//! Thread-safe queue for single-process deployments, tests and development.
//!
//! ## Features
//!
//! - **Visibility Timeout**: jobs are invisible after receive and re-visible
//!   after the timeout, giving at-least-once delivery when a worker stalls
//! - **Receipts**: each delivery gets its own receipt; an outdated receipt
//!   cannot finish a job that has since been redelivered
//! - **Attempt Cap**: a job redelivered past `max_attempts` is parked as failed
//! - **Retention**: finished jobs are kept up to a count and an age

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::errors::{QueueError, QueueResult};
use super::jobs::{
    EnqueueOutcome, JobEnvelope, JobState, MonitoringJob, ReceiptHandle, ReceivedJob,
};
use super::queue::{JobQueue, QueueCounters, QueueStats};
use crate::config::RetentionConfig;

#[derive(Debug)]
struct ActiveJob {
    envelope: JobEnvelope,
    delivery_id: Option<Uuid>,
}

#[derive(Debug, Default)]
struct QueueState {
    active: VecDeque<ActiveJob>,
    completed: VecDeque<JobEnvelope>,
    failed: VecDeque<JobEnvelope>,
}

#[derive(Debug)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    max_attempts: u32,
    retention: RetentionConfig,
    counters: QueueCounters,
}

fn after(instant: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| instant.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn before(instant: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| instant.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl InMemoryJobQueue {
    pub fn new(max_attempts: u32, retention: RetentionConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            max_attempts: max_attempts.max(1),
            retention,
            counters: QueueCounters::default(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Number of jobs not yet finished (pending or in flight)
    pub fn active_len(&self) -> usize {
        self.state.lock().active.len()
    }

    fn take_owned(
        state: &mut QueueState,
        receipt: &ReceiptHandle,
    ) -> QueueResult<JobEnvelope> {
        let position = state
            .active
            .iter()
            .position(|job| job.envelope.job_id == receipt.job_id)
            .ok_or(QueueError::StaleReceipt {
                job_id: receipt.job_id,
            })?;

        if state.active[position].delivery_id != Some(receipt.delivery_id) {
            return Err(QueueError::StaleReceipt {
                job_id: receipt.job_id,
            });
        }

        state
            .active
            .remove(position)
            .map(|job| job.envelope)
            .ok_or(QueueError::StaleReceipt {
                job_id: receipt.job_id,
            })
    }

    fn owned_mut<'a>(
        state: &'a mut QueueState,
        receipt: &ReceiptHandle,
    ) -> QueueResult<&'a mut ActiveJob> {
        state
            .active
            .iter_mut()
            .find(|job| {
                job.envelope.job_id == receipt.job_id
                    && job.delivery_id == Some(receipt.delivery_id)
            })
            .ok_or(QueueError::StaleReceipt {
                job_id: receipt.job_id,
            })
    }

    fn park_failed(&self, state: &mut QueueState, mut envelope: JobEnvelope, reason: String) {
        envelope.state = JobState::Failed;
        envelope.last_error = Some(reason);
        envelope.finished_at = Some(Utc::now());
        state.failed.push_back(envelope);
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn purge_locked(&self, state: &mut QueueState, now: DateTime<Utc>) -> usize {
        let completed_cutoff = before(now, self.retention.completed_max_age());
        let failed_cutoff = before(now, self.retention.failed_max_age());

        let purged = purge_bucket(
            &mut state.completed,
            self.retention.completed_max_count,
            completed_cutoff,
        ) + purge_bucket(
            &mut state.failed,
            self.retention.failed_max_count,
            failed_cutoff,
        );

        if purged > 0 {
            self.counters
                .purged
                .fetch_add(purged as u64, Ordering::Relaxed);
        }
        purged
    }
}

/// Oldest entries sit at the front
fn purge_bucket(
    bucket: &mut VecDeque<JobEnvelope>,
    max_count: usize,
    cutoff: DateTime<Utc>,
) -> usize {
    let before = bucket.len();
    bucket.retain(|job| job.finished_at.is_some_and(|finished| finished > cutoff));
    while bucket.len() > max_count {
        bucket.pop_front();
    }
    before - bucket.len()
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        job: MonitoringJob,
        dedup_key: Option<String>,
    ) -> QueueResult<EnqueueOutcome> {
        let mut state = self.state.lock();

        if let Some(key) = dedup_key.as_deref() {
            if let Some(existing) = state
                .active
                .iter()
                .find(|active| active.envelope.dedup_key.as_deref() == Some(key))
            {
                self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
                debug!(
                    dedup_key = %key,
                    existing_job_id = %existing.envelope.job_id,
                    "Active job with the same dedup key exists, not enqueuing"
                );
                return Ok(EnqueueOutcome::Deduplicated(existing.envelope.job_id));
            }
        }

        let envelope = JobEnvelope::new(job, dedup_key);
        let job_id = envelope.job_id;
        state.active.push_back(ActiveJob {
            envelope,
            delivery_id: None,
        });
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(EnqueueOutcome::Enqueued(job_id))
    }

    async fn receive(&self, visibility_timeout: Duration) -> QueueResult<Option<ReceivedJob>> {
        let now = Utc::now();
        let mut state = self.state.lock();

        loop {
            let Some(position) = state
                .active
                .iter()
                .position(|job| job.envelope.visible_at <= now)
            else {
                return Ok(None);
            };

            // A job that became visible while in flight was abandoned by its
            // worker; once out of attempts it is parked instead of redelivered
            if state.active[position].envelope.attempts >= self.max_attempts {
                if let Some(abandoned) = state.active.remove(position) {
                    warn!(
                        job_id = %abandoned.envelope.job_id,
                        attempts = abandoned.envelope.attempts,
                        "Job exceeded max attempts after visibility timeout, parking as failed"
                    );
                    let reason = abandoned.envelope.last_error.clone().unwrap_or_else(|| {
                        format!(
                            "visibility timeout expired after {} attempts",
                            abandoned.envelope.attempts
                        )
                    });
                    self.park_failed(&mut state, abandoned.envelope, reason);
                    self.purge_locked(&mut state, now);
                }
                continue;
            }

            let delivery_id = Uuid::now_v7();
            let job = &mut state.active[position];
            job.delivery_id = Some(delivery_id);
            job.envelope.state = JobState::InFlight;
            job.envelope.attempts += 1;
            job.envelope.visible_at = after(now, visibility_timeout);
            self.counters.received.fetch_add(1, Ordering::Relaxed);

            return Ok(Some(ReceivedJob {
                envelope: job.envelope.clone(),
                receipt: ReceiptHandle {
                    job_id: job.envelope.job_id,
                    delivery_id,
                },
            }));
        }
    }

    async fn complete(&self, receipt: &ReceiptHandle) -> QueueResult<()> {
        let mut state = self.state.lock();
        let mut envelope = Self::take_owned(&mut state, receipt)?;
        envelope.state = JobState::Completed;
        envelope.finished_at = Some(Utc::now());
        state.completed.push_back(envelope);
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        self.purge_locked(&mut state, Utc::now());
        Ok(())
    }

    async fn retry(
        &self,
        receipt: &ReceiptHandle,
        delay: Duration,
        reason: String,
    ) -> QueueResult<()> {
        let mut state = self.state.lock();
        let job = Self::owned_mut(&mut state, receipt)?;
        job.delivery_id = None;
        job.envelope.state = JobState::Pending;
        job.envelope.visible_at = after(Utc::now(), delay);
        job.envelope.last_error = Some(reason);
        self.counters.retried.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn fail(&self, receipt: &ReceiptHandle, reason: String) -> QueueResult<()> {
        let mut state = self.state.lock();
        let envelope = Self::take_owned(&mut state, receipt)?;
        self.park_failed(&mut state, envelope, reason);
        self.purge_locked(&mut state, Utc::now());
        Ok(())
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let state = self.state.lock();
        let in_flight = state
            .active
            .iter()
            .filter(|job| job.envelope.state == JobState::InFlight)
            .count();

        Ok(self.counters.snapshot(
            state.active.len() - in_flight,
            in_flight,
            state.completed.len(),
            state.failed.len(),
        ))
    }

    async fn failed_jobs(&self) -> QueueResult<Vec<JobEnvelope>> {
        Ok(self.state.lock().failed.iter().cloned().collect())
    }

    async fn completed_jobs(&self) -> QueueResult<Vec<JobEnvelope>> {
        Ok(self.state.lock().completed.iter().cloned().collect())
    }

    async fn requeue_failed(&self, job_id: Uuid) -> QueueResult<()> {
        let mut state = self.state.lock();
        let position = state
            .failed
            .iter()
            .position(|job| job.job_id == job_id)
            .ok_or(QueueError::JobNotFound { job_id })?;

        let Some(mut envelope) = state.failed.remove(position) else {
            return Err(QueueError::JobNotFound { job_id });
        };
        envelope.state = JobState::Pending;
        envelope.attempts = 0;
        envelope.visible_at = Utc::now();
        envelope.finished_at = None;
        state.active.push_back(ActiveJob {
            envelope,
            delivery_id: None,
        });
        Ok(())
    }

    async fn purge_expired(&self) -> QueueResult<usize> {
        let mut state = self.state.lock();
        Ok(self.purge_locked(&mut state, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(max_attempts: u32) -> InMemoryJobQueue {
        InMemoryJobQueue::new(max_attempts, RetentionConfig::default())
    }

    const VISIBILITY: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_receive_hides_job_until_finished() {
        let queue = queue(3);
        queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();

        let received = queue.receive(VISIBILITY).await.unwrap().unwrap();
        assert_eq!(received.envelope.attempts, 1);
        assert!(queue.receive(VISIBILITY).await.unwrap().is_none());

        queue.complete(&received.receipt).await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn test_dedup_key_suppresses_active_duplicates() {
        let queue = queue(3);
        let key = Some("kpi-breach-check-all".to_string());

        let first = queue
            .enqueue(MonitoringJob::ProcessAll, key.clone())
            .await
            .unwrap();
        let second = queue
            .enqueue(MonitoringJob::ProcessAll, key.clone())
            .await
            .unwrap();
        assert!(first.is_enqueued());
        assert_eq!(second, EnqueueOutcome::Deduplicated(first.job_id()));

        let received = queue.receive(VISIBILITY).await.unwrap().unwrap();
        queue.complete(&received.receipt).await.unwrap();

        let third = queue.enqueue(MonitoringJob::ProcessAll, key).await.unwrap();
        assert!(third.is_enqueued());
        assert_eq!(queue.stats().await.unwrap().total_deduplicated, 1);
    }

    #[tokio::test]
    async fn test_expired_visibility_redelivers_and_invalidates_old_receipt() {
        let queue = queue(3);
        queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();

        let first = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        let second = queue.receive(VISIBILITY).await.unwrap().unwrap();
        assert_eq!(first.envelope.job_id, second.envelope.job_id);
        assert_eq!(second.envelope.attempts, 2);

        let stale = queue.complete(&first.receipt).await.unwrap_err();
        assert_eq!(
            stale,
            QueueError::StaleReceipt {
                job_id: first.envelope.job_id
            }
        );
        queue.complete(&second.receipt).await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_job_parked_after_max_attempts() {
        let queue = queue(2);
        queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();

        queue.receive(Duration::ZERO).await.unwrap().unwrap();
        queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert!(queue.receive(VISIBILITY).await.unwrap().is_none());

        let failed = queue.failed_jobs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].state, JobState::Failed);
        assert_eq!(failed[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_retry_delays_visibility() {
        let queue = queue(3);
        queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();
        let received = queue.receive(VISIBILITY).await.unwrap().unwrap();

        queue
            .retry(&received.receipt, Duration::from_secs(60), "db down".to_string())
            .await
            .unwrap();
        assert!(queue.receive(VISIBILITY).await.unwrap().is_none());
        assert_eq!(queue.stats().await.unwrap().pending, 1);

        queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();
        let next = queue.receive(VISIBILITY).await.unwrap().unwrap();
        assert_ne!(next.envelope.job_id, received.envelope.job_id);
    }

    #[tokio::test]
    async fn test_requeue_failed_restores_attempt_budget() {
        let queue = queue(3);
        queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();
        let received = queue.receive(VISIBILITY).await.unwrap().unwrap();
        queue
            .fail(&received.receipt, "not found".to_string())
            .await
            .unwrap();

        queue.requeue_failed(received.envelope.job_id).await.unwrap();
        assert!(queue.failed_jobs().await.unwrap().is_empty());

        let again = queue.receive(VISIBILITY).await.unwrap().unwrap();
        assert_eq!(again.envelope.job_id, received.envelope.job_id);
        assert_eq!(again.envelope.attempts, 1);

        let missing = queue.requeue_failed(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(missing, QueueError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_retention_limits_finished_jobs() {
        let queue = InMemoryJobQueue::new(
            3,
            RetentionConfig {
                completed_max_count: 2,
                completed_max_age_seconds: 3600,
                failed_max_count: 10,
                failed_max_age_seconds: 0,
            },
        );

        for _ in 0..3 {
            queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();
            let received = queue.receive(VISIBILITY).await.unwrap().unwrap();
            queue.complete(&received.receipt).await.unwrap();
        }
        assert_eq!(queue.completed_jobs().await.unwrap().len(), 2);

        queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();
        let received = queue.receive(VISIBILITY).await.unwrap().unwrap();
        queue
            .fail(&received.receipt, "permanent".to_string())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        queue.purge_expired().await.unwrap();
        assert!(queue.failed_jobs().await.unwrap().is_empty());
        assert_eq!(queue.stats().await.unwrap().total_purged, 2);
    }
}

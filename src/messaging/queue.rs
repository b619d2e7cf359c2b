use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

use super::errors::QueueResult;
use super::jobs::{EnqueueOutcome, JobEnvelope, MonitoringJob, ReceiptHandle, ReceivedJob};

/// Point-in-time queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_enqueued: u64,
    pub total_deduplicated: u64,
    pub total_received: u64,
    pub total_completed: u64,
    pub total_retried: u64,
    pub total_failed: u64,
    pub total_purged: u64,
}

/// Process-local lifetime totals shared by the queue backends
#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    pub(crate) enqueued: AtomicU64,
    pub(crate) deduplicated: AtomicU64,
    pub(crate) received: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) retried: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) purged: AtomicU64,
}

impl QueueCounters {
    pub(crate) fn snapshot(
        &self,
        pending: usize,
        in_flight: usize,
        completed: usize,
        failed: usize,
    ) -> QueueStats {
        QueueStats {
            pending,
            in_flight,
            completed,
            failed,
            total_enqueued: self.enqueued.load(Ordering::Relaxed),
            total_deduplicated: self.deduplicated.load(Ordering::Relaxed),
            total_received: self.received.load(Ordering::Relaxed),
            total_completed: self.completed.load(Ordering::Relaxed),
            total_retried: self.retried.load(Ordering::Relaxed),
            total_failed: self.failed.load(Ordering::Relaxed),
            total_purged: self.purged.load(Ordering::Relaxed),
        }
    }
}

/// At-least-once job queue with visibility timeouts
///
/// A received job stays invisible until its visibility timeout elapses; if
/// the receiver neither completes, retries nor fails it by then, the job is
/// delivered again. Finished jobs are retained for inspection subject to the
/// queue's retention policy.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Add a job unless an active job already carries `dedup_key`
    async fn enqueue(
        &self,
        job: MonitoringJob,
        dedup_key: Option<String>,
    ) -> QueueResult<EnqueueOutcome>;

    /// Take the next visible job, hiding it for `visibility_timeout`
    async fn receive(&self, visibility_timeout: Duration) -> QueueResult<Option<ReceivedJob>>;

    async fn complete(&self, receipt: &ReceiptHandle) -> QueueResult<()>;

    /// Return the job to the queue, visible again after `delay`
    async fn retry(&self, receipt: &ReceiptHandle, delay: Duration, reason: String)
        -> QueueResult<()>;

    /// Park the job as failed
    async fn fail(&self, receipt: &ReceiptHandle, reason: String) -> QueueResult<()>;

    async fn stats(&self) -> QueueResult<QueueStats>;

    async fn failed_jobs(&self) -> QueueResult<Vec<JobEnvelope>>;

    async fn completed_jobs(&self) -> QueueResult<Vec<JobEnvelope>>;

    /// Move a parked job back to pending with a fresh attempt budget
    async fn requeue_failed(&self, job_id: Uuid) -> QueueResult<()>;

    /// Drop finished jobs beyond the retention limits; returns how many
    async fn purge_expired(&self) -> QueueResult<usize>;
}

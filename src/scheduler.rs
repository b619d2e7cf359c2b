//! # Recurring Scheduler
//!
//! Enqueues monitoring jobs on fixed intervals and on demand. The scheduler
//! never executes work itself; it only enqueues.
//!
//! Registrations are keyed by a logical job id. Registering an id that is
//! already registered replaces the earlier timer instead of adding a second
//! one, and every recurring enqueue uses the job id as its dedup key, so a
//! slow or failing cycle never stacks up duplicate pending cycles.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::errors::{MonitorError, MonitorResult};
use crate::log_queue_worker;
use crate::messaging::{EnqueueOutcome, JobQueue, MonitoringJob};
use crate::metrics;

/// Public view of one recurring registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringRegistration {
    pub job_id: String,
    pub job: MonitoringJob,
    pub interval: Duration,
    pub registered_at: DateTime<Utc>,
}

struct RegistrationEntry {
    registration: RecurringRegistration,
    handle: JoinHandle<()>,
}

pub struct RecurringScheduler {
    queue: Arc<dyn JobQueue>,
    registrations: DashMap<String, RegistrationEntry>,
}

impl std::fmt::Debug for RecurringScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurringScheduler")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

impl RecurringScheduler {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            registrations: DashMap::new(),
        }
    }

    /// Register (or replace) a recurring job
    ///
    /// With `run_on_start` the first enqueue happens immediately, otherwise
    /// after one full interval. Returns `true` when an existing registration
    /// with the same id was replaced. Must be called from within a tokio
    /// runtime.
    pub fn register_recurring(
        &self,
        job_id: impl Into<String>,
        interval: Duration,
        job: MonitoringJob,
        run_on_start: bool,
    ) -> MonitorResult<bool> {
        let job_id = job_id.into();
        if interval.is_zero() {
            return Err(MonitorError::Configuration(format!(
                "recurring job '{job_id}' needs a non-zero interval"
            )));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            MonitorError::Internal(format!("scheduler requires a tokio runtime: {e}"))
        })?;

        let registration = RecurringRegistration {
            job_id: job_id.clone(),
            job: job.clone(),
            interval,
            registered_at: Utc::now(),
        };

        let queue = self.queue.clone();
        let timer_job_id = job_id.clone();
        let handle = runtime.spawn(async move {
            let first_tick = if run_on_start {
                Instant::now()
            } else {
                Instant::now() + interval
            };
            let mut ticker = interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                enqueue_job(queue.as_ref(), job.clone(), timer_job_id.clone()).await;
            }
        });

        let replaced = self
            .registrations
            .insert(
                job_id.clone(),
                RegistrationEntry {
                    registration,
                    handle,
                },
            )
            .map(|previous| previous.handle.abort())
            .is_some();

        info!(
            job_id = %job_id,
            interval_seconds = interval.as_secs(),
            run_on_start,
            replaced,
            "Recurring job registered"
        );
        Ok(replaced)
    }

    /// Remove a registration; returns whether it existed
    pub fn unregister(&self, job_id: &str) -> bool {
        match self.registrations.remove(job_id) {
            Some((_, entry)) => {
                entry.handle.abort();
                info!(job_id = %job_id, "Recurring job unregistered");
                true
            }
            None => false,
        }
    }

    pub fn registrations(&self) -> Vec<RecurringRegistration> {
        let mut registrations: Vec<RecurringRegistration> = self
            .registrations
            .iter()
            .map(|entry| entry.value().registration.clone())
            .collect();
        registrations.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        registrations
    }

    /// Enqueue a check-all cycle now
    pub async fn trigger_process_all(&self) -> MonitorResult<EnqueueOutcome> {
        self.trigger(MonitoringJob::ProcessAll).await
    }

    /// Enqueue a single-indicator check now
    pub async fn trigger_process_one(&self, indicator_id: Uuid) -> MonitorResult<EnqueueOutcome> {
        self.trigger(MonitoringJob::ProcessOne { indicator_id }).await
    }

    async fn trigger(&self, job: MonitoringJob) -> MonitorResult<EnqueueOutcome> {
        let dedup_key = job.default_dedup_key();
        let job_kind = job.kind_name();
        let outcome = self.queue.enqueue(job, Some(dedup_key)).await?;
        if outcome.is_enqueued() {
            metrics::jobs_enqueued_total().add(1, &[KeyValue::new("job_kind", job_kind)]);
        }
        log_queue_worker!(
            info,
            "JOB_TRIGGERED",
            job_id: outcome.job_id(),
            job_kind: job_kind,
            enqueued: outcome.is_enqueued()
        );
        Ok(outcome)
    }

    /// Stop every recurring timer
    pub fn shutdown(&self) {
        let job_ids: Vec<String> = self
            .registrations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for job_id in job_ids {
            if let Some((_, entry)) = self.registrations.remove(&job_id) {
                entry.handle.abort();
            }
        }
        debug!("Recurring scheduler stopped");
    }
}

impl Drop for RecurringScheduler {
    fn drop(&mut self) {
        for entry in self.registrations.iter() {
            entry.value().handle.abort();
        }
    }
}

async fn enqueue_job(queue: &dyn JobQueue, job: MonitoringJob, job_id: String) {
    let job_kind = job.kind_name();
    match queue.enqueue(job, Some(job_id.clone())).await {
        Ok(EnqueueOutcome::Enqueued(queued_id)) => {
            metrics::jobs_enqueued_total().add(1, &[KeyValue::new("job_kind", job_kind)]);
            debug!(
                recurring_job_id = %job_id,
                queued_job_id = %queued_id,
                "Recurring job enqueued"
            );
        }
        Ok(EnqueueOutcome::Deduplicated(existing)) => {
            debug!(
                recurring_job_id = %job_id,
                existing_job_id = %existing,
                "Previous recurring job still active, tick skipped"
            );
        }
        Err(e) => {
            error!(
                recurring_job_id = %job_id,
                error = %e,
                "Failed to enqueue recurring job"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionConfig;
    use crate::messaging::InMemoryJobQueue;

    fn scheduler() -> (Arc<InMemoryJobQueue>, RecurringScheduler) {
        let queue = Arc::new(InMemoryJobQueue::new(3, RetentionConfig::default()));
        (queue.clone(), RecurringScheduler::new(queue))
    }

    #[tokio::test]
    async fn test_reregistration_replaces_previous() {
        let (_queue, scheduler) = scheduler();
        let hour = Duration::from_secs(3600);

        let replaced = scheduler
            .register_recurring("check-all", hour, MonitoringJob::ProcessAll, false)
            .unwrap();
        assert!(!replaced);
        let replaced = scheduler
            .register_recurring("check-all", hour * 2, MonitoringJob::ProcessAll, false)
            .unwrap();
        assert!(replaced);

        let registrations = scheduler.registrations();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].interval, hour * 2);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let (_queue, scheduler) = scheduler();
        let err = scheduler
            .register_recurring("check-all", Duration::ZERO, MonitoringJob::ProcessAll, false)
            .unwrap_err();
        assert!(matches!(err, MonitorError::Configuration(_)));
        assert!(scheduler.registrations().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_process_one_dedups_pending() {
        let (queue, scheduler) = scheduler();
        let indicator_id = Uuid::now_v7();

        let first = scheduler.trigger_process_one(indicator_id).await.unwrap();
        let second = scheduler.trigger_process_one(indicator_id).await.unwrap();
        assert!(first.is_enqueued());
        assert!(!second.is_enqueued());
        assert_eq!(queue.active_len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_and_shutdown() {
        let (_queue, scheduler) = scheduler();
        let hour = Duration::from_secs(3600);
        scheduler
            .register_recurring("a", hour, MonitoringJob::ProcessAll, false)
            .unwrap();
        scheduler
            .register_recurring("b", hour, MonitoringJob::ProcessAll, false)
            .unwrap();

        assert!(scheduler.unregister("a"));
        assert!(!scheduler.unregister("a"));
        scheduler.shutdown();
        assert!(scheduler.registrations().is_empty());
    }
}
